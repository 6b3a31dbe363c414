// libs/pharmacy-cell/src/services/reorder.rs
//
// Reorder lifecycle: threshold breach -> pending request (deduped) -> supplier
// notification with a signed approval link -> token-gated restock, or an
// admin-driven status walk ending in a completed request that credits stock
// exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Duration;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{dispatch_background, NotificationKind, Notifier};
use shared_models::auth::User;
use shared_utils::action_token::{
    mint_action_token, verify_action_token, ActionTokenError,
};
use shared_utils::clock::Clock;

use crate::models::{
    Medicine, NotificationStatus, PharmacyError, ReorderRequest, ReorderStatus,
    RestockEntry, UpdateReorderStatusRequest,
};
use crate::services::stock::{calculate_reorder_quantity, classify_urgency};
use crate::services::store::PharmacyStore;

const RESTOCK_ACTION: &str = "restock";
const MAX_CAS_ATTEMPTS: u32 = 3;

/// One async mutex per medicine id; serializes stock mutations in-process.
#[derive(Default)]
struct MedicineLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl MedicineLocks {
    async fn acquire(&self, medicine_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("medicine lock map poisoned");
            map.entry(medicine_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub fn validate_reorder_transition(
    current: ReorderStatus,
    new: ReorderStatus,
) -> Result<(), PharmacyError> {
    let allowed = match current {
        ReorderStatus::Pending => matches!(
            new,
            ReorderStatus::Approved | ReorderStatus::Completed | ReorderStatus::Cancelled
        ),
        ReorderStatus::Approved => {
            matches!(new, ReorderStatus::Completed | ReorderStatus::Cancelled)
        }
        ReorderStatus::Completed | ReorderStatus::Cancelled => false,
    };

    if !allowed {
        warn!("Invalid reorder transition attempted: {} -> {}", current, new);
        return Err(PharmacyError::InvalidStatusTransition {
            from: current,
            to: new,
        });
    }
    Ok(())
}

pub struct ReorderEngineService {
    store: Arc<dyn PharmacyStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    token_secret: String,
    public_base_url: String,
    /// Approval tokens are single-use; redeemed ones are refused on replay.
    consumed_tokens: Mutex<HashSet<String>>,
    locks: MedicineLocks,
}

impl ReorderEngineService {
    pub fn new(
        store: Arc<dyn PharmacyStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        token_secret: String,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            token_secret,
            public_base_url,
            consumed_tokens: Mutex::new(HashSet::new()),
            locks: MedicineLocks::default(),
        }
    }

    fn approval_link(&self, medicine_id: Uuid, token: &str) -> String {
        format!(
            "{}/pharmacy/medicines/{}/restock/{}",
            self.public_base_url, medicine_id, token
        )
    }

    /// Raise (or return the existing) pending reorder request for a medicine.
    /// Idempotent: one pending request per medicine, enforced both here and by
    /// the storage partial-unique index.
    pub async fn initiate_reorder(
        &self,
        medicine: &Medicine,
        auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError> {
        if let Some(existing) = self
            .store
            .find_pending_reorder(medicine.id, auth_token)
            .await?
        {
            debug!(
                "Reorder for medicine {} already pending as {}",
                medicine.id, existing.id
            );
            return Ok(existing);
        }

        let now = self.clock.now();
        let urgency = classify_urgency(medicine.stock, medicine.reorder_level);
        let quantity = calculate_reorder_quantity(medicine);
        let expected_delivery = now + Duration::days(urgency.lead_time_days());

        let row = json!({
            "medicine_id": medicine.id,
            "quantity": quantity,
            "urgency": urgency.to_string(),
            "status": ReorderStatus::Pending.to_string(),
            "expected_delivery": expected_delivery.to_rfc3339(),
            "history": [
                {
                    "status": "initiated",
                    "date": now.to_rfc3339(),
                    "updated_by": null,
                    "notes": null
                }
            ],
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let request = match self.store.insert_reorder(row, auth_token).await {
            Ok(request) => request,
            // Another writer created the pending request between our check and
            // insert; theirs wins.
            Err(PharmacyError::Conflict(_)) => {
                return self
                    .store
                    .find_pending_reorder(medicine.id, auth_token)
                    .await?
                    .ok_or_else(|| {
                        PharmacyError::Database(
                            "Pending reorder vanished after conflict".to_string(),
                        )
                    });
            }
            Err(e) => return Err(e),
        };

        let patch = json!({
            "notification_status": NotificationStatus::Sent.to_string(),
            "last_reorder_request": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });
        self.store
            .update_medicine(medicine.id, patch, auth_token)
            .await?;

        let token = mint_action_token(medicine.id, RESTOCK_ACTION, &self.token_secret, now);
        let payload = json!({
            "medicine_id": medicine.id,
            "medicine_name": medicine.name,
            "quantity": request.quantity,
            "urgency": request.urgency,
            "expected_delivery": request.expected_delivery,
            "approval_link": self.approval_link(medicine.id, &token),
        });

        dispatch_background(
            Arc::clone(&self.notifier),
            NotificationKind::ReorderAlert,
            payload.clone(),
        );
        dispatch_background(
            Arc::clone(&self.notifier),
            NotificationKind::SupplierReorder,
            payload,
        );

        info!(
            "Reorder {} raised for medicine {} ({} units, {} urgency)",
            request.id, medicine.id, request.quantity, request.urgency
        );
        Ok(request)
    }

    /// Scan-driven entry point: raise requests for every medicine at or under
    /// its threshold.
    pub async fn initiate_for_all(
        &self,
        breached: Vec<Medicine>,
        auth_token: Option<&str>,
    ) -> Result<Vec<ReorderRequest>, PharmacyError> {
        let mut requests = Vec::with_capacity(breached.len());
        for medicine in &breached {
            requests.push(self.initiate_reorder(medicine, auth_token).await?);
        }
        Ok(requests)
    }

    /// Redeem a restock approval token. Verification failures never touch
    /// stock; a verified token credits the medicine exactly once.
    pub async fn approve_restock(
        &self,
        medicine_id: Uuid,
        token: &str,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        let claims = verify_action_token(token, &self.token_secret, self.clock.now())
            .map_err(|e| match e {
                ActionTokenError::Expired => PharmacyError::TokenExpired,
                ActionTokenError::Invalid => PharmacyError::InvalidToken,
            })?;

        if claims.action != RESTOCK_ACTION || claims.record_id != medicine_id {
            warn!(
                "Restock token record mismatch: token for {}, path {}",
                claims.record_id, medicine_id
            );
            return Err(PharmacyError::InvalidToken);
        }

        // Serialize redemptions per medicine so a replayed token cannot slip
        // in between the consumed-check and the stock write.
        let _guard = self.locks.acquire(medicine_id).await;

        if self
            .consumed_tokens
            .lock()
            .expect("consumed token set poisoned")
            .contains(token)
        {
            return Err(PharmacyError::TokenConsumed);
        }

        let updated = self.credit_stock(medicine_id, None, auth_token).await?;

        self.consumed_tokens
            .lock()
            .expect("consumed token set poisoned")
            .insert(token.to_string());

        dispatch_background(
            Arc::clone(&self.notifier),
            NotificationKind::RestockCompleted,
            json!({
                "medicine_id": updated.id,
                "medicine_name": updated.name,
                "stock": updated.stock,
            }),
        );

        info!(
            "Restock approved for medicine {}, stock now {}",
            updated.id, updated.stock
        );
        Ok(updated)
    }

    pub async fn list_reorders(
        &self,
        status: Option<ReorderStatus>,
        auth_token: Option<&str>,
    ) -> Result<Vec<ReorderRequest>, PharmacyError> {
        self.store.list_reorders(status, auth_token).await
    }

    /// Walk a reorder request through its status machine. The transition into
    /// `completed` credits the medicine's stock by the request quantity; the
    /// from-state guard plus a status-conditioned update make re-completion
    /// impossible.
    pub async fn update_reorder_status(
        &self,
        request_id: Uuid,
        update: UpdateReorderStatusRequest,
        user: &User,
        auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError> {
        let current = self.store.get_reorder(request_id, auth_token).await?;

        validate_reorder_transition(current.status, update.status)?;

        let now = self.clock.now();
        let mut history = current.history.clone();
        history.push(crate::models::ReorderHistoryEntry {
            status: update.status.to_string(),
            date: now,
            updated_by: Some(user.id.clone()),
            notes: update.notes.clone(),
        });

        let patch = json!({
            "status": update.status.to_string(),
            "history": history,
            "updated_at": now.to_rfc3339()
        });

        // Conditioned on the status we validated against, so two racing
        // completions cannot both apply.
        let updated = self
            .store
            .update_reorder_cas(request_id, current.status, patch, auth_token)
            .await?
            .ok_or_else(|| {
                PharmacyError::Conflict("Reorder request was updated concurrently".to_string())
            })?;

        if update.status == ReorderStatus::Completed {
            let _guard = self.locks.acquire(current.medicine_id).await;
            self.credit_stock(current.medicine_id, Some(current.quantity), auth_token)
                .await?;
        }

        dispatch_background(
            Arc::clone(&self.notifier),
            NotificationKind::ReorderAlert,
            json!({
                "reorder_id": updated.id,
                "medicine_id": updated.medicine_id,
                "status": updated.status,
            }),
        );

        info!(
            "Reorder {} moved {} -> {}",
            request_id, current.status, updated.status
        );
        Ok(updated)
    }

    /// Atomically add units to a medicine: compare-and-swap on the stock
    /// column, retried a bounded number of times. `quantity` defaults to the
    /// medicine's configured restock amount.
    async fn credit_stock(
        &self,
        medicine_id: Uuid,
        quantity: Option<i32>,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let medicine = self.store.get_medicine(medicine_id, auth_token).await?;
            let amount = quantity.unwrap_or_else(|| medicine.restock_amount());
            let now = self.clock.now();

            let mut history = medicine.restock_history.clone();
            history.push(RestockEntry {
                date: now,
                quantity: amount,
                total_amount: medicine.supplier_price.unwrap_or(0.0) * amount as f64,
                bill_no: format!("PO-{}", now.timestamp()),
                status: "received".to_string(),
            });

            let patch = json!({
                "stock": medicine.stock + amount,
                "restock_history": history,
                "last_restocked": now.to_rfc3339(),
                "last_reorder_request": null,
                "notification_status": NotificationStatus::Restocked.to_string(),
                "updated_at": now.to_rfc3339()
            });

            match self
                .store
                .update_medicine_cas(medicine_id, medicine.stock, patch, auth_token)
                .await?
            {
                Some(updated) => return Ok(updated),
                None => {
                    warn!(
                        "Stock changed under restock of medicine {}, retrying ({}/{})",
                        medicine_id, attempt, MAX_CAS_ATTEMPTS
                    );
                }
            }
        }

        Err(PharmacyError::Conflict(
            "Could not apply restock after repeated stock changes".to_string(),
        ))
    }
}
