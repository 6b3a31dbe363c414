//! Reorder engine behavior against an in-memory store that mirrors the
//! storage contracts: a partial-unique index over pending requests and
//! guarded (compare-and-swap) updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use notification_cell::LogNotifier;
use pharmacy_cell::models::{
    Medicine, NotificationStatus, Order, PharmacyError, ReorderRequest, ReorderStatus,
    UpdateReorderStatusRequest, Urgency,
};
use pharmacy_cell::models::{OrderLine, PlaceOrderRequest};
use pharmacy_cell::services::orders::OrderService;
use pharmacy_cell::services::reorder::ReorderEngineService;
use pharmacy_cell::services::stock::StockMonitorService;
use pharmacy_cell::services::store::PharmacyStore;
use shared_models::auth::User;
use shared_utils::action_token::mint_action_token;
use shared_utils::clock::FixedClock;

const SECRET: &str = "test-secret-key-for-action-tokens";
const BASE_URL: &str = "http://localhost:3000";

fn merge(current: &impl serde::Serialize, patch: Value) -> Value {
    let mut value = serde_json::to_value(current).unwrap();
    if let (Some(obj), Some(patch_obj)) = (value.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_obj {
            obj.insert(k.clone(), v.clone());
        }
    }
    value
}

#[derive(Default)]
struct InMemoryPharmacy {
    medicines: Mutex<HashMap<Uuid, Medicine>>,
    reorders: Mutex<HashMap<Uuid, ReorderRequest>>,
    orders: Mutex<Vec<Order>>,
}

impl InMemoryPharmacy {
    fn seed(&self, medicine: Medicine) {
        self.medicines.lock().unwrap().insert(medicine.id, medicine);
    }

    fn medicine(&self, id: Uuid) -> Medicine {
        self.medicines.lock().unwrap().get(&id).unwrap().clone()
    }

    fn reorder_count(&self) -> usize {
        self.reorders.lock().unwrap().len()
    }
}

#[async_trait]
impl PharmacyStore for InMemoryPharmacy {
    async fn list_medicines(
        &self,
        _auth_token: Option<&str>,
    ) -> Result<Vec<Medicine>, PharmacyError> {
        Ok(self.medicines.lock().unwrap().values().cloned().collect())
    }

    async fn get_medicine(
        &self,
        medicine_id: Uuid,
        _auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        self.medicines
            .lock()
            .unwrap()
            .get(&medicine_id)
            .cloned()
            .ok_or(PharmacyError::MedicineNotFound)
    }

    async fn insert_medicine(
        &self,
        row: Value,
        _auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        let mut value = row;
        value["id"] = json!(Uuid::new_v4().to_string());
        let medicine: Medicine = serde_json::from_value(value)
            .map_err(|e| PharmacyError::Database(e.to_string()))?;
        self.seed(medicine.clone());
        Ok(medicine)
    }

    async fn update_medicine(
        &self,
        medicine_id: Uuid,
        patch: Value,
        _auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        let mut medicines = self.medicines.lock().unwrap();
        let current = medicines
            .get(&medicine_id)
            .ok_or(PharmacyError::MedicineNotFound)?;
        let updated: Medicine = serde_json::from_value(merge(current, patch))
            .map_err(|e| PharmacyError::Database(e.to_string()))?;
        medicines.insert(medicine_id, updated.clone());
        Ok(updated)
    }

    async fn update_medicine_cas(
        &self,
        medicine_id: Uuid,
        expected_stock: i32,
        patch: Value,
        _auth_token: Option<&str>,
    ) -> Result<Option<Medicine>, PharmacyError> {
        let mut medicines = self.medicines.lock().unwrap();
        let current = medicines
            .get(&medicine_id)
            .ok_or(PharmacyError::MedicineNotFound)?;
        if current.stock != expected_stock {
            return Ok(None);
        }
        let updated: Medicine = serde_json::from_value(merge(current, patch))
            .map_err(|e| PharmacyError::Database(e.to_string()))?;
        medicines.insert(medicine_id, updated.clone());
        Ok(Some(updated))
    }

    async fn find_pending_reorder(
        &self,
        medicine_id: Uuid,
        _auth_token: Option<&str>,
    ) -> Result<Option<ReorderRequest>, PharmacyError> {
        Ok(self
            .reorders
            .lock()
            .unwrap()
            .values()
            .find(|r| r.medicine_id == medicine_id && r.status == ReorderStatus::Pending)
            .cloned())
    }

    async fn insert_reorder(
        &self,
        row: Value,
        _auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError> {
        let mut reorders = self.reorders.lock().unwrap();
        let medicine_id: Uuid =
            serde_json::from_value(row["medicine_id"].clone()).unwrap();
        // Partial-unique index over pending requests.
        if reorders
            .values()
            .any(|r| r.medicine_id == medicine_id && r.status == ReorderStatus::Pending)
        {
            return Err(PharmacyError::Conflict(
                "duplicate pending reorder".to_string(),
            ));
        }
        let mut value = row;
        value["id"] = json!(Uuid::new_v4().to_string());
        let request: ReorderRequest = serde_json::from_value(value)
            .map_err(|e| PharmacyError::Database(e.to_string()))?;
        reorders.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_reorder(
        &self,
        request_id: Uuid,
        _auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError> {
        self.reorders
            .lock()
            .unwrap()
            .get(&request_id)
            .cloned()
            .ok_or(PharmacyError::ReorderNotFound)
    }

    async fn update_reorder_cas(
        &self,
        request_id: Uuid,
        expected_status: ReorderStatus,
        patch: Value,
        _auth_token: Option<&str>,
    ) -> Result<Option<ReorderRequest>, PharmacyError> {
        let mut reorders = self.reorders.lock().unwrap();
        let current = reorders
            .get(&request_id)
            .ok_or(PharmacyError::ReorderNotFound)?;
        if current.status != expected_status {
            return Ok(None);
        }
        let updated: ReorderRequest = serde_json::from_value(merge(current, patch))
            .map_err(|e| PharmacyError::Database(e.to_string()))?;
        reorders.insert(request_id, updated.clone());
        Ok(Some(updated))
    }

    async fn list_reorders(
        &self,
        status: Option<ReorderStatus>,
        _auth_token: Option<&str>,
    ) -> Result<Vec<ReorderRequest>, PharmacyError> {
        Ok(self
            .reorders
            .lock()
            .unwrap()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn insert_order(
        &self,
        row: Value,
        _auth_token: Option<&str>,
    ) -> Result<Order, PharmacyError> {
        let mut value = row;
        value["id"] = json!(Uuid::new_v4().to_string());
        let order: Order =
            serde_json::from_value(value).map_err(|e| PharmacyError::Database(e.to_string()))?;
        self.orders.lock().unwrap().push(order.clone());
        Ok(order)
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 3, 12, 0, 0).unwrap()
}

fn medicine(stock: i32, reorder_level: i32, reorder_quantity: Option<i32>) -> Medicine {
    Medicine {
        id: Uuid::new_v4(),
        name: "Amoxicillin".to_string(),
        stock,
        reorder_level,
        reorder_quantity,
        supplier_price: Some(2.0),
        restock_history: vec![],
        last_restocked: None,
        last_reorder_request: None,
        notification_status: NotificationStatus::Pending,
        created_at: fixed_now(),
        updated_at: fixed_now(),
    }
}

fn engine_at(store: Arc<InMemoryPharmacy>, now: DateTime<Utc>) -> ReorderEngineService {
    ReorderEngineService::new(
        store,
        Arc::new(LogNotifier),
        Arc::new(FixedClock(now)),
        SECRET.to_string(),
        BASE_URL.to_string(),
    )
}

fn admin() -> User {
    User {
        id: Uuid::new_v4().to_string(),
        email: Some("admin@example.com".to_string()),
        role: Some("admin".to_string()),
        created_at: None,
    }
}

#[tokio::test]
async fn initiate_reorder_computes_quantity_and_delivery() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(4, 10, Some(50));
    store.seed(m.clone());
    let engine = engine_at(Arc::clone(&store), fixed_now());

    let request = engine.initiate_reorder(&m, None).await.unwrap();

    // stock 4 of 10 => medium urgency => 5-day lead time.
    assert_eq!(request.urgency, Urgency::Medium);
    assert_eq!(request.quantity, 50);
    assert_eq!(request.status, ReorderStatus::Pending);
    assert_eq!(request.expected_delivery, fixed_now() + Duration::days(5));
    assert_eq!(request.history.len(), 1);
    assert_eq!(request.history[0].status, "initiated");

    let updated = store.medicine(m.id);
    assert_eq!(updated.notification_status, NotificationStatus::Sent);
    assert_eq!(updated.last_reorder_request, Some(fixed_now()));
}

#[tokio::test]
async fn out_of_stock_reorder_is_high_urgency_with_short_lead() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(0, 10, None);
    store.seed(m.clone());
    let engine = engine_at(Arc::clone(&store), fixed_now());

    let request = engine.initiate_reorder(&m, None).await.unwrap();

    assert_eq!(request.urgency, Urgency::High);
    assert_eq!(request.expected_delivery, fixed_now() + Duration::days(2));
    // No configured reorder quantity: margin term 2*10 - 0.
    assert_eq!(request.quantity, 20);
}

#[tokio::test]
async fn initiate_reorder_is_idempotent_while_pending() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(3, 10, Some(50));
    store.seed(m.clone());
    let engine = engine_at(Arc::clone(&store), fixed_now());

    let first = engine.initiate_reorder(&m, None).await.unwrap();
    let second = engine.initiate_reorder(&m, None).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.reorder_count(), 1);
}

#[tokio::test]
async fn scan_feeds_only_threshold_breaches() {
    let store = Arc::new(InMemoryPharmacy::default());
    let low = medicine(2, 10, Some(50));
    let healthy = medicine(40, 10, Some(50));
    store.seed(low.clone());
    store.seed(healthy);

    let monitor = StockMonitorService::new(store.clone() as Arc<dyn PharmacyStore>);
    let breached = monitor.scan(None).await.unwrap();

    assert_eq!(breached.len(), 1);
    assert_eq!(breached[0].id, low.id);
}

#[tokio::test]
async fn restock_approval_credits_stock_once() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(3, 10, Some(50));
    store.seed(m.clone());
    let engine = engine_at(Arc::clone(&store), fixed_now());

    let token = mint_action_token(m.id, "restock", SECRET, fixed_now());

    let updated = engine.approve_restock(m.id, &token, None).await.unwrap();
    assert_eq!(updated.stock, 53);
    assert_eq!(updated.notification_status, NotificationStatus::Restocked);
    assert_eq!(updated.last_reorder_request, None);
    assert_eq!(updated.restock_history.len(), 1);
    assert!(updated.restock_history[0].bill_no.starts_with("PO-"));
    assert_eq!(updated.restock_history[0].quantity, 50);

    // Replay of the same token is refused and stock stays put.
    let replay = engine.approve_restock(m.id, &token, None).await;
    assert!(matches!(replay, Err(PharmacyError::TokenConsumed)));
    assert_eq!(store.medicine(m.id).stock, 53);
}

#[tokio::test]
async fn tampered_medicine_id_is_rejected_without_mutation() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(3, 10, Some(50));
    let other = medicine(5, 10, Some(50));
    store.seed(m.clone());
    store.seed(other.clone());
    let engine = engine_at(Arc::clone(&store), fixed_now());

    // Token minted for `other`, redeemed against `m`.
    let token = mint_action_token(other.id, "restock", SECRET, fixed_now());
    let result = engine.approve_restock(m.id, &token, None).await;

    assert!(matches!(result, Err(PharmacyError::InvalidToken)));
    assert_eq!(store.medicine(m.id).stock, 3);
    assert_eq!(store.medicine(other.id).stock, 5);
}

#[tokio::test]
async fn expired_token_is_rejected_without_mutation() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(3, 10, Some(50));
    store.seed(m.clone());
    // Engine clock runs 25 hours after the token was minted.
    let engine = engine_at(Arc::clone(&store), fixed_now() + Duration::hours(25));

    let token = mint_action_token(m.id, "restock", SECRET, fixed_now());
    let result = engine.approve_restock(m.id, &token, None).await;

    assert!(matches!(result, Err(PharmacyError::TokenExpired)));
    assert_eq!(store.medicine(m.id).stock, 3);
}

#[tokio::test]
async fn completing_a_reorder_credits_stock_exactly_once() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(3, 10, Some(50));
    store.seed(m.clone());
    let engine = engine_at(Arc::clone(&store), fixed_now());
    let user = admin();

    let request = engine.initiate_reorder(&m, None).await.unwrap();

    let completed = engine
        .update_reorder_status(
            request.id,
            UpdateReorderStatusRequest {
                status: ReorderStatus::Completed,
                notes: Some("Delivered".to_string()),
            },
            &user,
            None,
        )
        .await
        .unwrap();

    assert_eq!(completed.status, ReorderStatus::Completed);
    assert_eq!(store.medicine(m.id).stock, 3 + request.quantity);
    assert_eq!(completed.history.last().unwrap().status, "completed");

    // Re-completing is an invalid transition and must not double-credit.
    let again = engine
        .update_reorder_status(
            request.id,
            UpdateReorderStatusRequest {
                status: ReorderStatus::Completed,
                notes: None,
            },
            &user,
            None,
        )
        .await;
    assert!(matches!(
        again,
        Err(PharmacyError::InvalidStatusTransition { .. })
    ));
    assert_eq!(store.medicine(m.id).stock, 3 + request.quantity);
}

#[tokio::test]
async fn checkout_decrements_stock_and_prices_lines() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(20, 10, Some(50));
    store.seed(m.clone());
    let orders = OrderService::new(
        Arc::clone(&store) as Arc<dyn PharmacyStore>,
        Arc::new(FixedClock(fixed_now())),
    );

    let order = orders
        .place_order(
            Uuid::new_v4(),
            PlaceOrderRequest {
                items: vec![OrderLine {
                    medicine_id: m.id,
                    quantity: 4,
                }],
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(store.medicine(m.id).stock, 16);
    // 4 units at the 2.0 supplier price.
    assert_eq!(order.total_amount, 8.0);
    assert_eq!(order.status, "placed");
}

#[tokio::test]
async fn checkout_rejects_insufficient_stock_without_mutation() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(3, 10, Some(50));
    store.seed(m.clone());
    let orders = OrderService::new(
        Arc::clone(&store) as Arc<dyn PharmacyStore>,
        Arc::new(FixedClock(fixed_now())),
    );

    let result = orders
        .place_order(
            Uuid::new_v4(),
            PlaceOrderRequest {
                items: vec![OrderLine {
                    medicine_id: m.id,
                    quantity: 5,
                }],
            },
            None,
        )
        .await;

    assert!(matches!(
        result,
        Err(PharmacyError::InsufficientStock { .. })
    ));
    assert_eq!(store.medicine(m.id).stock, 3);
}

#[tokio::test]
async fn cancelled_reorder_never_touches_stock() {
    let store = Arc::new(InMemoryPharmacy::default());
    let m = medicine(3, 10, Some(50));
    store.seed(m.clone());
    let engine = engine_at(Arc::clone(&store), fixed_now());

    let request = engine.initiate_reorder(&m, None).await.unwrap();
    engine
        .update_reorder_status(
            request.id,
            UpdateReorderStatusRequest {
                status: ReorderStatus::Cancelled,
                notes: None,
            },
            &admin(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(store.medicine(m.id).stock, 3);

    // A cancelled request no longer blocks a fresh reorder.
    let fresh = engine
        .initiate_reorder(&store.medicine(m.id), None)
        .await
        .unwrap();
    assert_ne!(fresh.id, request.id);
    assert_eq!(fresh.status, ReorderStatus::Pending);
}
