// libs/pharmacy-cell/src/services/orders.rs
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use shared_utils::clock::Clock;

use crate::models::{Order, PharmacyError, PlaceOrderRequest};
use crate::services::store::PharmacyStore;

const MAX_CAS_ATTEMPTS: u32 = 3;

pub struct OrderService {
    store: Arc<dyn PharmacyStore>,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    pub fn new(store: Arc<dyn PharmacyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Checkout: decrement each line's stock, rejecting any line that would
    /// drive stock negative. Each decrement is a compare-and-swap on the
    /// medicine row; lines settle independently.
    pub async fn place_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
        auth_token: Option<&str>,
    ) -> Result<Order, PharmacyError> {
        if request.items.is_empty() {
            return Err(PharmacyError::Validation(
                "Order must contain at least one item".to_string(),
            ));
        }
        for line in &request.items {
            if line.quantity < 1 {
                return Err(PharmacyError::Validation(
                    "Order quantities must be at least 1".to_string(),
                ));
            }
        }

        let mut total_amount = 0.0;
        for line in &request.items {
            total_amount += self
                .take_stock(line.medicine_id, line.quantity, auth_token)
                .await?;
        }

        let now = self.clock.now();
        let row = json!({
            "user_id": user_id,
            "items": request.items,
            "total_amount": total_amount,
            "status": "placed",
            "created_at": now.to_rfc3339()
        });

        let order = self.store.insert_order(row, auth_token).await?;
        info!("Order {} placed for user {}", order.id, user_id);
        Ok(order)
    }

    /// Decrement one medicine's stock, returning the line price. Rejects when
    /// stock is insufficient at the moment of the swap.
    async fn take_stock(
        &self,
        medicine_id: Uuid,
        quantity: i32,
        auth_token: Option<&str>,
    ) -> Result<f64, PharmacyError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let medicine = self.store.get_medicine(medicine_id, auth_token).await?;

            if medicine.stock < quantity {
                return Err(PharmacyError::InsufficientStock {
                    medicine: medicine.name,
                });
            }

            let patch = json!({
                "stock": medicine.stock - quantity,
                "updated_at": self.clock.now().to_rfc3339()
            });

            match self
                .store
                .update_medicine_cas(medicine_id, medicine.stock, patch, auth_token)
                .await?
            {
                Some(_) => {
                    return Ok(medicine.supplier_price.unwrap_or(0.0) * quantity as f64);
                }
                None => {
                    warn!(
                        "Stock changed under order line for medicine {}, retrying ({}/{})",
                        medicine_id, attempt, MAX_CAS_ATTEMPTS
                    );
                }
            }
        }

        Err(PharmacyError::Conflict(
            "Could not reserve stock after repeated changes".to_string(),
        ))
    }
}
