// libs/pharmacy-cell/src/services/stock.rs
use std::sync::Arc;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use chrono::Utc;

use crate::models::{
    CreateMedicineRequest, LowStockItem, Medicine, NotificationStatus, PharmacyError,
    UpdateMedicineRequest, Urgency,
};
use crate::services::store::PharmacyStore;

/// Restock priority from the stock-to-threshold ratio. A zero reorder level
/// never reaches the ratio: it is rejected at write time, and an out-of-stock
/// medicine is high urgency regardless.
pub fn classify_urgency(stock: i32, reorder_level: i32) -> Urgency {
    if stock == 0 {
        return Urgency::High;
    }
    if reorder_level <= 0 {
        return Urgency::Low;
    }
    if stock as f64 / reorder_level as f64 <= 0.5 {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

/// Quantity that clears the reorder threshold with margin: at least the
/// configured reorder quantity, and at least twice the threshold minus what
/// is still on the shelf.
pub fn calculate_reorder_quantity(medicine: &Medicine) -> i32 {
    let margin = medicine.reorder_level * 2 - medicine.stock;
    medicine.reorder_quantity.unwrap_or(0).max(margin)
}

fn validate_medicine_config(stock: i32, reorder_level: i32) -> Result<(), PharmacyError> {
    if stock < 0 {
        return Err(PharmacyError::Validation(
            "Stock cannot be negative".to_string(),
        ));
    }
    if reorder_level < 1 {
        return Err(PharmacyError::Validation(
            "Reorder level must be at least 1".to_string(),
        ));
    }
    Ok(())
}

pub struct StockMonitorService {
    store: Arc<dyn PharmacyStore>,
}

impl StockMonitorService {
    pub fn new(store: Arc<dyn PharmacyStore>) -> Self {
        Self { store }
    }

    /// Point-in-time scan for medicines at or under their reorder threshold.
    pub async fn scan(&self, auth_token: Option<&str>) -> Result<Vec<Medicine>, PharmacyError> {
        let medicines = self.store.list_medicines(auth_token).await?;
        let breached: Vec<Medicine> = medicines
            .into_iter()
            .filter(|m| m.is_below_reorder_level())
            .collect();

        debug!("Stock scan found {} medicines under threshold", breached.len());
        Ok(breached)
    }

    pub async fn low_stock_report(
        &self,
        auth_token: Option<&str>,
    ) -> Result<Vec<LowStockItem>, PharmacyError> {
        let breached = self.scan(auth_token).await?;

        Ok(breached
            .into_iter()
            .map(|medicine| LowStockItem {
                urgency: classify_urgency(medicine.stock, medicine.reorder_level),
                suggested_quantity: calculate_reorder_quantity(&medicine),
                medicine,
            })
            .collect())
    }

    pub async fn create_medicine(
        &self,
        request: CreateMedicineRequest,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        if request.name.trim().is_empty() {
            return Err(PharmacyError::Validation(
                "Medicine name is required".to_string(),
            ));
        }
        validate_medicine_config(request.stock, request.reorder_level)?;

        let now = Utc::now();
        let row = json!({
            "name": request.name,
            "stock": request.stock,
            "reorder_level": request.reorder_level,
            "reorder_quantity": request.reorder_quantity,
            "supplier_price": request.supplier_price,
            "restock_history": [],
            "notification_status": NotificationStatus::Pending.to_string(),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        self.store.insert_medicine(row, auth_token).await
    }

    pub async fn update_medicine(
        &self,
        medicine_id: Uuid,
        request: UpdateMedicineRequest,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        let current = self.store.get_medicine(medicine_id, auth_token).await?;

        let stock = request.stock.unwrap_or(current.stock);
        let reorder_level = request.reorder_level.unwrap_or(current.reorder_level);
        validate_medicine_config(stock, reorder_level)?;

        let mut patch = serde_json::Map::new();
        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(PharmacyError::Validation(
                    "Medicine name is required".to_string(),
                ));
            }
            patch.insert("name".to_string(), json!(name));
        }
        if let Some(stock) = request.stock {
            patch.insert("stock".to_string(), json!(stock));
        }
        if let Some(reorder_level) = request.reorder_level {
            patch.insert("reorder_level".to_string(), json!(reorder_level));
        }
        if let Some(reorder_quantity) = request.reorder_quantity {
            patch.insert("reorder_quantity".to_string(), json!(reorder_quantity));
        }
        if let Some(supplier_price) = request.supplier_price {
            patch.insert("supplier_price".to_string(), json!(supplier_price));
        }
        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.store
            .update_medicine(medicine_id, serde_json::Value::Object(patch), auth_token)
            .await
    }

    pub async fn get_medicine(
        &self,
        medicine_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        self.store.get_medicine(medicine_id, auth_token).await
    }

    pub async fn list_medicines(&self, auth_token: Option<&str>) -> Result<Vec<Medicine>, PharmacyError> {
        self.store.list_medicines(auth_token).await
    }
}
