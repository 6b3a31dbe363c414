// libs/pharmacy-cell/src/services/store.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Medicine, Order, PharmacyError, ReorderRequest, ReorderStatus};

/// Persistence seam for the pharmacy services. Compare-and-swap updates are
/// expressed as filtered PATCHes; a `None` return means the guard column no
/// longer held its expected value.
#[async_trait]
pub trait PharmacyStore: Send + Sync {
    async fn list_medicines(&self, auth_token: Option<&str>) -> Result<Vec<Medicine>, PharmacyError>;

    async fn get_medicine(
        &self,
        medicine_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError>;

    async fn insert_medicine(
        &self,
        row: Value,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError>;

    async fn update_medicine(
        &self,
        medicine_id: Uuid,
        patch: Value,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError>;

    /// PATCH guarded on the current stock value.
    async fn update_medicine_cas(
        &self,
        medicine_id: Uuid,
        expected_stock: i32,
        patch: Value,
        auth_token: Option<&str>,
    ) -> Result<Option<Medicine>, PharmacyError>;

    async fn find_pending_reorder(
        &self,
        medicine_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<ReorderRequest>, PharmacyError>;

    /// Insert relying on the partial-unique index over pending requests;
    /// a lost dedupe race surfaces as `Conflict`.
    async fn insert_reorder(
        &self,
        row: Value,
        auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError>;

    async fn get_reorder(
        &self,
        request_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError>;

    /// PATCH guarded on the current status value.
    async fn update_reorder_cas(
        &self,
        request_id: Uuid,
        expected_status: ReorderStatus,
        patch: Value,
        auth_token: Option<&str>,
    ) -> Result<Option<ReorderRequest>, PharmacyError>;

    async fn list_reorders(
        &self,
        status: Option<ReorderStatus>,
        auth_token: Option<&str>,
    ) -> Result<Vec<ReorderRequest>, PharmacyError>;

    async fn insert_order(&self, row: Value, auth_token: Option<&str>) -> Result<Order, PharmacyError>;
}

pub struct SupabasePharmacyStore {
    supabase: SupabaseClient,
}

impl SupabasePharmacyStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn parse_one<T: serde::de::DeserializeOwned>(
        result: Vec<Value>,
        missing: PharmacyError,
    ) -> Result<T, PharmacyError> {
        let Some(row) = result.into_iter().next() else {
            return Err(missing);
        };
        serde_json::from_value(row)
            .map_err(|e| PharmacyError::Database(format!("Failed to parse row: {}", e)))
    }
}

#[async_trait]
impl PharmacyStore for SupabasePharmacyStore {
    async fn list_medicines(&self, auth_token: Option<&str>) -> Result<Vec<Medicine>, PharmacyError> {
        let path = "/rest/v1/medicines?order=name.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, auth_token, None)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Medicine>, _>>()
            .map_err(|e| PharmacyError::Database(format!("Failed to parse medicines: {}", e)))
    }

    async fn get_medicine(
        &self,
        medicine_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        let path = format!("/rest/v1/medicines?id=eq.{}", medicine_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        Self::parse_one(result, PharmacyError::MedicineNotFound)
    }

    async fn insert_medicine(
        &self,
        row: Value,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        let result: Vec<Value> = self
            .supabase
            .insert_returning("/rest/v1/medicines", auth_token, row)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        Self::parse_one(
            result,
            PharmacyError::Database("Failed to create medicine".to_string()),
        )
    }

    async fn update_medicine(
        &self,
        medicine_id: Uuid,
        patch: Value,
        auth_token: Option<&str>,
    ) -> Result<Medicine, PharmacyError> {
        let path = format!("/rest/v1/medicines?id=eq.{}", medicine_id);
        let result: Vec<Value> = self
            .supabase
            .update_returning(&path, auth_token, patch)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        Self::parse_one(result, PharmacyError::MedicineNotFound)
    }

    async fn update_medicine_cas(
        &self,
        medicine_id: Uuid,
        expected_stock: i32,
        patch: Value,
        auth_token: Option<&str>,
    ) -> Result<Option<Medicine>, PharmacyError> {
        let path = format!(
            "/rest/v1/medicines?id=eq.{}&stock=eq.{}",
            medicine_id, expected_stock
        );
        let result: Vec<Value> = self
            .supabase
            .update_returning(&path, auth_token, patch)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let medicine = serde_json::from_value(row).map_err(|e| {
                    PharmacyError::Database(format!("Failed to parse medicine: {}", e))
                })?;
                Ok(Some(medicine))
            }
            None => {
                debug!(
                    "Stock CAS missed for medicine {} (expected {})",
                    medicine_id, expected_stock
                );
                Ok(None)
            }
        }
    }

    async fn find_pending_reorder(
        &self,
        medicine_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<ReorderRequest>, PharmacyError> {
        let path = format!(
            "/rest/v1/reorder_requests?medicine_id=eq.{}&status=eq.pending&limit=1",
            medicine_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let request = serde_json::from_value(row).map_err(|e| {
                    PharmacyError::Database(format!("Failed to parse reorder request: {}", e))
                })?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    async fn insert_reorder(
        &self,
        row: Value,
        auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError> {
        let result: Vec<Value> = self
            .supabase
            .insert_returning("/rest/v1/reorder_requests", auth_token, row)
            .await
            .map_err(|e| match e {
                SupabaseError::Conflict(msg) => PharmacyError::Conflict(msg),
                other => PharmacyError::Database(other.to_string()),
            })?;

        Self::parse_one(
            result,
            PharmacyError::Database("Failed to create reorder request".to_string()),
        )
    }

    async fn get_reorder(
        &self,
        request_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<ReorderRequest, PharmacyError> {
        let path = format!("/rest/v1/reorder_requests?id=eq.{}", request_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        Self::parse_one(result, PharmacyError::ReorderNotFound)
    }

    async fn update_reorder_cas(
        &self,
        request_id: Uuid,
        expected_status: ReorderStatus,
        patch: Value,
        auth_token: Option<&str>,
    ) -> Result<Option<ReorderRequest>, PharmacyError> {
        let path = format!(
            "/rest/v1/reorder_requests?id=eq.{}&status=eq.{}",
            request_id, expected_status
        );
        let result: Vec<Value> = self
            .supabase
            .update_returning(&path, auth_token, patch)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let request = serde_json::from_value(row).map_err(|e| {
                    PharmacyError::Database(format!("Failed to parse reorder request: {}", e))
                })?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    async fn list_reorders(
        &self,
        status: Option<ReorderStatus>,
        auth_token: Option<&str>,
    ) -> Result<Vec<ReorderRequest>, PharmacyError> {
        let mut path = "/rest/v1/reorder_requests?order=created_at.desc".to_string();
        if let Some(status) = status {
            path.push_str(&format!("&status=eq.{}", status));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ReorderRequest>, _>>()
            .map_err(|e| PharmacyError::Database(format!("Failed to parse reorder requests: {}", e)))
    }

    async fn insert_order(&self, row: Value, auth_token: Option<&str>) -> Result<Order, PharmacyError> {
        let result: Vec<Value> = self
            .supabase
            .insert_returning("/rest/v1/orders", auth_token, row)
            .await
            .map_err(|e| PharmacyError::Database(e.to_string()))?;

        Self::parse_one(
            result,
            PharmacyError::Database("Failed to create order".to_string()),
        )
    }
}
