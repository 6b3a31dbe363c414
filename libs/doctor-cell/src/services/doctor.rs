// libs/doctor-cell/src/services/doctor.rs
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Doctor, DoctorError};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(DoctorError::NotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse doctor: {}", e)))
    }

    pub async fn list_doctors(&self, auth_token: &str) -> Result<Vec<Doctor>, DoctorError> {
        let path = "/rest/v1/doctors?order=full_name.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Doctor>, _>>()
            .map_err(|e| DoctorError::Database(format!("Failed to parse doctors: {}", e)))
    }
}
