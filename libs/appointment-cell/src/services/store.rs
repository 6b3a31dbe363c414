// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use doctor_cell::models::{day_of_week_index, DayAvailability};
use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_models::time::format_hhmm;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Row values for a new booking; the id and timestamps are storage-assigned.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub queue_number: i32,
    pub estimated_time: NaiveTime,
    pub consultation_duration: i32,
}

/// Persistence seam for the scheduler and lifecycle services. The production
/// implementation talks Postgrest; tests substitute an in-memory store.
#[async_trait]
pub trait SchedulerStore: Send + Sync {
    async fn day_template(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<DayAvailability>, AppointmentError>;

    /// Count of non-cancelled appointments for (doctor, date) at this instant.
    async fn count_active_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i64, AppointmentError>;

    /// Highest queue number currently held by a non-cancelled appointment for
    /// (doctor, date); 0 when none exist.
    async fn highest_active_queue_number(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i32, AppointmentError>;

    async fn patient_has_active_booking(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<bool, AppointmentError>;

    /// Insert relying on the (doctor_id, date, queue_number) unique index;
    /// a lost race surfaces as `QueueConflict`.
    async fn insert_appointment(
        &self,
        new: NewAppointment,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError>;

    async fn fetch_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError>;

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError>;

    async fn doctor_name(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<String, AppointmentError>;

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError>;
}

pub struct SupabaseSchedulerStore {
    supabase: SupabaseClient,
}

impl SupabaseSchedulerStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn parse_rows(result: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointments: {}", e)))
    }
}

#[async_trait]
impl SchedulerStore for SupabaseSchedulerStore {
    async fn day_template(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<DayAvailability>, AppointmentError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}&limit=1",
            doctor_id,
            day_of_week_index(date)
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Ok(None);
        };

        let template: DayAvailability = serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse availability: {}", e)))?;

        if !template.is_available {
            return Ok(None);
        }
        Ok(Some(template))
    }

    async fn count_active_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i64, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status=neq.cancelled&select=id",
            doctor_id, date
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        Ok(result.len() as i64)
    }

    async fn highest_active_queue_number(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i32, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status=neq.cancelled&select=queue_number&order=queue_number.desc&limit=1",
            doctor_id, date
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        Ok(result
            .first()
            .and_then(|row| row["queue_number"].as_i64())
            .unwrap_or(0) as i32)
    }

    async fn patient_has_active_booking(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&date=eq.{}&status=neq.cancelled&select=id&limit=1",
            patient_id, date
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        Ok(!result.is_empty())
    }

    async fn insert_appointment(
        &self,
        new: NewAppointment,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let appointment_data = json!({
            "doctor_id": new.doctor_id,
            "patient_id": new.patient_id,
            "date": new.date,
            "queue_number": new.queue_number,
            "estimated_time": format_hhmm(new.estimated_time),
            "status": AppointmentStatus::Pending.to_string(),
            "consultation_duration": new.consultation_duration,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .insert_returning("/rest/v1/appointments", Some(auth_token), appointment_data)
            .await
            .map_err(|e| match e {
                SupabaseError::Conflict(_) => AppointmentError::QueueConflict,
                other => AppointmentError::Database(other.to_string()),
            })?;

        let Some(row) = result.into_iter().next() else {
            return Err(AppointmentError::Database(
                "Failed to create appointment".to_string(),
            ));
        };

        debug!(
            "Appointment created for doctor {} on {} at queue position {}",
            new.doctor_id, new.date, new.queue_number
        );

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))
    }

    async fn fetch_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(AppointmentError::NotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let update_data = json!({
            "status": status.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .update_returning(&path, Some(auth_token), update_data)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(AppointmentError::NotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))
    }

    async fn doctor_name(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<String, AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=full_name", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        result
            .first()
            .and_then(|row| row["full_name"].as_str())
            .map(|name| name.to_string())
            .ok_or(AppointmentError::DoctorNotFound)
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&order=date.asc,queue_number.asc",
            doctor_id
        );
        if let Some(date) = date {
            path.push_str(&format!("&date=eq.{}", date));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        Self::parse_rows(result)
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=date.desc,queue_number.asc",
            patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        Self::parse_rows(result)
    }
}
