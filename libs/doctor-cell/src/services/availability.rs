// libs/doctor-cell/src/services/availability.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{
    day_of_week_index, CreateAvailabilityRequest, DayAvailability, DayCapacityView,
    DoctorError, TimeSlot, UpdateAvailabilityRequest,
};

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Weekly template for a doctor, ordered by weekday.
    pub async fn get_weekly_schedule(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DayAvailability>, DoctorError> {
        debug!("Fetching weekly schedule for doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&order=day_of_week.asc",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DayAvailability>, _>>()
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))
    }

    /// Resolve a date to the doctor's template for that weekday. `None` means
    /// "not bookable" (no row, or the day is switched off) and is never an error.
    pub async fn day_template(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<DayAvailability>, DoctorError> {
        let day_of_week = day_of_week_index(date);
        debug!(
            "Resolving day template for doctor {} on {} (weekday {})",
            doctor_id, date, day_of_week
        );

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}&limit=1",
            doctor_id, day_of_week
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Ok(None);
        };

        let template: DayAvailability = serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))?;

        if !template.is_available {
            return Ok(None);
        }

        Ok(Some(template))
    }

    /// Capacity read-model for one calendar day.
    pub async fn day_capacity(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DayCapacityView, DoctorError> {
        let template = self.day_template(doctor_id, date, auth_token).await?;

        Ok(match template {
            Some(day) => DayCapacityView {
                doctor_id,
                date,
                day_of_week: day.day_of_week,
                bookable: day.is_bookable(),
                total_capacity: day.total_capacity(),
                time_slots: day.time_slots,
            },
            None => DayCapacityView {
                doctor_id,
                date,
                day_of_week: day_of_week_index(date),
                bookable: false,
                total_capacity: 0,
                time_slots: vec![],
            },
        })
    }

    pub async fn create_availability(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<DayAvailability, DoctorError> {
        debug!("Creating availability for doctor: {}", doctor_id);

        if !(0..=6).contains(&request.day_of_week) {
            return Err(DoctorError::Validation(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        validate_slots(&request.time_slots)?;

        let availability_data = json!({
            "doctor_id": doctor_id,
            "day_of_week": request.day_of_week,
            "is_available": request.is_available.unwrap_or(true),
            "time_slots": request.time_slots,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        // Unique index on (doctor_id, day_of_week) enforces the one-row-per-weekday invariant.
        let result: Vec<Value> = self
            .supabase
            .insert_returning("/rest/v1/doctor_availability", Some(auth_token), availability_data)
            .await
            .map_err(|e| match e {
                SupabaseError::Conflict(_) => DoctorError::Conflict(
                    "Availability already defined for this weekday".to_string(),
                ),
                other => DoctorError::Database(other.to_string()),
            })?;

        let Some(row) = result.into_iter().next() else {
            return Err(DoctorError::Database("Failed to create availability".to_string()));
        };

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))
    }

    pub async fn update_availability(
        &self,
        availability_id: Uuid,
        request: UpdateAvailabilityRequest,
        auth_token: &str,
    ) -> Result<DayAvailability, DoctorError> {
        debug!("Updating availability: {}", availability_id);

        let mut update_data = serde_json::Map::new();
        if let Some(is_available) = request.is_available {
            update_data.insert("is_available".to_string(), json!(is_available));
        }
        if let Some(time_slots) = request.time_slots {
            validate_slots(&time_slots)?;
            update_data.insert("time_slots".to_string(), json!(time_slots));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctor_availability?id=eq.{}", availability_id);
        let result: Vec<Value> = self
            .supabase
            .update_returning(&path, Some(auth_token), Value::Object(update_data))
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(DoctorError::AvailabilityNotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| DoctorError::Database(format!("Failed to parse availability: {}", e)))
    }

    pub async fn delete_availability(
        &self,
        availability_id: Uuid,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        debug!("Deleting availability: {}", availability_id);

        let path = format!("/rest/v1/doctor_availability?id=eq.{}", availability_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::Database(e.to_string()))?;

        Ok(())
    }
}

fn validate_slots(slots: &[TimeSlot]) -> Result<(), DoctorError> {
    for slot in slots {
        if let (Some(start), Some(end)) = (slot.start_time, slot.end_time) {
            if start >= end {
                return Err(DoctorError::Validation(
                    "Slot start time must be before end time".to_string(),
                ));
            }
        }
        if let Some(max) = slot.max_patients {
            if max < 1 {
                return Err(DoctorError::Validation(
                    "Slot max_patients must be at least 1".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::time::parse_hhmm;

    #[test]
    fn rejects_inverted_slot() {
        let slots = vec![TimeSlot {
            start_time: parse_hhmm("13:00"),
            end_time: parse_hhmm("09:00"),
            max_patients: Some(5),
        }];
        assert!(matches!(
            validate_slots(&slots),
            Err(DoctorError::Validation(_))
        ));
    }

    #[test]
    fn accepts_partial_slot() {
        // Partial rows are tolerated at read time, so writes tolerate them too.
        let slots = vec![TimeSlot {
            start_time: parse_hhmm("09:00"),
            end_time: None,
            max_patients: Some(5),
        }];
        assert!(validate_slots(&slots).is_ok());
    }

    #[test]
    fn rejects_zero_capacity_slot() {
        let slots = vec![TimeSlot {
            start_time: parse_hhmm("09:00"),
            end_time: parse_hhmm("12:00"),
            max_patients: Some(0),
        }];
        assert!(matches!(
            validate_slots(&slots),
            Err(DoctorError::Validation(_))
        ));
    }
}
