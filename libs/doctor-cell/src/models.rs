// libs/doctor-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::time::serde_hhmm_opt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One bookable window inside a day template. Rows written by older admin
/// tooling can be missing any of the three fields; such slots stay parseable
/// and simply contribute no capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(default, with = "serde_hhmm_opt")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "serde_hhmm_opt")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub max_patients: Option<i32>,
}

impl TimeSlot {
    pub fn is_complete(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_some() && self.max_patients.is_some()
    }
}

/// A doctor's template for one weekday. At most one row exists per
/// (doctor_id, day_of_week); slots keep their insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub is_available: bool,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DayAvailability {
    /// Sum of `max_patients` over fully-specified slots. Advisory only: the
    /// booking cutoff is the elapsed-time check in the queue scheduler.
    pub fn total_capacity(&self) -> i32 {
        self.time_slots
            .iter()
            .filter(|slot| slot.is_complete())
            .filter_map(|slot| slot.max_patients)
            .sum()
    }

    /// Start of the first slot in template order. Estimated times are derived
    /// from this anchor, not from the earliest slot by clock value.
    pub fn first_slot_start(&self) -> Option<NaiveTime> {
        self.time_slots.first().and_then(|slot| slot.start_time)
    }

    /// End of the last slot in template order; the booking cutoff boundary.
    pub fn last_slot_end(&self) -> Option<NaiveTime> {
        self.time_slots.last().and_then(|slot| slot.end_time)
    }

    pub fn is_bookable(&self) -> bool {
        self.is_available && self.first_slot_start().is_some() && self.last_slot_end().is_some()
    }
}

/// Map a calendar date onto the stored weekday index (0 = Sunday .. 6 = Saturday).
pub fn day_of_week_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub day_of_week: i32,
    pub is_available: Option<bool>,
    pub time_slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub is_available: Option<bool>,
    pub time_slots: Option<Vec<TimeSlot>>,
}

/// Read-model for the `GET /doctors/{id}/slots` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayCapacityView {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub day_of_week: i32,
    pub bookable: bool,
    pub total_capacity: i32,
    pub time_slots: Vec<TimeSlot>,
}

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Availability not found")]
    AvailabilityNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}
