// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use shared_models::time::serde_hhmm;

pub const DEFAULT_CONSULTATION_MINUTES: i32 = 30;
pub const MAX_CONSULTATION_MINUTES: i32 = 240;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A queue position for one doctor on one calendar day. Rows are never
/// deleted; a cancelled appointment keeps its queue number and leaves a gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub queue_number: i32,
    #[serde(with = "serde_hhmm")]
    pub estimated_time: NaiveTime,
    pub status: AppointmentStatus,
    pub consultation_duration: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Cancelled appointments drop out of queue counting; everything else holds
    /// its position.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub consultation_duration: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment_id: Uuid,
    pub queue_number: i32,
    #[serde(with = "serde_hhmm")]
    pub estimated_time: NaiveTime,
}

impl From<&Appointment> for BookingConfirmation {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            queue_number: appointment.queue_number,
            estimated_time: appointment.estimated_time,
        }
    }
}

/// Payload sent to the notifier on every status transition.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentNotification {
    pub doctor_name: String,
    pub date: NaiveDate,
    pub queue_number: i32,
    #[serde(with = "serde_hhmm")]
    pub estimated_time: NaiveTime,
    pub status: AppointmentStatus,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    /// Doctor has no bookable template for the requested date.
    #[error("Doctor is not available on the requested date")]
    NotAvailable,

    /// The day's queue has run past the closing time of the last slot.
    #[error("All slots are exhausted for the requested date")]
    SlotsExhausted,

    #[error("Patient already has an appointment on this date")]
    DuplicateBookingSameDay,

    /// Storage rejected a queue number another writer claimed first.
    /// Recovered internally by retry-with-refetch.
    #[error("Queue position conflict")]
    QueueConflict,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Only the booking patient may cancel this appointment")]
    NotOwner,

    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}
