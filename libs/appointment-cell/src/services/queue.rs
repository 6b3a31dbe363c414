// libs/appointment-cell/src/services/queue.rs
//
// Queue-number allocation for a doctor's day. Two mechanisms close the
// read-count-then-insert race: an async mutex per (doctor, date) serializes
// bookings inside this process, and the storage unique index on
// (doctor_id, date, queue_number) catches anything that slips past it, driving
// a bounded retry-with-refetch loop.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::time::{minutes_since_midnight, time_from_minutes};

use crate::models::{
    Appointment, AppointmentError, BookAppointmentRequest, DEFAULT_CONSULTATION_MINUTES,
    MAX_CONSULTATION_MINUTES,
};
use crate::services::store::{NewAppointment, SchedulerStore};

const MAX_BOOKING_ATTEMPTS: u32 = 3;

/// One async mutex per (doctor, date) booking key.
#[derive(Default)]
pub struct BookingLocks {
    inner: std::sync::Mutex<HashMap<(Uuid, NaiveDate), Arc<AsyncMutex<()>>>>,
}

impl BookingLocks {
    pub async fn acquire(&self, doctor_id: Uuid, date: NaiveDate) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("booking lock map poisoned");
            map.entry((doctor_id, date))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Estimated consultation start for a queue position: the first slot's start
/// plus elapsed consultation time, with no day rollover. Anything at or past
/// `closing` (the last slot's end) means the day's queue is full.
pub fn derive_estimated_time(
    base_start: NaiveTime,
    closing: NaiveTime,
    queue_number: i32,
    consultation_duration: i32,
) -> Result<NaiveTime, AppointmentError> {
    let minutes =
        minutes_since_midnight(base_start) + (queue_number - 1) * consultation_duration;

    let estimated = time_from_minutes(minutes).ok_or(AppointmentError::SlotsExhausted)?;

    if estimated >= closing {
        return Err(AppointmentError::SlotsExhausted);
    }

    Ok(estimated)
}

pub struct QueueScheduler {
    store: Arc<dyn SchedulerStore>,
    locks: BookingLocks,
}

impl QueueScheduler {
    pub fn new(store: Arc<dyn SchedulerStore>) -> Self {
        Self {
            store,
            locks: BookingLocks::default(),
        }
    }

    /// Allocate the next queue position for (doctor, date) and persist the
    /// appointment as `pending`. Queue numbers are issued strictly in arrival
    /// order; rejections are never retried here.
    pub async fn book_slot(
        &self,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let consultation_duration = request
            .consultation_duration
            .unwrap_or(DEFAULT_CONSULTATION_MINUTES);
        if !(1..=MAX_CONSULTATION_MINUTES).contains(&consultation_duration) {
            return Err(AppointmentError::Validation(format!(
                "Consultation duration must be between 1 and {} minutes",
                MAX_CONSULTATION_MINUTES
            )));
        }

        let template = self
            .store
            .day_template(request.doctor_id, request.date, auth_token)
            .await?
            .filter(|day| day.is_bookable())
            .ok_or(AppointmentError::NotAvailable)?;

        // is_bookable guarantees both anchors exist.
        let base_start = template
            .first_slot_start()
            .ok_or(AppointmentError::NotAvailable)?;
        let closing = template
            .last_slot_end()
            .ok_or(AppointmentError::NotAvailable)?;

        if self
            .store
            .patient_has_active_booking(request.patient_id, request.date, auth_token)
            .await?
        {
            return Err(AppointmentError::DuplicateBookingSameDay);
        }

        let _guard = self.locks.acquire(request.doctor_id, request.date).await;

        for attempt in 1..=MAX_BOOKING_ATTEMPTS {
            let existing = self
                .store
                .count_active_appointments(request.doctor_id, request.date, auth_token)
                .await?;
            let highest = self
                .store
                .highest_active_queue_number(request.doctor_id, request.date, auth_token)
                .await?;
            // count + 1 when the day has no cancellations; otherwise skip past
            // the highest active number so a cancelled position's gap can never
            // collide with a later active booking.
            let queue_number = (existing as i32 + 1).max(highest + 1);

            let estimated_time =
                derive_estimated_time(base_start, closing, queue_number, consultation_duration)?;

            let new = NewAppointment {
                doctor_id: request.doctor_id,
                patient_id: request.patient_id,
                date: request.date,
                queue_number,
                estimated_time,
                consultation_duration,
            };

            match self.store.insert_appointment(new, auth_token).await {
                Ok(appointment) => {
                    info!(
                        "Booked queue position {} for doctor {} on {} (estimated {})",
                        queue_number, request.doctor_id, request.date, estimated_time
                    );
                    return Ok(appointment);
                }
                Err(AppointmentError::QueueConflict) if attempt < MAX_BOOKING_ATTEMPTS => {
                    warn!(
                        "Queue position {} for doctor {} on {} was taken, retrying ({}/{})",
                        queue_number, request.doctor_id, request.date, attempt, MAX_BOOKING_ATTEMPTS
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(50 * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Booking for doctor {} on {} exhausted {} attempts",
            request.doctor_id, request.date, MAX_BOOKING_ATTEMPTS
        );
        Err(AppointmentError::QueueConflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn first_position_starts_at_slot_anchor() {
        let estimated = derive_estimated_time(t(9, 0), t(13, 0), 1, 30).unwrap();
        assert_eq!(estimated, t(9, 0));
    }

    #[test]
    fn positions_advance_by_consultation_duration() {
        let estimated = derive_estimated_time(t(9, 0), t(13, 0), 5, 30).unwrap();
        assert_eq!(estimated, t(11, 0));
    }

    #[test]
    fn last_position_before_closing_is_accepted() {
        // Queue number 8 lands at 12:30, still inside [09:00, 13:00).
        let estimated = derive_estimated_time(t(9, 0), t(13, 0), 8, 30).unwrap();
        assert_eq!(estimated, t(12, 30));
    }

    #[test]
    fn position_at_closing_boundary_is_rejected() {
        // Queue number 9 lands exactly on the 13:00 boundary.
        assert_matches!(
            derive_estimated_time(t(9, 0), t(13, 0), 9, 30),
            Err(AppointmentError::SlotsExhausted)
        );
    }

    #[test]
    fn arithmetic_past_midnight_is_rejected() {
        assert_matches!(
            derive_estimated_time(t(22, 0), t(23, 59), 10, 30),
            Err(AppointmentError::SlotsExhausted)
        );
    }

    #[test]
    fn custom_duration_changes_cutoff() {
        // 60-minute consultations fill [09:00, 13:00) after four positions.
        assert_eq!(derive_estimated_time(t(9, 0), t(13, 0), 4, 60).unwrap(), t(12, 0));
        assert_matches!(
            derive_estimated_time(t(9, 0), t(13, 0), 5, 60),
            Err(AppointmentError::SlotsExhausted)
        );
    }
}
