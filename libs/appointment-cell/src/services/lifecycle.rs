// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{NotificationKind, Notifier};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentNotification, AppointmentStatus,
};
use crate::services::store::SchedulerStore;

/// All states a given status may move to. `completed` and `cancelled` are
/// terminal; queue numbers survive every transition untouched.
pub fn valid_transitions(current: AppointmentStatus) -> Vec<AppointmentStatus> {
    match current {
        AppointmentStatus::Pending => vec![
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Confirmed => vec![
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Completed | AppointmentStatus::Cancelled => vec![],
    }
}

pub fn validate_status_transition(
    current: AppointmentStatus,
    new: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if !valid_transitions(current).contains(&new) {
        warn!("Invalid status transition attempted: {} -> {}", current, new);
        return Err(AppointmentError::InvalidStatusTransition {
            from: current,
            to: new,
        });
    }
    Ok(())
}

pub struct AppointmentLifecycleService {
    store: Arc<dyn SchedulerStore>,
    notifier: Arc<dyn Notifier>,
}

impl AppointmentLifecycleService {
    pub fn new(store: Arc<dyn SchedulerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Apply a status transition with its guards, then dispatch the status
    /// notification off the request path. The state change is the durable
    /// fact; a failed notification never rolls it back.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Transitioning appointment {} to {}",
            appointment_id, new_status
        );

        let current = self.store.fetch_appointment(appointment_id, auth_token).await?;

        validate_status_transition(current.status, new_status)?;

        match new_status {
            AppointmentStatus::Cancelled => {
                let is_owner = current.patient_id.to_string() == user.id;
                if !is_owner && !user.is_admin() {
                    return Err(AppointmentError::NotOwner);
                }
            }
            AppointmentStatus::Confirmed | AppointmentStatus::Completed => {
                if !user.is_doctor() && !user.is_admin() {
                    return Err(AppointmentError::Validation(
                        "Only a doctor or admin may update this appointment".to_string(),
                    ));
                }
            }
            AppointmentStatus::Pending => {
                // Unreachable via valid_transitions; kept for exhaustiveness.
                return Err(AppointmentError::InvalidStatusTransition {
                    from: current.status,
                    to: new_status,
                });
            }
        }

        let updated = self
            .store
            .update_status(appointment_id, new_status, auth_token)
            .await?;

        info!(
            "Appointment {} moved {} -> {}",
            appointment_id, current.status, new_status
        );

        self.dispatch_status_notification(&updated, auth_token);

        Ok(updated)
    }

    /// Exactly one outbound notification per transition, fire-and-forget.
    fn dispatch_status_notification(&self, appointment: &Appointment, auth_token: &str) {
        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        let appointment = appointment.clone();
        let auth_token = auth_token.to_string();

        tokio::spawn(async move {
            let doctor_name = match store.doctor_name(appointment.doctor_id, &auth_token).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(
                        "Could not resolve doctor name for notification on appointment {}: {}",
                        appointment.id, e
                    );
                    appointment.doctor_id.to_string()
                }
            };

            let payload = AppointmentNotification {
                doctor_name,
                date: appointment.date,
                queue_number: appointment.queue_number,
                estimated_time: appointment.estimated_time,
                status: appointment.status,
            };

            let delivered = notifier
                .send(
                    NotificationKind::AppointmentUpdate,
                    json!(payload),
                )
                .await;
            if !delivered {
                warn!(
                    "Status notification for appointment {} was not delivered",
                    appointment.id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use AppointmentStatus::*;

    #[test]
    fn pending_moves_to_confirmed_or_cancelled() {
        assert!(validate_status_transition(Pending, Confirmed).is_ok());
        assert!(validate_status_transition(Pending, Cancelled).is_ok());
        assert_matches!(
            validate_status_transition(Pending, Completed),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn confirmed_moves_to_completed_or_cancelled() {
        assert!(validate_status_transition(Confirmed, Completed).is_ok());
        assert!(validate_status_transition(Confirmed, Cancelled).is_ok());
        assert_matches!(
            validate_status_transition(Confirmed, Pending),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for terminal in [Completed, Cancelled] {
            for target in [Pending, Confirmed, Completed, Cancelled] {
                assert_matches!(
                    validate_status_transition(terminal, target),
                    Err(AppointmentError::InvalidStatusTransition { .. })
                );
            }
        }
    }
}
