// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use notification_cell::Notifier;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::queue::QueueScheduler;
use crate::services::store::{SchedulerStore, SupabaseSchedulerStore};

/// Built once at router construction so the per-(doctor, date) booking locks
/// span the life of the process.
pub struct AppointmentCellState {
    pub scheduler: QueueScheduler,
    pub lifecycle: AppointmentLifecycleService,
    pub store: Arc<dyn SchedulerStore>,
}

impl AppointmentCellState {
    pub fn new(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let store: Arc<dyn SchedulerStore> = Arc::new(SupabaseSchedulerStore::new(config));
        Self {
            scheduler: QueueScheduler::new(Arc::clone(&store)),
            lifecycle: AppointmentLifecycleService::new(Arc::clone(&store), notifier),
            store,
        }
    }

    /// Swap the persistence seam; used by tests.
    pub fn with_store(store: Arc<dyn SchedulerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            scheduler: QueueScheduler::new(Arc::clone(&store)),
            lifecycle: AppointmentLifecycleService::new(Arc::clone(&store), notifier),
            store,
        }
    }
}

pub fn appointment_routes(config: Arc<AppConfig>, notifier: Arc<dyn Notifier>) -> Router {
    let state = Arc::new(AppointmentCellState::new(&config, notifier));

    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/confirm", post(handlers::confirm_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_appointments))
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
