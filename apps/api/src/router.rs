use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use doctor_cell::router::doctor_routes;
use notification_cell::notifier_from_config;
use pharmacy_cell::router::pharmacy_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    let notifier = notifier_from_config(&state);

    Router::new()
        .route("/", get(|| async { "MediLink API is running!" }))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest(
            "/appointments",
            appointment_routes(state.clone(), Arc::clone(&notifier)),
        )
        .nest("/pharmacy", pharmacy_routes(state.clone(), notifier))
}
