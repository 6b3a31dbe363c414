// libs/pharmacy-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use notification_cell::Notifier;
use shared_config::AppConfig;
use shared_utils::clock::{Clock, SystemClock};
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::orders::OrderService;
use crate::services::reorder::ReorderEngineService;
use crate::services::stock::StockMonitorService;
use crate::services::store::{PharmacyStore, SupabasePharmacyStore};

/// Built once at router construction: the consumed-token set and per-medicine
/// locks inside the reorder engine must span the life of the process.
pub struct PharmacyCellState {
    pub monitor: StockMonitorService,
    pub engine: ReorderEngineService,
    pub orders: OrderService,
}

impl PharmacyCellState {
    pub fn new(config: &AppConfig, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        let store: Arc<dyn PharmacyStore> = Arc::new(SupabasePharmacyStore::new(config));
        Self::with_store(store, notifier, clock, config)
    }

    /// Swap the persistence seam; used by tests.
    pub fn with_store(
        store: Arc<dyn PharmacyStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        Self {
            monitor: StockMonitorService::new(Arc::clone(&store)),
            engine: ReorderEngineService::new(
                Arc::clone(&store),
                notifier,
                Arc::clone(&clock),
                config.action_token_secret.clone(),
                config.public_base_url.clone(),
            ),
            orders: OrderService::new(store, clock),
        }
    }
}

pub fn pharmacy_routes(config: Arc<AppConfig>, notifier: Arc<dyn Notifier>) -> Router {
    let state = Arc::new(PharmacyCellState::new(
        &config,
        notifier,
        Arc::new(SystemClock),
    ));
    routes_with_state(state, config)
}

pub fn routes_with_state(state: Arc<PharmacyCellState>, config: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/medicines", get(handlers::list_medicines))
        .route("/medicines", post(handlers::create_medicine))
        .route("/medicines/low-stock", get(handlers::low_stock_report))
        .route("/medicines/scan-reorders", post(handlers::scan_reorders))
        .route("/medicines/{medicine_id}", get(handlers::get_medicine))
        .route("/medicines/{medicine_id}", patch(handlers::update_medicine))
        .route("/reorders", get(handlers::list_reorders))
        .route("/reorders/{request_id}/status", post(handlers::update_reorder_status))
        .route("/orders", post(handlers::place_order))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    // The approval link is opened from a supplier email; the signed token is
    // the credential.
    let public_routes = Router::new().route(
        "/medicines/{medicine_id}/restock/{token}",
        get(handlers::approve_restock),
    );

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
}
