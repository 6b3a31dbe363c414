// libs/pharmacy-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Html,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateMedicineRequest, PharmacyError, PlaceOrderRequest, ReorderStatus,
    UpdateMedicineRequest, UpdateReorderStatusRequest,
};
use crate::router::PharmacyCellState;

#[derive(Debug, Deserialize)]
pub struct ReorderListQuery {
    pub status: Option<ReorderStatus>,
}

fn map_pharmacy_error(e: PharmacyError) -> AppError {
    match e {
        PharmacyError::MedicineNotFound | PharmacyError::ReorderNotFound => {
            AppError::NotFound(e.to_string())
        }
        PharmacyError::Validation(msg) => AppError::BadRequest(msg),
        PharmacyError::InvalidToken
        | PharmacyError::TokenExpired
        | PharmacyError::TokenConsumed => AppError::BadRequest(e.to_string()),
        PharmacyError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
        PharmacyError::InsufficientStock { .. } => AppError::BadRequest(e.to_string()),
        PharmacyError::Conflict(msg) => AppError::Conflict(msg),
        PharmacyError::Database(msg) => AppError::Database(msg),
    }
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Admin access required".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// MEDICINE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_medicines(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let medicines = state
        .monitor
        .list_medicines(Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok(Json(json!({ "medicines": medicines })))
}

#[axum::debug_handler]
pub async fn get_medicine(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(medicine_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let medicine = state
        .monitor
        .get_medicine(medicine_id, Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok(Json(json!({ "medicine": medicine })))
}

#[axum::debug_handler]
pub async fn create_medicine(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateMedicineRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&user)?;

    let medicine = state
        .monitor
        .create_medicine(request, Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "medicine": medicine
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_medicine(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(medicine_id): Path<Uuid>,
    Json(request): Json<UpdateMedicineRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let medicine = state
        .monitor
        .update_medicine(medicine_id, request, Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok(Json(json!({
        "success": true,
        "medicine": medicine
    })))
}

/// Threshold breaches with urgency and suggested reorder quantities.
#[axum::debug_handler]
pub async fn low_stock_report(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let report = state
        .monitor
        .low_stock_report(Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok(Json(json!({ "low_stock": report })))
}

/// Run the stock monitor and raise reorder requests for every breach.
#[axum::debug_handler]
pub async fn scan_reorders(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let breached = state
        .monitor
        .scan(Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    let requests = state
        .engine
        .initiate_for_all(breached, Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok(Json(json!({
        "success": true,
        "reorder_requests": requests
    })))
}

// ==============================================================================
// RESTOCK APPROVAL (token-gated, no login)
// ==============================================================================

/// Supplier-facing approval link. Renders HTML since it is opened from an
/// email, not called by the app.
#[axum::debug_handler]
pub async fn approve_restock(
    State(state): State<Arc<PharmacyCellState>>,
    Path((medicine_id, token)): Path<(Uuid, String)>,
) -> (StatusCode, Html<String>) {
    match state.engine.approve_restock(medicine_id, &token, None).await {
        Ok(medicine) => (
            StatusCode::OK,
            Html(format!(
                "<html><body><h1>Restock confirmed</h1>\
                 <p>{} now has {} units in stock.</p></body></html>",
                medicine.name, medicine.stock
            )),
        ),
        Err(e) => {
            let status = match e {
                PharmacyError::InvalidToken
                | PharmacyError::TokenExpired
                | PharmacyError::TokenConsumed => StatusCode::BAD_REQUEST,
                PharmacyError::MedicineNotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Html(format!(
                    "<html><body><h1>Restock failed</h1><p>{}</p></body></html>",
                    e
                )),
            )
        }
    }
}

// ==============================================================================
// REORDER REQUEST HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_reorders(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ReorderListQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let requests = state
        .engine
        .list_reorders(query.status, Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok(Json(json!({ "reorder_requests": requests })))
}

#[axum::debug_handler]
pub async fn update_reorder_status(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
    Json(request): Json<UpdateReorderStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let updated = state
        .engine
        .update_reorder_status(request_id, request, &user, Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok(Json(json!({
        "success": true,
        "reorder_request": updated
    })))
}

// ==============================================================================
// ORDER HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn place_order(
    State(state): State<Arc<PharmacyCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;

    let order = state
        .orders
        .place_order(user_id, request, Some(auth.token()))
        .await
        .map_err(map_pharmacy_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "order": order
        })),
    ))
}
