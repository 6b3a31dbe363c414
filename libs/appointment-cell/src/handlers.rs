// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingConfirmation,
};
use crate::router::AppointmentCellState;

#[derive(Debug, Deserialize)]
pub struct DoctorQueueQuery {
    pub date: Option<NaiveDate>,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotAvailable
        | AppointmentError::SlotsExhausted
        | AppointmentError::DuplicateBookingSameDay => AppError::BadRequest(e.to_string()),
        AppointmentError::QueueConflict => AppError::Conflict(
            "Could not allocate a queue position, please retry".to_string(),
        ),
        AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
        AppointmentError::NotOwner => AppError::Forbidden(e.to_string()),
        AppointmentError::NotFound | AppointmentError::DoctorNotFound => {
            AppError::NotFound(e.to_string())
        }
        AppointmentError::Validation(msg) => AppError::BadRequest(msg),
        AppointmentError::Database(msg) => AppError::Database(msg),
    }
}

/// Book the next queue position for a doctor and date.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let is_patient = request.patient_id.to_string() == user.id;
    if !is_patient && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to book appointment for this patient".to_string(),
        ));
    }

    let appointment = state
        .scheduler
        .book_slot(&request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let confirmation = BookingConfirmation::from(&appointment);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "booking": confirmation,
            "appointment": appointment
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .store
        .fetch_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointment": appointment })))
}

/// The day's queue for a doctor, ordered by queue number.
#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DoctorQueueQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .store
        .list_for_doctor(doctor_id, query.date, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let is_self = patient_id.to_string() == user.id;
    if !is_self && !user.is_admin() && !user.is_doctor() {
        return Err(AppError::Forbidden(
            "Not authorized to view this patient's appointments".to_string(),
        ));
    }

    let appointments = state
        .store
        .list_for_patient(patient_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

async fn transition_handler(
    state: Arc<AppointmentCellState>,
    auth_token: &str,
    user: User,
    appointment_id: Uuid,
    new_status: AppointmentStatus,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .lifecycle
        .transition(appointment_id, new_status, &user, auth_token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    transition_handler(
        state,
        auth.token(),
        user,
        appointment_id,
        AppointmentStatus::Confirmed,
    )
    .await
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    transition_handler(
        state,
        auth.token(),
        user,
        appointment_id,
        AppointmentStatus::Cancelled,
    )
    .await
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    transition_handler(
        state,
        auth.token(),
        user,
        appointment_id,
        AppointmentStatus::Completed,
    )
    .await
}
