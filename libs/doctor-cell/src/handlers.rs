// libs/doctor-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateAvailabilityRequest, DoctorError, UpdateAvailabilityRequest};
use crate::services::availability::AvailabilityService;
use crate::services::doctor::DoctorService;

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

fn map_doctor_error(e: DoctorError) -> AppError {
    match e {
        DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
        DoctorError::AvailabilityNotFound => {
            AppError::NotFound("Availability not found".to_string())
        }
        DoctorError::Validation(msg) => AppError::BadRequest(msg),
        DoctorError::Conflict(msg) => AppError::Conflict(msg),
        DoctorError::Database(msg) => AppError::Database(msg),
    }
}

fn require_schedule_manager(user: &User, doctor_id: Uuid) -> Result<(), AppError> {
    let is_owner = user.is_doctor() && user.id == doctor_id.to_string();
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to manage this doctor's schedule".to_string(),
        ));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let doctors = DoctorService::new(&state)
        .list_doctors(auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "doctors": doctors })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state)
        .get_doctor(doctor_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "doctor": doctor })))
}

#[axum::debug_handler]
pub async fn get_weekly_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = AvailabilityService::new(&state)
        .get_weekly_schedule(doctor_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "availability": schedule })))
}

/// Day template + capacity view for a specific date.
#[axum::debug_handler]
pub async fn get_day_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let view = AvailabilityService::new(&state)
        .day_capacity(doctor_id, query.date, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "day": view })))
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    require_schedule_manager(&user, doctor_id)?;

    let availability = AvailabilityService::new(&state)
        .create_availability(doctor_id, request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "success": true,
        "availability": availability
    })))
}

#[axum::debug_handler]
pub async fn update_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(availability_id): Path<Uuid>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_doctor() {
        return Err(AppError::Forbidden(
            "Not authorized to manage schedules".to_string(),
        ));
    }

    let availability = AvailabilityService::new(&state)
        .update_availability(availability_id, request, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "success": true,
        "availability": availability
    })))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(availability_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_doctor() {
        return Err(AppError::Forbidden(
            "Not authorized to manage schedules".to_string(),
        ));
    }

    AvailabilityService::new(&state)
        .delete_availability(availability_id, auth.token())
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "success": true })))
}
