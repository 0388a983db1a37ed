//! services/api/src/web/hospitals.rs
//!
//! Hospital profile endpoints, including admin verification.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use blood_alert_core::service::NewHospital;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::dto::HospitalView;
use crate::web::extract::ApiJson;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct RegisterHospitalRequest {
    pub name: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct LocationRequest {
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct VerificationRequest {
    pub verified: bool,
}

/// Register the caller as a hospital. New hospitals start unverified.
#[utoipa::path(
    post,
    path = "/hospitals",
    request_body = RegisterHospitalRequest,
    responses(
        (status = 201, description = "Hospital profile created", body = HospitalView),
        (status = 400, description = "Empty name or location"),
        (status = 409, description = "The caller already has a hospital profile")
    )
)]
pub async fn register_hospital_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    ApiJson(req): ApiJson<RegisterHospitalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let hospital = state
        .sos
        .register_hospital(
            user_id,
            NewHospital {
                name: req.name,
                location: req.location,
                latitude: req.latitude,
                longitude: req.longitude,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(HospitalView::from(hospital))))
}

/// The caller's hospital profile.
#[utoipa::path(
    get,
    path = "/hospitals/me",
    responses(
        (status = 200, description = "Hospital profile", body = HospitalView),
        (status = 404, description = "The caller has no hospital profile")
    )
)]
pub async fn my_hospital_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<HospitalView>, ApiError> {
    let hospital = state.sos.my_hospital(user_id).await?;
    Ok(Json(hospital.into()))
}

/// Update the caller's hospital location.
#[utoipa::path(
    put,
    path = "/hospitals/me/location",
    request_body = LocationRequest,
    responses(
        (status = 200, description = "Location updated", body = HospitalView),
        (status = 404, description = "The caller has no hospital profile")
    )
)]
pub async fn update_location_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    ApiJson(req): ApiJson<LocationRequest>,
) -> Result<Json<HospitalView>, ApiError> {
    let hospital = state
        .sos
        .update_hospital_location(user_id, &req.location, req.latitude, req.longitude)
        .await?;
    Ok(Json(hospital.into()))
}

/// Verify or un-verify a hospital. Admin accounts only.
#[utoipa::path(
    put,
    path = "/hospitals/{id}/verification",
    request_body = VerificationRequest,
    params(("id" = Uuid, Path, description = "Hospital id")),
    responses(
        (status = 200, description = "Verification updated", body = HospitalView),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "Hospital not found")
    )
)]
pub async fn verify_hospital_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(hospital_id): Path<Uuid>,
    ApiJson(req): ApiJson<VerificationRequest>,
) -> Result<Json<HospitalView>, ApiError> {
    let hospital = state
        .sos
        .verify_hospital(user_id, hospital_id, req.verified)
        .await?;
    Ok(Json(hospital.into()))
}
