//! services/api/src/web/donors.rs
//!
//! Donor profile endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use blood_alert_core::domain::BloodGroup;
use blood_alert_core::service::NewDonor;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::dto::DonorView;
use crate::web::extract::ApiJson;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct RegisterDonorRequest {
    /// One of O-, O+, A-, A+, B-, B+, AB-, AB+.
    pub blood_group: String,
    pub location: String,
    pub is_available: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct DonationRequest {
    /// When the donation took place. Must not be in the future.
    pub donated_at: DateTime<Utc>,
}

/// Register the caller as a donor.
#[utoipa::path(
    post,
    path = "/donors",
    request_body = RegisterDonorRequest,
    responses(
        (status = 201, description = "Donor profile created", body = DonorView),
        (status = 400, description = "Unknown blood group or empty location"),
        (status = 409, description = "The caller already has a donor profile")
    )
)]
pub async fn register_donor_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    ApiJson(req): ApiJson<RegisterDonorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let blood_group: BloodGroup = req.blood_group.parse()?;
    let donor = state
        .sos
        .register_donor(
            user_id,
            NewDonor {
                blood_group,
                location: req.location,
                is_available: req.is_available.unwrap_or(true),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(DonorView::from(donor))))
}

/// The caller's donor profile.
#[utoipa::path(
    get,
    path = "/donors/me",
    responses(
        (status = 200, description = "Donor profile", body = DonorView),
        (status = 404, description = "The caller has no donor profile")
    )
)]
pub async fn my_donor_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<DonorView>, ApiError> {
    let donor = state.sos.my_donor(user_id).await?;
    Ok(Json(donor.into()))
}

/// Toggle whether the caller is currently available to donate.
#[utoipa::path(
    put,
    path = "/donors/me/availability",
    request_body = AvailabilityRequest,
    responses(
        (status = 200, description = "Availability updated", body = DonorView),
        (status = 404, description = "The caller has no donor profile")
    )
)]
pub async fn set_availability_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    ApiJson(req): ApiJson<AvailabilityRequest>,
) -> Result<Json<DonorView>, ApiError> {
    let donor = state
        .sos
        .set_donor_availability(user_id, req.is_available)
        .await?;
    Ok(Json(donor.into()))
}

/// Record a donation made outside an SOS alert.
#[utoipa::path(
    put,
    path = "/donors/me/last-donation",
    request_body = DonationRequest,
    responses(
        (status = 200, description = "Donation recorded", body = DonorView),
        (status = 400, description = "Donation time is in the future"),
        (status = 404, description = "The caller has no donor profile")
    )
)]
pub async fn record_donation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    ApiJson(req): ApiJson<DonationRequest>,
) -> Result<Json<DonorView>, ApiError> {
    let donor = state.sos.record_donation(user_id, req.donated_at).await?;
    Ok(Json(donor.into()))
}
