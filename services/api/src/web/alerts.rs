//! services/api/src/web/alerts.rs
//!
//! SOS alert endpoints: issuance by hospitals, matching lists for donors,
//! donor responses and the alert status lifecycle.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use blood_alert_core::domain::{AlertStatus, ResponseStatus};
use blood_alert_core::service::NewSosAlert;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::dto::{AlertView, DonorAlertView, ResponseView};
use crate::web::extract::ApiJson;
use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateSosAlertRequest {
    /// One of O-, O+, A-, A+, B-, B+, AB-, AB+.
    pub blood_group: String,
    /// One of critical, urgent, normal.
    pub urgency: String,
    pub units_needed: i32,
    pub contact_number: String,
    pub description: String,
    pub hours_valid: i64,
    /// Only donors whose location (or whose hospital's location) contains
    /// this text are counted.
    pub target_area: Option<String>,
    /// Defaults to 50.
    pub radius_km: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateSosAlertResponse {
    pub alert_id: Uuid,
    pub donors_notified: i64,
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RespondRequest {
    pub notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RespondResponse {
    pub response_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// `fulfilled` or `expired`.
    pub status: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateResponseStatusRequest {
    /// `confirmed` or `completed`.
    pub status: String,
}

//=========================================================================================
// Hospital-side Handlers
//=========================================================================================

/// Issue an SOS alert from the caller's verified hospital.
#[utoipa::path(
    post,
    path = "/alerts",
    request_body = CreateSosAlertRequest,
    responses(
        (status = 201, description = "Alert created", body = CreateSosAlertResponse),
        (status = 400, description = "Invalid blood group, urgency, units or validity"),
        (status = 403, description = "Caller's hospital is not verified"),
        (status = 404, description = "Caller has no hospital profile")
    )
)]
pub async fn create_alert_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    ApiJson(req): ApiJson<CreateSosAlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewSosAlert {
        blood_group: req.blood_group.parse()?,
        urgency: req.urgency.parse()?,
        units_needed: req.units_needed,
        contact_number: req.contact_number,
        description: req.description,
        hours_valid: req.hours_valid,
        target_area: req.target_area,
        radius_km: req.radius_km,
    };
    let issued = state.sos.create_sos_alert(user_id, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSosAlertResponse {
            alert_id: issued.alert_id,
            donors_notified: issued.donors_notified,
            message: issued.message,
        }),
    ))
}

/// The caller's hospital's alerts, newest first, with effective status.
#[utoipa::path(
    get,
    path = "/alerts/mine",
    responses(
        (status = 200, description = "Alerts issued by the caller's hospital", body = [AlertView]),
        (status = 404, description = "Caller has no hospital profile")
    )
)]
pub async fn my_alerts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<AlertView>>, ApiError> {
    let alerts = state.sos.list_hospital_alerts(user_id).await?;
    Ok(Json(alerts.into_iter().map(AlertView::from).collect()))
}

/// Close an alert as fulfilled or expired.
#[utoipa::path(
    put,
    path = "/alerts/{id}/status",
    request_body = UpdateStatusRequest,
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 204, description = "Status updated"),
        (status = 400, description = "Unknown status or attempt to reactivate"),
        (status = 403, description = "Alert belongs to another hospital"),
        (status = 409, description = "Alert is already closed")
    )
)]
pub async fn update_alert_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(alert_id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let status: AlertStatus = req.status.parse()?;
    state
        .sos
        .update_sos_alert_status(user_id, alert_id, status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Responses received for one of the caller's alerts.
#[utoipa::path(
    get,
    path = "/alerts/{id}/responses",
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Donor responses, oldest first", body = [ResponseView]),
        (status = 403, description = "Alert belongs to another hospital")
    )
)]
pub async fn list_responses_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<Vec<ResponseView>>, ApiError> {
    let responses = state.sos.list_alert_responses(user_id, alert_id).await?;
    Ok(Json(responses.into_iter().map(ResponseView::from).collect()))
}

/// Move a donor response forward.
#[utoipa::path(
    put,
    path = "/alerts/{id}/responses/{response_id}",
    request_body = UpdateResponseStatusRequest,
    params(
        ("id" = Uuid, Path, description = "Alert id"),
        ("response_id" = Uuid, Path, description = "Response id")
    ),
    responses(
        (status = 204, description = "Response updated"),
        (status = 403, description = "Alert belongs to another hospital"),
        (status = 409, description = "Response is already at or past that status")
    )
)]
pub async fn update_response_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path((alert_id, response_id)): Path<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<UpdateResponseStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let status: ResponseStatus = req.status.parse()?;
    state
        .sos
        .update_response_status(user_id, alert_id, response_id, status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Donor-side Handlers
//=========================================================================================

/// Open alerts the caller can donate to, most urgent first.
#[utoipa::path(
    get,
    path = "/alerts/active",
    responses(
        (status = 200, description = "Matching alerts; empty without a donor profile", body = [DonorAlertView])
    )
)]
pub async fn active_alerts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<DonorAlertView>>, ApiError> {
    let alerts = state.sos.active_alerts_for_donor(user_id).await?;
    Ok(Json(alerts.into_iter().map(DonorAlertView::from).collect()))
}

/// Open alerts near the caller's location, most urgent first.
#[utoipa::path(
    get,
    path = "/alerts/nearby",
    responses(
        (status = 200, description = "Nearby matching alerts; empty without a donor profile", body = [DonorAlertView])
    )
)]
pub async fn nearby_alerts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<DonorAlertView>>, ApiError> {
    let alerts = state.sos.nearby_alerts_for_donor(user_id).await?;
    Ok(Json(alerts.into_iter().map(DonorAlertView::from).collect()))
}

/// Record the caller's interest in an alert. Allowed once per alert.
#[utoipa::path(
    post,
    path = "/alerts/{id}/responses",
    request_body = RespondRequest,
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 201, description = "Response recorded", body = RespondResponse),
        (status = 404, description = "Alert or donor profile not found"),
        (status = 409, description = "Already responded, or alert closed")
    )
)]
pub async fn respond_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(alert_id): Path<Uuid>,
    ApiJson(req): ApiJson<RespondRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response_id = state
        .sos
        .respond_to_sos_alert(user_id, alert_id, req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(RespondResponse { response_id })))
}
