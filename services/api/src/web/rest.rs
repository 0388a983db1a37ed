//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI specification and the
//! liveness endpoint.

use axum::response::Json;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::web::{alerts, auth, donors, dto, hospitals};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        donors::register_donor_handler,
        donors::my_donor_handler,
        donors::set_availability_handler,
        donors::record_donation_handler,
        hospitals::register_hospital_handler,
        hospitals::my_hospital_handler,
        hospitals::update_location_handler,
        hospitals::verify_hospital_handler,
        alerts::create_alert_handler,
        alerts::my_alerts_handler,
        alerts::update_alert_status_handler,
        alerts::list_responses_handler,
        alerts::update_response_status_handler,
        alerts::active_alerts_handler,
        alerts::nearby_alerts_handler,
        alerts::respond_handler,
    ),
    components(
        schemas(
            HealthResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            donors::RegisterDonorRequest,
            donors::AvailabilityRequest,
            donors::DonationRequest,
            hospitals::RegisterHospitalRequest,
            hospitals::LocationRequest,
            hospitals::VerificationRequest,
            alerts::CreateSosAlertRequest,
            alerts::CreateSosAlertResponse,
            alerts::RespondRequest,
            alerts::RespondResponse,
            alerts::UpdateStatusRequest,
            alerts::UpdateResponseStatusRequest,
            dto::DonorView,
            dto::HospitalView,
            dto::AlertView,
            dto::DonorAlertView,
            dto::ResponseView,
        )
    ),
    tags(
        (name = "Blood Alert API", description = "SOS blood requests from hospitals, matched to compatible donors.")
    )
)]
pub struct ApiDoc;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
