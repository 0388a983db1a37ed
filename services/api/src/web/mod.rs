pub mod alerts;
pub mod auth;
pub mod donors;
pub mod dto;
pub mod extract;
pub mod hospitals;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

pub use middleware::require_auth;
use state::AppState;

/// Builds the full API router: public auth routes plus the session-protected
/// donor, hospital and alert routes.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/donors", post(donors::register_donor_handler))
        .route("/donors/me", get(donors::my_donor_handler))
        .route("/donors/me/availability", put(donors::set_availability_handler))
        .route("/donors/me/last-donation", put(donors::record_donation_handler))
        .route("/hospitals", post(hospitals::register_hospital_handler))
        .route("/hospitals/me", get(hospitals::my_hospital_handler))
        .route("/hospitals/me/location", put(hospitals::update_location_handler))
        .route("/hospitals/{id}/verification", put(hospitals::verify_hospital_handler))
        .route("/alerts", post(alerts::create_alert_handler))
        .route("/alerts/mine", get(alerts::my_alerts_handler))
        .route("/alerts/active", get(alerts::active_alerts_handler))
        .route("/alerts/nearby", get(alerts::nearby_alerts_handler))
        .route("/alerts/{id}/status", put(alerts::update_alert_status_handler))
        .route(
            "/alerts/{id}/responses",
            post(alerts::respond_handler).get(alerts::list_responses_handler),
        )
        .route(
            "/alerts/{id}/responses/{response_id}",
            put(alerts::update_response_status_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let mut cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    match app_state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => warn!(
            "CORS_ORIGIN '{}' is not a valid header value; cross-origin requests disabled",
            app_state.config.cors_origin
        ),
    }

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state)
}
