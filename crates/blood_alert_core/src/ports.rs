//! crates/blood_alert_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete database and of the wall clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AlertStatus, AlertWithHospital, BloodGroup, Donor, DonorResponse, Hospital, ResponseStatus,
    Role, SosAlert, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for every record the service touches.
///
/// The `insert_*` methods for donors, hospitals, users and responses must be
/// atomic conditional inserts: when the unique key already exists they return
/// `PortError::Conflict` and write nothing. Status changes are conditional
/// updates in the same way.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Accounts ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a live session to its user. Unknown or expired sessions yield
    /// `PortError::Unauthenticated`.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Donors ---
    async fn insert_donor(&self, donor: Donor) -> PortResult<Donor>;

    async fn get_donor_by_user(&self, user_id: Uuid) -> PortResult<Option<Donor>>;

    async fn get_donor_by_id(&self, donor_id: Uuid) -> PortResult<Donor>;

    async fn set_donor_availability(&self, donor_id: Uuid, is_available: bool)
        -> PortResult<Donor>;

    async fn set_donor_last_donation(&self, donor_id: Uuid, at: DateTime<Utc>) -> PortResult<()>;

    /// Available donors whose group is one of `groups`.
    async fn find_available_donors(&self, groups: &[BloodGroup]) -> PortResult<Vec<Donor>>;

    // --- Hospitals ---
    async fn insert_hospital(&self, hospital: Hospital) -> PortResult<Hospital>;

    async fn get_hospital_by_user(&self, user_id: Uuid) -> PortResult<Option<Hospital>>;

    async fn get_hospital_by_id(&self, hospital_id: Uuid) -> PortResult<Hospital>;

    async fn set_hospital_verified(&self, hospital_id: Uuid, verified: bool)
        -> PortResult<Hospital>;

    async fn update_hospital_location(
        &self,
        hospital_id: Uuid,
        location: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> PortResult<Hospital>;

    // --- SOS Alerts ---
    async fn insert_alert(&self, alert: SosAlert) -> PortResult<SosAlert>;

    async fn get_alert_by_id(&self, alert_id: Uuid) -> PortResult<SosAlert>;

    /// Alerts stored as active whose `expires_at` is not before `now`,
    /// each joined with its hospital.
    async fn list_open_alerts(&self, now: DateTime<Utc>) -> PortResult<Vec<AlertWithHospital>>;

    /// All alerts of one hospital, newest first.
    async fn list_alerts_by_hospital(&self, hospital_id: Uuid) -> PortResult<Vec<SosAlert>>;

    /// Moves an alert out of `active`. The check and the write are one atomic
    /// step: an alert no longer stored as active yields `PortError::Conflict`.
    async fn close_alert(&self, alert_id: Uuid, status: AlertStatus) -> PortResult<()>;

    // --- Donor Responses ---
    async fn insert_response(&self, response: DonorResponse) -> PortResult<DonorResponse>;

    async fn get_response_by_id(&self, response_id: Uuid) -> PortResult<DonorResponse>;

    /// Responses for one alert, oldest first.
    async fn list_responses_for_alert(&self, alert_id: Uuid) -> PortResult<Vec<DonorResponse>>;

    /// Sets a response's status only if it is still `from`; otherwise
    /// `PortError::Conflict`.
    async fn update_response_status(
        &self,
        response_id: Uuid,
        from: ResponseStatus,
        to: ResponseStatus,
    ) -> PortResult<()>;
}

/// Source of the current time, injected so expiry can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
