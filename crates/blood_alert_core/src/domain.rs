//! crates/blood_alert_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Radius stored on an alert when the issuing hospital does not supply one.
pub const DEFAULT_RADIUS_KM: f64 = 50.0;

//=========================================================================================
// Enumerations
//=========================================================================================

/// The eight ABO/Rh blood groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BloodGroup {
    ONeg,
    OPos,
    ANeg,
    APos,
    BNeg,
    BPos,
    AbNeg,
    AbPos,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::ONeg,
        BloodGroup::OPos,
        BloodGroup::ANeg,
        BloodGroup::APos,
        BloodGroup::BNeg,
        BloodGroup::BPos,
        BloodGroup::AbNeg,
        BloodGroup::AbPos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::ONeg => "O-",
            BloodGroup::OPos => "O+",
            BloodGroup::ANeg => "A-",
            BloodGroup::APos => "A+",
            BloodGroup::BNeg => "B-",
            BloodGroup::BPos => "B+",
            BloodGroup::AbNeg => "AB-",
            BloodGroup::AbPos => "AB+",
        }
    }

    pub fn is_rh_positive(&self) -> bool {
        matches!(
            self,
            BloodGroup::OPos | BloodGroup::APos | BloodGroup::BPos | BloodGroup::AbPos
        )
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised {kind}: '{value}'")]
pub struct ParseDomainError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseDomainError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl FromStr for BloodGroup {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BloodGroup::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseDomainError::new("blood group", s))
    }
}

/// How urgently an alert needs to be filled, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Urgency {
    Normal,
    Urgent,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::Urgent => "urgent",
            Urgency::Normal => "normal",
        }
    }

    /// Ordinal used for sorting; critical ranks highest.
    pub fn rank(&self) -> u8 {
        match self {
            Urgency::Critical => 3,
            Urgency::Urgent => 2,
            Urgency::Normal => 1,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Urgency::Critical),
            "urgent" => Ok(Urgency::Urgent),
            "normal" => Ok(Urgency::Normal),
            _ => Err(ParseDomainError::new("urgency", s)),
        }
    }
}

/// Lifecycle state of an alert as stored. See `matching::effective_status`
/// for the value that should drive decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertStatus {
    Active,
    Fulfilled,
    Expired,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Fulfilled => "fulfilled",
            AlertStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AlertStatus::Active)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "fulfilled" => Ok(AlertStatus::Fulfilled),
            "expired" => Ok(AlertStatus::Expired),
            _ => Err(ParseDomainError::new("alert status", s)),
        }
    }
}

/// Progress of a donor's reply to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResponseStatus {
    Interested,
    Confirmed,
    Completed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Interested => "interested",
            ResponseStatus::Confirmed => "confirmed",
            ResponseStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseStatus {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interested" => Ok(ResponseStatus::Interested),
            "confirmed" => Ok(ResponseStatus::Confirmed),
            "completed" => Ok(ResponseStatus::Completed),
            _ => Err(ParseDomainError::new("response status", s)),
        }
    }
}

/// Account role, checked through `User::is_admin` instead of an e-mail list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Donor,
    Hospital,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Donor => "donor",
            Role::Hospital => "hospital",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "donor" => Ok(Role::Donor),
            "hospital" => Ok(Role::Hospital),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseDomainError::new("role", s)),
        }
    }
}

//=========================================================================================
// Records
//=========================================================================================

// Represents a user account - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// A registered blood donor. At most one per user.
#[derive(Debug, Clone)]
pub struct Donor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub blood_group: BloodGroup,
    pub location: String,
    pub is_available: bool,
    pub last_donation_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A hospital account. Only verified hospitals may issue alerts.
#[derive(Debug, Clone)]
pub struct Hospital {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub is_verified: bool,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A hospital-issued, time-bounded request for blood.
#[derive(Debug, Clone)]
pub struct SosAlert {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub blood_group: BloodGroup,
    pub urgency: Urgency,
    pub units_needed: i32,
    pub contact_number: String,
    pub description: String,
    pub location: String,
    pub target_area: Option<String>,
    pub radius_km: f64,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub notifications_sent: i64,
}

/// An alert together with the hospital that issued it.
#[derive(Debug, Clone)]
pub struct AlertWithHospital {
    pub alert: SosAlert,
    pub hospital: Hospital,
}

/// A donor's opt-in to a specific alert.
#[derive(Debug, Clone)]
pub struct DonorResponse {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub donor_id: Uuid,
    pub status: ResponseStatus,
    pub responded_at: DateTime<Utc>,
    pub notes: Option<String>,
}
