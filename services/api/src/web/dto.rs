//! services/api/src/web/dto.rs
//!
//! JSON views of the core domain records returned by the REST handlers.

use blood_alert_core::domain::{AlertWithHospital, Donor, DonorResponse, Hospital, SosAlert};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub struct DonorView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub blood_group: String,
    pub location: String,
    pub is_available: bool,
    pub last_donation_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Donor> for DonorView {
    fn from(d: Donor) -> Self {
        Self {
            id: d.id,
            user_id: d.user_id,
            blood_group: d.blood_group.to_string(),
            location: d.location,
            is_available: d.is_available,
            last_donation_at: d.last_donation_at,
            created_at: d.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HospitalView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub is_verified: bool,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<Hospital> for HospitalView {
    fn from(h: Hospital) -> Self {
        Self {
            id: h.id,
            user_id: h.user_id,
            name: h.name,
            is_verified: h.is_verified,
            location: h.location,
            latitude: h.latitude,
            longitude: h.longitude,
            created_at: h.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AlertView {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub blood_group: String,
    pub urgency: String,
    pub units_needed: i32,
    pub contact_number: String,
    pub description: String,
    pub location: String,
    pub target_area: Option<String>,
    pub radius_km: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub notifications_sent: i64,
}

impl From<SosAlert> for AlertView {
    fn from(a: SosAlert) -> Self {
        Self {
            id: a.id,
            hospital_id: a.hospital_id,
            blood_group: a.blood_group.to_string(),
            urgency: a.urgency.to_string(),
            units_needed: a.units_needed,
            contact_number: a.contact_number,
            description: a.description,
            location: a.location,
            target_area: a.target_area,
            radius_km: a.radius_km,
            status: a.status.to_string(),
            created_at: a.created_at,
            expires_at: a.expires_at,
            notifications_sent: a.notifications_sent,
        }
    }
}

/// An alert with its issuing hospital embedded, as shown to donors.
#[derive(Serialize, ToSchema)]
pub struct DonorAlertView {
    #[serde(flatten)]
    pub alert: AlertView,
    pub hospital: HospitalView,
}

impl From<AlertWithHospital> for DonorAlertView {
    fn from(a: AlertWithHospital) -> Self {
        Self {
            alert: a.alert.into(),
            hospital: a.hospital.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ResponseView {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub donor_id: Uuid,
    pub status: String,
    pub responded_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl From<DonorResponse> for ResponseView {
    fn from(r: DonorResponse) -> Self {
        Self {
            id: r.id,
            alert_id: r.alert_id,
            donor_id: r.donor_id,
            status: r.status.to_string(),
            responded_at: r.responded_at,
            notes: r.notes,
        }
    }
}
