//! crates/blood_alert_core/src/memory.rs
//!
//! An in-process implementation of `DatabaseService`, used by the test suites
//! and by the API when it is started with `DATABASE_URL=memory`.
//!
//! Every method takes the table lock once, so the unique-key checks in the
//! `insert_*` methods and the write that follows happen atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    AlertStatus, AlertWithHospital, BloodGroup, Donor, DonorResponse, Hospital, ResponseStatus,
    Role, SosAlert, User, UserCredentials,
};
use crate::ports::{Clock, DatabaseService, PortError, PortResult};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, (User, String)>,
    auth_sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    donors: HashMap<Uuid, Donor>,
    hospitals: HashMap<Uuid, Hospital>,
    alerts: HashMap<Uuid, SosAlert>,
    responses: HashMap<Uuid, DonorResponse>,
}

/// A `DatabaseService` backed by hash maps behind a single lock.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: RwLock<Tables>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> PortError {
    PortError::NotFound(format!("{} {} not found", what, id))
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User> {
        let mut t = self.tables.write().await;
        if t
            .users
            .values()
            .any(|(u, _)| u.email.eq_ignore_ascii_case(email))
        {
            return Err(PortError::Conflict(format!("Email {} is already registered", email)));
        }
        let user = User {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        };
        t.users
            .insert(user.user_id, (user.clone(), hashed_password.to_string()));
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let t = self.tables.read().await;
        t.users
            .values()
            .find(|(u, _)| u.email.eq_ignore_ascii_case(email))
            .map(|(u, hash)| UserCredentials {
                user_id: u.user_id,
                email: u.email.clone(),
                hashed_password: hash.clone(),
            })
            .ok_or_else(|| not_found("User", email))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let t = self.tables.read().await;
        t.users
            .get(&user_id)
            .map(|(u, _)| u.clone())
            .ok_or_else(|| not_found("User", user_id))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut t = self.tables.write().await;
        t.auth_sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let t = self.tables.read().await;
        match t.auth_sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthenticated),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn insert_donor(&self, donor: Donor) -> PortResult<Donor> {
        let mut t = self.tables.write().await;
        if t.donors.values().any(|d| d.user_id == donor.user_id) {
            return Err(PortError::Conflict(
                "Donor profile already exists for this user".to_string(),
            ));
        }
        t.donors.insert(donor.id, donor.clone());
        Ok(donor)
    }

    async fn get_donor_by_user(&self, user_id: Uuid) -> PortResult<Option<Donor>> {
        let t = self.tables.read().await;
        Ok(t.donors.values().find(|d| d.user_id == user_id).cloned())
    }

    async fn get_donor_by_id(&self, donor_id: Uuid) -> PortResult<Donor> {
        let t = self.tables.read().await;
        t.donors
            .get(&donor_id)
            .cloned()
            .ok_or_else(|| not_found("Donor", donor_id))
    }

    async fn set_donor_availability(
        &self,
        donor_id: Uuid,
        is_available: bool,
    ) -> PortResult<Donor> {
        let mut t = self.tables.write().await;
        let donor = t
            .donors
            .get_mut(&donor_id)
            .ok_or_else(|| not_found("Donor", donor_id))?;
        donor.is_available = is_available;
        Ok(donor.clone())
    }

    async fn set_donor_last_donation(&self, donor_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let mut t = self.tables.write().await;
        let donor = t
            .donors
            .get_mut(&donor_id)
            .ok_or_else(|| not_found("Donor", donor_id))?;
        donor.last_donation_at = Some(at);
        Ok(())
    }

    async fn find_available_donors(&self, groups: &[BloodGroup]) -> PortResult<Vec<Donor>> {
        let t = self.tables.read().await;
        Ok(t.donors
            .values()
            .filter(|d| d.is_available && groups.contains(&d.blood_group))
            .cloned()
            .collect())
    }

    async fn insert_hospital(&self, hospital: Hospital) -> PortResult<Hospital> {
        let mut t = self.tables.write().await;
        if t.hospitals.values().any(|h| h.user_id == hospital.user_id) {
            return Err(PortError::Conflict(
                "Hospital profile already exists for this user".to_string(),
            ));
        }
        t.hospitals.insert(hospital.id, hospital.clone());
        Ok(hospital)
    }

    async fn get_hospital_by_user(&self, user_id: Uuid) -> PortResult<Option<Hospital>> {
        let t = self.tables.read().await;
        Ok(t.hospitals.values().find(|h| h.user_id == user_id).cloned())
    }

    async fn get_hospital_by_id(&self, hospital_id: Uuid) -> PortResult<Hospital> {
        let t = self.tables.read().await;
        t.hospitals
            .get(&hospital_id)
            .cloned()
            .ok_or_else(|| not_found("Hospital", hospital_id))
    }

    async fn set_hospital_verified(
        &self,
        hospital_id: Uuid,
        verified: bool,
    ) -> PortResult<Hospital> {
        let mut t = self.tables.write().await;
        let hospital = t
            .hospitals
            .get_mut(&hospital_id)
            .ok_or_else(|| not_found("Hospital", hospital_id))?;
        hospital.is_verified = verified;
        Ok(hospital.clone())
    }

    async fn update_hospital_location(
        &self,
        hospital_id: Uuid,
        location: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> PortResult<Hospital> {
        let mut t = self.tables.write().await;
        let hospital = t
            .hospitals
            .get_mut(&hospital_id)
            .ok_or_else(|| not_found("Hospital", hospital_id))?;
        hospital.location = location.to_string();
        hospital.latitude = latitude;
        hospital.longitude = longitude;
        Ok(hospital.clone())
    }

    async fn insert_alert(&self, alert: SosAlert) -> PortResult<SosAlert> {
        let mut t = self.tables.write().await;
        if !t.hospitals.contains_key(&alert.hospital_id) {
            return Err(not_found("Hospital", alert.hospital_id));
        }
        t.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    async fn get_alert_by_id(&self, alert_id: Uuid) -> PortResult<SosAlert> {
        let t = self.tables.read().await;
        t.alerts
            .get(&alert_id)
            .cloned()
            .ok_or_else(|| not_found("SOS alert", alert_id))
    }

    async fn list_open_alerts(&self, now: DateTime<Utc>) -> PortResult<Vec<AlertWithHospital>> {
        let t = self.tables.read().await;
        Ok(t.alerts
            .values()
            .filter(|a| a.status == AlertStatus::Active && a.expires_at >= now)
            .filter_map(|a| {
                t.hospitals.get(&a.hospital_id).map(|h| AlertWithHospital {
                    alert: a.clone(),
                    hospital: h.clone(),
                })
            })
            .collect())
    }

    async fn list_alerts_by_hospital(&self, hospital_id: Uuid) -> PortResult<Vec<SosAlert>> {
        let t = self.tables.read().await;
        let mut alerts: Vec<SosAlert> = t
            .alerts
            .values()
            .filter(|a| a.hospital_id == hospital_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn close_alert(&self, alert_id: Uuid, status: AlertStatus) -> PortResult<()> {
        let mut t = self.tables.write().await;
        let alert = t
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| not_found("SOS alert", alert_id))?;
        if alert.status != AlertStatus::Active {
            return Err(PortError::Conflict(format!(
                "SOS alert is already {}",
                alert.status
            )));
        }
        alert.status = status;
        Ok(())
    }

    async fn insert_response(&self, response: DonorResponse) -> PortResult<DonorResponse> {
        let mut t = self.tables.write().await;
        if t
            .responses
            .values()
            .any(|r| r.alert_id == response.alert_id && r.donor_id == response.donor_id)
        {
            return Err(PortError::Conflict(
                "You have already responded to this alert".to_string(),
            ));
        }
        t.responses.insert(response.id, response.clone());
        Ok(response)
    }

    async fn get_response_by_id(&self, response_id: Uuid) -> PortResult<DonorResponse> {
        let t = self.tables.read().await;
        t.responses
            .get(&response_id)
            .cloned()
            .ok_or_else(|| not_found("Response", response_id))
    }

    async fn list_responses_for_alert(&self, alert_id: Uuid) -> PortResult<Vec<DonorResponse>> {
        let t = self.tables.read().await;
        let mut responses: Vec<DonorResponse> = t
            .responses
            .values()
            .filter(|r| r.alert_id == alert_id)
            .cloned()
            .collect();
        responses.sort_by(|a, b| a.responded_at.cmp(&b.responded_at));
        Ok(responses)
    }

    async fn update_response_status(
        &self,
        response_id: Uuid,
        from: ResponseStatus,
        to: ResponseStatus,
    ) -> PortResult<()> {
        let mut t = self.tables.write().await;
        let response = t
            .responses
            .get_mut(&response_id)
            .ok_or_else(|| not_found("Response", response_id))?;
        if response.status != from {
            return Err(PortError::Conflict(format!(
                "Response is already {}",
                response.status
            )));
        }
        response.status = to;
        Ok(())
    }
}

//=========================================================================================
// A settable clock
//=========================================================================================

/// A `Clock` that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now = *now + by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
