//! crates/blood_alert_core/src/service.rs
//!
//! The operations exposed to callers: registration, SOS alert issuance,
//! donor-facing alert queries, response recording and the alert lifecycle.
//! Every method takes the already-authenticated caller's user id.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::compatibility::compatible_donors;
use crate::domain::{
    AlertStatus, AlertWithHospital, BloodGroup, Donor, DonorResponse, Hospital, ResponseStatus,
    Role, SosAlert, Urgency, DEFAULT_RADIUS_KM,
};
use crate::matching::{
    effective_status, is_alert_matchable, is_alert_nearby, is_open, matches_target_area,
    rank_alerts,
};
use crate::ports::{Clock, DatabaseService, PortError, PortResult};

const MS_PER_HOUR: i64 = 3_600_000;

//=========================================================================================
// Inputs and Outputs
//=========================================================================================

#[derive(Debug, Clone)]
pub struct NewDonor {
    pub blood_group: BloodGroup,
    pub location: String,
    pub is_available: bool,
}

#[derive(Debug, Clone)]
pub struct NewHospital {
    pub name: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewSosAlert {
    pub blood_group: BloodGroup,
    pub urgency: Urgency,
    pub units_needed: i32,
    pub contact_number: String,
    pub description: String,
    pub hours_valid: i64,
    pub target_area: Option<String>,
    pub radius_km: Option<f64>,
}

/// What the issuing hospital gets back from `create_sos_alert`.
#[derive(Debug, Clone)]
pub struct AlertIssued {
    pub alert_id: Uuid,
    pub donors_notified: i64,
    pub message: String,
}

//=========================================================================================
// The Service
//=========================================================================================

#[derive(Clone)]
pub struct SosService {
    db: Arc<dyn DatabaseService>,
    clock: Arc<dyn Clock>,
}

impl SosService {
    pub fn new(db: Arc<dyn DatabaseService>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    // --- Registration ---

    /// Creates the caller's donor profile. Only donor accounts may have one;
    /// a second profile for the same user is rejected with `Conflict` by the
    /// store's unique key.
    pub async fn register_donor(&self, user_id: Uuid, new: NewDonor) -> PortResult<Donor> {
        self.require_role(user_id, Role::Donor).await?;
        let location = non_empty("location", &new.location)?;
        let donor = Donor {
            id: Uuid::new_v4(),
            user_id,
            blood_group: new.blood_group,
            location,
            is_available: new.is_available,
            last_donation_at: None,
            created_at: self.clock.now(),
        };
        let donor = self.db.insert_donor(donor).await?;
        info!(donor_id = %donor.id, blood_group = %donor.blood_group, "Donor registered");
        Ok(donor)
    }

    pub async fn my_donor(&self, user_id: Uuid) -> PortResult<Donor> {
        self.db
            .get_donor_by_user(user_id)
            .await?
            .ok_or_else(|| PortError::NotFound("Donor profile not found".to_string()))
    }

    pub async fn set_donor_availability(
        &self,
        user_id: Uuid,
        is_available: bool,
    ) -> PortResult<Donor> {
        let donor = self.my_donor(user_id).await?;
        self.db.set_donor_availability(donor.id, is_available).await
    }

    /// Records a donation made outside any SOS alert.
    pub async fn record_donation(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<Donor> {
        if at > self.clock.now() {
            return Err(PortError::Validation(
                "Donation time cannot be in the future".to_string(),
            ));
        }
        let donor = self.my_donor(user_id).await?;
        self.db.set_donor_last_donation(donor.id, at).await?;
        info!(donor_id = %donor.id, "Donation recorded");
        Ok(Donor {
            last_donation_at: Some(at),
            ..donor
        })
    }

    pub async fn register_hospital(
        &self,
        user_id: Uuid,
        new: NewHospital,
    ) -> PortResult<Hospital> {
        self.require_role(user_id, Role::Hospital).await?;
        let hospital = Hospital {
            id: Uuid::new_v4(),
            user_id,
            name: non_empty("name", &new.name)?,
            is_verified: false,
            location: non_empty("location", &new.location)?,
            latitude: new.latitude,
            longitude: new.longitude,
            created_at: self.clock.now(),
        };
        let hospital = self.db.insert_hospital(hospital).await?;
        info!(hospital_id = %hospital.id, "Hospital registered, awaiting verification");
        Ok(hospital)
    }

    pub async fn my_hospital(&self, user_id: Uuid) -> PortResult<Hospital> {
        self.db
            .get_hospital_by_user(user_id)
            .await?
            .ok_or_else(|| PortError::NotFound("Hospital profile not found".to_string()))
    }

    pub async fn update_hospital_location(
        &self,
        user_id: Uuid,
        location: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> PortResult<Hospital> {
        let location = non_empty("location", location)?;
        let hospital = self.my_hospital(user_id).await?;
        self.db
            .update_hospital_location(hospital.id, &location, latitude, longitude)
            .await
    }

    /// Sets a hospital's verification flag. Only admin accounts may do this.
    pub async fn verify_hospital(
        &self,
        admin_user_id: Uuid,
        hospital_id: Uuid,
        verified: bool,
    ) -> PortResult<Hospital> {
        let caller = self.db.get_user_by_id(admin_user_id).await?;
        if !caller.is_admin() {
            warn!(user_id = %admin_user_id, "Non-admin attempted hospital verification");
            return Err(PortError::Unauthorized(
                "Only administrators can verify hospitals".to_string(),
            ));
        }
        let hospital = self.db.set_hospital_verified(hospital_id, verified).await?;
        info!(hospital_id = %hospital_id, verified, "Hospital verification updated");
        Ok(hospital)
    }

    // --- Alert Issuance ---

    /// Issues an SOS alert for the caller's verified hospital and records how
    /// many available, compatible donors it reaches. Nothing is sent to them.
    pub async fn create_sos_alert(
        &self,
        user_id: Uuid,
        new: NewSosAlert,
    ) -> PortResult<AlertIssued> {
        let hospital = self.my_hospital(user_id).await?;
        if !hospital.is_verified {
            warn!(hospital_id = %hospital.id, "Unverified hospital attempted to create SOS alert");
            return Err(PortError::Unauthorized(
                "Only verified hospitals can create SOS alerts".to_string(),
            ));
        }
        if new.units_needed < 1 {
            return Err(PortError::Validation(
                "units_needed must be at least 1".to_string(),
            ));
        }
        if new.hours_valid < 1 {
            return Err(PortError::Validation(
                "hours_valid must be at least 1".to_string(),
            ));
        }

        let now = self.clock.now();
        let expires_at = expiry_after(now, new.hours_valid)?;
        let target_area = new
            .target_area
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let candidates = self
            .db
            .find_available_donors(&compatible_donors(new.blood_group))
            .await?;
        let donors_notified = candidates
            .iter()
            .filter(|d| matches_target_area(target_area.as_deref(), &d.location, &hospital.location))
            .count() as i64;

        let alert = SosAlert {
            id: Uuid::new_v4(),
            hospital_id: hospital.id,
            blood_group: new.blood_group,
            urgency: new.urgency,
            units_needed: new.units_needed,
            contact_number: new.contact_number,
            description: new.description,
            location: hospital.location.clone(),
            target_area,
            radius_km: new.radius_km.unwrap_or(DEFAULT_RADIUS_KM),
            status: AlertStatus::Active,
            created_at: now,
            expires_at,
            notifications_sent: donors_notified,
        };
        let alert = self.db.insert_alert(alert).await?;

        info!(
            alert_id = %alert.id,
            blood_group = %alert.blood_group,
            urgency = %alert.urgency,
            donors_notified,
            "SOS alert created"
        );
        Ok(AlertIssued {
            alert_id: alert.id,
            donors_notified,
            message: format!(
                "SOS alert sent to {} compatible donors",
                donors_notified
            ),
        })
    }

    /// The caller's hospital's alerts, newest first, with `status` replaced
    /// by the effective status.
    pub async fn list_hospital_alerts(&self, user_id: Uuid) -> PortResult<Vec<SosAlert>> {
        let hospital = self.my_hospital(user_id).await?;
        let now = self.clock.now();
        let alerts = self.db.list_alerts_by_hospital(hospital.id).await?;
        Ok(alerts
            .into_iter()
            .map(|mut a| {
                a.status = effective_status(&a, now);
                a
            })
            .collect())
    }

    // --- Donor-facing Queries ---

    /// Open alerts the caller's donor profile can help with, most urgent first.
    /// A caller without a donor profile gets an empty list.
    pub async fn active_alerts_for_donor(
        &self,
        user_id: Uuid,
    ) -> PortResult<Vec<AlertWithHospital>> {
        self.alerts_for_donor(user_id, is_alert_matchable).await
    }

    /// Like `active_alerts_for_donor`, restricted to alerts close to the
    /// donor's location.
    pub async fn nearby_alerts_for_donor(
        &self,
        user_id: Uuid,
    ) -> PortResult<Vec<AlertWithHospital>> {
        self.alerts_for_donor(user_id, is_alert_nearby).await
    }

    async fn alerts_for_donor(
        &self,
        user_id: Uuid,
        keep: fn(&Donor, &SosAlert, &Hospital, DateTime<Utc>) -> bool,
    ) -> PortResult<Vec<AlertWithHospital>> {
        let donor = match self.db.get_donor_by_user(user_id).await? {
            Some(donor) => donor,
            None => return Ok(Vec::new()),
        };
        let now = self.clock.now();
        let mut alerts: Vec<AlertWithHospital> = self
            .db
            .list_open_alerts(now)
            .await?
            .into_iter()
            .filter(|a| keep(&donor, &a.alert, &a.hospital, now))
            .collect();
        rank_alerts(&mut alerts);
        Ok(alerts)
    }

    // --- Responses ---

    /// Records the caller's interest in an alert. One response per donor and
    /// alert; the store rejects a second one with `Conflict`.
    pub async fn respond_to_sos_alert(
        &self,
        user_id: Uuid,
        alert_id: Uuid,
        notes: Option<String>,
    ) -> PortResult<Uuid> {
        let donor = self.my_donor(user_id).await?;
        let alert = self.db.get_alert_by_id(alert_id).await?;
        let now = self.clock.now();
        if !is_open(&alert, now) {
            return Err(PortError::Conflict(format!(
                "SOS alert is {}",
                effective_status(&alert, now)
            )));
        }

        let response = DonorResponse {
            id: Uuid::new_v4(),
            alert_id,
            donor_id: donor.id,
            status: ResponseStatus::Interested,
            responded_at: now,
            notes: notes.filter(|n| !n.trim().is_empty()),
        };
        let response = self.db.insert_response(response).await.map_err(|e| {
            if let PortError::Conflict(_) = e {
                warn!(alert_id = %alert_id, donor_id = %donor.id, "Duplicate SOS response rejected");
            }
            e
        })?;
        info!(alert_id = %alert_id, donor_id = %donor.id, "Donor responded to SOS alert");
        Ok(response.id)
    }

    pub async fn list_alert_responses(
        &self,
        user_id: Uuid,
        alert_id: Uuid,
    ) -> PortResult<Vec<DonorResponse>> {
        self.owned_alert(user_id, alert_id).await?;
        self.db.list_responses_for_alert(alert_id).await
    }

    /// Moves a response forward (interested, confirmed, completed). Completing
    /// it stamps the donor's last donation time.
    pub async fn update_response_status(
        &self,
        user_id: Uuid,
        alert_id: Uuid,
        response_id: Uuid,
        status: ResponseStatus,
    ) -> PortResult<()> {
        self.owned_alert(user_id, alert_id).await?;
        let response = self.db.get_response_by_id(response_id).await?;
        if response.alert_id != alert_id {
            return Err(PortError::NotFound(format!(
                "Response {} not found for alert {}",
                response_id, alert_id
            )));
        }
        if status <= response.status {
            return Err(PortError::Conflict(format!(
                "Response is already {}",
                response.status
            )));
        }

        self.db
            .update_response_status(response_id, response.status, status)
            .await?;
        if status == ResponseStatus::Completed {
            self.db
                .set_donor_last_donation(response.donor_id, self.clock.now())
                .await?;
        }
        info!(response_id = %response_id, status = %status, "SOS response updated");
        Ok(())
    }

    // --- Status Lifecycle ---

    /// Closes an alert as fulfilled or expired. Only the owning hospital may
    /// do this, and only while the alert is still effectively active. An
    /// alert whose expiry has passed may still be marked expired.
    pub async fn update_sos_alert_status(
        &self,
        user_id: Uuid,
        alert_id: Uuid,
        status: AlertStatus,
    ) -> PortResult<()> {
        let alert = self.owned_alert(user_id, alert_id).await?;
        if status == AlertStatus::Active {
            return Err(PortError::Validation(
                "An alert cannot be moved back to active".to_string(),
            ));
        }
        if alert.status.is_terminal() {
            return Err(PortError::Conflict(format!("SOS alert is already {}", alert.status)));
        }
        let now = self.clock.now();
        if status == AlertStatus::Fulfilled && !is_open(&alert, now) {
            return Err(PortError::Conflict(
                "SOS alert has already expired".to_string(),
            ));
        }

        self.db.close_alert(alert_id, status).await?;
        info!(alert_id = %alert_id, status = %status, "SOS alert status updated");
        Ok(())
    }

    async fn require_role(&self, user_id: Uuid, role: Role) -> PortResult<()> {
        let user = self.db.get_user_by_id(user_id).await?;
        if user.role != role {
            warn!(
                user_id = %user_id,
                role = %user.role,
                required = %role,
                "Profile registration with wrong account role"
            );
            return Err(PortError::Unauthorized(format!(
                "Only {} accounts can do this",
                role
            )));
        }
        Ok(())
    }

    /// Loads an alert and checks it belongs to the caller's hospital.
    async fn owned_alert(&self, user_id: Uuid, alert_id: Uuid) -> PortResult<SosAlert> {
        let hospital = self
            .db
            .get_hospital_by_user(user_id)
            .await?
            .ok_or_else(|| PortError::Unauthorized("Hospital profile required".to_string()))?;
        let alert = self.db.get_alert_by_id(alert_id).await?;
        if alert.hospital_id != hospital.id {
            warn!(alert_id = %alert_id, hospital_id = %hospital.id, "Hospital does not own SOS alert");
            return Err(PortError::Unauthorized(
                "You can only manage your own SOS alerts".to_string(),
            ));
        }
        Ok(alert)
    }
}

fn non_empty(field: &str, value: &str) -> PortResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PortError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn expiry_after(now: DateTime<Utc>, hours_valid: i64) -> PortResult<DateTime<Utc>> {
    hours_valid
        .checked_mul(MS_PER_HOUR)
        .and_then(Duration::try_milliseconds)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| PortError::Validation("hours_valid is too large".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::memory::{InMemoryDatabase, ManualClock};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
    }

    struct Fixture {
        db: Arc<InMemoryDatabase>,
        clock: Arc<ManualClock>,
        service: SosService,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Arc::new(InMemoryDatabase::new());
            let clock = Arc::new(ManualClock::new(t0()));
            let service = SosService::new(db.clone(), clock.clone());
            Self { db, clock, service }
        }

        async fn user(&self, email: &str, role: Role) -> Uuid {
            self.db
                .create_user_with_email(email, "hash", role)
                .await
                .unwrap()
                .user_id
        }

        async fn donor(&self, group: BloodGroup, location: &str) -> (Uuid, Donor) {
            let user_id = self.user(&format!("{}@donor.test", Uuid::new_v4()), Role::Donor).await;
            let donor = self
                .service
                .register_donor(
                    user_id,
                    NewDonor {
                        blood_group: group,
                        location: location.to_string(),
                        is_available: true,
                    },
                )
                .await
                .unwrap();
            (user_id, donor)
        }

        async fn hospital(&self, location: &str, verified: bool) -> (Uuid, Hospital) {
            let user_id = self
                .user(&format!("{}@hospital.test", Uuid::new_v4()), Role::Hospital)
                .await;
            let hospital = self
                .service
                .register_hospital(
                    user_id,
                    NewHospital {
                        name: "St. Mary".to_string(),
                        location: location.to_string(),
                        latitude: None,
                        longitude: None,
                    },
                )
                .await
                .unwrap();
            if verified {
                self.db.set_hospital_verified(hospital.id, true).await.unwrap();
            }
            (user_id, hospital)
        }
    }

    fn request(group: BloodGroup, urgency: Urgency, target_area: Option<&str>) -> NewSosAlert {
        NewSosAlert {
            blood_group: group,
            urgency,
            units_needed: 3,
            contact_number: "555-0199".to_string(),
            description: "Surgery".to_string(),
            hours_valid: 24,
            target_area: target_area.map(str::to_string),
            radius_km: None,
        }
    }

    #[tokio::test]
    async fn create_alert_sets_expiry_and_defaults() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("New York, NY", true).await;

        let issued = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::APos, Urgency::Urgent, None))
            .await
            .unwrap();

        let alert = f.db.get_alert_by_id(issued.alert_id).await.unwrap();
        assert_eq!(alert.expires_at, t0() + Duration::milliseconds(86_400_000));
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.radius_km, DEFAULT_RADIUS_KM);
        assert_eq!(alert.location, "New York, NY");
    }

    #[tokio::test]
    async fn create_alert_counts_compatible_available_donors_in_area() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("New York, NY", true).await;
        f.donor(BloodGroup::ONeg, "Brooklyn, NY").await;
        f.donor(BloodGroup::APos, "brooklyn heights").await;
        f.donor(BloodGroup::BPos, "Brooklyn, NY").await; // incompatible
        f.donor(BloodGroup::APos, "Newark, NJ").await; // outside area
        let (unavailable_user, _) = f.donor(BloodGroup::APos, "Brooklyn").await;
        f.service
            .set_donor_availability(unavailable_user, false)
            .await
            .unwrap();

        let issued = f
            .service
            .create_sos_alert(
                hospital_user,
                request(BloodGroup::APos, Urgency::Critical, Some("Brooklyn")),
            )
            .await
            .unwrap();

        assert_eq!(issued.donors_notified, 2);
        assert!(issued.message.contains('2'));
        let alert = f.db.get_alert_by_id(issued.alert_id).await.unwrap();
        assert_eq!(alert.notifications_sent, 2);
    }

    #[tokio::test]
    async fn hospital_location_match_counts_every_compatible_donor() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Brooklyn Methodist", true).await;
        f.donor(BloodGroup::OPos, "Queens").await;
        f.donor(BloodGroup::OPos, "Bronx").await;

        let issued = f
            .service
            .create_sos_alert(
                hospital_user,
                request(BloodGroup::OPos, Urgency::Normal, Some("brooklyn")),
            )
            .await
            .unwrap();
        assert_eq!(issued.donors_notified, 2);
    }

    #[tokio::test]
    async fn unverified_hospital_cannot_create_alert() {
        let f = Fixture::new();
        let (hospital_user, hospital) = f.hospital("Boston", false).await;

        let err = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unauthorized(_)));
        assert!(f.db.list_alerts_by_hospital(hospital.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_units_and_hours_are_rejected() {
        let f = Fixture::new();
        let (hospital_user, hospital) = f.hospital("Boston", true).await;

        let mut zero_units = request(BloodGroup::OPos, Urgency::Urgent, None);
        zero_units.units_needed = 0;
        assert!(matches!(
            f.service.create_sos_alert(hospital_user, zero_units).await,
            Err(PortError::Validation(_))
        ));

        let mut no_hours = request(BloodGroup::OPos, Urgency::Urgent, None);
        no_hours.hours_valid = 0;
        assert!(matches!(
            f.service.create_sos_alert(hospital_user, no_hours).await,
            Err(PortError::Validation(_))
        ));
        assert!(f.db.list_alerts_by_hospital(hospital.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_donor_registration_is_a_conflict() {
        let f = Fixture::new();
        let (user_id, _) = f.donor(BloodGroup::ANeg, "Austin").await;
        let err = f
            .service
            .register_donor(
                user_id,
                NewDonor {
                    blood_group: BloodGroup::ANeg,
                    location: "Austin".to_string(),
                    is_available: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn active_alerts_are_compatible_and_ranked() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Seattle", true).await;
        let (donor_user, _) = f.donor(BloodGroup::ONeg, "Seattle").await;

        let normal = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::BPos, Urgency::Normal, None))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        let critical_old = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::APos, Urgency::Critical, None))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        let critical_new = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::AbNeg, Urgency::Critical, None))
            .await
            .unwrap();

        let alerts = f.service.active_alerts_for_donor(donor_user).await.unwrap();
        let ids: Vec<Uuid> = alerts.iter().map(|a| a.alert.id).collect();
        assert_eq!(
            ids,
            vec![critical_new.alert_id, critical_old.alert_id, normal.alert_id]
        );
    }

    #[tokio::test]
    async fn active_alerts_exclude_incompatible_and_expired() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Seattle", true).await;
        let (donor_user, _) = f.donor(BloodGroup::APos, "Seattle").await;

        f.service
            .create_sos_alert(hospital_user, request(BloodGroup::BPos, Urgency::Critical, None))
            .await
            .unwrap();
        f.service
            .create_sos_alert(hospital_user, request(BloodGroup::APos, Urgency::Urgent, None))
            .await
            .unwrap();
        assert_eq!(f.service.active_alerts_for_donor(donor_user).await.unwrap().len(), 1);

        f.clock.advance(Duration::hours(25));
        assert!(f.service.active_alerts_for_donor(donor_user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alerts_for_user_without_donor_profile_are_empty() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Seattle", true).await;
        f.service
            .create_sos_alert(hospital_user, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();

        assert!(f.service.active_alerts_for_donor(hospital_user).await.unwrap().is_empty());
        assert!(f.service.nearby_alerts_for_donor(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nearby_alerts_only_include_local_hospitals() {
        let f = Fixture::new();
        let (local_user, _) = f.hospital("Portland, OR", true).await;
        let (remote_user, _) = f.hospital("Miami, FL", true).await;
        let (donor_user, _) = f.donor(BloodGroup::ONeg, "Portland").await;

        let local = f
            .service
            .create_sos_alert(local_user, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();
        f.service
            .create_sos_alert(remote_user, request(BloodGroup::OPos, Urgency::Critical, None))
            .await
            .unwrap();

        assert_eq!(f.service.active_alerts_for_donor(donor_user).await.unwrap().len(), 2);
        let nearby = f.service.nearby_alerts_for_donor(donor_user).await.unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].alert.id, local.alert_id);
        assert_eq!(nearby[0].hospital.location, "Portland, OR");
    }

    #[tokio::test]
    async fn second_response_from_same_donor_is_rejected() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Denver", true).await;
        let (donor_user, donor) = f.donor(BloodGroup::ONeg, "Denver").await;
        let issued = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();

        let response_id = f
            .service
            .respond_to_sos_alert(donor_user, issued.alert_id, Some("On my way".to_string()))
            .await
            .unwrap();
        let err = f
            .service
            .respond_to_sos_alert(donor_user, issued.alert_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        let responses = f
            .service
            .list_alert_responses(hospital_user, issued.alert_id)
            .await
            .unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, response_id);
        assert_eq!(responses[0].donor_id, donor.id);
        assert_eq!(responses[0].status, ResponseStatus::Interested);
        assert_eq!(responses[0].notes.as_deref(), Some("On my way"));
    }

    #[tokio::test]
    async fn concurrent_responses_record_exactly_one() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Denver", true).await;
        let (donor_user, _) = f.donor(BloodGroup::ONeg, "Denver").await;
        let issued = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = f.service.clone();
                let alert_id = issued.alert_id;
                tokio::spawn(async move {
                    service.respond_to_sos_alert(donor_user, alert_id, None).await
                })
            })
            .collect();
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(
            f.db.list_responses_for_alert(issued.alert_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn responding_requires_donor_profile_and_open_alert() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Denver", true).await;
        let (donor_user, _) = f.donor(BloodGroup::ONeg, "Denver").await;
        let issued = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();

        assert!(matches!(
            f.service.respond_to_sos_alert(hospital_user, issued.alert_id, None).await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(
            f.service.respond_to_sos_alert(donor_user, Uuid::new_v4(), None).await,
            Err(PortError::NotFound(_))
        ));

        f.clock.advance(Duration::hours(24) + Duration::seconds(1));
        assert!(matches!(
            f.service.respond_to_sos_alert(donor_user, issued.alert_id, None).await,
            Err(PortError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn only_owner_can_update_status() {
        let f = Fixture::new();
        let (owner, _) = f.hospital("Denver", true).await;
        let (other, _) = f.hospital("Denver", true).await;
        let issued = f
            .service
            .create_sos_alert(owner, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();

        assert!(matches!(
            f.service
                .update_sos_alert_status(other, issued.alert_id, AlertStatus::Fulfilled)
                .await,
            Err(PortError::Unauthorized(_))
        ));

        f.service
            .update_sos_alert_status(owner, issued.alert_id, AlertStatus::Fulfilled)
            .await
            .unwrap();
        let alert = f.db.get_alert_by_id(issued.alert_id).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Fulfilled);

        assert!(matches!(
            f.service
                .update_sos_alert_status(owner, issued.alert_id, AlertStatus::Expired)
                .await,
            Err(PortError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn stale_active_alert_can_be_expired_but_not_fulfilled() {
        let f = Fixture::new();
        let (owner, _) = f.hospital("Denver", true).await;
        let issued = f
            .service
            .create_sos_alert(owner, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();
        f.clock.advance(Duration::hours(30));

        let listed = f.service.list_hospital_alerts(owner).await.unwrap();
        assert_eq!(listed[0].status, AlertStatus::Expired);

        assert!(matches!(
            f.service
                .update_sos_alert_status(owner, issued.alert_id, AlertStatus::Fulfilled)
                .await,
            Err(PortError::Conflict(_))
        ));
        f.service
            .update_sos_alert_status(owner, issued.alert_id, AlertStatus::Expired)
            .await
            .unwrap();
        assert!(matches!(
            f.service
                .update_sos_alert_status(owner, issued.alert_id, AlertStatus::Active)
                .await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn completing_a_response_records_the_donation() {
        let f = Fixture::new();
        let (owner, _) = f.hospital("Denver", true).await;
        let (donor_user, donor) = f.donor(BloodGroup::ONeg, "Denver").await;
        let issued = f
            .service
            .create_sos_alert(owner, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();
        let response_id = f
            .service
            .respond_to_sos_alert(donor_user, issued.alert_id, None)
            .await
            .unwrap();

        f.service
            .update_response_status(owner, issued.alert_id, response_id, ResponseStatus::Confirmed)
            .await
            .unwrap();
        assert!(matches!(
            f.service
                .update_response_status(
                    owner,
                    issued.alert_id,
                    response_id,
                    ResponseStatus::Interested
                )
                .await,
            Err(PortError::Conflict(_))
        ));

        f.clock.advance(Duration::hours(2));
        f.service
            .update_response_status(owner, issued.alert_id, response_id, ResponseStatus::Completed)
            .await
            .unwrap();
        let donor = f.db.get_donor_by_id(donor.id).await.unwrap();
        assert_eq!(donor.last_donation_at, Some(t0() + Duration::hours(2)));
    }

    #[tokio::test]
    async fn only_admins_verify_hospitals() {
        let f = Fixture::new();
        let (hospital_user, hospital) = f.hospital("Denver", false).await;
        let admin = f.user("admin@bloodline.test", Role::Admin).await;

        assert!(matches!(
            f.service.verify_hospital(hospital_user, hospital.id, true).await,
            Err(PortError::Unauthorized(_))
        ));
        let verified = f.service.verify_hospital(admin, hospital.id, true).await.unwrap();
        assert!(verified.is_verified);

        f.service
            .create_sos_alert(hospital_user, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn moved_hospital_issues_alerts_from_new_location() {
        let f = Fixture::new();
        let (hospital_user, hospital) = f.hospital("Denver", true).await;

        assert!(matches!(
            f.service
                .update_hospital_location(hospital_user, "  ", None, None)
                .await,
            Err(PortError::Validation(_))
        ));
        let moved = f
            .service
            .update_hospital_location(hospital_user, " Boulder, CO ", Some(40.01), Some(-105.27))
            .await
            .unwrap();
        assert_eq!(moved.id, hospital.id);
        assert_eq!(moved.location, "Boulder, CO");
        assert_eq!(moved.latitude, Some(40.01));

        let issued = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::BPos, Urgency::Normal, None))
            .await
            .unwrap();
        let alert = f.db.get_alert_by_id(issued.alert_id).await.unwrap();
        assert_eq!(alert.location, "Boulder, CO");
        assert_eq!(f.service.my_hospital(hospital_user).await.unwrap().location, "Boulder, CO");
    }

    #[tokio::test]
    async fn unavailable_donors_are_not_counted() {
        let f = Fixture::new();
        let (hospital_user, _) = f.hospital("Denver", true).await;
        let (donor_user, _) = f.donor(BloodGroup::ONeg, "Denver").await;
        f.service.set_donor_availability(donor_user, false).await.unwrap();
        assert!(!f.service.my_donor(donor_user).await.unwrap().is_available);

        let issued = f
            .service
            .create_sos_alert(hospital_user, request(BloodGroup::ONeg, Urgency::Critical, None))
            .await
            .unwrap();
        assert_eq!(issued.donors_notified, 0);
        assert_eq!(issued.message, "SOS alert sent to 0 compatible donors");
    }

    #[tokio::test]
    async fn profiles_follow_the_account_role() {
        let f = Fixture::new();
        let donor_user = f.user("donor@bloodline.test", Role::Donor).await;
        let hospital_user = f.user("hospital@bloodline.test", Role::Hospital).await;

        let err = f
            .service
            .register_hospital(
                donor_user,
                NewHospital {
                    name: "Back Room Clinic".to_string(),
                    location: "Denver".to_string(),
                    latitude: None,
                    longitude: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unauthorized(_)));

        let err = f
            .service
            .register_donor(
                hospital_user,
                NewDonor {
                    blood_group: BloodGroup::ONeg,
                    location: "Denver".to_string(),
                    is_available: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unauthorized(_)));

        assert!(f.db.get_hospital_by_user(donor_user).await.unwrap().is_none());
        assert!(f.db.get_donor_by_user(hospital_user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recorded_donation_must_not_be_in_the_future() {
        let f = Fixture::new();
        let (donor_user, donor) = f.donor(BloodGroup::BNeg, "Austin").await;

        assert!(matches!(
            f.service
                .record_donation(donor_user, t0() + Duration::minutes(1))
                .await,
            Err(PortError::Validation(_))
        ));

        let at = t0() - Duration::days(40);
        let updated = f.service.record_donation(donor_user, at).await.unwrap();
        assert_eq!(updated.last_donation_at, Some(at));
        let stored = f.db.get_donor_by_id(donor.id).await.unwrap();
        assert_eq!(stored.last_donation_at, Some(at));

        let stranger = f.user("nobody@bloodline.test", Role::Donor).await;
        assert!(matches!(
            f.service.record_donation(stranger, at).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_closes_apply_exactly_one() {
        let f = Fixture::new();
        let (owner, _) = f.hospital("Denver", true).await;
        let issued = f
            .service
            .create_sos_alert(owner, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = f.service.clone();
                let alert_id = issued.alert_id;
                let status = if i % 2 == 0 {
                    AlertStatus::Fulfilled
                } else {
                    AlertStatus::Expired
                };
                tokio::spawn(async move {
                    service
                        .update_sos_alert_status(owner, alert_id, status)
                        .await
                        .map(|_| status)
                })
            })
            .collect();
        let mut applied = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(status) => applied.push(status),
                Err(e) => assert!(matches!(e, PortError::Conflict(_))),
            }
        }
        assert_eq!(applied.len(), 1);
        let alert = f.db.get_alert_by_id(issued.alert_id).await.unwrap();
        assert_eq!(alert.status, applied[0]);
    }

    #[tokio::test]
    async fn concurrent_response_updates_apply_exactly_one() {
        let f = Fixture::new();
        let (owner, _) = f.hospital("Denver", true).await;
        let (donor_user, _) = f.donor(BloodGroup::ONeg, "Denver").await;
        let issued = f
            .service
            .create_sos_alert(owner, request(BloodGroup::OPos, Urgency::Urgent, None))
            .await
            .unwrap();
        let response_id = f
            .service
            .respond_to_sos_alert(donor_user, issued.alert_id, None)
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = f.service.clone();
                let alert_id = issued.alert_id;
                tokio::spawn(async move {
                    service
                        .update_response_status(owner, alert_id, response_id, ResponseStatus::Confirmed)
                        .await
                })
            })
            .collect();
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }
}
