//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Uniqueness (one donor and one hospital per user, one response per donor
//! and alert) is enforced by constraints; inserts use `ON CONFLICT DO NOTHING`
//! and report a missing `RETURNING` row as `PortError::Conflict`.

use async_trait::async_trait;
use blood_alert_core::domain::{
    AlertStatus, AlertWithHospital, BloodGroup, Donor, DonorResponse, Hospital, ResponseStatus,
    Role, SosAlert, User, UserCredentials,
};
use blood_alert_core::ports::{DatabaseService, PortError, PortResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or(what: &str, id: impl std::fmt::Display) -> impl FnOnce(sqlx::Error) -> PortError {
    let message = format!("{} {} not found", what, id);
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(message),
        other => unexpected(other),
    }
}

fn parse_column<T>(column: &str, raw: &str) -> PortResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("Corrupt {} column: {}", column, e)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    role: String,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            user_id: self.user_id,
            email: self.email,
            role: parse_column::<Role>("role", &self.role)?,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}

#[derive(FromRow)]
struct DonorRecord {
    id: Uuid,
    user_id: Uuid,
    blood_group: String,
    location: String,
    is_available: bool,
    last_donation_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl DonorRecord {
    fn to_domain(self) -> PortResult<Donor> {
        Ok(Donor {
            id: self.id,
            user_id: self.user_id,
            blood_group: parse_column("blood_group", &self.blood_group)?,
            location: self.location,
            is_available: self.is_available,
            last_donation_at: self.last_donation_at,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct HospitalRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    is_verified: bool,
    location: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_at: DateTime<Utc>,
}
impl HospitalRecord {
    fn to_domain(self) -> Hospital {
        Hospital {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            is_verified: self.is_verified,
            location: self.location,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AlertRecord {
    id: Uuid,
    hospital_id: Uuid,
    blood_group: String,
    urgency: String,
    units_needed: i32,
    contact_number: String,
    description: String,
    location: String,
    target_area: Option<String>,
    radius_km: f64,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    notifications_sent: i64,
}
impl AlertRecord {
    fn to_domain(self) -> PortResult<SosAlert> {
        Ok(SosAlert {
            id: self.id,
            hospital_id: self.hospital_id,
            blood_group: parse_column("blood_group", &self.blood_group)?,
            urgency: parse_column("urgency", &self.urgency)?,
            units_needed: self.units_needed,
            contact_number: self.contact_number,
            description: self.description,
            location: self.location,
            target_area: self.target_area,
            radius_km: self.radius_km,
            status: parse_column("status", &self.status)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            notifications_sent: self.notifications_sent,
        })
    }
}

/// One row of the alert/hospital join used by `list_open_alerts`.
#[derive(FromRow)]
struct AlertHospitalRecord {
    #[sqlx(flatten)]
    alert: AlertRecord,
    h_user_id: Uuid,
    h_name: String,
    h_is_verified: bool,
    h_location: String,
    h_latitude: Option<f64>,
    h_longitude: Option<f64>,
    h_created_at: DateTime<Utc>,
}
impl AlertHospitalRecord {
    fn to_domain(self) -> PortResult<AlertWithHospital> {
        let hospital = Hospital {
            id: self.alert.hospital_id,
            user_id: self.h_user_id,
            name: self.h_name,
            is_verified: self.h_is_verified,
            location: self.h_location,
            latitude: self.h_latitude,
            longitude: self.h_longitude,
            created_at: self.h_created_at,
        };
        Ok(AlertWithHospital {
            alert: self.alert.to_domain()?,
            hospital,
        })
    }
}

#[derive(FromRow)]
struct ResponseRecord {
    id: Uuid,
    alert_id: Uuid,
    donor_id: Uuid,
    status: String,
    responded_at: DateTime<Utc>,
    notes: Option<String>,
}
impl ResponseRecord {
    fn to_domain(self) -> PortResult<DonorResponse> {
        Ok(DonorResponse {
            id: self.id,
            alert_id: self.alert_id,
            donor_id: self.donor_id,
            status: parse_column("status", &self.status)?,
            responded_at: self.responded_at,
            notes: self.notes,
        })
    }
}

const DONOR_COLUMNS: &str =
    "id, user_id, blood_group, location, is_available, last_donation_at, created_at";
const HOSPITAL_COLUMNS: &str =
    "id, user_id, name, is_verified, location, latitude, longitude, created_at";
const ALERT_COLUMNS: &str = "id, hospital_id, blood_group, urgency, units_needed, contact_number, \
     description, location, target_area, radius_km, status, created_at, expires_at, notifications_sent";
const RESPONSE_COLUMNS: &str = "id, alert_id, donor_id, status, responded_at, notes";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Accounts ---

    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        role: Role,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password, role) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (email) DO NOTHING RETURNING user_id, email, role",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::Conflict(format!("Email {} is already registered", email)))?;
        record.to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("User", email))?;
        Ok(UserCredentials {
            user_id: record.user_id,
            email: record.email,
            hashed_password: record.hashed_password,
        })
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        sqlx::query_as::<_, UserRecord>("SELECT user_id, email, role FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("User", user_id))?
            .to_domain()
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthenticated)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Donors ---

    async fn insert_donor(&self, donor: Donor) -> PortResult<Donor> {
        let sql = format!(
            "INSERT INTO donors ({DONOR_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO NOTHING RETURNING {DONOR_COLUMNS}"
        );
        sqlx::query_as::<_, DonorRecord>(&sql)
            .bind(donor.id)
            .bind(donor.user_id)
            .bind(donor.blood_group.as_str())
            .bind(&donor.location)
            .bind(donor.is_available)
            .bind(donor.last_donation_at)
            .bind(donor.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| {
                PortError::Conflict("Donor profile already exists for this user".to_string())
            })?
            .to_domain()
    }

    async fn get_donor_by_user(&self, user_id: Uuid) -> PortResult<Option<Donor>> {
        let sql = format!("SELECT {DONOR_COLUMNS} FROM donors WHERE user_id = $1");
        sqlx::query_as::<_, DonorRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(DonorRecord::to_domain)
            .transpose()
    }

    async fn get_donor_by_id(&self, donor_id: Uuid) -> PortResult<Donor> {
        let sql = format!("SELECT {DONOR_COLUMNS} FROM donors WHERE id = $1");
        sqlx::query_as::<_, DonorRecord>(&sql)
            .bind(donor_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("Donor", donor_id))?
            .to_domain()
    }

    async fn set_donor_availability(
        &self,
        donor_id: Uuid,
        is_available: bool,
    ) -> PortResult<Donor> {
        let sql = format!(
            "UPDATE donors SET is_available = $1 WHERE id = $2 RETURNING {DONOR_COLUMNS}"
        );
        sqlx::query_as::<_, DonorRecord>(&sql)
            .bind(is_available)
            .bind(donor_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("Donor", donor_id))?
            .to_domain()
    }

    async fn set_donor_last_donation(&self, donor_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let result = sqlx::query("UPDATE donors SET last_donation_at = $1 WHERE id = $2")
            .bind(at)
            .bind(donor_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Donor {} not found", donor_id)));
        }
        Ok(())
    }

    async fn find_available_donors(&self, groups: &[BloodGroup]) -> PortResult<Vec<Donor>> {
        let groups: Vec<&str> = groups.iter().map(BloodGroup::as_str).collect();
        let sql = format!(
            "SELECT {DONOR_COLUMNS} FROM donors WHERE is_available AND blood_group = ANY($1)"
        );
        sqlx::query_as::<_, DonorRecord>(&sql)
            .bind(groups)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(DonorRecord::to_domain)
            .collect()
    }

    // --- Hospitals ---

    async fn insert_hospital(&self, hospital: Hospital) -> PortResult<Hospital> {
        let sql = format!(
            "INSERT INTO hospitals ({HOSPITAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO NOTHING RETURNING {HOSPITAL_COLUMNS}"
        );
        let record = sqlx::query_as::<_, HospitalRecord>(&sql)
            .bind(hospital.id)
            .bind(hospital.user_id)
            .bind(&hospital.name)
            .bind(hospital.is_verified)
            .bind(&hospital.location)
            .bind(hospital.latitude)
            .bind(hospital.longitude)
            .bind(hospital.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| {
                PortError::Conflict("Hospital profile already exists for this user".to_string())
            })?;
        Ok(record.to_domain())
    }

    async fn get_hospital_by_user(&self, user_id: Uuid) -> PortResult<Option<Hospital>> {
        let sql = format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE user_id = $1");
        let record = sqlx::query_as::<_, HospitalRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(HospitalRecord::to_domain))
    }

    async fn get_hospital_by_id(&self, hospital_id: Uuid) -> PortResult<Hospital> {
        let sql = format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = $1");
        let record = sqlx::query_as::<_, HospitalRecord>(&sql)
            .bind(hospital_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("Hospital", hospital_id))?;
        Ok(record.to_domain())
    }

    async fn set_hospital_verified(
        &self,
        hospital_id: Uuid,
        verified: bool,
    ) -> PortResult<Hospital> {
        let sql = format!(
            "UPDATE hospitals SET is_verified = $1 WHERE id = $2 RETURNING {HOSPITAL_COLUMNS}"
        );
        let record = sqlx::query_as::<_, HospitalRecord>(&sql)
            .bind(verified)
            .bind(hospital_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("Hospital", hospital_id))?;
        Ok(record.to_domain())
    }

    async fn update_hospital_location(
        &self,
        hospital_id: Uuid,
        location: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> PortResult<Hospital> {
        let sql = format!(
            "UPDATE hospitals SET location = $1, latitude = $2, longitude = $3 \
             WHERE id = $4 RETURNING {HOSPITAL_COLUMNS}"
        );
        let record = sqlx::query_as::<_, HospitalRecord>(&sql)
            .bind(location)
            .bind(latitude)
            .bind(longitude)
            .bind(hospital_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("Hospital", hospital_id))?;
        Ok(record.to_domain())
    }

    // --- SOS Alerts ---

    async fn insert_alert(&self, alert: SosAlert) -> PortResult<SosAlert> {
        let sql = format!(
            "INSERT INTO sos_alerts ({ALERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {ALERT_COLUMNS}"
        );
        sqlx::query_as::<_, AlertRecord>(&sql)
            .bind(alert.id)
            .bind(alert.hospital_id)
            .bind(alert.blood_group.as_str())
            .bind(alert.urgency.as_str())
            .bind(alert.units_needed)
            .bind(&alert.contact_number)
            .bind(&alert.description)
            .bind(&alert.location)
            .bind(&alert.target_area)
            .bind(alert.radius_km)
            .bind(alert.status.as_str())
            .bind(alert.created_at)
            .bind(alert.expires_at)
            .bind(alert.notifications_sent)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn get_alert_by_id(&self, alert_id: Uuid) -> PortResult<SosAlert> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM sos_alerts WHERE id = $1");
        sqlx::query_as::<_, AlertRecord>(&sql)
            .bind(alert_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("SOS alert", alert_id))?
            .to_domain()
    }

    async fn list_open_alerts(&self, now: DateTime<Utc>) -> PortResult<Vec<AlertWithHospital>> {
        sqlx::query_as::<_, AlertHospitalRecord>(
            "SELECT a.id, a.hospital_id, a.blood_group, a.urgency, a.units_needed, \
                    a.contact_number, a.description, a.location, a.target_area, a.radius_km, \
                    a.status, a.created_at, a.expires_at, a.notifications_sent, \
                    h.user_id AS h_user_id, h.name AS h_name, h.is_verified AS h_is_verified, \
                    h.location AS h_location, h.latitude AS h_latitude, \
                    h.longitude AS h_longitude, h.created_at AS h_created_at \
             FROM sos_alerts a JOIN hospitals h ON h.id = a.hospital_id \
             WHERE a.status = 'active' AND a.expires_at >= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(AlertHospitalRecord::to_domain)
        .collect()
    }

    async fn list_alerts_by_hospital(&self, hospital_id: Uuid) -> PortResult<Vec<SosAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM sos_alerts WHERE hospital_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, AlertRecord>(&sql)
            .bind(hospital_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(AlertRecord::to_domain)
            .collect()
    }

    async fn close_alert(&self, alert_id: Uuid, status: AlertStatus) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE sos_alerts SET status = $1 WHERE id = $2 AND status = 'active'",
        )
        .bind(status.as_str())
        .bind(alert_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            let current = self.get_alert_by_id(alert_id).await?;
            return Err(PortError::Conflict(format!(
                "SOS alert is already {}",
                current.status
            )));
        }
        Ok(())
    }

    // --- Donor Responses ---

    async fn insert_response(&self, response: DonorResponse) -> PortResult<DonorResponse> {
        let sql = format!(
            "INSERT INTO sos_responses ({RESPONSE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (alert_id, donor_id) DO NOTHING RETURNING {RESPONSE_COLUMNS}"
        );
        sqlx::query_as::<_, ResponseRecord>(&sql)
            .bind(response.id)
            .bind(response.alert_id)
            .bind(response.donor_id)
            .bind(response.status.as_str())
            .bind(response.responded_at)
            .bind(&response.notes)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| {
                PortError::Conflict("You have already responded to this alert".to_string())
            })?
            .to_domain()
    }

    async fn get_response_by_id(&self, response_id: Uuid) -> PortResult<DonorResponse> {
        let sql = format!("SELECT {RESPONSE_COLUMNS} FROM sos_responses WHERE id = $1");
        sqlx::query_as::<_, ResponseRecord>(&sql)
            .bind(response_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or("Response", response_id))?
            .to_domain()
    }

    async fn list_responses_for_alert(&self, alert_id: Uuid) -> PortResult<Vec<DonorResponse>> {
        let sql = format!(
            "SELECT {RESPONSE_COLUMNS} FROM sos_responses WHERE alert_id = $1 ORDER BY responded_at ASC"
        );
        sqlx::query_as::<_, ResponseRecord>(&sql)
            .bind(alert_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(ResponseRecord::to_domain)
            .collect()
    }

    async fn update_response_status(
        &self,
        response_id: Uuid,
        from: ResponseStatus,
        to: ResponseStatus,
    ) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE sos_responses SET status = $1 WHERE id = $2 AND status = $3")
                .bind(to.as_str())
                .bind(response_id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            let current = self.get_response_by_id(response_id).await?;
            return Err(PortError::Conflict(format!(
                "Response is already {}",
                current.status
            )));
        }
        Ok(())
    }
}
