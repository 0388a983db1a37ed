//! crates/blood_alert_core/src/matching.rs
//!
//! Donor/alert matching: target-area narrowing, effective status, and the
//! sort order used for every alert list shown to a donor.

use chrono::{DateTime, Utc};

use crate::compatibility::can_donate;
use crate::domain::{AlertStatus, AlertWithHospital, Donor, Hospital, SosAlert};

/// `true` when there is no target area, or when it appears (ignoring case)
/// in the donor's location or in the hospital's own location.
pub fn matches_target_area(
    target_area: Option<&str>,
    donor_location: &str,
    hospital_location: &str,
) -> bool {
    let target = match target_area.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_lowercase(),
        _ => return true,
    };
    donor_location.to_lowercase().contains(&target)
        || hospital_location.to_lowercase().contains(&target)
}

/// The status decisions should use. An alert past `expires_at` is expired
/// whatever the stored field says.
pub fn effective_status(alert: &SosAlert, now: DateTime<Utc>) -> AlertStatus {
    if now > alert.expires_at {
        AlertStatus::Expired
    } else {
        alert.status
    }
}

pub fn is_open(alert: &SosAlert, now: DateTime<Utc>) -> bool {
    effective_status(alert, now) == AlertStatus::Active
}

/// Whether `donor` should see `alert` in their active list.
pub fn is_alert_matchable(
    donor: &Donor,
    alert: &SosAlert,
    hospital: &Hospital,
    now: DateTime<Utc>,
) -> bool {
    is_open(alert, now)
        && can_donate(donor.blood_group, alert.blood_group)
        && matches_target_area(
            alert.target_area.as_deref(),
            &donor.location,
            &hospital.location,
        )
}

/// Stricter variant for the "nearby" list: an untargeted alert only counts
/// when the hospital and donor locations share a word.
pub fn is_alert_nearby(
    donor: &Donor,
    alert: &SosAlert,
    hospital: &Hospital,
    now: DateTime<Utc>,
) -> bool {
    if !is_alert_matchable(donor, alert, hospital, now) {
        return false;
    }
    match alert.target_area.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => true,
        _ => shares_location_token(&donor.location, &hospital.location),
    }
}

fn location_tokens(location: &str) -> impl Iterator<Item = String> + '_ {
    location
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
}

fn shares_location_token(a: &str, b: &str) -> bool {
    let theirs: Vec<String> = location_tokens(b).collect();
    location_tokens(a).any(|t| theirs.contains(&t))
}

/// Sorts most urgent first, newest first within the same urgency.
pub fn rank_alerts(alerts: &mut [AlertWithHospital]) {
    alerts.sort_by(|a, b| {
        b.alert
            .urgency
            .rank()
            .cmp(&a.alert.urgency.rank())
            .then_with(|| b.alert.created_at.cmp(&a.alert.created_at))
    });
}
