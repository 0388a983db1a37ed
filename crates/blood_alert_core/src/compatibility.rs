//! crates/blood_alert_core/src/compatibility.rs
//!
//! The red-cell compatibility table shared by every alert query.
//!
//! A donor can give to a recipient when the donor's red cells carry no ABO
//! antigen the recipient lacks, and the donor is Rh-negative or the
//! recipient is Rh-positive.

use crate::domain::BloodGroup;

/// Returns `true` if red cells from `donor` may be given to `recipient`.
pub fn can_donate(donor: BloodGroup, recipient: BloodGroup) -> bool {
    use BloodGroup::*;

    let abo_ok = match donor {
        ONeg | OPos => true,
        ANeg | APos => matches!(recipient, ANeg | APos | AbNeg | AbPos),
        BNeg | BPos => matches!(recipient, BNeg | BPos | AbNeg | AbPos),
        AbNeg | AbPos => matches!(recipient, AbNeg | AbPos),
    };
    let rh_ok = !donor.is_rh_positive() || recipient.is_rh_positive();

    abo_ok && rh_ok
}

/// All groups that can donate to `recipient`, in `BloodGroup::ALL` order.
pub fn compatible_donors(recipient: BloodGroup) -> Vec<BloodGroup> {
    BloodGroup::ALL
        .into_iter()
        .filter(|donor| can_donate(*donor, recipient))
        .collect()
}
