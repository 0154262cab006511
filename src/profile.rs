//! Profile manager: read and patch the caller's own profile, plus the
//! doctor directory and a doctor's patient roster.
//!
//! A patch may touch three rows (user, profile, details). All of it is
//! validated first and written inside one transaction.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{is_doctor, Actor};
use crate::db::repository::{
    get_profile_by_user, get_user, list_doctors as query_doctors, list_patients_of_doctor,
    update_profile, update_user_names,
};
use crate::error::{FieldErrors, TelemedError};
use crate::models::{Profile, ProfileDetails, Role, User, UserSummary};
use crate::registration::{NAME_MAX, PHONE_MAX, CONTACT_NAME_MAX, SPECIALIZATION_MAX};
use crate::validation::{deserialize_some, is_valid_email, past_date, too_long, INVALID_EMAIL};

// ═══════════════════════════════════════════════════════════
// Views
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileView {
    pub id: Uuid,
    pub user: UserSummary,
    pub role: Role,
    pub role_display: &'static str,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub details: ProfileDetails,
}

impl ProfileView {
    fn new(user: &User, profile: Profile) -> Self {
        let role = profile.role();
        Self {
            id: profile.id,
            user: user.summary(),
            role,
            role_display: role.label(),
            phone_number: profile.phone_number,
            address: profile.address,
            date_of_birth: profile.date_of_birth,
            details: profile.details,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DoctorListing {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub specialization: String,
    pub years_of_experience: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PatientListing {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

// ═══════════════════════════════════════════════════════════
// Patch input
// ═══════════════════════════════════════════════════════════

/// Partial update of the caller's profile. Absent fields are left
/// alone; `null` clears a nullable field. `role` and `license_number`
/// are read-only and ignored if sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub date_of_birth: Option<Option<String>>,
    #[serde(default, alias = "user_update")]
    pub user: Option<UserPatch>,
    #[serde(default, alias = "doctor_details_update")]
    pub doctor_details: Option<DoctorDetailsPatch>,
    #[serde(default, alias = "patient_details_update")]
    pub patient_details: Option<PatientDetailsPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorDetailsPatch {
    pub specialization: Option<String>,
    pub years_of_experience: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientDetailsPatch {
    #[serde(default, deserialize_with = "deserialize_some")]
    pub emergency_contact_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub emergency_contact_phone: Option<Option<String>>,
}

// ═══════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════

fn load(conn: &Connection, actor: &Actor) -> Result<(User, Profile), TelemedError> {
    let user = get_user(conn, &actor.user_id)?
        .ok_or_else(|| TelemedError::NotFound("User".into()))?;
    let profile = get_profile_by_user(conn, &actor.user_id)?
        .ok_or_else(|| TelemedError::NotFound("Profile".into()))?;
    Ok((user, profile))
}

/// The caller's profile joined with its role-specific details.
pub fn get(conn: &Connection, actor: &Actor) -> Result<ProfileView, TelemedError> {
    let (user, profile) = load(conn, actor)?;
    tracing::debug!(user_id = %actor.user_id, "Profile read");
    Ok(ProfileView::new(&user, profile))
}

/// Apply a patch atomically. Any field error aborts the whole update
/// and nothing is written.
pub fn update(
    conn: &mut Connection,
    actor: &Actor,
    patch: &ProfilePatch,
) -> Result<ProfileView, TelemedError> {
    let (mut user, mut profile) = load(conn, actor)?;
    let mut errors = FieldErrors::new();

    if let Some(value) = &patch.phone_number {
        profile.phone_number = nullable_text(&mut errors, "phone_number", value, PHONE_MAX);
    }
    if let Some(value) = &patch.address {
        profile.address = nullable_text(&mut errors, "address", value, usize::MAX);
    }
    if let Some(value) = &patch.date_of_birth {
        profile.date_of_birth = match value.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => past_date(&mut errors, "date_of_birth", raw),
        };
    }

    if let Some(user_patch) = &patch.user {
        let mut nested = FieldErrors::new();
        apply_user_patch(&mut nested, &mut user, user_patch);
        errors.merge_nested("user", nested);
    }

    // A sub-patch for the other role is ignored.
    match &mut profile.details {
        ProfileDetails::Doctor(doctor) => {
            if let Some(p) = &patch.doctor_details {
                let mut nested = FieldErrors::new();
                if let Some(value) = &p.specialization {
                    let value = value.trim();
                    if value.is_empty() {
                        nested.add("specialization", "This field may not be blank.");
                    } else if value.chars().count() > SPECIALIZATION_MAX {
                        nested.add("specialization", too_long(SPECIALIZATION_MAX));
                    } else {
                        doctor.specialization = value.to_string();
                    }
                }
                if let Some(years) = p.years_of_experience {
                    match u32::try_from(years) {
                        Ok(y) => doctor.years_of_experience = y,
                        Err(_) => nested.add(
                            "years_of_experience",
                            "Ensure this value is greater than or equal to 0.",
                        ),
                    }
                }
                errors.merge_nested("doctor_details", nested);
            }
        }
        ProfileDetails::Patient(patient) => {
            if let Some(p) = &patch.patient_details {
                let mut nested = FieldErrors::new();
                if let Some(value) = &p.emergency_contact_name {
                    patient.emergency_contact_name = nullable_text(
                        &mut nested,
                        "emergency_contact_name",
                        value,
                        CONTACT_NAME_MAX,
                    );
                }
                if let Some(value) = &p.emergency_contact_phone {
                    patient.emergency_contact_phone =
                        nullable_text(&mut nested, "emergency_contact_phone", value, PHONE_MAX);
                }
                errors.merge_nested("patient_details", nested);
            }
        }
    }

    if let Err(e) = errors.into_result() {
        tracing::warn!(user_id = %actor.user_id, "Profile update rejected");
        return Err(e);
    }

    let tx = conn.transaction()?;
    update_user_names(&tx, &user.id, &user.first_name, &user.last_name, &user.email)?;
    update_profile(&tx, &profile)?;
    tx.commit()?;

    tracing::info!(user_id = %actor.user_id, "Profile updated");
    Ok(ProfileView::new(&user, profile))
}

fn apply_user_patch(errors: &mut FieldErrors, user: &mut User, patch: &UserPatch) {
    if let Some(first) = &patch.first_name {
        let first = first.trim();
        if first.chars().count() > NAME_MAX {
            errors.add("first_name", too_long(NAME_MAX));
        } else {
            user.first_name = first.to_string();
        }
    }
    if let Some(last) = &patch.last_name {
        let last = last.trim();
        if last.chars().count() > NAME_MAX {
            errors.add("last_name", too_long(NAME_MAX));
        } else {
            user.last_name = last.to_string();
        }
    }
    if let Some(email) = &patch.email {
        let email = email.trim();
        if !email.is_empty() && !is_valid_email(email) {
            errors.add("email", INVALID_EMAIL);
        } else {
            user.email = email.to_string();
        }
    }
}

/// `null` or blank clears; otherwise trimmed and length-checked.
fn nullable_text(
    errors: &mut FieldErrors,
    field: &str,
    value: &Option<String>,
    max: usize,
) -> Option<String> {
    let trimmed = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
    if trimmed.chars().count() > max {
        errors.add(field, too_long(max));
        return None;
    }
    Some(trimmed.to_string())
}

/// Every doctor, ordered by name. Open to any authenticated actor.
pub fn list_doctors(conn: &Connection) -> Result<Vec<DoctorListing>, TelemedError> {
    let doctors = query_doctors(conn)?;
    Ok(doctors
        .into_iter()
        .map(|(user, details)| DoctorListing {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            specialization: details.specialization,
            years_of_experience: details.years_of_experience,
        })
        .collect())
}

/// Distinct patients with at least one appointment with the calling doctor.
pub fn list_patients(conn: &Connection, actor: &Actor) -> Result<Vec<PatientListing>, TelemedError> {
    if !is_doctor(actor) {
        return Err(TelemedError::PermissionDenied(
            "Only doctors can list their patients".into(),
        ));
    }
    let rows = list_patients_of_doctor(conn, &actor.user_id)?;
    Ok(rows
        .into_iter()
        .map(|row| PatientListing {
            id: row.user.id,
            username: row.user.username,
            first_name: row.user.first_name,
            last_name: row.user.last_name,
            email: row.user.email,
            phone_number: row.phone_number,
            date_of_birth: row.date_of_birth,
        })
        .collect())
}
