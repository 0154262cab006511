//! Account registration: one user, one profile, one role-specific
//! details row, created together or not at all.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::hash_password;
use crate::db::repository::{insert_profile, insert_user, license_number_exists, username_exists};
use crate::db::DatabaseError;
use crate::error::{FieldErrors, TelemedError};
use crate::models::{DoctorDetails, PatientDetails, Profile, ProfileDetails, Role, User};
use crate::validation::{
    is_valid_email, is_valid_username, optional_text, past_date, required_text, too_long,
    INVALID_EMAIL, REQUIRED,
};

pub const USERNAME_MAX: usize = 150;
pub const USERNAME_MIN: usize = 3;
pub const NAME_MAX: usize = 150;
pub const PASSWORD_MIN: usize = 8;
pub const PHONE_MAX: usize = 20;
pub const SPECIALIZATION_MAX: usize = 100;
pub const LICENSE_MAX: usize = 50;
pub const CONTACT_NAME_MAX: usize = 100;
pub const RELATIONSHIP_MAX: usize = 50;

/// Registration form. Every field is optional at the type level so a
/// missing field is reported as a field error rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
    pub role: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    // Doctor
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub years_of_experience: Option<i64>,
    // Patient
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    /// Accepted for compatibility; not stored.
    pub emergency_contact_relationship: Option<String>,
}

/// Identity returned after a successful registration. No token:
/// logging in is a separate step.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// Validate everything, then create user + profile + details in one
/// transaction, all on one connection.
///
/// Callers sharing a locked connection should drive the three steps
/// themselves so the password is hashed with the lock released:
/// [`validate`], [`PendingRegistration::hash_password`],
/// [`HashedRegistration::persist`].
pub fn register(
    conn: &mut Connection,
    req: &RegistrationRequest,
    password_iterations: u32,
) -> Result<RegisteredUser, TelemedError> {
    validate(conn, req)?
        .hash_password(password_iterations)
        .persist(conn)
}

/// A request that passed validation; the password is still plaintext.
#[derive(Debug)]
pub struct PendingRegistration {
    user: User,
    profile: Profile,
    password: String,
}

/// Ready to write: the user carries its password hash.
#[derive(Debug)]
pub struct HashedRegistration {
    user: User,
    profile: Profile,
}

impl PendingRegistration {
    /// PBKDF2 over the accepted password. Needs no connection.
    pub fn hash_password(self, iterations: u32) -> HashedRegistration {
        let user = User {
            password_hash: hash_password(&self.password, iterations),
            ..self.user
        };
        HashedRegistration {
            user,
            profile: self.profile,
        }
    }
}

impl HashedRegistration {
    /// Write user, profile and details in one transaction.
    pub fn persist(self, conn: &mut Connection) -> Result<RegisteredUser, TelemedError> {
        let Self { user, profile } = self;

        write_rows(conn, &user, &profile).map_err(|e| match e {
            // Lost a uniqueness race against a concurrent registration.
            DatabaseError::ConstraintViolation(msg) if msg.contains("license_number") => {
                TelemedError::validation("license_number", LICENSE_TAKEN)
            }
            DatabaseError::ConstraintViolation(msg) if msg.contains("username") => {
                TelemedError::validation("username", USERNAME_TAKEN)
            }
            other => TelemedError::Database(other),
        })?;

        tracing::info!(user_id = %user.id, role = %profile.role(), "User registered");

        Ok(RegisteredUser {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: profile.role(),
        })
    }
}

const USERNAME_TAKEN: &str = "A user with that username already exists.";
const LICENSE_TAKEN: &str = "A doctor with this license number already exists.";

fn write_rows(conn: &mut Connection, user: &User, profile: &Profile) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    insert_user(&tx, user)?;
    insert_profile(&tx, profile)?;
    tx.commit()?;
    Ok(())
}

/// Every rule is checked and every failing field reported before
/// anything is written.
pub fn validate(
    conn: &Connection,
    req: &RegistrationRequest,
) -> Result<PendingRegistration, TelemedError> {
    let mut errors = FieldErrors::new();

    let username = required_text(&mut errors, "username", req.username.as_deref(), USERNAME_MAX);
    if let Some(name) = &username {
        if name.chars().count() < USERNAME_MIN {
            errors.add("username", format!("Ensure this field has at least {USERNAME_MIN} characters."));
        } else if !is_valid_username(name) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if username_exists(conn, name)? {
            errors.add("username", USERNAME_TAKEN);
        }
    }

    // Passwords are not trimmed.
    let password = match req.password.as_deref() {
        None | Some("") => {
            errors.add("password", REQUIRED);
            None
        }
        Some(pw) if pw.chars().count() < PASSWORD_MIN => {
            errors.add(
                "password",
                format!("This password is too short. It must contain at least {PASSWORD_MIN} characters."),
            );
            None
        }
        Some(pw) => Some(pw.to_string()),
    };
    if let Some(pw) = &password {
        if req.password2.as_deref() != Some(pw.as_str()) {
            errors.add("password", "Password fields didn't match.");
        }
    }

    let role = match req.role.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("role", REQUIRED);
            None
        }
        Some(raw) => match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                errors.add("role", format!("\"{raw}\" is not a valid choice."));
                None
            }
        },
    };

    let first_name = required_text(&mut errors, "first_name", req.first_name.as_deref(), NAME_MAX);
    let last_name = required_text(&mut errors, "last_name", req.last_name.as_deref(), NAME_MAX);

    let email = required_text(&mut errors, "email", req.email.as_deref(), 254);
    if let Some(e) = &email {
        if !is_valid_email(e) {
            errors.add("email", INVALID_EMAIL);
        }
    }

    let phone_number =
        required_text(&mut errors, "phone_number", req.phone_number.as_deref(), PHONE_MAX);
    let address = required_text(&mut errors, "address", req.address.as_deref(), usize::MAX);
    let date_of_birth = match req.date_of_birth.as_deref() {
        Some(raw) if !raw.trim().is_empty() => past_date(&mut errors, "date_of_birth", raw),
        _ => {
            errors.add("date_of_birth", REQUIRED);
            None
        }
    };

    let details = match role {
        Some(Role::Doctor) => doctor_details(conn, &mut errors, req)?,
        Some(Role::Patient) => patient_details(&mut errors, req),
        None => None,
    };

    errors.into_result()?;

    // All `Some` once no error was recorded.
    match (username, password, first_name, last_name, email, details) {
        (
            Some(username),
            Some(password),
            Some(first_name),
            Some(last_name),
            Some(email),
            Some(details),
        ) => {
            let user = User {
                id: Uuid::new_v4(),
                username,
                email,
                first_name,
                last_name,
                password_hash: String::new(),
                date_joined: Utc::now(),
            };
            let profile = Profile {
                id: Uuid::new_v4(),
                user_id: user.id,
                phone_number,
                address,
                date_of_birth,
                details,
            };
            Ok(PendingRegistration {
                user,
                profile,
                password,
            })
        }
        _ => Err(TelemedError::validation("non_field_errors", "Invalid registration data.")),
    }
}

fn doctor_details(
    conn: &Connection,
    errors: &mut FieldErrors,
    req: &RegistrationRequest,
) -> Result<Option<ProfileDetails>, TelemedError> {
    let specialization = match req.specialization.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("specialization", "Specialization is required for doctors.");
            None
        }
        Some(s) if s.chars().count() > SPECIALIZATION_MAX => {
            errors.add("specialization", too_long(SPECIALIZATION_MAX));
            None
        }
        Some(s) => Some(s.to_string()),
    };

    let license_number = match req.license_number.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("license_number", "License number is required for doctors.");
            None
        }
        Some(s) if s.chars().count() > LICENSE_MAX => {
            errors.add("license_number", too_long(LICENSE_MAX));
            None
        }
        Some(s) if license_number_exists(conn, s)? => {
            errors.add("license_number", LICENSE_TAKEN);
            None
        }
        Some(s) => Some(s.to_string()),
    };

    let years_of_experience = match req.years_of_experience {
        None => Some(0),
        Some(y) => match u32::try_from(y) {
            Ok(y) => Some(y),
            Err(_) => {
                errors.add(
                    "years_of_experience",
                    "Ensure this value is greater than or equal to 0.",
                );
                None
            }
        },
    };

    Ok(match (specialization, license_number, years_of_experience) {
        (Some(specialization), Some(license_number), Some(years_of_experience)) => {
            Some(ProfileDetails::Doctor(DoctorDetails {
                specialization,
                years_of_experience,
                license_number,
            }))
        }
        _ => None,
    })
}

fn patient_details(errors: &mut FieldErrors, req: &RegistrationRequest) -> Option<ProfileDetails> {
    let before = errors.clone();
    let emergency_contact_name = optional_text(
        errors,
        "emergency_contact_name",
        req.emergency_contact_name.as_deref(),
        CONTACT_NAME_MAX,
    );
    let emergency_contact_phone = optional_text(
        errors,
        "emergency_contact_phone",
        req.emergency_contact_phone.as_deref(),
        PHONE_MAX,
    );
    optional_text(
        errors,
        "emergency_contact_relationship",
        req.emergency_contact_relationship.as_deref(),
        RELATIONSHIP_MAX,
    );
    if *errors != before {
        return None;
    }
    Some(ProfileDetails::Patient(PatientDetails {
        emergency_contact_name,
        emergency_contact_phone,
    }))
}
