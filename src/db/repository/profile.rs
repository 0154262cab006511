use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::user::row_to_user;
use super::{date_column, enum_column, expect_affected, uuid_column};
use crate::db::DatabaseError;
use crate::models::{
    DoctorDetails, PatientDetails, Profile, ProfileDetails, Role, User,
};

/// Insert a profile together with its role-specific details row.
///
/// Two statements: run inside a transaction when atomicity matters.
pub fn insert_profile(conn: &Connection, profile: &Profile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO profiles (id, user_id, role, phone_number, address, date_of_birth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            profile.id.to_string(),
            profile.user_id.to_string(),
            profile.role().as_str(),
            profile.phone_number,
            profile.address,
            profile.date_of_birth.map(|d| d.to_string()),
        ],
    )
    .map_err(DatabaseError::from_write)?;

    match &profile.details {
        ProfileDetails::Doctor(doctor) => {
            conn.execute(
                "INSERT INTO doctor_details (profile_id, specialization, license_number, years_of_experience)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    profile.id.to_string(),
                    doctor.specialization,
                    doctor.license_number,
                    doctor.years_of_experience,
                ],
            )
            .map_err(DatabaseError::from_write)?;
        }
        ProfileDetails::Patient(patient) => {
            conn.execute(
                "INSERT INTO patient_details (profile_id, emergency_contact_name, emergency_contact_phone)
                 VALUES (?1, ?2, ?3)",
                params![
                    profile.id.to_string(),
                    patient.emergency_contact_name,
                    patient.emergency_contact_phone,
                ],
            )
            .map_err(DatabaseError::from_write)?;
        }
    }
    Ok(())
}

/// Load the profile of a user, joined with the details row its role requires.
pub fn get_profile_by_user(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<Profile>, DatabaseError> {
    let base = conn
        .query_row(
            "SELECT id, user_id, role, phone_number, address, date_of_birth
             FROM profiles WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok((
                    uuid_column(row, 0)?,
                    uuid_column(row, 1)?,
                    enum_column::<Role>(row, 2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    date_column(row, 5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, user_id, role, phone_number, address, date_of_birth)) = base else {
        return Ok(None);
    };

    let details = match role {
        Role::Doctor => ProfileDetails::Doctor(get_doctor_details(conn, &id)?),
        Role::Patient => ProfileDetails::Patient(get_patient_details(conn, &id)?),
    };

    Ok(Some(Profile {
        id,
        user_id,
        phone_number,
        address,
        date_of_birth,
        details,
    }))
}

/// Role of a user, `None` when the user has no profile.
pub fn get_role(conn: &Connection, user_id: &Uuid) -> Result<Option<Role>, DatabaseError> {
    conn.query_row(
        "SELECT role FROM profiles WHERE user_id = ?1",
        params![user_id.to_string()],
        |row| enum_column::<Role>(row, 0),
    )
    .optional()
    .map_err(DatabaseError::from)
}

fn get_doctor_details(conn: &Connection, profile_id: &Uuid) -> Result<DoctorDetails, DatabaseError> {
    conn.query_row(
        "SELECT specialization, years_of_experience, license_number
         FROM doctor_details WHERE profile_id = ?1",
        params![profile_id.to_string()],
        |row| {
            Ok(DoctorDetails {
                specialization: row.get(0)?,
                years_of_experience: row.get(1)?,
                license_number: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "doctor_details".into(),
        id: profile_id.to_string(),
    })
}

fn get_patient_details(
    conn: &Connection,
    profile_id: &Uuid,
) -> Result<PatientDetails, DatabaseError> {
    conn.query_row(
        "SELECT emergency_contact_name, emergency_contact_phone
         FROM patient_details WHERE profile_id = ?1",
        params![profile_id.to_string()],
        |row| {
            Ok(PatientDetails {
                emergency_contact_name: row.get(0)?,
                emergency_contact_phone: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "patient_details".into(),
        id: profile_id.to_string(),
    })
}

/// Write back the contact fields and the details row of an existing profile.
/// The role column is never touched.
pub fn update_profile(conn: &Connection, profile: &Profile) -> Result<(), DatabaseError> {
    let affected = conn
        .execute(
            "UPDATE profiles SET phone_number = ?2, address = ?3, date_of_birth = ?4
             WHERE id = ?1",
            params![
                profile.id.to_string(),
                profile.phone_number,
                profile.address,
                profile.date_of_birth.map(|d| d.to_string()),
            ],
        )
        .map_err(DatabaseError::from_write)?;
    expect_affected(affected, "profile", &profile.id)?;

    let affected = match &profile.details {
        ProfileDetails::Doctor(doctor) => conn.execute(
            "UPDATE doctor_details SET specialization = ?2, years_of_experience = ?3
             WHERE profile_id = ?1",
            params![
                profile.id.to_string(),
                doctor.specialization,
                doctor.years_of_experience,
            ],
        ),
        ProfileDetails::Patient(patient) => conn.execute(
            "UPDATE patient_details SET emergency_contact_name = ?2, emergency_contact_phone = ?3
             WHERE profile_id = ?1",
            params![
                profile.id.to_string(),
                patient.emergency_contact_name,
                patient.emergency_contact_phone,
            ],
        ),
    }
    .map_err(DatabaseError::from_write)?;
    expect_affected(affected, "profile_details", &profile.id)
}

pub fn license_number_exists(conn: &Connection, license_number: &str) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM doctor_details WHERE license_number = ?1)",
        params![license_number],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn count_profiles(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
    Ok(count)
}

/// All doctors with their details, ordered by first then last name.
pub fn list_doctors(conn: &Connection) -> Result<Vec<(User, DoctorDetails)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash, u.date_joined,
                d.specialization, d.years_of_experience, d.license_number
         FROM users u
         JOIN profiles p ON p.user_id = u.id
         JOIN doctor_details d ON d.profile_id = p.id
         WHERE p.role = 'DOCTOR'
         ORDER BY u.first_name, u.last_name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row_to_user(row)?,
            DoctorDetails {
                specialization: row.get(7)?,
                years_of_experience: row.get(8)?,
                license_number: row.get(9)?,
            },
        ))
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// A patient as seen from a doctor's roster.
#[derive(Debug, Clone)]
pub struct PatientRow {
    pub user: User,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<chrono::NaiveDate>,
}

/// Distinct patients with at least one appointment (any status) with the
/// doctor, ordered by first then last name.
pub fn list_patients_of_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<PatientRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash, u.date_joined,
                p.phone_number, p.date_of_birth
         FROM users u
         JOIN profiles p ON p.user_id = u.id
         WHERE p.role = 'PATIENT'
           AND u.id IN (SELECT DISTINCT patient_id FROM appointments WHERE doctor_id = ?1)
         ORDER BY u.first_name, u.last_name",
    )?;
    let rows = stmt.query_map(params![doctor_id.to_string()], |row| {
        Ok(PatientRow {
            user: row_to_user(row)?,
            phone_number: row.get(7)?,
            date_of_birth: date_column(row, 8)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_user;
    use crate::db::sqlite::open_memory_database;
    use chrono::{NaiveDate, Utc};

    fn seed_user(conn: &Connection, username: &str, first: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.into(),
            email: format!("{username}@example.com"),
            first_name: first.into(),
            last_name: "Test".into(),
            password_hash: "hash".into(),
            date_joined: Utc::now(),
        };
        insert_user(conn, &user).unwrap();
        user
    }

    fn doctor_profile(user_id: Uuid, license: &str) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            user_id,
            phone_number: Some("555-0100".into()),
            address: Some("1 Clinic Way".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 1),
            details: ProfileDetails::Doctor(DoctorDetails {
                specialization: "Cardiology".into(),
                years_of_experience: 10,
                license_number: license.into(),
            }),
        }
    }

    #[test]
    fn profile_round_trip_with_details() {
        let conn = open_memory_database().unwrap();
        let user = seed_user(&conn, "bob", "Bob");
        let profile = doctor_profile(user.id, "LIC-1");
        insert_profile(&conn, &profile).unwrap();

        let loaded = get_profile_by_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(get_role(&conn, &user.id).unwrap(), Some(Role::Doctor));
    }

    #[test]
    fn missing_profile_is_none() {
        let conn = open_memory_database().unwrap();
        let user = seed_user(&conn, "ghost", "Ghost");
        assert!(get_profile_by_user(&conn, &user.id).unwrap().is_none());
        assert!(get_role(&conn, &user.id).unwrap().is_none());
    }

    #[test]
    fn license_numbers_are_unique() {
        let conn = open_memory_database().unwrap();
        let a = seed_user(&conn, "doc_a", "A");
        let b = seed_user(&conn, "doc_b", "B");
        insert_profile(&conn, &doctor_profile(a.id, "LIC-1")).unwrap();
        assert!(license_number_exists(&conn, "LIC-1").unwrap());

        let err = insert_profile(&conn, &doctor_profile(b.id, "LIC-1")).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn update_keeps_license_number() {
        let conn = open_memory_database().unwrap();
        let user = seed_user(&conn, "bob", "Bob");
        let mut profile = doctor_profile(user.id, "LIC-1");
        insert_profile(&conn, &profile).unwrap();

        profile.phone_number = None;
        if let ProfileDetails::Doctor(d) = &mut profile.details {
            d.specialization = "Neurology".into();
            d.license_number = "LIC-CHANGED".into();
        }
        update_profile(&conn, &profile).unwrap();

        let loaded = get_profile_by_user(&conn, &user.id).unwrap().unwrap();
        assert!(loaded.phone_number.is_none());
        match loaded.details {
            ProfileDetails::Doctor(d) => {
                assert_eq!(d.specialization, "Neurology");
                assert_eq!(d.license_number, "LIC-1");
            }
            other => panic!("expected doctor details, got {other:?}"),
        }
    }

    #[test]
    fn doctors_are_listed_by_name() {
        let conn = open_memory_database().unwrap();
        let zed = seed_user(&conn, "zed", "Zed");
        let amy = seed_user(&conn, "amy", "Amy");
        insert_profile(&conn, &doctor_profile(zed.id, "LIC-Z")).unwrap();
        insert_profile(&conn, &doctor_profile(amy.id, "LIC-A")).unwrap();

        let doctors = list_doctors(&conn).unwrap();
        let names: Vec<_> = doctors.iter().map(|(u, _)| u.first_name.as_str()).collect();
        assert_eq!(names, vec!["Amy", "Zed"]);
    }
}
