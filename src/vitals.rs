//! Vitals (health record) manager.
//!
//! Records are written only by the owning patient. Doctors read the
//! records of any patient they have had an appointment with.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{
    can_read_health_record, can_write_health_record, is_doctor, is_patient, Actor,
};
use crate::db::repository::{
    delete_health_record, get_health_record, insert_health_record, list_health_records_for_doctor,
    list_health_records_for_patient, update_health_record, HealthRecordRow,
};
use crate::error::{FieldErrors, TelemedError};
use crate::models::HealthRecord;
use crate::validation::{datetime, deserialize_some};

/// Upper bound (exclusive) for glucose and temperature readings.
const MEASUREMENT_MAX: f64 = 1000.0;

/// Body for create, PUT and PATCH. Absent fields are left alone,
/// `null` clears. `patient`/`patient_id` keys are not fields here, so
/// serde drops them and ownership always comes from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VitalsInput {
    pub record_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub blood_pressure_systolic: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub blood_pressure_diastolic: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub heart_rate: Option<Option<i64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub glucose_level: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub temperature: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VitalsView {
    pub id: Uuid,
    pub patient: Uuid,
    pub patient_username: String,
    pub record_time: DateTime<Utc>,
    pub blood_pressure_systolic: Option<u32>,
    pub blood_pressure_diastolic: Option<u32>,
    pub heart_rate: Option<u32>,
    pub glucose_level: Option<f64>,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
}

impl From<HealthRecordRow> for VitalsView {
    fn from(row: HealthRecordRow) -> Self {
        let HealthRecordRow { record, patient_username } = row;
        Self {
            id: record.id,
            patient: record.patient_id,
            patient_username,
            record_time: record.record_time,
            blood_pressure_systolic: record.blood_pressure_systolic,
            blood_pressure_diastolic: record.blood_pressure_diastolic,
            heart_rate: record.heart_rate,
            glucose_level: record.glucose_level,
            temperature: record.temperature,
            notes: record.notes,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Field cleaning
// ═══════════════════════════════════════════════════════════

fn count(errors: &mut FieldErrors, field: &str, value: i64) -> Option<u32> {
    match u32::try_from(value) {
        Ok(v) => Some(v),
        Err(_) if value < 0 => {
            errors.add(field, "Ensure this value is greater than or equal to 0.");
            None
        }
        Err(_) => {
            errors.add(field, format!("Ensure this value is less than or equal to {}.", u32::MAX));
            None
        }
    }
}

/// Non-negative, below `MEASUREMENT_MAX`, rounded to `decimals` places.
fn measurement(errors: &mut FieldErrors, field: &str, value: f64, decimals: i32) -> Option<f64> {
    if !value.is_finite() || value < 0.0 {
        errors.add(field, "Ensure this value is greater than or equal to 0.");
        return None;
    }
    let scale = 10f64.powi(decimals);
    let rounded = (value * scale).round() / scale;
    if rounded >= MEASUREMENT_MAX {
        errors.add(field, format!("Ensure this value is less than {MEASUREMENT_MAX}."));
        return None;
    }
    Some(rounded)
}

/// Apply `input` on top of `record`, collecting every field error.
fn apply(record: &mut HealthRecord, input: &VitalsInput) -> Result<(), TelemedError> {
    let mut errors = FieldErrors::new();

    if let Some(raw) = input.record_time.as_deref() {
        if let Some(ts) = datetime(&mut errors, "record_time", raw) {
            record.record_time = ts;
        }
    }

    let counts = [
        ("blood_pressure_systolic", input.blood_pressure_systolic, &mut record.blood_pressure_systolic),
        ("blood_pressure_diastolic", input.blood_pressure_diastolic, &mut record.blood_pressure_diastolic),
        ("heart_rate", input.heart_rate, &mut record.heart_rate),
    ];
    for (field, patch, slot) in counts {
        match patch {
            None => {}
            Some(None) => *slot = None,
            Some(Some(v)) => {
                if let Some(v) = count(&mut errors, field, v) {
                    *slot = Some(v);
                }
            }
        }
    }

    let measurements = [
        ("glucose_level", input.glucose_level, 2, &mut record.glucose_level),
        ("temperature", input.temperature, 1, &mut record.temperature),
    ];
    for (field, patch, decimals, slot) in measurements {
        match patch {
            None => {}
            Some(None) => *slot = None,
            Some(Some(v)) => {
                if let Some(v) = measurement(&mut errors, field, v, decimals) {
                    *slot = Some(v);
                }
            }
        }
    }

    if let Some(notes) = &input.notes {
        record.notes = notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
    }

    errors.into_result()
}

// ═══════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════

/// Record vitals for the calling patient.
pub fn create(
    conn: &Connection,
    actor: &Actor,
    input: &VitalsInput,
) -> Result<VitalsView, TelemedError> {
    if !is_patient(actor) {
        tracing::warn!(user_id = %actor.user_id, "Non-patient tried to submit a health record");
        return Err(TelemedError::PermissionDenied(
            "Only patients can submit health records.".into(),
        ));
    }

    let mut record = HealthRecord {
        id: Uuid::new_v4(),
        patient_id: actor.user_id,
        record_time: Utc::now(),
        blood_pressure_systolic: None,
        blood_pressure_diastolic: None,
        heart_rate: None,
        glucose_level: None,
        temperature: None,
        notes: None,
    };
    apply(&mut record, input)?;
    insert_health_record(conn, &record)?;
    tracing::info!(record_id = %record.id, patient = %actor.user_id, "Health record created");

    fetch(conn, &record.id)
}

/// Patients see their own records; doctors see those of patients they
/// have had an appointment with.
pub fn list(conn: &Connection, actor: &Actor) -> Result<Vec<VitalsView>, TelemedError> {
    let rows = if is_patient(actor) {
        list_health_records_for_patient(conn, &actor.user_id)?
    } else if is_doctor(actor) {
        list_health_records_for_doctor(conn, &actor.user_id)?
    } else {
        Vec::new()
    };
    tracing::debug!(user_id = %actor.user_id, count = rows.len(), "Listed health records");
    Ok(rows.into_iter().map(VitalsView::from).collect())
}

pub fn get(conn: &Connection, actor: &Actor, id: &Uuid) -> Result<VitalsView, TelemedError> {
    let row = load(conn, id)?;
    if !can_read_health_record(conn, actor, &row.record)? {
        tracing::warn!(user_id = %actor.user_id, record_id = %id, "Health record read denied");
        return Err(TelemedError::PermissionDenied(
            "You do not have permission to view this health record.".into(),
        ));
    }
    Ok(row.into())
}

pub fn update(
    conn: &Connection,
    actor: &Actor,
    id: &Uuid,
    input: &VitalsInput,
) -> Result<VitalsView, TelemedError> {
    let HealthRecordRow { mut record, .. } = load_writable(conn, actor, id)?;
    apply(&mut record, input)?;
    update_health_record(conn, &record)?;
    tracing::info!(record_id = %id, "Health record updated");
    fetch(conn, id)
}

pub fn delete(conn: &Connection, actor: &Actor, id: &Uuid) -> Result<(), TelemedError> {
    load_writable(conn, actor, id)?;
    delete_health_record(conn, id)?;
    tracing::info!(record_id = %id, "Health record deleted");
    Ok(())
}

fn load(conn: &Connection, id: &Uuid) -> Result<HealthRecordRow, TelemedError> {
    get_health_record(conn, id)?.ok_or_else(|| TelemedError::NotFound("Health record".into()))
}

fn load_writable(conn: &Connection, actor: &Actor, id: &Uuid) -> Result<HealthRecordRow, TelemedError> {
    let row = load(conn, id)?;
    if !can_write_health_record(actor, &row.record) {
        tracing::warn!(user_id = %actor.user_id, record_id = %id, "Health record write denied");
        return Err(TelemedError::PermissionDenied(
            "Only the owning patient can modify this health record.".into(),
        ));
    }
    Ok(row)
}

fn fetch(conn: &Connection, id: &Uuid) -> Result<VitalsView, TelemedError> {
    load(conn, id).map(VitalsView::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::{self, NewAppointment};
    use crate::db::sqlite::open_memory_database;
    use crate::models::Role;
    use crate::registration::{register, RegistrationRequest};
    use chrono::Duration;

    fn register_actor(conn: &mut Connection, username: &str, role: Role) -> Actor {
        let mut req = RegistrationRequest {
            username: Some(username.into()),
            email: Some(format!("{username}@example.com")),
            first_name: Some(username.into()),
            last_name: Some("Test".into()),
            password: Some("password-123".into()),
            password2: Some("password-123".into()),
            role: Some(role.as_str().into()),
            phone_number: Some("555-0100".into()),
            address: Some("1 Main St".into()),
            date_of_birth: Some("1990-01-01".into()),
            ..Default::default()
        };
        if role == Role::Doctor {
            req.specialization = Some("Cardiology".into());
            req.license_number = Some(format!("LIC-{username}"));
        }
        let out = register(conn, &req, 1_000).unwrap();
        Actor::new(out.id, Some(role))
    }

    fn input(json: &str) -> VitalsInput {
        serde_json::from_str(json).unwrap()
    }

    fn book(conn: &Connection, patient: &Actor, doctor: &Actor) -> Uuid {
        let req = NewAppointment {
            doctor_id: Some(doctor.user_id.to_string()),
            appointment_time: Some((Utc::now() + Duration::days(1)).to_rfc3339()),
            reason: None,
            patient_id: None,
        };
        appointment::create(conn, patient, &req).unwrap().id
    }

    #[test]
    fn doctor_without_appointment_sees_nothing() {
        let mut conn = open_memory_database().unwrap();
        let alice = register_actor(&mut conn, "alice", Role::Patient);
        let bob = register_actor(&mut conn, "bob", Role::Doctor);

        let rec = create(&conn, &alice, &input(r#"{"heart_rate": 72}"#)).unwrap();
        assert_eq!(rec.heart_rate, Some(72));
        assert_eq!(rec.patient_username, "alice");

        assert!(list(&conn, &bob).unwrap().is_empty());
        assert!(matches!(
            get(&conn, &bob, &rec.id),
            Err(TelemedError::PermissionDenied(_))
        ));

        // Any appointment, even a cancelled one, opens read access.
        let appt = book(&conn, &alice, &bob);
        appointment::cancel(&conn, &alice, &appt).unwrap();
        let seen = list(&conn, &bob).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(get(&conn, &bob, &rec.id).unwrap().id, rec.id);
    }

    #[test]
    fn patient_field_cannot_be_spoofed() {
        let mut conn = open_memory_database().unwrap();
        let alice = register_actor(&mut conn, "alice", Role::Patient);
        let carol = register_actor(&mut conn, "carol", Role::Patient);

        let body = format!(
            r#"{{"patient": "{0}", "patient_id": "{0}", "temperature": 36.64}}"#,
            carol.user_id
        );
        let rec = create(&conn, &alice, &input(&body)).unwrap();
        assert_eq!(rec.patient, alice.user_id);
        assert_eq!(rec.temperature, Some(36.6));
        assert!(list(&conn, &carol).unwrap().is_empty());
    }

    #[test]
    fn doctors_cannot_create_or_write() {
        let mut conn = open_memory_database().unwrap();
        let alice = register_actor(&mut conn, "alice", Role::Patient);
        let bob = register_actor(&mut conn, "bob", Role::Doctor);
        book(&conn, &alice, &bob);

        assert!(matches!(
            create(&conn, &bob, &input("{}")),
            Err(TelemedError::PermissionDenied(_))
        ));
        let rec = create(&conn, &alice, &input(r#"{"heart_rate": 60}"#)).unwrap();
        assert!(matches!(
            update(&conn, &bob, &rec.id, &input(r#"{"heart_rate": 61}"#)),
            Err(TelemedError::PermissionDenied(_))
        ));
        assert!(matches!(
            delete(&conn, &bob, &rec.id),
            Err(TelemedError::PermissionDenied(_))
        ));
    }

    #[test]
    fn invalid_measurements_are_all_reported() {
        let mut conn = open_memory_database().unwrap();
        let alice = register_actor(&mut conn, "alice", Role::Patient);
        let result = create(
            &conn,
            &alice,
            &input(r#"{"heart_rate": -1, "glucose_level": 1000, "temperature": -0.5, "record_time": "yesterday"}"#),
        );
        match result {
            Err(TelemedError::Validation(f)) => {
                for field in ["heart_rate", "glucose_level", "temperature", "record_time"] {
                    assert!(f.contains(field), "missing error for {field}");
                }
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(list(&conn, &alice).unwrap().is_empty());
    }

    #[test]
    fn patch_keeps_absent_and_clears_null() {
        let mut conn = open_memory_database().unwrap();
        let alice = register_actor(&mut conn, "alice", Role::Patient);
        let rec = create(
            &conn,
            &alice,
            &input(r#"{"heart_rate": 72, "glucose_level": 5.456, "notes": "after run"}"#),
        )
        .unwrap();
        assert_eq!(rec.glucose_level, Some(5.46));

        let updated = update(&conn, &alice, &rec.id, &input(r#"{"notes": null, "heart_rate": 80}"#)).unwrap();
        assert_eq!(updated.heart_rate, Some(80));
        assert_eq!(updated.glucose_level, Some(5.46));
        assert!(updated.notes.is_none());
        assert_eq!(updated.record_time, rec.record_time);
    }

    #[test]
    fn list_is_newest_first_and_delete_removes() {
        let mut conn = open_memory_database().unwrap();
        let alice = register_actor(&mut conn, "alice", Role::Patient);
        let old = create(&conn, &alice, &input(r#"{"record_time": "2024-01-01T08:00:00Z"}"#)).unwrap();
        let new = create(&conn, &alice, &input(r#"{"record_time": "2024-03-01T08:00:00Z"}"#)).unwrap();

        let ids: Vec<_> = list(&conn, &alice).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);

        delete(&conn, &alice, &old.id).unwrap();
        assert!(matches!(get(&conn, &alice, &old.id), Err(TelemedError::NotFound(_))));
    }
}
