use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{enum_column, expect_affected, timestamp_column, uuid_column};
use crate::db::{format_timestamp, DatabaseError};
use crate::models::{Appointment, AppointmentStatus};

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, appointment_time, reason, status,
     consultation_notes, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, appointment_time, reason, status,
                                   consultation_notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.doctor_id.to_string(),
            format_timestamp(&appt.appointment_time),
            appt.reason,
            appt.status.as_str(),
            appt.consultation_notes,
            format_timestamp(&appt.created_at),
            format_timestamp(&appt.updated_at),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_appointment)
        .optional()
        .map_err(DatabaseError::from)
}

/// Appointments where the user is the patient, newest appointment_time first.
pub fn list_appointments_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE patient_id = ?1
         ORDER BY appointment_time DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_appointment)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Appointments where the user is the doctor, newest appointment_time first.
pub fn list_appointments_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE doctor_id = ?1
         ORDER BY appointment_time DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![doctor_id.to_string()], row_to_appointment)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Whether the doctor has ever had an appointment (any status) with the patient.
pub fn doctor_has_seen_patient(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM appointments WHERE doctor_id = ?1 AND patient_id = ?2)",
        params![doctor_id.to_string(), patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Compare-and-set status transition.
///
/// Writes `next` (and the notes, when given) only if the stored status is
/// still `expected`. Returns `false` when another writer got there first
/// or the appointment does not exist.
pub fn transition_appointment_status(
    conn: &Connection,
    id: &Uuid,
    expected: AppointmentStatus,
    next: AppointmentStatus,
    consultation_notes: Option<&str>,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments
         SET status = ?3,
             consultation_notes = COALESCE(?4, consultation_notes),
             updated_at = ?5
         WHERE id = ?1 AND status = ?2",
        params![
            id.to_string(),
            expected.as_str(),
            next.as_str(),
            consultation_notes,
            format_timestamp(now),
        ],
    )?;
    Ok(affected == 1)
}

/// Reschedule/re-describe a still-scheduled appointment. Same
/// compare-and-set guard as status transitions.
pub fn update_appointment_details(
    conn: &Connection,
    id: &Uuid,
    appointment_time: &DateTime<Utc>,
    reason: Option<&str>,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE appointments
         SET appointment_time = ?2, reason = ?3, updated_at = ?4
         WHERE id = ?1 AND status = 'SCHEDULED'",
        params![
            id.to_string(),
            format_timestamp(appointment_time),
            reason,
            format_timestamp(now),
        ],
    )?;
    Ok(affected == 1)
}

pub fn delete_appointment(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM appointments WHERE id = ?1",
        params![id.to_string()],
    )?;
    expect_affected(affected, "appointment", id)
}

fn row_to_appointment(row: &rusqlite::Row) -> Result<Appointment, rusqlite::Error> {
    Ok(Appointment {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        doctor_id: uuid_column(row, 2)?,
        appointment_time: timestamp_column(row, 3)?,
        reason: row.get(4)?,
        status: enum_column::<AppointmentStatus>(row, 5)?,
        consultation_notes: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}
