use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{expect_affected, timestamp_column, uuid_column};
use crate::db::{format_timestamp, DatabaseError};
use crate::models::HealthRecord;

/// A health record joined with its owner's username.
#[derive(Debug, Clone)]
pub struct HealthRecordRow {
    pub record: HealthRecord,
    pub patient_username: String,
}

const RECORD_SELECT: &str = "SELECT h.id, h.patient_id, h.record_time, h.blood_pressure_systolic,
            h.blood_pressure_diastolic, h.heart_rate, h.glucose_level, h.temperature, h.notes,
            u.username
     FROM health_records h
     JOIN users u ON u.id = h.patient_id";

/// Insert a health record.
pub fn insert_health_record(conn: &Connection, hr: &HealthRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO health_records (id, patient_id, record_time, blood_pressure_systolic,
                                     blood_pressure_diastolic, heart_rate, glucose_level,
                                     temperature, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            hr.id.to_string(),
            hr.patient_id.to_string(),
            format_timestamp(&hr.record_time),
            hr.blood_pressure_systolic,
            hr.blood_pressure_diastolic,
            hr.heart_rate,
            hr.glucose_level,
            hr.temperature,
            hr.notes,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_health_record(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<HealthRecordRow>, DatabaseError> {
    let sql = format!("{RECORD_SELECT} WHERE h.id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_health_record)
        .optional()
        .map_err(DatabaseError::from)
}

/// A patient's own records, newest first.
pub fn list_health_records_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<HealthRecordRow>, DatabaseError> {
    let sql = format!(
        "{RECORD_SELECT}
         WHERE h.patient_id = ?1
         ORDER BY h.record_time DESC, h.rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_health_record)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Records of every patient the doctor has an appointment with (any status),
/// grouped by patient username, newest first within a patient.
pub fn list_health_records_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<HealthRecordRow>, DatabaseError> {
    let sql = format!(
        "{RECORD_SELECT}
         WHERE h.patient_id IN (SELECT DISTINCT patient_id FROM appointments WHERE doctor_id = ?1)
         ORDER BY u.username ASC, h.record_time DESC, h.rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![doctor_id.to_string()], row_to_health_record)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Overwrite the measurement fields. Ownership is not updatable.
pub fn update_health_record(conn: &Connection, hr: &HealthRecord) -> Result<(), DatabaseError> {
    let affected = conn
        .execute(
            "UPDATE health_records
             SET record_time = ?2, blood_pressure_systolic = ?3, blood_pressure_diastolic = ?4,
                 heart_rate = ?5, glucose_level = ?6, temperature = ?7, notes = ?8
             WHERE id = ?1",
            params![
                hr.id.to_string(),
                format_timestamp(&hr.record_time),
                hr.blood_pressure_systolic,
                hr.blood_pressure_diastolic,
                hr.heart_rate,
                hr.glucose_level,
                hr.temperature,
                hr.notes,
            ],
        )
        .map_err(DatabaseError::from_write)?;
    expect_affected(affected, "health_record", &hr.id)
}

/// Delete a health record by ID.
pub fn delete_health_record(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM health_records WHERE id = ?1",
        params![id.to_string()],
    )?;
    expect_affected(affected, "health_record", id)
}

fn row_to_health_record(row: &rusqlite::Row) -> Result<HealthRecordRow, rusqlite::Error> {
    Ok(HealthRecordRow {
        record: HealthRecord {
            id: uuid_column(row, 0)?,
            patient_id: uuid_column(row, 1)?,
            record_time: timestamp_column(row, 2)?,
            blood_pressure_systolic: row.get(3)?,
            blood_pressure_diastolic: row.get(4)?,
            heart_rate: row.get(5)?,
            glucose_level: row.get(6)?,
            temperature: row.get(7)?,
            notes: row.get(8)?,
        },
        patient_username: row.get(9)?,
    })
}
