use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point-in-time vitals entry owned by one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub record_time: DateTime<Utc>,
    pub blood_pressure_systolic: Option<u32>,
    pub blood_pressure_diastolic: Option<u32>,
    /// Beats per minute.
    pub heart_rate: Option<u32>,
    pub glucose_level: Option<f64>,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
}
