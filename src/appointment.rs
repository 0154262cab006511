//! Appointment lifecycle manager.
//!
//! State machine: SCHEDULED → COMPLETED | CANCELLED, both terminal.
//! Every transition is written as a compare-and-set on the SCHEDULED
//! status, so of two racing `complete`/`cancel` calls exactly one wins
//! and the other sees `InvalidState`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authorization::{can_act_on_appointment, is_doctor, is_patient, Actor};
use crate::db::repository::{
    delete_appointment, get_appointment, get_role, get_user, insert_appointment,
    list_appointments_for_doctor, list_appointments_for_patient, transition_appointment_status,
    update_appointment_details,
};
use crate::error::{FieldErrors, TelemedError};
use crate::models::{Appointment, AppointmentStatus, Role, User, UserSummary};
use crate::validation::{datetime, deserialize_some, REQUIRED};

const NOT_FUTURE: &str = "Appointment time must be in the future.";

// ═══════════════════════════════════════════════════════════
// Input
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAppointment {
    pub doctor_id: Option<String>,
    pub appointment_time: Option<String>,
    pub reason: Option<String>,
    /// Optional; when present it must name the caller.
    pub patient_id: Option<String>,
}

/// Only time and reason are editable. Status, notes and participants
/// are ignored if sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentPatch {
    pub appointment_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub reason: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteAppointment {
    pub consultation_notes: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Views
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppointmentListItem {
    pub id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub appointment_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub status_display: &'static str,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppointmentView {
    pub id: Uuid,
    pub patient: UserSummary,
    pub doctor: UserSummary,
    pub appointment_time: DateTime<Utc>,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub status_display: &'static str,
    pub consultation_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn participant(conn: &Connection, id: &Uuid) -> Result<User, TelemedError> {
    get_user(conn, id)?.ok_or_else(|| TelemedError::NotFound("User".into()))
}

fn view(conn: &Connection, appt: Appointment) -> Result<AppointmentView, TelemedError> {
    let patient = participant(conn, &appt.patient_id)?;
    let doctor = participant(conn, &appt.doctor_id)?;
    Ok(AppointmentView {
        id: appt.id,
        patient: patient.summary(),
        doctor: doctor.summary(),
        appointment_time: appt.appointment_time,
        reason: appt.reason,
        status: appt.status,
        status_display: appt.status.label(),
        consultation_notes: appt.consultation_notes,
        created_at: appt.created_at,
        updated_at: appt.updated_at,
    })
}

// ═══════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════

/// Book an appointment. Only patients book, and only for themselves.
pub fn create(
    conn: &Connection,
    actor: &Actor,
    input: &NewAppointment,
) -> Result<AppointmentView, TelemedError> {
    let mut errors = FieldErrors::new();
    let now = Utc::now();

    let appointment_time = match input.appointment_time.as_deref() {
        None => {
            errors.add("appointment_time", REQUIRED);
            None
        }
        Some(raw) => datetime(&mut errors, "appointment_time", raw),
    };
    if let Some(ts) = appointment_time {
        if ts <= now {
            errors.add("appointment_time", NOT_FUTURE);
        }
    }

    let doctor_id = match input.doctor_id.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("doctor_id", REQUIRED);
            None
        }
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add("doctor_id", "Must be a valid UUID.");
                None
            }
        },
    };
    errors.into_result()?;

    if !is_patient(actor) {
        tracing::warn!(user_id = %actor.user_id, "Non-patient tried to book an appointment");
        return Err(TelemedError::PermissionDenied(
            "Only patients can book new appointments.".into(),
        ));
    }
    if let Some(raw) = input.patient_id.as_deref() {
        if Uuid::parse_str(raw.trim()).ok() != Some(actor.user_id) {
            return Err(TelemedError::PermissionDenied(
                "Patients can only book appointments for themselves.".into(),
            ));
        }
    }

    let (Some(appointment_time), Some(doctor_id)) = (appointment_time, doctor_id) else {
        return Err(TelemedError::validation("non_field_errors", "Invalid appointment data."));
    };
    if get_role(conn, &doctor_id)? != Some(Role::Doctor) {
        return Err(TelemedError::NotFound("Doctor".into()));
    }

    let appt = Appointment {
        id: Uuid::new_v4(),
        patient_id: actor.user_id,
        doctor_id,
        appointment_time,
        reason: input
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
        status: AppointmentStatus::Scheduled,
        consultation_notes: None,
        created_at: now,
        updated_at: now,
    };
    insert_appointment(conn, &appt)?;
    tracing::info!(appointment_id = %appt.id, patient = %appt.patient_id, doctor = %doctor_id, "Appointment booked");

    view(conn, appt)
}

/// The caller's appointments, newest appointment time first.
pub fn list(conn: &Connection, actor: &Actor) -> Result<Vec<AppointmentListItem>, TelemedError> {
    let appointments = if is_patient(actor) {
        list_appointments_for_patient(conn, &actor.user_id)?
    } else if is_doctor(actor) {
        list_appointments_for_doctor(conn, &actor.user_id)?
    } else {
        Vec::new()
    };

    let mut names: HashMap<Uuid, String> = HashMap::new();
    let mut name_of = |id: &Uuid| -> Result<String, TelemedError> {
        if let Some(name) = names.get(id) {
            return Ok(name.clone());
        }
        let name = participant(conn, id)?.full_name();
        names.insert(*id, name.clone());
        Ok(name)
    };

    appointments
        .into_iter()
        .map(|appt| {
            Ok(AppointmentListItem {
                id: appt.id,
                patient_name: name_of(&appt.patient_id)?,
                doctor_name: name_of(&appt.doctor_id)?,
                appointment_time: appt.appointment_time,
                status: appt.status,
                status_display: appt.status.label(),
                reason: appt.reason,
            })
        })
        .collect()
}

/// Load an appointment for an action. Missing → `NotFound`,
/// non-participant → `PermissionDenied`.
fn load_for_action(
    conn: &Connection,
    actor: &Actor,
    id: &Uuid,
    action: &str,
) -> Result<Appointment, TelemedError> {
    let appt = get_appointment(conn, id)?
        .ok_or_else(|| TelemedError::NotFound("Appointment".into()))?;
    if !can_act_on_appointment(actor, &appt) {
        tracing::warn!(user_id = %actor.user_id, appointment_id = %id, action, "Appointment action denied");
        return Err(TelemedError::PermissionDenied(format!(
            "Not authorized to {action} this appointment."
        )));
    }
    Ok(appt)
}

/// Detail view. Non-participants cannot see the appointment at all.
pub fn get(conn: &Connection, actor: &Actor, id: &Uuid) -> Result<AppointmentView, TelemedError> {
    let appt = get_appointment(conn, id)?
        .filter(|a| can_act_on_appointment(actor, a))
        .ok_or_else(|| TelemedError::NotFound("Appointment".into()))?;
    view(conn, appt)
}

/// Reschedule or re-describe a still-scheduled appointment.
pub fn update(
    conn: &Connection,
    actor: &Actor,
    id: &Uuid,
    patch: &AppointmentPatch,
) -> Result<AppointmentView, TelemedError> {
    let appt = load_for_action(conn, actor, id, "update")?;
    require_scheduled(&appt, "update")?;

    let mut errors = FieldErrors::new();
    let now = Utc::now();
    let mut appointment_time = appt.appointment_time;
    if let Some(raw) = patch.appointment_time.as_deref() {
        if let Some(ts) = datetime(&mut errors, "appointment_time", raw) {
            if ts <= now {
                errors.add("appointment_time", NOT_FUTURE);
            } else {
                appointment_time = ts;
            }
        }
    }
    errors.into_result()?;

    let reason = match &patch.reason {
        None => appt.reason.clone(),
        Some(value) => value
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    };

    if !update_appointment_details(conn, id, &appointment_time, reason.as_deref(), &now)? {
        return Err(TelemedError::InvalidState(
            "Appointment is no longer scheduled.".into(),
        ));
    }
    tracing::info!(appointment_id = %id, "Appointment updated");
    get(conn, actor, id)
}

/// Remove an appointment. Completed appointments carry consultation
/// notes and are kept.
pub fn delete(conn: &Connection, actor: &Actor, id: &Uuid) -> Result<(), TelemedError> {
    let appt = load_for_action(conn, actor, id, "delete")?;
    if appt.status == AppointmentStatus::Completed {
        return Err(TelemedError::InvalidState(
            "Completed appointments cannot be deleted.".into(),
        ));
    }
    delete_appointment(conn, id)?;
    tracing::info!(appointment_id = %id, "Appointment deleted");
    Ok(())
}

/// The assigned doctor closes the appointment with notes.
pub fn complete(
    conn: &Connection,
    actor: &Actor,
    id: &Uuid,
    notes: Option<&str>,
) -> Result<AppointmentView, TelemedError> {
    let appt = get_appointment(conn, id)?
        .ok_or_else(|| TelemedError::NotFound("Appointment".into()))?;
    if appt.doctor_id != actor.user_id || !is_doctor(actor) {
        tracing::warn!(user_id = %actor.user_id, appointment_id = %id, "Complete denied");
        return Err(TelemedError::PermissionDenied(
            "Not authorized to complete this appointment.".into(),
        ));
    }
    require_scheduled(&appt, "complete")?;

    let notes = notes.map(str::trim).filter(|n| !n.is_empty()).ok_or_else(|| {
        TelemedError::validation(
            "consultation_notes",
            "Consultation notes are required to complete the appointment.",
        )
    })?;

    transition(conn, &appt, AppointmentStatus::Completed, Some(notes))?;
    tracing::info!(appointment_id = %id, "Appointment completed");
    view_by_id(conn, id)
}

/// Either participant cancels a scheduled appointment. No restore path.
pub fn cancel(conn: &Connection, actor: &Actor, id: &Uuid) -> Result<AppointmentView, TelemedError> {
    let appt = load_for_action(conn, actor, id, "cancel")?;
    require_scheduled(&appt, "cancel")?;
    transition(conn, &appt, AppointmentStatus::Cancelled, None)?;
    tracing::info!(appointment_id = %id, by = %actor.user_id, "Appointment cancelled");
    view_by_id(conn, id)
}

fn require_scheduled(appt: &Appointment, action: &str) -> Result<(), TelemedError> {
    if appt.status != AppointmentStatus::Scheduled {
        return Err(TelemedError::InvalidState(format!(
            "Cannot {action} an appointment with status \"{}\".",
            appt.status.label()
        )));
    }
    Ok(())
}

fn transition(
    conn: &Connection,
    appt: &Appointment,
    next: AppointmentStatus,
    notes: Option<&str>,
) -> Result<(), TelemedError> {
    if !appt.status.can_transition_to(next) {
        return Err(TelemedError::InvalidState(format!(
            "Cannot move from {} to {}.",
            appt.status, next
        )));
    }
    let won = transition_appointment_status(conn, &appt.id, appt.status, next, notes, &Utc::now())?;
    if !won {
        // Someone else moved it between our read and our write.
        return Err(TelemedError::InvalidState(
            "Appointment is no longer scheduled.".into(),
        ));
    }
    Ok(())
}

fn view_by_id(conn: &Connection, id: &Uuid) -> Result<AppointmentView, TelemedError> {
    let appt = get_appointment(conn, id)?
        .ok_or_else(|| TelemedError::NotFound("Appointment".into()))?;
    view(conn, appt)
}
