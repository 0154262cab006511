//! Role- and ownership-based access predicates.
//!
//! Every predicate is a pure read over current state: denial is a
//! `false`, never an error. Callers turn it into `PermissionDenied`
//! (or `NotFound` when the object must stay invisible).
//!
//! Rules:
//! 1. Health record read → owner, or a doctor with ≥1 appointment
//!    (any status) with the owner
//! 2. Health record write → owner, and only while the owner is a patient
//! 3. Appointment action → patient or doctor of the appointment
//! 4. Default → DENY

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::{doctor_has_seen_patient, get_role, get_user};
use crate::db::DatabaseError;
use crate::models::{Appointment, HealthRecord, Role};

// ═══════════════════════════════════════════════════════════
// Actor
// ═══════════════════════════════════════════════════════════

/// The authenticated user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    /// `None` for a user without a profile (should not happen after
    /// registration, but every predicate treats it as "no role").
    pub role: Option<Role>,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Option<Role>) -> Self {
        Self { user_id, role }
    }

    /// Resolve an actor from a user id. `None` when the user no longer exists.
    pub fn load(conn: &Connection, user_id: &Uuid) -> Result<Option<Self>, DatabaseError> {
        if get_user(conn, user_id)?.is_none() {
            return Ok(None);
        }
        let role = get_role(conn, user_id)?;
        Ok(Some(Self::new(*user_id, role)))
    }
}

// ═══════════════════════════════════════════════════════════
// Predicates
// ═══════════════════════════════════════════════════════════

pub fn is_doctor(actor: &Actor) -> bool {
    actor.role == Some(Role::Doctor)
}

pub fn is_patient(actor: &Actor) -> bool {
    actor.role == Some(Role::Patient)
}

pub fn can_read_health_record(
    conn: &Connection,
    actor: &Actor,
    record: &HealthRecord,
) -> Result<bool, DatabaseError> {
    // Rule 1a: owner
    if actor.user_id == record.patient_id {
        return Ok(true);
    }
    // Rule 1b: doctor linked through an appointment
    if is_doctor(actor) {
        return doctor_has_seen_patient(conn, &actor.user_id, &record.patient_id);
    }
    Ok(false)
}

pub fn can_write_health_record(actor: &Actor, record: &HealthRecord) -> bool {
    actor.user_id == record.patient_id && is_patient(actor)
}

pub fn can_act_on_appointment(actor: &Actor, appt: &Appointment) -> bool {
    appt.is_participant(&actor.user_id)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
