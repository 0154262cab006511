//! API endpoint handlers.
//!
//! Handlers parse the request, take the database lock for one
//! synchronous manager call, and map the result to JSON.

pub mod appointments;
pub mod auth;
pub mod health;
pub mod profile;
pub mod vitals;

use uuid::Uuid;

use crate::api::error::ApiError;

/// Path ids that are not UUIDs cannot name anything.
pub(crate) fn parse_id(raw: &str, entity: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(entity.to_string()))
}
