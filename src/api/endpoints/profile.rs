//! Profile and directory endpoints.
//!
//! - `GET/PUT/PATCH /profile/`: the caller's own profile
//! - `GET /doctors/`: every doctor
//! - `GET /doctor/patients/`: patients of the calling doctor

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Actor;
use crate::profile::{self, DoctorListing, PatientListing, ProfilePatch, ProfileView};

/// `GET /profile/`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ProfileView>, ApiError> {
    let conn = ctx.db()?;
    Ok(Json(profile::get(&conn, &actor)?))
}

/// `PUT /profile/` and `PATCH /profile/`: both partial.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<ProfilePatch>, JsonRejection>,
) -> Result<Json<ProfileView>, ApiError> {
    let Json(patch) = payload?;
    let mut conn = ctx.db()?;
    Ok(Json(profile::update(&mut conn, &actor, &patch)?))
}

/// `GET /doctors/`
pub async fn doctors(
    State(ctx): State<ApiContext>,
    Extension(_actor): Extension<Actor>,
) -> Result<Json<Vec<DoctorListing>>, ApiError> {
    let conn = ctx.db()?;
    Ok(Json(profile::list_doctors(&conn)?))
}

/// `GET /doctor/patients/`
pub async fn patients(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<PatientListing>>, ApiError> {
    let conn = ctx.db()?;
    Ok(Json(profile::list_patients(&conn, &actor)?))
}
