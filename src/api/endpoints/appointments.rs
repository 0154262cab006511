//! Appointment endpoints.
//!
//! - `GET/POST /appointments/`
//! - `GET/PUT/PATCH/DELETE /appointments/:id/`
//! - `POST /appointments/:id/complete/`
//! - `POST /appointments/:id/cancel/`

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::api::endpoints::parse_id;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::appointment::{
    self, AppointmentListItem, AppointmentPatch, AppointmentView, CompleteAppointment,
    NewAppointment,
};
use crate::authorization::Actor;

const ENTITY: &str = "Appointment";

/// `GET /appointments/`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<AppointmentListItem>>, ApiError> {
    let conn = ctx.db()?;
    Ok(Json(appointment::list(&conn, &actor)?))
}

/// `POST /appointments/`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<NewAppointment>, JsonRejection>,
) -> Result<(StatusCode, Json<AppointmentView>), ApiError> {
    let Json(input) = payload?;
    let conn = ctx.db()?;
    let view = appointment::create(&conn, &actor, &input)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /appointments/:id/`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<AppointmentView>, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let conn = ctx.db()?;
    Ok(Json(appointment::get(&conn, &actor, &id)?))
}

/// `PUT /appointments/:id/` and `PATCH /appointments/:id/`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    payload: Result<Json<AppointmentPatch>, JsonRejection>,
) -> Result<Json<AppointmentView>, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let Json(patch) = payload?;
    let conn = ctx.db()?;
    Ok(Json(appointment::update(&conn, &actor, &id, &patch)?))
}

/// `DELETE /appointments/:id/`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let conn = ctx.db()?;
    appointment::delete(&conn, &actor, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /appointments/:id/complete/`
pub async fn complete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    payload: Result<Json<CompleteAppointment>, JsonRejection>,
) -> Result<Json<AppointmentView>, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let Json(body) = payload?;
    let conn = ctx.db()?;
    let view = appointment::complete(&conn, &actor, &id, body.consultation_notes.as_deref())?;
    Ok(Json(view))
}

/// `POST /appointments/:id/cancel/`: no body.
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<AppointmentView>, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let conn = ctx.db()?;
    Ok(Json(appointment::cancel(&conn, &actor, &id)?))
}
