//! Vitals endpoints.
//!
//! - `GET/POST /vitals/`
//! - `GET/PUT/PATCH/DELETE /vitals/:id/`

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::api::endpoints::parse_id;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Actor;
use crate::vitals::{self, VitalsInput, VitalsView};

const ENTITY: &str = "Health record";

/// `GET /vitals/`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<VitalsView>>, ApiError> {
    let conn = ctx.db()?;
    Ok(Json(vitals::list(&conn, &actor)?))
}

/// `POST /vitals/`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<VitalsInput>, JsonRejection>,
) -> Result<(StatusCode, Json<VitalsView>), ApiError> {
    let Json(input) = payload?;
    let conn = ctx.db()?;
    let view = vitals::create(&conn, &actor, &input)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /vitals/:id/`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<VitalsView>, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let conn = ctx.db()?;
    Ok(Json(vitals::get(&conn, &actor, &id)?))
}

/// `PUT /vitals/:id/` and `PATCH /vitals/:id/`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    payload: Result<Json<VitalsInput>, JsonRejection>,
) -> Result<Json<VitalsView>, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let Json(input) = payload?;
    let conn = ctx.db()?;
    Ok(Json(vitals::update(&conn, &actor, &id, &input)?))
}

/// `DELETE /vitals/:id/`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, ENTITY)?;
    let conn = ctx.db()?;
    vitals::delete(&conn, &actor, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
