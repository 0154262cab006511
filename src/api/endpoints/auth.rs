//! Registration and JWT issuance.
//!
//! `POST /register/`: create an account (no token returned)
//! `POST /login/`: username + password → access/refresh pair
//! `POST /login/refresh/`: refresh token → new access token

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::crypto::{verify_password, TokenPair, TokenType};
use crate::db::repository::get_user_by_username;
use crate::error::FieldErrors;
use crate::registration::{self, RegisteredUser, RegistrationRequest};
use crate::validation::REQUIRED;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub access: String,
}

/// `POST /register/`
pub async fn register(
    State(ctx): State<ApiContext>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let Json(request) = payload?;
    let core = ctx.core.clone();

    // PBKDF2 is CPU-bound: run it off the async workers, and with the
    // database lock released so other requests are not held up by it.
    let user = tokio::task::spawn_blocking(move || -> Result<RegisteredUser, ApiError> {
        let pending = {
            let conn = core.lock_db()?;
            registration::validate(&conn, &request)?
        };
        let hashed = pending.hash_password(core.config.password_iterations);
        let mut conn = core.lock_db()?;
        Ok(hashed.persist(&mut conn)?)
    })
    .await??;

    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /login/`
pub async fn login(
    State(ctx): State<ApiContext>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(request) = payload?;

    let mut errors = FieldErrors::new();
    let username = request.username.filter(|u| !u.is_empty());
    let password = request.password.filter(|p| !p.is_empty());
    if username.is_none() {
        errors.add("username", REQUIRED);
    }
    if password.is_none() {
        errors.add("password", REQUIRED);
    }
    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::Validation(errors));
    };

    let core = ctx.core.clone();
    let pair = tokio::task::spawn_blocking(move || -> Result<TokenPair, ApiError> {
        let user = {
            let conn = core.lock_db()?;
            get_user_by_username(&conn, &username)?
        };
        let Some(user) = user else {
            // Same PBKDF2 cost as a real check, so timing does not reveal
            // which usernames exist.
            let _ = verify_password(&password, core.decoy_password_hash());
            tracing::warn!("Login failed: unknown username");
            return Err(ApiError::InvalidCredentials);
        };
        if !verify_password(&password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(ApiError::InvalidCredentials);
        }
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(core.tokens.issue_pair(user.id)?)
    })
    .await??;

    Ok(Json(pair))
}

/// `POST /login/refresh/`
pub async fn refresh(
    State(ctx): State<ApiContext>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessResponse>, ApiError> {
    let Json(request) = payload?;
    let token = request
        .refresh
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation(FieldErrors::single("refresh", REQUIRED)))?;

    let claims = ctx.core.tokens.verify(&token, TokenType::Refresh)?;
    let access = ctx.core.tokens.issue(claims.user_id, TokenType::Access)?;
    Ok(Json(AccessResponse { access }))
}
