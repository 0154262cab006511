//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies it as an access
//! JWT, resolves the user to an `Actor`, and injects it into request
//! extensions for downstream handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Actor;
use crate::crypto::TokenType;

/// Require a valid access token for an existing user.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = ctx.core.tokens.verify(token, TokenType::Access).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        ApiError::from(e)
    })?;

    // Guard dropped at the end of the block, before any .await
    let actor = {
        let conn = ctx.db()?;
        Actor::load(&conn, &claims.user_id)?
    };
    let actor = actor.ok_or_else(|| {
        tracing::warn!(user_id = %claims.user_id, "Token for a user that no longer exists");
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
