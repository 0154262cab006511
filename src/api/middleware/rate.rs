//! Per-client rate limiting middleware.
//!
//! Sliding-window limits per client, configured through
//! `Config::rate_per_minute` and `Config::rate_per_hour`.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::crypto::TokenType;

/// The user behind a valid access token, else the client address.
///
/// Tokens are verified here rather than sliced: every JWT shares the
/// same header prefix, and an unverified token must not select a bucket.
fn rate_key(ctx: &ApiContext, req: &Request<axum::body::Body>) -> String {
    let headers = req.headers();
    if let Some(claims) = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| ctx.core.tokens.verify(token, TokenType::Access).ok())
    {
        return format!("user:{}", claims.user_id);
    }
    client_key(req, ctx.core.config.trust_forwarded_for)
}

/// First `X-Forwarded-For` hop when the deployment sits behind a trusted
/// proxy, otherwise the peer address of the connection.
fn client_key(req: &Request<axum::body::Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(ip) = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return format!("ip:{ip}");
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(peer)| format!("ip:{}", peer.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Per-client rate limiting. Returns 429 if exceeded.
/// Accesses `ApiContext` from request extensions.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(req: Request<axum::body::Body>, next: Next) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&ctx, &req);

    // MutexGuard is !Send: must drop before .await via block scope
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter.check(&key).map_err(|retry_after| {
            tracing::warn!(key, retry_after, "Rate limit exceeded");
            ApiError::RateLimited { retry_after }
        })?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::config::Config;
    use crate::core_state::CoreState;

    fn context(trust_forwarded_for: bool) -> ApiContext {
        let mut config = Config::for_tests();
        config.trust_forwarded_for = trust_forwarded_for;
        ApiContext::new(Arc::new(CoreState::in_memory(config).unwrap()))
    }

    fn request(peer: Option<&str>, headers: &[(&str, &str)]) -> Request<axum::body::Body> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            builder = builder.extension(ConnectInfo(addr));
        }
        builder.body(axum::body::Body::empty()).unwrap()
    }

    #[test]
    fn valid_tokens_key_by_user() {
        let ctx = context(false);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a = ctx.core.tokens.issue(alice, TokenType::Access).unwrap();
        let b = ctx.core.tokens.issue(bob, TokenType::Access).unwrap();

        let (auth_a, auth_b) = (format!("Bearer {a}"), format!("Bearer {b}"));
        let key_a = rate_key(&ctx, &request(None, &[("Authorization", auth_a.as_str())]));
        let key_b = rate_key(&ctx, &request(None, &[("Authorization", auth_b.as_str())]));
        assert_eq!(key_a, format!("user:{alice}"));
        assert_eq!(key_b, format!("user:{bob}"));
    }

    #[test]
    fn forged_or_refresh_tokens_fall_back_to_peer() {
        let ctx = context(false);
        let refresh = ctx.core.tokens.issue(Uuid::new_v4(), TokenType::Refresh).unwrap();
        for token in ["eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9.forged", refresh.as_str()] {
            let auth = format!("Bearer {token}");
            let req = request(Some("198.51.100.4:5000"), &[("Authorization", auth.as_str())]);
            assert_eq!(rate_key(&ctx, &req), "ip:198.51.100.4");
        }
    }

    #[test]
    fn forwarded_header_ignored_unless_trusted() {
        let headers = [("X-Forwarded-For", "203.0.113.7, 10.0.0.1")];
        let req = request(Some("10.0.0.1:41000"), &headers);
        assert_eq!(rate_key(&context(false), &req), "ip:10.0.0.1");
        assert_eq!(rate_key(&context(true), &req), "ip:203.0.113.7");
    }

    #[test]
    fn peer_port_does_not_split_buckets() {
        let ctx = context(false);
        let first = rate_key(&ctx, &request(Some("192.0.2.9:1111"), &[]));
        let second = rate_key(&ctx, &request(Some("192.0.2.9:2222"), &[]));
        assert_eq!(first, second);
        assert_eq!(rate_key(&ctx, &request(None, &[])), "anonymous");
    }
}
