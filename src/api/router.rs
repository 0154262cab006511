//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//!
//! Middleware stack (outermost → innermost):
//! 1. Rate limiter → 2. Auth validator (protected only) → 3. Audit logger

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // Protected routes: bearer access token required.
    //
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension → Rate limit → Cache-Control → Auth → Audit → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route(
            "/profile/",
            get(endpoints::profile::get)
                .put(endpoints::profile::update)
                .patch(endpoints::profile::update),
        )
        .route("/doctors/", get(endpoints::profile::doctors))
        .route("/doctor/patients/", get(endpoints::profile::patients))
        .route(
            "/appointments/",
            get(endpoints::appointments::list).post(endpoints::appointments::create),
        )
        .route(
            "/appointments/:id/",
            get(endpoints::appointments::detail)
                .put(endpoints::appointments::update)
                .patch(endpoints::appointments::update)
                .delete(endpoints::appointments::delete),
        )
        .route(
            "/appointments/:id/complete/",
            post(endpoints::appointments::complete),
        )
        .route(
            "/appointments/:id/cancel/",
            post(endpoints::appointments::cancel),
        )
        .route(
            "/vitals/",
            get(endpoints::vitals::list).post(endpoints::vitals::create),
        )
        .route(
            "/vitals/:id/",
            get(endpoints::vitals::detail)
                .put(endpoints::vitals::update)
                .patch(endpoints::vitals::update)
                .delete(endpoints::vitals::delete),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes (rate-limited only, no auth required)
    let unprotected = Router::new()
        .route("/health/", get(endpoints::health::check))
        .route("/register/", post(endpoints::auth::register))
        .route("/login/", post(endpoints::auth::login))
        .route("/login/refresh/", post(endpoints::auth::refresh))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx));

    Router::new().merge(protected).merge(unprotected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;

    fn test_app() -> Router {
        let core = CoreState::in_memory(Config::for_tests()).unwrap();
        api_router(Arc::new(core))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn registration(username: &str, role: &str) -> Value {
        let mut body = json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "first_name": username,
            "last_name": "Test",
            "password": "password-123",
            "password2": "password-123",
            "role": role,
            "phone_number": "555-0100",
            "address": "1 Main St",
            "date_of_birth": "1980-05-20",
        });
        if role == "DOCTOR" {
            body["specialization"] = json!("Cardiology");
            body["license_number"] = json!(format!("LIC-{username}"));
            body["years_of_experience"] = json!(12);
        } else {
            body["emergency_contact_name"] = json!("Next Of Kin");
        }
        body
    }

    /// Register and log in; returns (user id, access token, refresh token).
    async fn signup(app: &Router, username: &str, role: &str) -> (String, String, String) {
        let (status, user) = send(app, "POST", "/register/", None, Some(registration(username, role))).await;
        assert_eq!(status, StatusCode::CREATED, "{user}");
        let (status, tokens) = send(
            app,
            "POST",
            "/login/",
            None,
            Some(json!({"username": username, "password": "password-123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{tokens}");
        (
            user["id"].as_str().unwrap().to_string(),
            tokens["access"].as_str().unwrap().to_string(),
            tokens["refresh"].as_str().unwrap().to_string(),
        )
    }

    fn tomorrow() -> String {
        (Utc::now() + Duration::days(1)).to_rfc3339()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = test_app();
        let (status, json) = send(&app, "GET", "/health/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = test_app();
        for uri in ["/profile/", "/doctors/", "/appointments/", "/vitals/", "/doctor/patients/"] {
            let (status, json) = send(&app, "GET", uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
        }
        let (status, _) = send(&app, "GET", "/profile/", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_responses_are_not_cached() {
        let app = test_app();
        let (_, access, _) = signup(&app, "alice", "PATIENT").await;
        let req = Request::builder()
            .uri("/profile/")
            .header("Authorization", format!("Bearer {access}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");
    }

    #[tokio::test]
    async fn register_rejects_mismatch_without_creating_user() {
        let app = test_app();
        let mut body = registration("alice", "PATIENT");
        body["password2"] = json!("something-else");
        let (status, json) = send(&app, "POST", "/register/", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert!(json["error"]["fields"]["password"].is_array());

        let (status, json) = send(
            &app,
            "POST",
            "/login/",
            None,
            Some(json!({"username": "alice", "password": "password-123"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = test_app();
        let req = Request::builder()
            .method("POST")
            .uri("/register/")
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let app = test_app();
        signup(&app, "alice", "PATIENT").await;
        let (status, json) = send(
            &app,
            "POST",
            "/login/",
            None,
            Some(json!({"username": "alice", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn refresh_issues_access_and_rejects_access_tokens() {
        let app = test_app();
        let (_, access, refresh) = signup(&app, "alice", "PATIENT").await;

        let (status, json) = send(&app, "POST", "/login/refresh/", None, Some(json!({"refresh": refresh}))).await;
        assert_eq!(status, StatusCode::OK);
        let new_access = json["access"].as_str().unwrap().to_string();
        let (status, _) = send(&app, "GET", "/profile/", Some(&new_access), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "POST", "/login/refresh/", None, Some(json!({"refresh": access}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A refresh token is not a bearer credential.
        let (status, _) = send(&app, "GET", "/profile/", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_get_and_nested_patch() {
        let app = test_app();
        let (_, access, _) = signup(&app, "bob", "DOCTOR").await;

        let (status, json) = send(&app, "GET", "/profile/", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["role"], "DOCTOR");
        assert_eq!(json["role_display"], "Doctor");
        assert_eq!(json["details"]["license_number"], "LIC-bob");

        let patch = json!({
            "address": "2 Clinic Rd",
            "user": {"first_name": "Robert"},
            "doctor_details": {"specialization": "Neurology", "license_number": "HACKED"},
        });
        let (status, json) = send(&app, "PATCH", "/profile/", Some(&access), Some(patch)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["address"], "2 Clinic Rd");
        assert_eq!(json["user"]["first_name"], "Robert");
        assert_eq!(json["details"]["specialization"], "Neurology");
        assert_eq!(json["details"]["license_number"], "LIC-bob");

        let bad = json!({"phone_number": "0800-NEW", "user": {"email": "not-an-email"}});
        let (status, json) = send(&app, "PUT", "/profile/", Some(&access), Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]["fields"]["user.email"].is_array());
        let (_, json) = send(&app, "GET", "/profile/", Some(&access), None).await;
        assert_eq!(json["phone_number"], "555-0100");
    }

    #[tokio::test]
    async fn appointment_lifecycle_over_http() {
        let app = test_app();
        let (_, alice, _) = signup(&app, "alice", "PATIENT").await;
        let (bob_id, bob, _) = signup(&app, "bob", "DOCTOR").await;
        let (_, carol, _) = signup(&app, "carol", "PATIENT").await;

        let (status, doctors) = send(&app, "GET", "/doctors/", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doctors[0]["specialization"], "Cardiology");

        let booking = json!({"doctor_id": bob_id, "appointment_time": tomorrow(), "reason": "Checkup"});
        let (status, appt) = send(&app, "POST", "/appointments/", Some(&alice), Some(booking.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "{appt}");
        assert_eq!(appt["status"], "SCHEDULED");
        let id = appt["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, "POST", "/appointments/", Some(&bob), Some(booking)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, "GET", &format!("/appointments/{id}/"), Some(&carol), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, patients) = send(&app, "GET", "/doctor/patients/", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patients.as_array().unwrap().len(), 1);
        let (status, _) = send(&app, "GET", "/doctor/patients/", Some(&alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let complete = format!("/appointments/{id}/complete/");
        let (status, done) = send(&app, "POST", &complete, Some(&bob), Some(json!({"consultation_notes": "stable"}))).await;
        assert_eq!(status, StatusCode::OK, "{done}");
        assert_eq!(done["status"], "COMPLETED");
        assert_eq!(done["consultation_notes"], "stable");

        let (status, json) = send(&app, "POST", &format!("/appointments/{id}/cancel/"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "INVALID_STATE");

        let (status, _) = send(&app, "DELETE", &format!("/appointments/{id}/"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, list) = send(&app, "GET", "/appointments/", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["status_display"], "Completed");
    }

    #[tokio::test]
    async fn past_appointment_time_is_validation_error() {
        let app = test_app();
        let (_, alice, _) = signup(&app, "alice", "PATIENT").await;
        let (bob_id, _, _) = signup(&app, "bob", "DOCTOR").await;
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let (status, json) = send(
            &app,
            "POST",
            "/appointments/",
            Some(&alice),
            Some(json!({"doctor_id": bob_id, "appointment_time": past})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]["fields"]["appointment_time"].is_array());
    }

    #[tokio::test]
    async fn vitals_visibility_over_http() {
        let app = test_app();
        let (alice_id, alice, _) = signup(&app, "alice", "PATIENT").await;
        let (_, bob, _) = signup(&app, "bob", "DOCTOR").await;

        let (status, rec) = send(
            &app,
            "POST",
            "/vitals/",
            Some(&alice),
            Some(json!({"heart_rate": 72, "patient": "00000000-0000-0000-0000-000000000000"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{rec}");
        assert_eq!(rec["patient"], alice_id.as_str());
        assert_eq!(rec["patient_username"], "alice");
        let id = rec["id"].as_str().unwrap().to_string();

        let (_, list) = send(&app, "GET", "/vitals/", Some(&bob), None).await;
        assert!(list.as_array().unwrap().is_empty());
        let (status, _) = send(&app, "GET", &format!("/vitals/{id}/"), Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "GET", "/vitals/not-a-uuid/", Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "POST", "/vitals/", Some(&bob), Some(json!({"heart_rate": 60}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, "DELETE", &format!("/vitals/{id}/"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn rate_limit_returns_429() {
        let mut config = Config::for_tests();
        config.rate_per_minute = 2;
        let app = api_router(Arc::new(CoreState::in_memory(config).unwrap()));
        for _ in 0..2 {
            let (status, _) = send(&app, "GET", "/health/", None, None).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, json) = send(&app, "GET", "/health/", None, None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn users_have_separate_rate_buckets() {
        let mut config = Config::for_tests();
        config.rate_per_minute = 5;
        let app = api_router(Arc::new(CoreState::in_memory(config).unwrap()));
        // Two signups spend four requests of the shared anonymous bucket.
        let (_, alice, _) = signup(&app, "alice", "PATIENT").await;
        let (_, bob, _) = signup(&app, "bob", "DOCTOR").await;

        for _ in 0..5 {
            let (status, _) = send(&app, "GET", "/profile/", Some(&alice), None).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, _) = send(&app, "GET", "/profile/", Some(&alice), None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _) = send(&app, "GET", "/profile/", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_username_matches_wrong_password() {
        let app = test_app();
        signup(&app, "alice", "PATIENT").await;

        let (unknown_status, unknown) = send(
            &app,
            "POST",
            "/login/",
            None,
            Some(json!({"username": "nobody", "password": "password-123"})),
        )
        .await;
        let (wrong_status, wrong) = send(
            &app,
            "POST",
            "/login/",
            None,
            Some(json!({"username": "alice", "password": "not-the-password"})),
        )
        .await;
        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_status, wrong_status);
        assert_eq!(unknown, wrong);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn registration_hashes_without_holding_the_database() {
        const ITERATIONS: u32 = 300_000;
        let started = std::time::Instant::now();
        crate::crypto::hash_password("password-123", ITERATIONS);
        let hash_cost = started.elapsed();

        let mut config = Config::for_tests();
        config.password_iterations = ITERATIONS;
        let core = Arc::new(CoreState::in_memory(config).unwrap());
        let app = api_router(core.clone());

        let request = tokio::spawn(async move {
            send(&app, "POST", "/register/", None, Some(registration("alice", "PATIENT"))).await
        });

        // Longest single wait for the connection while registration runs.
        let mut longest_wait = std::time::Duration::ZERO;
        while !request.is_finished() {
            let waited = std::time::Instant::now();
            drop(core.lock_db().unwrap());
            longest_wait = longest_wait.max(waited.elapsed());
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        let (status, body) = request.await.unwrap();
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert!(
            longest_wait < hash_cost / 2,
            "waited {longest_wait:?} for the database; hashing takes {hash_cost:?}"
        );
    }
}
