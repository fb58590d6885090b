use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::admin;
use super::health;
use super::middleware::{logging_middleware, metrics_middleware};
use super::state::AppState;
use super::v1;
use crate::infrastructure::observability::{create_metrics_router, PrometheusMetrics};

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // API key holders
        .nest("/v1", v1::create_v1_router(state.clone()))
        // Admin API
        .nest("/admin", admin::create_admin_router())
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Full router plus the Prometheus endpoint when metrics are enabled
pub fn create_router_with_metrics(
    state: AppState,
    metrics: Option<PrometheusMetrics>,
    metrics_path: &str,
) -> Router {
    let router = create_router(state);

    match metrics {
        Some(metrics) => router.merge(create_metrics_router(metrics, metrics_path)),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::domain::{ManualClock, TenantId, UsageQuery, UsageRepository};
    use crate::{create_app_state_with_stores, Stores};

    struct TestApp {
        router: Router,
        state: AppState,
        stores: Stores,
        clock: ManualClock,
        admin_token: String,
    }

    fn test_app() -> TestApp {
        let stores = Stores::in_memory();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 14, 9, 58, 0).unwrap());
        let state =
            create_app_state_with_stores(&AppConfig::default(), stores.clone(), Arc::new(clock.clone()))
                .unwrap();
        let admin_token = state
            .admin_tokens
            .issue("admin-1", &TenantId::new("acme").unwrap())
            .unwrap();

        TestApp {
            router: create_router(state.clone()),
            state,
            stores,
            clock,
            admin_token,
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response {
        app.router.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn admin(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token));

        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn with_key(uri: &str, secret: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", secret))
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap()
    }

    /// Create a key through the admin API; returns (id, secret)
    async fn create_key(app: &TestApp, body: Value) -> (String, String) {
        let response = send(app, admin(app, "POST", "/admin/api-keys", Some(body))).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        (
            body["data"]["id"].as_str().unwrap().to_string(),
            body["data"]["key"].as_str().unwrap().to_string(),
        )
    }

    /// Wait for background ledger writes to land
    async fn ledger_len(app: &TestApp, expected: usize) -> usize {
        let mut len = 0;
        for _ in 0..50 {
            len = app.stores.usage.query(&UsageQuery::new()).await.unwrap().len();
            if len >= expected {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        len
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = test_app();

        for uri in ["/health", "/ready", "/live"] {
            let response = send(&app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_missing_header_is_401_with_error_shape() {
        let app = test_app();

        let response = send(
            &app,
            Request::builder().uri("/v1/session").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({ "data": null, "message": "Missing Authorization header", "status": 401 })
        );
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_keys_are_401() {
        let app = test_app();

        let response = send(
            &app,
            Request::builder()
                .uri("/v1/session")
                .header(header::AUTHORIZATION, "Token abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["message"],
            "Invalid Authorization header format. Expected 'Bearer <api-key>'"
        );

        let response = send(&app, with_key("/v1/session", "kg_live_tooshort")).await;
        assert_eq!(body_json(response).await["message"], "Invalid API key format");

        let unknown = crate::create_generator(&AppConfig::default()).unwrap().generate().key;
        let response = send(&app, with_key("/v1/session", &unknown)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Invalid API key");
    }

    #[tokio::test]
    async fn test_session_with_rate_limit_headers_and_ledger_entry() {
        let app = test_app();
        let (id, secret) = create_key(&app, json!({ "name": "Exports", "rateLimit": 5 })).await;

        let response = send(&app, with_key("/v1/session", &secret)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
        let body = body_json(response).await;
        assert_eq!(body["data"]["keyId"], id.as_str());
        assert_eq!(body["data"]["tenantId"], "acme");
        assert_eq!(body["data"]["rateLimit"]["remaining"], 4);

        assert_eq!(ledger_len(&app, 1).await, 1);
        let entries = app.stores.usage.query(&UsageQuery::new()).await.unwrap();
        assert_eq!(entries[0].response_status(), 200);
        assert_eq!(entries[0].endpoint(), "/v1/session");
        assert_eq!(entries[0].ip_address(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_ceiling_of_one_across_the_hour() {
        let app = test_app();
        let (_, secret) = create_key(&app, json!({ "name": "Exports", "rateLimit": 1 })).await;

        let first = send(&app, with_key("/v1/session", &secret)).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(ledger_len(&app, 1).await, 1);

        let second = send(&app, with_key("/v1/session", &secret)).await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["retry-after"], "120");
        let body = body_json(second).await;
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["message"], "Rate limit exceeded");
        assert_eq!(body["status"], 429);
        assert_eq!(body["limit"], 1);
        assert_eq!(body["remaining"], 0);
        assert_eq!(body["resetTime"], "2024-05-14T10:00:00Z");

        app.clock.advance(Duration::minutes(2));
        let third = send(&app, with_key("/v1/session", &secret)).await;
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_scoped_route_rejects_foreign_tenant() {
        let app = test_app();
        let (_, secret) = create_key(&app, json!({ "name": "Exports" })).await;

        let response = send(&app, with_key("/v1/usage?tenant_id=globex", &secret)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["message"],
            "API key is not authorized for tenant 'globex'"
        );

        let response = send(&app, with_key("/v1/usage?tenantId=acme", &secret)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // The plain route ignores the filter.
        let response = send(&app, with_key("/v1/session?tenant_id=globex", &secret)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_tenant_params_do_not_preempt_authentication() {
        let app = test_app();

        for uri in [
            "/v1/session?tenant_id=acme&tenantId=globex",
            "/v1/usage?tenant_id=acme&tenantId=globex",
        ] {
            let response =
                send(&app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(
                body_json(response).await["message"],
                "Missing Authorization header"
            );
        }
    }

    #[tokio::test]
    async fn test_conflicting_tenant_params_on_scoped_route() {
        let app = test_app();
        let (_, secret) = create_key(&app, json!({ "name": "Exports" })).await;

        let response = send(
            &app,
            with_key("/v1/usage?tenant_id=acme&tenantId=globex", &secret),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        assert_eq!(ledger_len(&app, 1).await, 1);
        let entries = app.stores.usage.query(&UsageQuery::new()).await.unwrap();
        assert_eq!(entries[0].response_status(), 403);
        assert_eq!(entries[0].endpoint(), "/v1/usage");

        let response = send(
            &app,
            with_key("/v1/session?tenant_id=acme&tenantId=globex", &secret),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_revoked_key_stops_authenticating() {
        let app = test_app();
        let (id, secret) = create_key(&app, json!({ "name": "Exports" })).await;

        let response = send(
            &app,
            admin(
                &app,
                "POST",
                &format!("/admin/api-keys/{}/revoke", id),
                Some(json!({ "reason": "leaked" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["isActive"], false);
        assert_eq!(body["data"]["revocation"]["revokedBy"], "admin-1");

        let again = send(
            &app,
            admin(&app, "POST", &format!("/admin/api-keys/{}/revoke", id), None),
        )
        .await;
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let response = send(&app, with_key("/v1/session", &secret)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Invalid API key");
    }

    #[tokio::test]
    async fn test_admin_crud_and_delete_cascade() {
        let app = test_app();
        let (id, secret) = create_key(&app, json!({ "name": "Exports" })).await;

        send(&app, with_key("/v1/session", &secret)).await;
        assert_eq!(ledger_len(&app, 1).await, 1);

        let response = send(
            &app,
            admin(
                &app,
                "PATCH",
                &format!("/admin/api-keys/{}", id),
                Some(json!({ "name": "Exports v2", "rateLimit": 50 })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["name"], "Exports v2");
        assert_eq!(body["data"]["rateLimit"], 50);

        let response = send(&app, admin(&app, "GET", "/admin/api-keys?search=v2", None)).await;
        let body = body_json(response).await;
        assert_eq!(body["data"]["total"], 1);
        assert!(body["data"]["items"][0].get("keyHash").is_none());

        let response = send(
            &app,
            admin(&app, "GET", &format!("/admin/api-keys/{}/usage/stats", id), None),
        )
        .await;
        assert_eq!(body_json(response).await["data"]["totalRequests"], 1);

        let response = send(
            &app,
            admin(&app, "DELETE", &format!("/admin/api-keys/{}", id), None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["usageEntriesRemoved"], 1);

        let response = send(&app, admin(&app, "GET", &format!("/admin/api-keys/{}", id), None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(ledger_len(&app, 0).await, 0);
    }

    #[tokio::test]
    async fn test_admin_is_tenant_scoped() {
        let app = test_app();
        let (id, _) = create_key(&app, json!({ "name": "Exports" })).await;
        let globex_token = app
            .state
            .admin_tokens
            .issue("admin-9", &TenantId::new("globex").unwrap())
            .unwrap();

        let response = send(
            &app,
            Request::builder()
                .uri(format!("/admin/api-keys/{}", id))
                .header(header::AUTHORIZATION, format!("Bearer {}", globex_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let app = test_app();

        let response = send(
            &app,
            Request::builder().uri("/admin/api-keys").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &app,
            Request::builder()
                .uri("/admin/api-keys")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_validation_errors_are_400() {
        let app = test_app();

        let response = send(
            &app,
            admin(&app, "POST", "/admin/api-keys", Some(json!({ "name": "", "rateLimit": 0 }))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["status"], 400);
    }
}
