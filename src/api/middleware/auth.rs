//! API key authentication middleware
//!
//! Puts any router behind the authentication pipeline. Plain and tenant-scoped
//! routes share this one function; they differ only in the [`TenantScope`] flag.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, OriginalUri, Query, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};

use crate::api::state::AppState;
use crate::api::types::{rate_limit_headers, ApiError};
use crate::domain::usage::RequestMetadata;
use crate::domain::AuthenticationContext;
use crate::infrastructure::auth::AuthRequest;

pub use crate::infrastructure::auth::TenantScope;

const TENANT_PARAMS: [&str; 2] = ["tenant_id", "tenantId"];

/// Authenticate the request with its API key, then run the downstream handler
pub async fn api_key_auth(
    State((state, scope)): State<(AppState, TenantScope)>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();

    let tenant_filters = match scope {
        TenantScope::Enforced => tenant_filters(&request),
        TenantScope::Unscoped => Vec::new(),
    };
    let metadata = request_metadata(&request);
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());

    let auth_request = AuthRequest {
        authorization,
        tenant_filters: &tenant_filters,
        scope,
        metadata: &metadata,
    };

    let context = match state.pipeline.authenticate(&auth_request).await {
        Ok(context) => context,
        Err(err) => return ApiError::from_auth_error(err, state.pipeline.now()).into_response(),
    };

    let mut request = request;
    request.extensions_mut().insert(context.clone());

    let mut response = next.run(request).await;

    if state.expose_rate_limit_headers {
        response
            .headers_mut()
            .extend(rate_limit_headers(&context.rate_limit));
    }

    state.pipeline.record_request(
        &context,
        &metadata,
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}

/// Put every route of `router` behind API key authentication
pub fn protect(router: Router<AppState>, state: AppState, scope: TenantScope) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state((state, scope), api_key_auth))
}

/// The authenticated key, for handlers behind [`api_key_auth`]
#[derive(Debug, Clone)]
pub struct Authenticated(pub AuthenticationContext);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticationContext>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| ApiError::internal("Handler reached without API key authentication"))
    }
}

/// Every `tenant_id` / `tenantId` value the caller sent, in order
fn tenant_filters(request: &Request<Body>) -> Vec<String> {
    Query::<Vec<(String, String)>>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .unwrap_or_default()
        .into_iter()
        .filter(|(name, _)| TENANT_PARAMS.contains(&name.as_str()))
        .map(|(_, value)| value)
        .collect()
}

fn request_metadata(request: &Request<Body>) -> RequestMetadata {
    let headers = request.headers();
    // Nested routers see the path without their prefix
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path())
        .unwrap_or_else(|| request.uri().path());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestMetadata::new(request.method().as_str(), path)
        .with_ip_address(client_ip(headers).or(peer))
        .with_user_agent(header_str(headers, header::USER_AGENT.as_str()).map(str::to_string))
        .with_request_size(
            header_str(headers, header::CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok()),
        )
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim))
        .map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.2".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());

        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());

        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.1"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_request_metadata_uses_peer_address() {
        let mut req = Request::builder()
            .method("POST")
            .uri("/v1/usage?from=2024-01-01T00:00:00Z")
            .header(header::USER_AGENT, "reporter/1.0")
            .header(header::CONTENT_LENGTH, "42")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 55_000))));

        let metadata = request_metadata(&req);

        assert_eq!(metadata.method, "POST");
        assert_eq!(metadata.endpoint, "/v1/usage");
        assert_eq!(metadata.ip_address.as_deref(), Some("192.0.2.10"));
        assert_eq!(metadata.user_agent.as_deref(), Some("reporter/1.0"));
        assert_eq!(metadata.request_size, Some(42));
    }

    #[test]
    fn test_request_metadata_keeps_nest_prefix() {
        let mut req = request("/session");
        req.extensions_mut()
            .insert(OriginalUri("/v1/session?tenant_id=acme".parse().unwrap()));

        assert_eq!(request_metadata(&req).endpoint, "/v1/session");
    }

    #[test]
    fn test_tenant_filters_accepts_both_spellings() {
        assert_eq!(tenant_filters(&request("/v1/usage?tenant_id=acme")), ["acme"]);
        assert_eq!(tenant_filters(&request("/v1/usage?tenantId=acme&limit=5")), ["acme"]);
        assert!(tenant_filters(&request("/v1/usage")).is_empty());
        assert_eq!(
            tenant_filters(&request("/v1/usage?tenant_id=acme&tenantId=globex")),
            ["acme", "globex"]
        );
    }
}
