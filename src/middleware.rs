use axum::{
    extract::{connect_info::MockConnectInfo, ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::SharedState;
use crate::rate_limiter::client_identity;

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = peer_addr(&request)
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let span = tracing::info_span!("request", %request_id, %method, %uri, %client_ip);

    async move {
        info!(target: "reelvault::middleware", "Incoming request");

        let response = next.run(request).await;

        info!(
            target: "reelvault::middleware",
            status = %response.status(),
            "Request completed"
        );
        response
    }
    .instrument(span)
    .await
}

/// Admission control: reject the request before any other work if the
/// client has no token left.
pub async fn rate_limit_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.rate_limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = match client_ip(&request) {
        Ok(ip) => ip,
        Err(err) => return err.into_response(),
    };

    if !state.rate_limiter.allow(client) {
        debug!(target: "reelvault::middleware", %client, "Rate limit exceeded");
        return ApiError::RateLimitExceeded {
            retry_after: state.rate_limiter.retry_after(client),
        }
        .into_response();
    }

    next.run(request).await
}

/// Turn the router's bare 405 into the JSON error shape
pub async fn method_not_allowed_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED
        || response.headers().contains_key(header::CONTENT_TYPE)
    {
        return response;
    }

    let allow = response.headers().get(header::ALLOW).cloned();
    let mut json = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        json.headers_mut().insert(header::ALLOW, allow);
    }
    json
}

/// Peer address from the serving connection, or from `MockConnectInfo`
/// when the router is driven without a listener.
fn peer_addr(request: &Request) -> Option<SocketAddr> {
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
}

/// The connecting peer's IP. Without connection info there is no identity
/// to limit on, which is a server wiring fault rather than a client error.
fn client_ip(request: &Request) -> Result<IpAddr, ApiError> {
    match peer_addr(request) {
        Some(addr) => client_identity(&addr.to_string()),
        None => Err(ApiError::Internal(
            "connection info missing from request".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 1], 55123))));

        let ip = client_ip(&request).unwrap();
        assert_eq!(ip.to_string(), "203.0.113.1");
    }

    #[test]
    fn test_client_ip_from_mock_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .extensions_mut()
            .insert(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4242))));

        let ip = client_ip(&request).unwrap();
        assert_eq!(ip.to_string(), "10.0.0.1");
    }

    #[test]
    fn test_served_connection_wins_over_mock() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .extensions_mut()
            .insert(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4242))));
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 443))));

        assert_eq!(peer_addr(&request).unwrap().ip().to_string(), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_missing_is_internal() {
        let request = Request::new(axum::body::Body::empty());
        assert!(matches!(client_ip(&request), Err(ApiError::Internal(_))));
    }
}
