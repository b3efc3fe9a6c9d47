//! Per-request context.
//!
//! # Responsibilities
//! - Derive a request ID (inbound header if non-empty, otherwise UUID v4)
//! - Build a request-scoped logger carrying method, path, query, URI,
//!   user agent and remote address
//! - Attach both to the request before any routing decision
//! - Echo the request ID on the response
//!
//! # Design Decisions
//! - Runs outermost, so 404/405/500 responses are logged with full context
//! - Set once per request, read-only afterwards, dropped with the request

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::observability::Logger;

/// Default header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Values attached to every request by [`request_context`].
#[derive(Clone, Debug)]
pub struct RequestContext {
    request_id: String,
    logger: Logger,
}

impl RequestContext {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// State of the request context middleware.
#[derive(Clone, Debug)]
pub struct RequestContextState {
    pub header: HeaderName,
    pub logger: Logger,
}

/// Middleware attaching a [`RequestContext`] to every request.
pub async fn request_context(
    State(state): State<RequestContextState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = request
        .headers()
        .get(&state.header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let uri = request.uri();
    let logger = state.logger.child(|| {
        tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = uri.path(),
            query = uri.query().unwrap_or_default(),
            uri = %uri,
            user_agent = %user_agent,
            remote_addr = %remote_addr,
        )
    });

    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
        logger: logger.clone(),
    });

    let mut response = logger.scope(next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(state.header.clone(), value);
    }
    response
}
