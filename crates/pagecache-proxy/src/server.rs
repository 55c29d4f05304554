//! HTTP front-end: every incoming request becomes one intercepted request
//! event for the worker.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use pagecache_core::{HandleError, PageRequest, Served, WorkerHandle};
use tracing::{debug, warn};
use url::Url;

/// Largest request body forwarded upstream.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Tells the front-end which path produced the answer.
const SOURCE_HEADER: &str = "x-pagecache";

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
struct ProxyState {
    worker: WorkerHandle,
    /// Upstream origin without a trailing slash.
    upstream: Arc<str>,
}

/// Build the router. Every method and path is intercepted.
pub fn build_router(worker: WorkerHandle, upstream: &Url) -> Router {
    let state = ProxyState {
        worker,
        upstream: Arc::from(upstream.as_str().trim_end_matches('/')),
    };
    Router::new().fallback(intercept).with_state(state)
}

fn is_forwarded(name: &str) -> bool {
    !name.eq_ignore_ascii_case("host")
        && !HOP_BY_HOP_HEADERS
            .iter()
            .any(|hop| hop.eq_ignore_ascii_case(name))
}

async fn intercept(State(state): State<ProxyState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!(uri = %parts.uri, error = %e, "Rejecting request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut page = PageRequest::new(parts.method.as_str(), format!("{}{}", state.upstream, path))
        .with_body(body.to_vec());
    for (name, value) in &parts.headers {
        if is_forwarded(name.as_str()) {
            page = page.with_header(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
    }

    match state.worker.dispatch(page).await {
        Ok(served) => {
            debug!(path = %path, source = served.source(), status = served.response().status, "Answered");
            into_http_response(served)
        }
        Err(HandleError::Unavailable { url, .. }) => {
            debug!(url = %url, "No response available");
            StatusCode::BAD_GATEWAY.into_response()
        }
        Err(HandleError::WorkerStopped) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

fn into_http_response(served: Served) -> Response {
    let source = served.source();
    let age = match &served {
        Served::Cache(cached) => Some(cached.age_seconds()),
        Served::Network(_) => None,
    };
    let response = served.into_response();

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        if !is_forwarded(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static(SOURCE_HEADER),
        HeaderValue::from_static(source),
    );
    if let Some(age) = age {
        headers.insert(header::AGE, HeaderValue::from(age));
    }

    (status, headers, Body::from(response.body)).into_response()
}
