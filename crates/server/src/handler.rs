//! Axum routing for the proxy.
//!
//! Every request except the health check falls through to `proxy`, which
//! hands it to the cache manager and writes back whatever the manager serves.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::http::header::HeaderName;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use swcache_client::{CacheManager, Destination, InterceptedRequest, ServedResponse};
use url::Url;

use crate::error::ProxyError;

/// Header naming how a response was produced.
pub static SOURCE_HEADER: HeaderName = HeaderName::from_static("x-swcache");

const SEC_FETCH_DEST: &str = "sec-fetch-dest";

/// State shared by the handlers.
#[derive(Clone)]
pub struct ProxyState {
    pub manager: Arc<CacheManager>,
    /// Largest request body accepted from the page.
    pub max_body: usize,
}

impl ProxyState {
    pub fn new(manager: Arc<CacheManager>, max_body: usize) -> Self {
        Self { manager, max_body }
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new().route("/__swcache/health", get(health)).fallback(proxy).with_state(state)
}

async fn health(State(state): State<ProxyState>) -> impl IntoResponse {
    let config = state.manager.config();
    Json(serde_json::json!({
        "state": state.manager.state().as_str(),
        "version": config.version,
        "origin": config.origin.as_str(),
    }))
}

/// Serve one request from the page through the cache manager.
pub async fn proxy(State(state): State<ProxyState>, request: Request) -> Result<Response, ProxyError> {
    let intercepted = intercepted_request(&state.manager.config().origin, request, state.max_body).await?;
    let served = state.manager.intercept(&intercepted).await?;
    Ok(into_response(served))
}

/// Rebuild a request from the page as the same request against the origin.
///
/// Only the path and query of the incoming URI are used, so the target can
/// never leave the origin.
pub async fn intercepted_request(
    origin: &Url, request: Request, max_body: usize,
) -> Result<InterceptedRequest, ProxyError> {
    let (parts, body) = request.into_parts();

    let mut url = origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let body = to_bytes(body, max_body)
        .await
        .map_err(|e| ProxyError::InvalidInput(format!("request body: {e}")))?;
    let destination = parts
        .headers
        .get(SEC_FETCH_DEST)
        .and_then(|value| value.to_str().ok())
        .map(Destination::from_header)
        .unwrap_or_default();

    let request = InterceptedRequest::new(parts.method, url.as_str())?
        .with_headers(parts.headers)
        .with_body(body)
        .with_destination(destination);
    if request.url.origin() != origin.origin() {
        return Err(ProxyError::InvalidInput(format!("{} leaves the origin", parts.uri)));
    }
    Ok(request)
}

fn into_response(served: ServedResponse) -> Response {
    let mut response = Response::new(Body::from(served.body));
    *response.status_mut() = served.status;
    *response.headers_mut() = served.headers;
    response
        .headers_mut()
        .insert(SOURCE_HEADER.clone(), HeaderValue::from_static(served.source.as_str()));
    response
}
