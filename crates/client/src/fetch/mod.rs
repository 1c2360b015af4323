//! HTTP fetch pipeline towards the origin server.
//!
//! ### Fetcher
//! - `Fetcher` is the seam between the cache manager and the network.
//! - `FetchClient` is the reqwest implementation used by the proxy.
//!
//! ### Forwarding
//! - Method, body and end-to-end headers are forwarded unchanged.
//! - Hop-by-hop headers, `Host` and `Accept-Encoding` are dropped
//!   (reqwest negotiates and decodes compression itself).
//! - Redirects are not followed; a 3xx goes back to the page as is.
//! - Max body bytes: 5MB (configurable)
//!
//! Any HTTP status is a successful fetch; only transport failures, timeouts
//! and oversized bodies are errors.

pub mod url;

use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, resolve};

use swcache_core::{CachedResponse, Error};

use crate::request::InterceptedRequest;

/// Headers that describe a single connection and must not be forwarded or stored.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// True for headers that must not cross the proxy.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Copy `headers` without hop-by-hop headers and without `skip`.
pub fn end_to_end_headers(headers: &header::HeaderMap, skip: &[header::HeaderName]) -> header::HeaderMap {
    let mut out = header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || skip.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Network access as seen by the cache manager.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Send the request to the network and read the full response.
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "swcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "swcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &swcache_core::AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), max_bytes: config.max_bytes, timeout: config.timeout() }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested; redirects are never followed
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response body bytes
    pub bytes: Bytes,
    /// Response headers
    pub headers: header::HeaderMap,
}

impl FetchResponse {
    /// Snapshot this response for storage under the requested URL.
    pub fn to_cached(&self, method: &str) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()) && *name != header::CONTENT_LENGTH)
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        CachedResponse::new(method, self.url.as_str(), self.status.as_u16(), self.bytes.to_vec()).with_headers(headers)
    }
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

fn map_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("request timed out: {}", err))
    } else {
        Error::HttpError(format!("network error: {}", err))
    }
}

#[async_trait::async_trait]
impl Fetcher for FetchClient {
    /// Forward the request and read the response, enforcing the byte limit.
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = request.url.clone();

        let headers = end_to_end_headers(
            &request.headers,
            &[header::HOST, header::CONTENT_LENGTH, header::ACCEPT_ENCODING],
        );

        let mut builder = self.http.request(request.method.clone(), url.clone()).headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let headers = response.headers().clone();

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                Error::FetchTimeout(format!("reading response timed out: {}", e))
            } else {
                Error::HttpError(format!("failed to read response: {}", e))
            }
        })?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse { url, status, bytes, headers })
    }
}
