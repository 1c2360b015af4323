//! Responses handed back to the page.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use swcache_core::CachedResponse;

use crate::fetch::{FetchResponse, end_to_end_headers};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// A stored entry.
    Cache,
    /// A fresh network response.
    Network,
    /// The cached offline page, standing in for a failed static fetch.
    Offline,
    /// A network response for a request no strategy handles.
    Bypass,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Cache => "hit",
            ResponseSource::Network => "network",
            ResponseSource::Offline => "offline",
            ResponseSource::Bypass => "bypass",
        }
    }
}

/// Response returned by `CacheManager::intercept`.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl ServedResponse {
    pub fn from_network(response: FetchResponse, source: ResponseSource) -> Self {
        Self {
            status: response.status,
            headers: end_to_end_headers(&response.headers, &[header::CONTENT_LENGTH]),
            body: response.bytes,
            source,
        }
    }

    /// Rebuild a response from a stored entry. Headers that no longer parse are dropped.
    pub fn from_cached(entry: CachedResponse, source: ResponseSource) -> Self {
        let mut headers = HeaderMap::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        Self {
            status: StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK),
            headers,
            body: Bytes::from(entry.body),
            source,
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
