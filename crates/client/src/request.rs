//! Requests as seen by the cache manager.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use swcache_core::Error;
use swcache_core::cache::hash::compute_cache_key;

use crate::fetch::canonicalize;

/// What the page intends to do with the response.
///
/// Mirrors the browser's `Sec-Fetch-Dest` values that matter for routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "script" | "worker" | "sharedworker" | "serviceworker" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "empty" | "" => Destination::Empty,
            _ => Destination::Other,
        }
    }

    /// Destinations served from the static partition.
    pub fn is_static_asset(&self) -> bool {
        matches!(
            self,
            Destination::Document | Destination::Script | Destination::Style | Destination::Font | Destination::Manifest
        )
    }
}

/// An outgoing request intercepted from the page.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    /// Canonical absolute URL on the origin.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub destination: Destination,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: &str) -> Result<Self, Error> {
        let url = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::from_url(method, url))
    }

    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(Method::GET, url)
    }

    /// Build from an already canonical URL.
    pub fn from_url(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: Bytes::new(), destination: Destination::Empty }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn cache_key(&self) -> String {
        compute_cache_key(self.method.as_str(), self.url.as_str(), "")
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_from_header() {
        assert_eq!(Destination::from_header("document"), Destination::Document);
        assert_eq!(Destination::from_header("IMAGE"), Destination::Image);
        assert_eq!(Destination::from_header("serviceworker"), Destination::Script);
        assert_eq!(Destination::from_header(""), Destination::Empty);
        assert_eq!(Destination::from_header("audio"), Destination::Other);
    }

    #[test]
    fn test_static_destinations() {
        assert!(Destination::Document.is_static_asset());
        assert!(Destination::Manifest.is_static_asset());
        assert!(!Destination::Image.is_static_asset());
        assert!(!Destination::Empty.is_static_asset());
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let a = InterceptedRequest::get("http://localhost:3000/index.html#pricing").unwrap();
        let b = InterceptedRequest::get("http://localhost:3000/index.html").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_depends_on_method() {
        let get = InterceptedRequest::get("http://localhost:3000/api/bookings").unwrap();
        let post = InterceptedRequest::new(Method::POST, "http://localhost:3000/api/bookings").unwrap();
        assert_ne!(get.cache_key(), post.cache_key());
        assert!(get.is_get());
        assert!(!post.is_get());
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(InterceptedRequest::get("ftp://example.com/x"), Err(Error::InvalidUrl(_))));
    }
}
