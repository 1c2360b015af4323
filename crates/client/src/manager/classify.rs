//! Request classification.
//!
//! Maps every intercepted request to exactly one strategy. Requests outside
//! the origin, or of a kind no partition holds, pass through untouched.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use crate::request::{Destination, InterceptedRequest};

static IMAGE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g|gif|webp|avif|svg|bmp)$").expect("valid image regex"));

static STATIC_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(html?|css|m?js|json|webmanifest|ico|woff2?|ttf|otf|txt|xml)$").expect("valid static regex")
});

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Cached copy if present, else network (offline page on failure).
    CacheFirst,
    /// Network within a timeout, cached copy on failure.
    NetworkFirst,
    /// Cached copy now, refreshed in the background.
    StaleWhileRevalidate,
    /// Straight to the network, nothing stored.
    Passthrough,
}

/// Classification rules derived from the manager configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Url,
    api_prefix: String,
    precache: HashSet<String>,
}

impl Classifier {
    pub fn new(origin: Url, api_prefix: impl Into<String>, precache: &[String]) -> Self {
        Self { origin, api_prefix: api_prefix.into(), precache: precache.iter().cloned().collect() }
    }

    /// Pick the strategy for a request.
    ///
    /// Order matters: scope, then API prefix (any method), then GET-only
    /// rules for precached paths, images and other static assets.
    pub fn classify(&self, request: &InterceptedRequest) -> Strategy {
        if request.url.origin() != self.origin.origin() {
            return Strategy::Passthrough;
        }

        let path = request.path();

        if path.starts_with(&self.api_prefix) {
            return Strategy::NetworkFirst;
        }

        if !request.is_get() {
            return Strategy::Passthrough;
        }

        if self.precache.contains(path) {
            return Strategy::CacheFirst;
        }

        if request.destination == Destination::Image || IMAGE_PATH.is_match(path) {
            return Strategy::StaleWhileRevalidate;
        }

        if request.destination.is_static_asset() || STATIC_PATH.is_match(path) {
            return Strategy::CacheFirst;
        }

        Strategy::Passthrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn classifier() -> Classifier {
        let precache: Vec<String> =
            ["/", "/index.html", "/offline.html", "/manifest.json", "/favicon.ico"].map(String::from).to_vec();
        Classifier::new(Url::parse("http://localhost:3000").unwrap(), "/api/", &precache)
    }

    fn get(path: &str) -> InterceptedRequest {
        InterceptedRequest::get(&format!("http://localhost:3000{path}")).unwrap()
    }

    #[test]
    fn test_precache_paths_are_cache_first() {
        let c = classifier();
        for path in ["/", "/index.html", "/offline.html", "/manifest.json", "/favicon.ico"] {
            assert_eq!(c.classify(&get(path)), Strategy::CacheFirst, "{path}");
        }
    }

    #[test]
    fn test_api_prefix_is_network_first_for_any_method() {
        let c = classifier();
        assert_eq!(c.classify(&get("/api/bookings")), Strategy::NetworkFirst);
        let post = InterceptedRequest::new(Method::POST, "http://localhost:3000/api/bookings").unwrap();
        assert_eq!(c.classify(&post), Strategy::NetworkFirst);
    }

    #[test]
    fn test_images() {
        let c = classifier();
        assert_eq!(c.classify(&get("/images/car1.jpg")), Strategy::StaleWhileRevalidate);
        assert_eq!(c.classify(&get("/images/Hero.WEBP")), Strategy::StaleWhileRevalidate);
        let by_destination = get("/gallery/render").with_destination(Destination::Image);
        assert_eq!(c.classify(&by_destination), Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_static_assets() {
        let c = classifier();
        assert_eq!(c.classify(&get("/static/js/main.3f2a1.js")), Strategy::CacheFirst);
        assert_eq!(c.classify(&get("/static/css/main.css")), Strategy::CacheFirst);
        let navigation = get("/services").with_destination(Destination::Document);
        assert_eq!(c.classify(&navigation), Strategy::CacheFirst);
    }

    #[test]
    fn test_unmatched_requests_pass_through() {
        let c = classifier();
        assert_eq!(c.classify(&get("/health")), Strategy::Passthrough);
        let cross_origin = InterceptedRequest::get("https://fonts.example.com/inter.woff2").unwrap();
        assert_eq!(c.classify(&cross_origin), Strategy::Passthrough);
        let post = InterceptedRequest::new(Method::POST, "http://localhost:3000/contact.html").unwrap();
        assert_eq!(c.classify(&post), Strategy::Passthrough);
    }
}
