//! Scripted `Fetcher` for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use swcache_core::Error;

use crate::fetch::{FetchResponse, Fetcher};
use crate::request::InterceptedRequest;

#[derive(Debug, Clone)]
enum Route {
    Respond { status: StatusCode, body: Bytes, delay: Option<Duration> },
    Fail,
}

/// Answers by request path. Unknown paths fail like an unreachable network,
/// unless `echo` is set, in which case they return their own path.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    total: AtomicUsize,
    echo: bool,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn echo() -> Self {
        Self { echo: true, ..Self::default() }
    }

    pub(crate) fn respond(&self, path: &str, status: u16, body: &str) -> &Self {
        self.set(path, Route::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            body: Bytes::from(body.to_string()),
            delay: None,
        })
    }

    pub(crate) fn respond_after(&self, path: &str, delay: Duration, body: &str) -> &Self {
        self.set(path, Route::Respond {
            status: StatusCode::OK,
            body: Bytes::from(body.to_string()),
            delay: Some(delay),
        })
    }

    pub(crate) fn fail(&self, path: &str) -> &Self {
        self.set(path, Route::Fail)
    }

    fn set(&self, path: &str, route: Route) -> &Self {
        self.routes.lock().unwrap().insert(path.to_string(), route);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| p.as_str() == path).count()
    }
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchResponse, Error> {
        let path = request.url.path().to_string();
        self.total.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(path.clone());

        let route = self.routes.lock().unwrap().get(&path).cloned();
        let route = match route {
            Some(route) => route,
            None if self.echo => {
                Route::Respond { status: StatusCode::OK, body: Bytes::from(path.clone()), delay: None }
            }
            None => Route::Fail,
        };

        match route {
            Route::Fail => Err(Error::HttpError(format!("network error: connection refused ({path})"))),
            Route::Respond { status, body, delay } => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                if status.is_redirection() {
                    headers.insert(header::LOCATION, HeaderValue::from_static("/thanks"));
                }
                Ok(FetchResponse { url: request.url.clone(), status, bytes: body, headers })
            }
        }
    }
}
