//! The caching strategies.
//!
//! Each strategy takes the partition it works on as an explicit argument.
//! Storage failures never fail a request: a failed read counts as a miss and
//! a failed write is abandoned after logging.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use swcache_core::{CachedResponse, Error, Partition};

use super::response::{ResponseSource, ServedResponse};
use super::revalidate::Revalidations;
use crate::fetch::{FetchResponse, Fetcher};
use crate::request::InterceptedRequest;

/// Fetch, optionally bounded by `timeout`.
pub async fn fetch_within(
    fetcher: &dyn Fetcher, request: &InterceptedRequest, timeout: Option<Duration>,
) -> Result<FetchResponse, Error> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fetcher.fetch(request))
            .await
            .map_err(|_| {
                Error::FetchTimeout(format!("{} {} exceeded {}ms", request.method, request.url, limit.as_millis()))
            })?,
        None => fetcher.fetch(request).await,
    }
}

/// Only successful, complete GET responses are stored.
fn is_storable(request: &InterceptedRequest, response: &FetchResponse) -> bool {
    request.is_get() && response.status.is_success() && response.status != StatusCode::PARTIAL_CONTENT
}

/// Look up the request, treating storage errors as a miss.
pub async fn lookup(partition: &Partition, request: &InterceptedRequest) -> Option<CachedResponse> {
    if !request.is_get() {
        return None;
    }
    lookup_key(partition, &request.cache_key()).await
}

async fn lookup_key(partition: &Partition, cache_key: &str) -> Option<CachedResponse> {
    match partition.lookup(cache_key).await {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(partition = %partition.name(), error = %e, "cache read failed, treating as miss");
            None
        }
    }
}

/// Store a copy of a network response. Returns whether the write happened.
pub async fn store(partition: &Partition, request: &InterceptedRequest, response: &FetchResponse) -> bool {
    if !is_storable(request, response) {
        return false;
    }
    match partition.put(&response.to_cached(request.method.as_str())).await {
        Ok(_) => true,
        Err(e @ Error::QuotaExceeded(_)) => {
            tracing::warn!(partition = %partition.name(), url = %request.url, error = %e, "cache write abandoned");
            false
        }
        Err(e) => {
            tracing::warn!(partition = %partition.name(), url = %request.url, error = %e, "cache write failed");
            false
        }
    }
}

/// Serve from cache; on a miss fetch and store. Falls back to the cached
/// offline page when the network fails.
pub async fn cache_first(
    fetcher: &dyn Fetcher, partition: &Partition, request: &InterceptedRequest, offline_key: &str,
) -> Result<ServedResponse, Error> {
    if let Some(entry) = lookup(partition, request).await {
        tracing::debug!(url = %request.url, "static cache hit");
        return Ok(ServedResponse::from_cached(entry, ResponseSource::Cache));
    }

    match fetcher.fetch(request).await {
        Ok(response) => {
            store(partition, request, &response).await;
            Ok(ServedResponse::from_network(response, ResponseSource::Network))
        }
        Err(e) => match lookup_key(partition, offline_key).await {
            Some(offline) => {
                tracing::info!(url = %request.url, error = %e, "network unavailable, serving offline page");
                Ok(ServedResponse::from_cached(offline, ResponseSource::Offline))
            }
            None => Err(e),
        },
    }
}

/// Prefer the network within `timeout`; fall back to the stored copy.
pub async fn network_first(
    fetcher: &dyn Fetcher, partition: &Partition, request: &InterceptedRequest, timeout: Duration,
) -> Result<ServedResponse, Error> {
    match fetch_within(fetcher, request, Some(timeout)).await {
        Ok(response) => {
            store(partition, request, &response).await;
            Ok(ServedResponse::from_network(response, ResponseSource::Network))
        }
        Err(e) => match lookup(partition, request).await {
            Some(entry) => {
                tracing::info!(url = %request.url, error = %e, "network failed, serving cached response");
                Ok(ServedResponse::from_cached(entry, ResponseSource::Cache))
            }
            None => Err(e),
        },
    }
}

/// Serve any stored copy at once and refresh it in the background. Without a
/// stored copy this is `network_first` bounded by `timeout`.
pub async fn stale_while_revalidate(
    fetcher: &Arc<dyn Fetcher>, partition: &Partition, request: &InterceptedRequest, timeout: Duration,
    revalidations: &Revalidations,
) -> Result<ServedResponse, Error> {
    let Some(entry) = lookup(partition, request).await else {
        return network_first(fetcher.as_ref(), partition, request, timeout).await;
    };

    tracing::debug!(url = %request.url, "image cache hit, revalidating");

    let fetcher = Arc::clone(fetcher);
    let partition = partition.clone();
    let request = request.clone();
    revalidations
        .spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) => {
                    if store(&partition, &request, &response).await {
                        tracing::debug!(url = %request.url, "image refreshed");
                    }
                }
                Err(e) => tracing::warn!(url = %request.url, error = %e, "background refresh failed"),
            }
        })
        .await;

    Ok(ServedResponse::from_cached(entry, ResponseSource::Cache))
}

/// Forward without touching any partition.
pub async fn passthrough(fetcher: &dyn Fetcher, request: &InterceptedRequest) -> Result<ServedResponse, Error> {
    let response = fetcher.fetch(request).await?;
    Ok(ServedResponse::from_network(response, ResponseSource::Bypass))
}
