//! Client side of swcache.
//!
//! This crate provides the network fetch pipeline and the cache lifecycle
//! manager that decides, per request, whether the cache or the network answers.

pub mod fetch;
pub mod manager;
pub mod request;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, FetchResponse, Fetcher};
pub use manager::{
    CacheManager, Classifier, InstallReport, Lifecycle, ManagerConfig, ResponseSource, ServedResponse, Strategy,
};
pub use request::{Destination, InterceptedRequest};
