//! SQLite-backed storage for versioned cache partitions.
//!
//! This module provides a persistent response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named partitions scoped to a purpose and a version token
//! - Insertion-ordered entries keyed by SHA-256 request keys
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Count (FIFO) and age eviction, plus a byte quota on cached bodies

pub mod catalog;
pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod partition;

pub use crate::Error;

pub use catalog::PartitionRecord;
pub use connection::CacheDb;
pub use entries::CachedResponse;
pub use partition::{Partition, PartitionName, PartitionPolicy, Purpose};
