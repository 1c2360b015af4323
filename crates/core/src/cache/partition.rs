//! Partition identity and eviction policy.
//!
//! A partition is named `{purpose}-{version}`. Exactly one partition per
//! purpose is live for a given version; older versions are removed when the
//! manager activates.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::connection::CacheDb;
use super::entries::CachedResponse;
use crate::Error;

/// What a partition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Static,
    Api,
    Images,
}

impl Purpose {
    pub const ALL: [Purpose; 3] = [Purpose::Static, Purpose::Api, Purpose::Images];

    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Static => "static",
            Purpose::Api => "api",
            Purpose::Images => "images",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Purpose::Static),
            "api" => Ok(Purpose::Api),
            "images" => Ok(Purpose::Images),
            other => Err(Error::InvalidPartition(format!("unknown purpose: {other}"))),
        }
    }
}

/// Partition identity: `(purpose, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionName {
    pub purpose: Purpose,
    pub version: String,
}

impl PartitionName {
    pub fn new(purpose: Purpose, version: impl Into<String>) -> Self {
        Self { purpose, version: version.into() }
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.purpose, self.version)
    }
}

impl FromStr for PartitionName {
    type Err = Error;

    /// Split at the first `-`; the version token may contain further dashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (purpose, version) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidPartition(format!("missing version token: {s}")))?;
        if version.is_empty() {
            return Err(Error::InvalidPartition(format!("empty version token: {s}")));
        }
        Ok(Self { purpose: purpose.parse()?, version: version.to_string() })
    }
}

/// Bounds applied after every write to a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionPolicy {
    /// Keep at most this many entries, dropping the oldest-inserted first.
    pub max_entries: Option<usize>,
    /// Drop entries stored longer ago than this.
    pub max_age: Option<Duration>,
}

impl PartitionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Oldest `stored_at` that survives at `now`, if an age bound applies.
    pub fn age_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let max_age = self.max_age?;
        let delta = TimeDelta::from_std(max_age).ok()?;
        now.checked_sub_signed(delta)
    }
}

/// Handle to one partition of the store.
///
/// Strategies receive this handle explicitly; it carries the policy so every
/// write through it is followed by eviction.
#[derive(Debug, Clone)]
pub struct Partition {
    db: CacheDb,
    name: PartitionName,
    key: String,
    policy: PartitionPolicy,
}

impl Partition {
    pub fn new(db: CacheDb, name: PartitionName, policy: PartitionPolicy) -> Self {
        let key = name.to_string();
        Self { db, name, key, policy }
    }

    pub fn name(&self) -> &PartitionName {
        &self.name
    }

    pub fn policy(&self) -> &PartitionPolicy {
        &self.policy
    }

    /// Look up a stored response by cache key, ignoring its age.
    pub async fn lookup(&self, cache_key: &str) -> Result<Option<CachedResponse>, Error> {
        self.db.get_entry(&self.key, cache_key).await
    }

    /// Store a response and apply the partition policy.
    ///
    /// Returns the number of entries evicted by the policy.
    pub async fn put(&self, response: &CachedResponse) -> Result<u64, Error> {
        self.db.put_entry(&self.key, response).await?;
        self.enforce_at(Utc::now()).await
    }

    pub async fn delete(&self, cache_key: &str) -> Result<bool, Error> {
        self.db.delete_entry(&self.key, cache_key).await
    }

    pub async fn len(&self) -> Result<u64, Error> {
        self.db.entry_count(&self.key).await
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }

    /// Cache keys in insertion order, oldest first.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.db.entry_keys(&self.key).await
    }

    /// Apply count and age bounds as of `now`.
    pub async fn enforce_at(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut evicted = 0;
        if let Some(max) = self.policy.max_entries {
            evicted += self.db.evict_oldest(&self.key, max).await?;
        }
        if let Some(cutoff) = self.policy.age_cutoff(now) {
            evicted += self.db.evict_older_than(&self.key, cutoff).await?;
        }
        if evicted > 0 {
            tracing::debug!(partition = %self.key, evicted, "evicted entries");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(url: &str, stored_at: DateTime<Utc>) -> CachedResponse {
        CachedResponse::new("GET", url, 200, b"body".to_vec()).stored_at(stored_at)
    }

    async fn partition(policy: PartitionPolicy) -> Partition {
        let db = CacheDb::open_in_memory().await.unwrap();
        let name = PartitionName::new(Purpose::Api, "v1");
        db.ensure_partition(&name).await.unwrap();
        Partition::new(db, name, policy)
    }

    #[test]
    fn test_partition_name_display() {
        assert_eq!(PartitionName::new(Purpose::Static, "v1").to_string(), "static-v1");
        assert_eq!(PartitionName::new(Purpose::Api, "v1").to_string(), "api-v1");
        assert_eq!(PartitionName::new(Purpose::Images, "v1").to_string(), "images-v1");
    }

    #[test]
    fn test_partition_name_parse() {
        let name: PartitionName = "images-2024-06-01".parse().unwrap();
        assert_eq!(name.purpose, Purpose::Images);
        assert_eq!(name.version, "2024-06-01");
    }

    #[test]
    fn test_partition_name_parse_invalid() {
        assert!(matches!("static".parse::<PartitionName>(), Err(Error::InvalidPartition(_))));
        assert!(matches!("static-".parse::<PartitionName>(), Err(Error::InvalidPartition(_))));
        assert!(matches!("fonts-v1".parse::<PartitionName>(), Err(Error::InvalidPartition(_))));
    }

    #[test]
    fn test_age_cutoff() {
        let now = Utc::now();
        assert_eq!(PartitionPolicy::unbounded().age_cutoff(now), None);

        let policy = PartitionPolicy::unbounded().with_max_age(Duration::from_secs(60));
        assert_eq!(policy.age_cutoff(now), Some(now - TimeDelta::seconds(60)));
    }

    #[tokio::test]
    async fn test_put_enforces_max_entries() {
        let partition = partition(PartitionPolicy::unbounded().with_max_entries(2)).await;
        let now = Utc::now();
        for i in 0..3 {
            partition.put(&response(&format!("https://example.com/api/{i}"), now)).await.unwrap();
        }

        assert_eq!(partition.len().await.unwrap(), 2);
        let first = CachedResponse::new("GET", "https://example.com/api/0", 200, Vec::new());
        assert!(partition.lookup(&first.cache_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enforce_max_age() {
        let partition = partition(PartitionPolicy::unbounded().with_max_age(Duration::from_secs(3600))).await;
        let now = Utc::now();
        let old = response("https://example.com/old.png", now - TimeDelta::hours(2));
        let fresh = response("https://example.com/new.png", now);
        partition.put(&old).await.unwrap();
        partition.put(&fresh).await.unwrap();

        assert!(partition.lookup(&old.cache_key).await.unwrap().is_none());
        assert!(partition.lookup(&fresh.cache_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_is_empty() {
        let partition = partition(PartitionPolicy::unbounded()).await;
        assert!(partition.is_empty().await.unwrap());
        partition.put(&response("https://example.com/a", Utc::now())).await.unwrap();
        assert!(!partition.is_empty().await.unwrap());
        let key = CachedResponse::new("GET", "https://example.com/a", 200, Vec::new()).cache_key;
        assert!(partition.delete(&key).await.unwrap());
        assert!(partition.is_empty().await.unwrap());
    }
}
