//! Cache entry CRUD and eviction.
//!
//! Entries are ordered by an autoincrement sequence, so "oldest" always means
//! oldest-inserted. Overwriting a key deletes the old row first, which moves
//! the key to the newest position.

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub cache_key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Build an entry stamped with the current time.
    pub fn new(method: &str, url: &str, status: u16, body: Vec<u8>) -> Self {
        Self {
            cache_key: compute_cache_key(method, url, ""),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status,
            content_type: None,
            headers: Vec::new(),
            body,
            stored_at: Utc::now(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone());
        self.headers = headers;
        self
    }

    pub fn stored_at(mut self, stored_at: DateTime<Utc>) -> Self {
        self.stored_at = stored_at;
        self
    }
}

fn quota_exceeded(total: i64, replaced: i64, incoming: i64, quota: u64) -> bool {
    let after = total.saturating_sub(replaced).saturating_add(incoming);
    after > 0 && after as u64 > quota
}

impl CacheDb {
    /// Insert or replace an entry in a partition.
    ///
    /// Runs in one transaction: the quota check, the removal of any previous
    /// row for the key, and the insert either all happen or none do.
    ///
    /// # Errors
    ///
    /// `Error::QuotaExceeded` if the configured quota would be exceeded or
    /// SQLite reports the disk full. The partition must already exist.
    pub async fn put_entry(&self, partition: &str, entry: &CachedResponse) -> Result<(), Error> {
        let partition = partition.to_string();
        let entry = entry.clone();
        let quota = self.quota_bytes;
        let headers_json =
            serde_json::to_string(&entry.headers).map_err(|e| Error::InvalidInput(format!("headers: {e}")))?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;

                if let Some(quota) = quota {
                    let total: i64 =
                        tx.query_row("SELECT COALESCE(SUM(LENGTH(body)), 0) FROM entries", [], |row| row.get(0))?;
                    let replaced: i64 = tx.query_row(
                        "SELECT COALESCE(SUM(LENGTH(body)), 0) FROM entries WHERE partition = ?1 AND cache_key = ?2",
                        params![partition, entry.cache_key],
                        |row| row.get(0),
                    )?;
                    if quota_exceeded(total, replaced, entry.body.len() as i64, quota) {
                        return Err(Error::QuotaExceeded(format!(
                            "{} bytes for {} would exceed quota of {} bytes",
                            entry.body.len(),
                            entry.url,
                            quota
                        )));
                    }
                }

                tx.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND cache_key = ?2",
                    params![partition, entry.cache_key],
                )?;
                tx.execute(
                    "INSERT INTO entries (
                    partition, cache_key, method, url, status, content_type, headers_json, body, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        partition,
                        entry.cache_key,
                        entry.method,
                        entry.url,
                        entry.status,
                        entry.content_type,
                        headers_json,
                        entry.body,
                        entry.stored_at.timestamp_millis(),
                    ],
                )?;

                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by cache key.
    ///
    /// Returns None if the key doesn't exist in the partition.
    pub async fn get_entry(&self, partition: &str, cache_key: &str) -> Result<Option<CachedResponse>, Error> {
        let partition = partition.to_string();
        let cache_key = cache_key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT cache_key, method, url, status, content_type, headers_json, body, stored_at
                    FROM entries WHERE partition = ?1 AND cache_key = ?2",
                )?;

                let result = stmt.query_row(params![partition, cache_key], |row| {
                    let headers_json: String = row.get(5)?;
                    let stored_at: i64 = row.get(7)?;
                    Ok(CachedResponse {
                        cache_key: row.get(0)?,
                        method: row.get(1)?,
                        url: row.get(2)?,
                        status: row.get(3)?,
                        content_type: row.get(4)?,
                        headers: serde_json::from_str(&headers_json).unwrap_or_default(),
                        body: row.get(6)?,
                        stored_at: DateTime::<Utc>::from_timestamp_millis(stored_at)
                            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    })
                });

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it did not exist.
    pub async fn delete_entry(&self, partition: &str, cache_key: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        let cache_key = cache_key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND cache_key = ?2",
                    params![partition, cache_key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn entry_count(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Cache keys of a partition, oldest-inserted first.
    pub async fn entry_keys(&self, partition: &str) -> Result<Vec<String>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT cache_key FROM entries WHERE partition = ?1 ORDER BY seq ASC")?;
                let keys = stmt.query_map(params![partition], |row| row.get(0))?;
                Ok(keys.collect::<Result<Vec<String>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Total size of all stored bodies, across partitions.
    pub async fn total_bytes(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let total: i64 =
                    conn.query_row("SELECT COALESCE(SUM(LENGTH(body)), 0) FROM entries", [], |row| row.get(0))?;
                Ok(total as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge oldest-inserted entries until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn evict_oldest(&self, partition: &str, max_entries: usize) -> Result<u64, Error> {
        let partition = partition.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE seq IN (
                    SELECT seq FROM entries WHERE partition = ?1 ORDER BY seq ASC LIMIT ?2
                )",
                    params![partition, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries stored strictly before `cutoff`.
    ///
    /// Returns the number of deleted entries.
    pub async fn evict_older_than(&self, partition: &str, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let partition = partition.to_string();
        let cutoff = cutoff.timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND stored_at < ?2",
                    params![partition, cutoff],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::partition::{PartitionName, Purpose};
    use chrono::TimeDelta;

    async fn db_with(name: &str) -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.ensure_partition(&name.parse::<PartitionName>().unwrap())
            .await
            .unwrap();
        db
    }

    fn entry(url: &str, body: &[u8]) -> CachedResponse {
        CachedResponse::new("GET", url, 200, body.to_vec())
            .with_headers(vec![("Content-Type".into(), "application/json".into())])
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = db_with("api-v1").await;
        let stored = entry("https://example.com/api/bookings", b"[]");

        db.put_entry("api-v1", &stored).await.unwrap();

        let retrieved = db.get_entry("api-v1", &stored.cache_key).await.unwrap().unwrap();
        assert_eq!(retrieved.url, stored.url);
        assert_eq!(retrieved.body, b"[]");
        assert_eq!(retrieved.content_type.as_deref(), Some("application/json"));
        assert_eq!(retrieved.headers, stored.headers);
        assert_eq!(retrieved.stored_at.timestamp_millis(), stored.stored_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = db_with("api-v1").await;
        assert!(db.get_entry("api-v1", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_isolated_by_partition() {
        let db = db_with("api-v1").await;
        db.ensure_partition(&PartitionName::new(Purpose::Api, "v2")).await.unwrap();
        let stored = entry("https://example.com/api/bookings", b"[]");
        db.put_entry("api-v1", &stored).await.unwrap();

        assert!(db.get_entry("api-v2", &stored.cache_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_requires_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.put_entry("api-v1", &entry("https://example.com/api/x", b"")).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_overwrite_moves_key_to_newest() {
        let db = db_with("api-v1").await;
        let a = entry("https://example.com/api/a", b"1");
        let b = entry("https://example.com/api/b", b"2");
        db.put_entry("api-v1", &a).await.unwrap();
        db.put_entry("api-v1", &b).await.unwrap();
        db.put_entry("api-v1", &entry("https://example.com/api/a", b"3")).await.unwrap();

        let keys = db.entry_keys("api-v1").await.unwrap();
        assert_eq!(keys, vec![b.cache_key.clone(), a.cache_key.clone()]);
        assert_eq!(db.get_entry("api-v1", &a.cache_key).await.unwrap().unwrap().body, b"3");
    }

    #[tokio::test]
    async fn test_evict_oldest_is_fifo() {
        let db = db_with("api-v1").await;
        for i in 0..5 {
            db.put_entry("api-v1", &entry(&format!("https://example.com/api/{i}"), b"x"))
                .await
                .unwrap();
        }
        // Reads must not affect eviction order.
        let first = entry("https://example.com/api/0", b"");
        for _ in 0..3 {
            db.get_entry("api-v1", &first.cache_key).await.unwrap();
        }

        assert_eq!(db.evict_oldest("api-v1", 3).await.unwrap(), 2);
        assert_eq!(db.evict_oldest("api-v1", 3).await.unwrap(), 0);
        assert!(db.get_entry("api-v1", &first.cache_key).await.unwrap().is_none());
        assert_eq!(db.entry_count("api-v1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_evict_older_than() {
        let db = db_with("images-v1").await;
        let now = Utc::now();
        let old = entry("https://example.com/images/old.jpg", b"o").stored_at(now - TimeDelta::days(31));
        let new = entry("https://example.com/images/new.jpg", b"n").stored_at(now - TimeDelta::days(1));
        db.put_entry("images-v1", &old).await.unwrap();
        db.put_entry("images-v1", &new).await.unwrap();

        let deleted = db.evict_older_than("images-v1", now - TimeDelta::days(30)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_entry("images-v1", &old.cache_key).await.unwrap().is_none());
        assert!(db.get_entry("images-v1", &new.cache_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_quota_rejects_write() {
        let db = db_with("static-v1").await.with_quota(8);
        db.put_entry("static-v1", &entry("https://example.com/a.js", b"12345")).await.unwrap();

        let result = db.put_entry("static-v1", &entry("https://example.com/b.js", b"12345")).await;
        assert!(matches!(result, Err(Error::QuotaExceeded(_))));
        assert_eq!(db.entry_count("static-v1").await.unwrap(), 1);
        assert_eq!(db.total_bytes().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_quota_counts_replaced_entry() {
        let db = db_with("static-v1").await.with_quota(8);
        db.put_entry("static-v1", &entry("https://example.com/a.js", b"12345")).await.unwrap();
        db.put_entry("static-v1", &entry("https://example.com/a.js", b"1234567")).await.unwrap();
        assert_eq!(db.total_bytes().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = db_with("api-v1").await;
        let stored = entry("https://example.com/api/a", b"1");
        db.put_entry("api-v1", &stored).await.unwrap();
        assert!(db.delete_entry("api-v1", &stored.cache_key).await.unwrap());
        assert!(!db.delete_entry("api-v1", &stored.cache_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_stored_at_round_trips_to_millis() {
        let db = db_with("images-v1").await;
        let stored_at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap() - TimeDelta::days(40);
        let e = entry("https://example.com/images/car1.jpg", b"").stored_at(stored_at);
        db.put_entry("images-v1", &e).await.unwrap();

        let loaded = db.get_entry("images-v1", &e.cache_key).await.unwrap().unwrap();
        assert_eq!(loaded.stored_at, stored_at);
    }
}
