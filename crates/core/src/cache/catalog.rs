//! Partition catalog operations.
//!
//! Tracks which partitions exist so activation can find and remove the ones
//! left behind by earlier versions.

use super::connection::CacheDb;
use super::partition::PartitionName;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A row of the partition catalog.
///
/// `name` is kept verbatim so rows that no longer parse can still be listed
/// and deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub name: String,
    pub purpose: String,
    pub version: String,
    pub created_at: String,
}

impl PartitionRecord {
    pub fn parsed_name(&self) -> Result<PartitionName, Error> {
        self.name.parse()
    }
}

impl CacheDb {
    /// Create a partition if it doesn't exist yet.
    ///
    /// Returns true if the partition was created by this call.
    pub async fn ensure_partition(&self, name: &PartitionName) -> Result<bool, Error> {
        let key = name.to_string();
        let purpose = name.purpose.as_str();
        let version = name.version.clone();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT INTO partitions (name, purpose, version, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(name) DO NOTHING",
                    params![key, purpose, version, created_at],
                )?;
                Ok(inserted == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// List every partition in creation order.
    pub async fn list_partitions(&self) -> Result<Vec<PartitionRecord>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PartitionRecord>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT name, purpose, version, created_at FROM partitions ORDER BY created_at, name",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(PartitionRecord {
                        name: row.get(0)?,
                        purpose: row.get(1)?,
                        version: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and, through the foreign key cascade, its entries.
    ///
    /// Returns false if no such partition existed.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entries::CachedResponse;
    use crate::cache::partition::Purpose;

    #[tokio::test]
    async fn test_ensure_partition_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let name = PartitionName::new(Purpose::Static, "v1");

        assert!(db.ensure_partition(&name).await.unwrap());
        assert!(!db.ensure_partition(&name).await.unwrap());

        let partitions = db.list_partitions().await.unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].name, "static-v1");
        assert_eq!(partitions[0].purpose, "static");
        assert_eq!(partitions[0].version, "v1");
        assert_eq!(partitions[0].parsed_name().unwrap(), name);
    }

    #[tokio::test]
    async fn test_delete_partition_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let name = PartitionName::new(Purpose::Api, "v1");
        db.ensure_partition(&name).await.unwrap();

        let entry = CachedResponse::new("GET", "https://example.com/api/bookings", 200, b"[]".to_vec());
        db.put_entry("api-v1", &entry).await.unwrap();
        assert_eq!(db.entry_count("api-v1").await.unwrap(), 1);

        assert!(db.delete_partition("api-v1").await.unwrap());
        assert!(!db.delete_partition("api-v1").await.unwrap());
        assert_eq!(db.entry_count("api-v1").await.unwrap(), 0);
        assert!(db.list_partitions().await.unwrap().is_empty());
    }
}
