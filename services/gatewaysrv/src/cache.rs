//! TTL cache for catalog partitions
//!
//! The handoff between the catalog loader (single writer, whole-partition
//! replacement) and the supervisor/workers (many readers). Expired entries
//! are purged lazily on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::catalog::{Device, Partition};

#[derive(Debug)]
struct CacheEntry {
    devices: Arc<Vec<Device>>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Keyed TTL map over the catalog partitions.
#[derive(Debug, Default)]
pub struct CatalogCache {
    entries: RwLock<HashMap<Partition, CacheEntry>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a partition wholesale.
    pub async fn set(&self, partition: Partition, devices: Vec<Device>, ttl: Duration) {
        let entry = CacheEntry {
            devices: Arc::new(devices),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(partition, entry);
    }

    /// Current value of a partition, or `None` once expired.
    pub async fn get(&self, partition: Partition) -> Option<Arc<Vec<Device>>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&partition) {
                if !entry.is_expired() {
                    return Some(Arc::clone(&entry.devices));
                }
            } else {
                return None;
            }
        }

        // Entry existed but expired: purge it.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(&partition) {
            if entry.is_expired() {
                entries.remove(&partition);
            } else {
                // Refreshed between the read and write locks
                return Some(Arc::clone(&entry.devices));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = CatalogCache::new();
        cache
            .set(Partition::ModbusDevices, Vec::new(), Duration::from_secs(60))
            .await;

        let devices = cache.get(Partition::ModbusDevices).await.expect("cached");
        assert!(devices.is_empty());
        assert!(cache.get(Partition::OpcUaSubDevices).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_purged() {
        let cache = CatalogCache::new();
        cache
            .set(
                Partition::ModbusDevices,
                Vec::new(),
                Duration::from_millis(20),
            )
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get(Partition::ModbusDevices).await.is_none());
        // A second read hits the now-purged map
        assert!(cache.get(Partition::ModbusDevices).await.is_none());
    }

    #[tokio::test]
    async fn test_replacement_resets_ttl() {
        let cache = CatalogCache::new();
        cache
            .set(
                Partition::ModbusDevices,
                Vec::new(),
                Duration::from_millis(20),
            )
            .await;
        cache
            .set(Partition::ModbusDevices, Vec::new(), Duration::from_secs(60))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get(Partition::ModbusDevices).await.is_some());
    }
}
