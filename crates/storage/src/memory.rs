//! In-memory reference backend
//!
//! DashMap keyed by (bucket, key); each slot holds the key's version set.
//! Mutations take the slot's shard lock, so retract-and-install is atomic
//! per key. Index queries scan the bucket, which is adequate for a
//! reference backend and for tests; a production backend answers them
//! from real secondary indexes.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use shelf_core::Result;

use crate::kv::{
    Bucket, IndexEntry, IndexHit, IndexQuery, KvBackend, StoredEntry, VersionSet, VersionToken,
};

/// In-memory [`KvBackend`]
///
/// Safe for unbounded concurrent use. Sibling semantics match the
/// contract exactly: a put retracts only the tokens it observed, so two
/// writers racing from the same observed state leave two siblings.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: DashMap<(Bucket, String), VersionSet>,
    next_token: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    fn mint_token(&self) -> VersionToken {
        VersionToken(self.next_token.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Total number of live siblings across all keys (diagnostics)
    pub fn total_entries(&self) -> usize {
        self.slots.iter().map(|slot| slot.value().len()).sum()
    }

    /// Number of siblings currently stored under one key (diagnostics)
    pub fn sibling_count(&self, bucket: Bucket, key: &str) -> usize {
        self.slots
            .get(&(bucket, key.to_string()))
            .map(|slot| slot.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, bucket: Bucket, key: &str) -> Result<VersionSet> {
        Ok(self
            .slots
            .get(&(bucket, key.to_string()))
            .map(|slot| slot.clone())
            .unwrap_or_default())
    }

    async fn put(
        &self,
        bucket: Bucket,
        key: &str,
        value: serde_json::Value,
        indexes: Vec<IndexEntry>,
        observed: &[VersionToken],
    ) -> Result<VersionToken> {
        let token = self.mint_token();
        let mut slot = self.slots.entry((bucket, key.to_string())).or_default();
        slot.retain(|entry| !observed.contains(&entry.token));
        slot.push(StoredEntry {
            token,
            value,
            indexes,
        });
        if slot.len() > 1 {
            tracing::debug!(bucket = %bucket, key, siblings = slot.len(), "sibling created");
        }
        Ok(token)
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<()> {
        self.slots.remove(&(bucket, key.to_string()));
        Ok(())
    }

    async fn index_query(&self, bucket: Bucket, query: &IndexQuery) -> Result<Vec<IndexHit>> {
        // Dedup by key, keeping the smallest matching term so pagination
        // cursors are stable across repeated queries.
        let mut hits: BTreeMap<String, IndexHit> = BTreeMap::new();
        for slot in self.slots.iter() {
            let (slot_bucket, key) = slot.key();
            if *slot_bucket != bucket {
                continue;
            }
            for entry in slot.value() {
                for index in &entry.indexes {
                    if index.name != query.index_name() || !query.matches(&index.value) {
                        continue;
                    }
                    let hit = IndexHit {
                        key: key.clone(),
                        value: index.value.clone(),
                    };
                    match hits.get(key) {
                        Some(existing) if existing.value <= hit.value => {}
                        _ => {
                            hits.insert(key.clone(), hit);
                        }
                    }
                }
            }
        }
        Ok(hits.into_values().collect())
    }
}
