//! Row CRUD
//!
//! Composes the validator, the index planner, and the resolver around the
//! backing store. Every operation resolves the owning store first, so a
//! deleted store makes its rows unreachable regardless of physical
//! retention.
//!
//! Writes carry the sibling tokens they observed: an update retracts the
//! versions it read (collapsing the set and the stale index terms in one
//! backend operation), while a concurrent update that read the same
//! versions legitimately lands as a new sibling. Losing a writer's data
//! silently is the failure mode this trades against.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelf_core::{Error, JsonMap, OwnerId, Result, Row, RowId, StoreId, StoreRecord, Timestamps};
use shelf_storage::{
    with_retry, Bucket, IndexHit, IndexQuery, IndexValue, KvBackend, RetryPolicy, StoredEntry,
    VersionToken,
};

use crate::catalog::StoreCatalog;
use crate::{indexer, resolver, validator};

/// Stored form of a row: data plus timestamps
///
/// The id lives in the backing key and the index terms live with the
/// entry, so neither is duplicated in the value.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    data: JsonMap,
}

/// One page of row ids plus the continuation token for the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIdPage {
    /// Row ids in creation order
    pub ids: Vec<RowId>,
    /// Opaque token resuming after the last id, absent on the final page
    pub next: Option<String>,
}

/// Continuation cursor wire form (base64 of this JSON)
#[derive(Debug, Serialize, Deserialize)]
struct Cursor {
    m: f64,
    k: String,
}

/// Row operations, scoped by (owner, store_id)
#[derive(Clone)]
pub struct RowRepository {
    backend: Arc<dyn KvBackend>,
    catalog: StoreCatalog,
    retry: RetryPolicy,
}

impl RowRepository {
    /// New repository over `backend`, sharing the catalog for store loads
    pub fn new(backend: Arc<dyn KvBackend>, catalog: StoreCatalog, retry: RetryPolicy) -> Self {
        RowRepository {
            backend,
            catalog,
            retry,
        }
    }

    /// The catalog this repository resolves stores through
    pub fn catalog(&self) -> &StoreCatalog {
        &self.catalog
    }

    /// Create a row, minting an id unless one is supplied
    ///
    /// The id is fixed before the first write attempt, so an internal
    /// retry (or a caller retry after cancellation) at worst lands an
    /// identical sibling, which the next read collapses.
    pub async fn create_row(
        &self,
        owner: &OwnerId,
        store_id: &StoreId,
        row_id: Option<RowId>,
        data: &JsonMap,
    ) -> Result<Row> {
        let store = self.catalog.get_store(owner, store_id).await?;
        let normalized = validator::validate(store.schema.as_ref(), store.strict, data)?;

        let row_id = row_id.unwrap_or_else(RowId::random);
        let timestamps = Timestamps::now();
        let entries = indexer::plan(store_id, store.schema.as_ref(), &normalized, &timestamps);
        let row = Row {
            row_id: row_id.clone(),
            store_id: store_id.clone(),
            timestamps,
            indexes: indexer::to_index_map(&entries),
            data: normalized,
        };

        self.write_row(&row, entries, &[]).await?;
        tracing::debug!(store_id = %store_id, row_id = %row_id, "row created");
        Ok(row)
    }

    /// Fetch a row, collapsing siblings per the store's strategy
    pub async fn get_row(&self, owner: &OwnerId, store_id: &StoreId, row_id: &RowId) -> Result<Row> {
        let store = self.catalog.get_store(owner, store_id).await?;
        let key = row_id.qualified(store_id);
        let set = with_retry(self.retry, "row.get", || {
            self.backend.get(Bucket::Rows, &key)
        })
        .await?;

        match set.len() {
            0 => Err(Error::RowNotFound(row_id.clone())),
            1 => Self::row_from_entry(store_id, row_id, &set[0]),
            _ => self.resolve_set(&store, row_id, set).await,
        }
    }

    /// Replace a row's data
    ///
    /// Re-validates against the store's current schema, retracts the
    /// index terms of every version it observed, and installs the new
    /// ones in the same backend operation. A concurrent update racing
    /// with this one produces a new sibling rather than losing data.
    pub async fn update_row(
        &self,
        owner: &OwnerId,
        store_id: &StoreId,
        row_id: &RowId,
        data: &JsonMap,
    ) -> Result<Row> {
        let store = self.catalog.get_store(owner, store_id).await?;
        let key = row_id.qualified(store_id);
        let set = with_retry(self.retry, "row.update.read", || {
            self.backend.get(Bucket::Rows, &key)
        })
        .await?;
        if set.is_empty() {
            return Err(Error::RowNotFound(row_id.clone()));
        }

        let normalized = validator::validate(store.schema.as_ref(), store.strict, data)?;
        let observed: Vec<VersionToken> = set.iter().map(|e| e.token).collect();
        let created_at = set
            .iter()
            .filter_map(|entry| {
                serde_json::from_value::<StoredRow>(entry.value.clone())
                    .ok()
                    .map(|stored| stored.created_at)
            })
            .min()
            .unwrap_or_else(Utc::now);
        let timestamps = Timestamps {
            created_at,
            modified_at: Utc::now(),
        };

        let entries = indexer::plan(store_id, store.schema.as_ref(), &normalized, &timestamps);
        let row = Row {
            row_id: row_id.clone(),
            store_id: store_id.clone(),
            timestamps,
            indexes: indexer::to_index_map(&entries),
            data: normalized,
        };

        self.write_row(&row, entries, &observed).await?;
        tracing::debug!(store_id = %store_id, row_id = %row_id, "row updated");
        Ok(row)
    }

    /// Remove a row and all its index terms
    ///
    /// Idempotent: deleting an absent row succeeds.
    pub async fn delete_row(
        &self,
        owner: &OwnerId,
        store_id: &StoreId,
        row_id: &RowId,
    ) -> Result<()> {
        self.catalog.get_store(owner, store_id).await?;
        let key = row_id.qualified(store_id);
        with_retry(self.retry, "row.delete", || {
            self.backend.delete(Bucket::Rows, &key)
        })
        .await?;
        tracing::debug!(store_id = %store_id, row_id = %row_id, "row deleted");
        Ok(())
    }

    /// One page of row ids in creation order
    ///
    /// `token` resumes a previous listing; the sequence is restartable
    /// and finite. Rows created after the cursor position appear in later
    /// pages; concurrent deletions simply vanish.
    pub async fn list_row_ids(
        &self,
        owner: &OwnerId,
        store_id: &StoreId,
        limit: usize,
        token: Option<&str>,
    ) -> Result<RowIdPage> {
        self.catalog.get_store(owner, store_id).await?;
        let mut hits = self.created_order_hits(store_id).await?;

        if let Some(token) = token {
            let cursor = decode_cursor(token)?;
            hits.retain(|hit| {
                let position = (hit_micros(hit), hit.key.as_str());
                position > (cursor.m, cursor.k.as_str())
            });
        }

        let has_more = hits.len() > limit;
        hits.truncate(limit);
        let next = if has_more {
            hits.last().map(|hit| {
                encode_cursor(&Cursor {
                    m: hit_micros(hit),
                    k: hit.key.clone(),
                })
            })
        } else {
            None
        };

        let ids = hits
            .iter()
            .filter_map(|hit| RowId::from_qualified(store_id, &hit.key))
            .collect();
        Ok(RowIdPage { ids, next })
    }

    /// Every row key of a store, ordered by creation time
    ///
    /// Shared with the query engine's free-text scan.
    pub(crate) async fn created_order_hits(&self, store_id: &StoreId) -> Result<Vec<IndexHit>> {
        let query = IndexQuery::Range {
            name: indexer::created_index(store_id),
            lo: IndexValue::Num(f64::NEG_INFINITY),
            hi: IndexValue::Num(f64::INFINITY),
        };
        let mut hits = with_retry(self.retry, "row.scan", || {
            self.backend.index_query(Bucket::Rows, &query)
        })
        .await?;
        hits.sort_by(|a, b| {
            a.value
                .cmp(&b.value)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(hits)
    }

    /// Fetch-and-resolve for a row key already read by a scan
    ///
    /// Identical semantics to [`RowRepository::get_row`], minus the store
    /// load the caller already did.
    pub(crate) async fn get_row_in(
        &self,
        store: &StoreRecord,
        row_id: &RowId,
    ) -> Result<Row> {
        let key = row_id.qualified(&store.store_id);
        let set = with_retry(self.retry, "row.get", || {
            self.backend.get(Bucket::Rows, &key)
        })
        .await?;
        match set.len() {
            0 => Err(Error::RowNotFound(row_id.clone())),
            1 => Self::row_from_entry(&store.store_id, row_id, &set[0]),
            _ => self.resolve_set(store, row_id, set).await,
        }
    }

    /// Collapse a divergent version set and write the resolution back
    async fn resolve_set(
        &self,
        store: &StoreRecord,
        row_id: &RowId,
        set: Vec<StoredEntry>,
    ) -> Result<Row> {
        let observed: Vec<VersionToken> = set.iter().map(|e| e.token).collect();
        let versions = set
            .iter()
            .map(|entry| Self::row_from_entry(&store.store_id, row_id, entry))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            store_id = %store.store_id,
            row_id = %row_id,
            siblings = versions.len(),
            strategy = ?store.sibling_strategy,
            "resolving version set"
        );

        let mut resolved = resolver::resolve(store.sibling_strategy, versions)?;
        // Terms come from the resolved data under the store's current
        // schema; sibling terms are never merged directly.
        let entries = indexer::plan(
            &store.store_id,
            store.schema.as_ref(),
            &resolved.data,
            &resolved.timestamps,
        );
        resolved.indexes = indexer::to_index_map(&entries);

        if let Err(err) = self.write_row(&resolved, entries, &observed).await {
            // The next read resolves again to the same answer; failing
            // the read over a write-back miss would help nobody.
            tracing::warn!(
                store_id = %store.store_id,
                row_id = %row_id,
                error = %err,
                "sibling write-back failed"
            );
        }
        Ok(resolved)
    }

    async fn write_row(
        &self,
        row: &Row,
        entries: Vec<shelf_storage::IndexEntry>,
        observed: &[VersionToken],
    ) -> Result<()> {
        let stored = StoredRow {
            created_at: row.timestamps.created_at,
            modified_at: row.timestamps.modified_at,
            data: row.data.clone(),
        };
        let value = serde_json::to_value(&stored)?;
        let key = row.row_id.qualified(&row.store_id);
        with_retry(self.retry, "row.write", || {
            self.backend.put(
                Bucket::Rows,
                &key,
                value.clone(),
                entries.clone(),
                observed,
            )
        })
        .await?;
        Ok(())
    }

    fn row_from_entry(store_id: &StoreId, row_id: &RowId, entry: &StoredEntry) -> Result<Row> {
        let stored: StoredRow = serde_json::from_value(entry.value.clone()).map_err(|e| {
            Error::Serialization(format!("row {}: {}", row_id.qualified(store_id), e))
        })?;
        let mut row = Row {
            row_id: row_id.clone(),
            store_id: store_id.clone(),
            timestamps: Timestamps {
                created_at: stored.created_at,
                modified_at: stored.modified_at,
            },
            indexes: Default::default(),
            data: stored.data,
        };
        row.indexes = indexer::to_index_map(&entry.indexes);
        Ok(row)
    }
}

fn hit_micros(hit: &IndexHit) -> f64 {
    match hit.value {
        IndexValue::Num(n) => n,
        IndexValue::Str(_) => f64::NEG_INFINITY,
    }
}

fn encode_cursor(cursor: &Cursor) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(cursor).unwrap_or_default())
}

fn decode_cursor(token: &str) -> Result<Cursor> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| Error::InvalidToken(token.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|_| Error::InvalidToken(token.to_string()))
}
