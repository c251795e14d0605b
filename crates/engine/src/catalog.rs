//! Store metadata lifecycle
//!
//! Stateless facade over the backing store's `stores` bucket. Records are
//! keyed by `store_id` alone (ids are unique within the namespace) and
//! carry an `@owner` index term so listing never scans.
//!
//! Store records can race into siblings like any other key; the catalog
//! resolves them last-write-wins internally and writes the pick back.
//! Schema changes are lazy: rows written before the change are left
//! as-is, rows written after conform to the new schema.

use std::sync::Arc;

use serde::Deserialize;

use shelf_core::{
    Error, KeyType, OwnerId, Result, SiblingStrategy, StoreId, StoreRecord, StoreSchema,
};
use shelf_storage::{
    with_retry, Bucket, IndexEntry, IndexQuery, IndexValue, KvBackend, RetryPolicy, StoredEntry,
    VersionToken,
};

use crate::indexer;

const OWNER_INDEX: &str = "@owner";

/// Fields a client may supply when creating a store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateStoreRequest {
    /// Client-supplied id; minted when absent
    #[serde(default)]
    pub store_id: Option<StoreId>,
    /// Row key interpretation tag
    #[serde(default)]
    pub key_type: Option<KeyType>,
    /// Conflict policy for the store's rows
    #[serde(default)]
    pub sibling_strategy: Option<SiblingStrategy>,
    /// Field declarations
    #[serde(default)]
    pub schema: Option<StoreSchema>,
    /// Reject undeclared fields
    #[serde(default)]
    pub strict: Option<bool>,
}

/// Partial store update; only supplied fields are touched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreUpdate {
    /// Replace the row key interpretation tag
    #[serde(default)]
    pub key_type: Option<KeyType>,
    /// Replace the conflict policy
    #[serde(default)]
    pub sibling_strategy: Option<SiblingStrategy>,
    /// Replace the schema (applies to subsequent writes only)
    #[serde(default)]
    pub schema: Option<StoreSchema>,
    /// Replace the strict-schema flag
    #[serde(default)]
    pub strict: Option<bool>,
}

impl StoreUpdate {
    fn is_empty(&self) -> bool {
        self.key_type.is_none()
            && self.sibling_strategy.is_none()
            && self.schema.is_none()
            && self.strict.is_none()
    }
}

/// Store metadata operations
#[derive(Clone)]
pub struct StoreCatalog {
    backend: Arc<dyn KvBackend>,
    retry: RetryPolicy,
}

impl StoreCatalog {
    /// New catalog over `backend`
    pub fn new(backend: Arc<dyn KvBackend>, retry: RetryPolicy) -> Self {
        StoreCatalog { backend, retry }
    }

    /// Create a store, minting an id unless the request supplies one
    pub async fn create_store(
        &self,
        owner: &OwnerId,
        request: CreateStoreRequest,
    ) -> Result<StoreRecord> {
        if let Some(schema) = &request.schema {
            schema.check_field_names()?;
        }
        let store_id = request.store_id.unwrap_or_else(StoreId::random);

        let existing = with_retry(self.retry, "store.create.check", || {
            self.backend.get(Bucket::Stores, store_id.as_str())
        })
        .await?;
        if !existing.is_empty() {
            return Err(Error::AlreadyExists(store_id));
        }

        let mut record = StoreRecord::new(store_id, owner.clone());
        if let Some(key_type) = request.key_type {
            record.key_type = key_type;
        }
        if let Some(strategy) = request.sibling_strategy {
            record.sibling_strategy = strategy;
        }
        if let Some(strict) = request.strict {
            record.strict = strict;
        }
        record.schema = request.schema;

        self.write_record(&record, &[]).await?;
        tracing::info!(owner = %owner, store_id = %record.store_id, "store created");
        Ok(record)
    }

    /// Fetch a store, resolving any metadata siblings along the way
    pub async fn get_store(&self, owner: &OwnerId, store_id: &StoreId) -> Result<StoreRecord> {
        let set = with_retry(self.retry, "store.get", || {
            self.backend.get(Bucket::Stores, store_id.as_str())
        })
        .await?;
        if set.is_empty() {
            return Err(Error::StoreNotFound(store_id.clone()));
        }

        let (record, stale) = Self::pick_record(store_id, set)?;
        if let Some(observed) = stale {
            // Read repair: collapse metadata siblings behind the pick.
            if let Err(err) = self.write_record(&record, &observed).await {
                tracing::warn!(store_id = %store_id, error = %err, "store read repair failed");
            }
        }

        if record.owner != *owner {
            return Err(Error::StoreNotFound(store_id.clone()));
        }
        Ok(record)
    }

    /// All stores belonging to `owner`, oldest first
    pub async fn list_stores(&self, owner: &OwnerId) -> Result<Vec<StoreRecord>> {
        let query = IndexQuery::Eq {
            name: OWNER_INDEX.to_string(),
            value: IndexValue::Str(owner.as_str().to_string()),
        };
        let hits = with_retry(self.retry, "store.list", || {
            self.backend.index_query(Bucket::Stores, &query)
        })
        .await?;

        let mut records = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.get_store(owner, &StoreId::new(hit.key)).await {
                Ok(record) => records.push(record),
                // Deleted between the index read and the fetch.
                Err(Error::StoreNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        records.sort_by(|a, b| {
            a.timestamps
                .created_at
                .cmp(&b.timestamps.created_at)
                .then_with(|| a.store_id.cmp(&b.store_id))
        });
        Ok(records)
    }

    /// Apply a partial update, bumping `modified_at`
    ///
    /// A schema change is not validated against existing rows; those stay
    /// untouched until their next write.
    pub async fn update_store(
        &self,
        owner: &OwnerId,
        store_id: &StoreId,
        update: StoreUpdate,
    ) -> Result<StoreRecord> {
        if let Some(schema) = &update.schema {
            schema.check_field_names()?;
        }

        let set = with_retry(self.retry, "store.update.read", || {
            self.backend.get(Bucket::Stores, store_id.as_str())
        })
        .await?;
        if set.is_empty() {
            return Err(Error::StoreNotFound(store_id.clone()));
        }
        let observed: Vec<VersionToken> = set.iter().map(|e| e.token).collect();
        let (mut record, _) = Self::pick_record(store_id, set)?;
        if record.owner != *owner {
            return Err(Error::StoreNotFound(store_id.clone()));
        }
        if update.is_empty() {
            return Ok(record);
        }

        if let Some(key_type) = update.key_type {
            record.key_type = key_type;
        }
        if let Some(strategy) = update.sibling_strategy {
            record.sibling_strategy = strategy;
        }
        if let Some(schema) = update.schema {
            record.schema = Some(schema);
        }
        if let Some(strict) = update.strict {
            record.strict = strict;
        }
        record.timestamps.touch();

        self.write_record(&record, &observed).await?;
        tracing::info!(owner = %owner, store_id = %store_id, "store updated");
        Ok(record)
    }

    /// Tombstone a store
    ///
    /// Rows become unreachable immediately because every row operation
    /// resolves the store first. Physical row cleanup is opportunistic:
    /// failures leave orphans for the backing store to collect.
    pub async fn delete_store(&self, owner: &OwnerId, store_id: &StoreId) -> Result<()> {
        // Scope check before the tombstone.
        self.get_store(owner, store_id).await?;
        with_retry(self.retry, "store.delete", || {
            self.backend.delete(Bucket::Stores, store_id.as_str())
        })
        .await?;
        tracing::info!(owner = %owner, store_id = %store_id, "store deleted");

        self.purge_rows(store_id).await;
        Ok(())
    }

    /// Best-effort deletion of a deleted store's rows
    async fn purge_rows(&self, store_id: &StoreId) {
        let query = IndexQuery::Range {
            name: indexer::created_index(store_id),
            lo: IndexValue::Num(f64::NEG_INFINITY),
            hi: IndexValue::Num(f64::INFINITY),
        };
        let hits = match self.backend.index_query(Bucket::Rows, &query).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(store_id = %store_id, error = %err, "row purge scan failed");
                return;
            }
        };
        for hit in hits {
            if let Err(err) = self.backend.delete(Bucket::Rows, &hit.key).await {
                tracing::warn!(store_id = %store_id, key = %hit.key, error = %err, "row purge failed");
            }
        }
    }

    /// LWW pick over store record siblings
    ///
    /// Returns the picked record plus the observed tokens when the set
    /// was divergent (signal to write the pick back).
    fn pick_record(
        store_id: &StoreId,
        set: Vec<StoredEntry>,
    ) -> Result<(StoreRecord, Option<Vec<VersionToken>>)> {
        let observed: Vec<VersionToken> = set.iter().map(|e| e.token).collect();
        let divergent = set.len() > 1;
        let mut records = set
            .into_iter()
            .map(|entry| {
                serde_json::from_value::<StoreRecord>(entry.value)
                    .map_err(|e| Error::Serialization(format!("store record {}: {}", store_id, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| {
            a.timestamps
                .modified_at
                .cmp(&b.timestamps.modified_at)
                .then_with(|| {
                    serde_json::to_string(a)
                        .unwrap_or_default()
                        .cmp(&serde_json::to_string(b).unwrap_or_default())
                })
        });
        let record = records.pop().ok_or_else(|| {
            Error::Internal(format!("empty version set for store {}", store_id))
        })?;
        Ok((record, divergent.then_some(observed)))
    }

    async fn write_record(&self, record: &StoreRecord, observed: &[VersionToken]) -> Result<()> {
        let value = serde_json::to_value(record)?;
        let indexes = vec![IndexEntry::new(
            OWNER_INDEX,
            IndexValue::Str(record.owner.as_str().to_string()),
        )];
        with_retry(self.retry, "store.write", || {
            self.backend.put(
                Bucket::Stores,
                record.store_id.as_str(),
                value.clone(),
                indexes.clone(),
                observed,
            )
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{FieldSpec, FieldType};
    use shelf_storage::MemoryBackend;

    fn catalog() -> StoreCatalog {
        StoreCatalog::new(Arc::new(MemoryBackend::new()), RetryPolicy::none())
    }

    fn owner() -> OwnerId {
        OwnerId::new("owner-1")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let catalog = catalog();
        let record = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();
        let fetched = catalog.get_store(&owner(), &record.store_id).await.unwrap();
        assert_eq!(record, fetched);
    }

    #[tokio::test]
    async fn test_create_with_supplied_id() {
        let catalog = catalog();
        let request = CreateStoreRequest {
            store_id: Some(StoreId::new("contacts")),
            ..Default::default()
        };
        let record = catalog.create_store(&owner(), request).await.unwrap();
        assert_eq!(record.store_id, StoreId::new("contacts"));
    }

    #[tokio::test]
    async fn test_create_collision_is_already_exists() {
        let catalog = catalog();
        let request = CreateStoreRequest {
            store_id: Some(StoreId::new("dup")),
            ..Default::default()
        };
        catalog.create_store(&owner(), request.clone()).await.unwrap();
        let err = catalog.create_store(&owner(), request).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_get_missing_store() {
        let catalog = catalog();
        let err = catalog
            .get_store(&owner(), &StoreId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let catalog = catalog();
        let record = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();
        let err = catalog
            .get_store(&OwnerId::new("other"), &record.store_id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)), "no cross-owner reads");
    }

    #[tokio::test]
    async fn test_list_stores_scoped_and_ordered() {
        let catalog = catalog();
        let a = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();
        let b = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();
        catalog
            .create_store(&OwnerId::new("other"), CreateStoreRequest::default())
            .await
            .unwrap();

        let listed = catalog.list_stores(&owner()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].store_id, a.store_id);
        assert_eq!(listed[1].store_id, b.store_id);
    }

    #[tokio::test]
    async fn test_update_touches_only_supplied_fields() {
        let catalog = catalog();
        let record = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();
        let update = StoreUpdate {
            sibling_strategy: Some(SiblingStrategy::Merge),
            ..Default::default()
        };
        let updated = catalog
            .update_store(&owner(), &record.store_id, update)
            .await
            .unwrap();
        assert_eq!(updated.sibling_strategy, SiblingStrategy::Merge);
        assert_eq!(updated.key_type, record.key_type);
        assert_eq!(updated.schema, record.schema);
        assert!(updated.timestamps.modified_at > record.timestamps.modified_at);
        assert_eq!(updated.timestamps.created_at, record.timestamps.created_at);
    }

    #[tokio::test]
    async fn test_update_schema_applies_forward_only() {
        let catalog = catalog();
        let record = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();
        let update = StoreUpdate {
            schema: Some(StoreSchema::from_fields([(
                "foo",
                FieldSpec::of(FieldType::Number),
            )])),
            ..Default::default()
        };
        let updated = catalog
            .update_store(&owner(), &record.store_id, update)
            .await
            .unwrap();
        assert!(updated.schema.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_store() {
        let catalog = catalog();
        let err = catalog
            .update_store(&owner(), &StoreId::new("nope"), StoreUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[tokio::test]
    async fn test_reserved_schema_names_rejected() {
        let catalog = catalog();
        let request = CreateStoreRequest {
            schema: Some(StoreSchema::from_fields([(
                "@created_at",
                FieldSpec::of(FieldType::Number),
            )])),
            ..Default::default()
        };
        let err = catalog.create_store(&owner(), request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let catalog = catalog();
        let record = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();
        catalog
            .delete_store(&owner(), &record.store_id)
            .await
            .unwrap();
        let err = catalog.get_store(&owner(), &record.store_id).await.unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_store() {
        let catalog = catalog();
        let err = catalog
            .delete_store(&owner(), &StoreId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[tokio::test]
    async fn test_metadata_siblings_resolve_lww() {
        let backend = Arc::new(MemoryBackend::new());
        let catalog = StoreCatalog::new(backend.clone(), RetryPolicy::none());
        let record = catalog
            .create_store(&owner(), CreateStoreRequest::default())
            .await
            .unwrap();

        // Second writer lands blind, creating a metadata sibling.
        let mut divergent = record.clone();
        divergent.sibling_strategy = SiblingStrategy::Merge;
        divergent.timestamps.touch();
        backend
            .put(
                Bucket::Stores,
                record.store_id.as_str(),
                serde_json::to_value(&divergent).unwrap(),
                vec![IndexEntry::new(
                    OWNER_INDEX,
                    IndexValue::Str(owner().as_str().to_string()),
                )],
                &[],
            )
            .await
            .unwrap();
        assert_eq!(backend.sibling_count(Bucket::Stores, record.store_id.as_str()), 2);

        let resolved = catalog.get_store(&owner(), &record.store_id).await.unwrap();
        assert_eq!(resolved.sibling_strategy, SiblingStrategy::Merge, "newer write wins");
        assert_eq!(
            backend.sibling_count(Bucket::Stores, record.store_id.as_str()),
            1,
            "read repair collapses the set"
        );
    }
}
