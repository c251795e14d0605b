//! Identifier and metadata types
//!
//! Identifiers are opaque strings. Freshly minted ids use the simple
//! (hyphen-free) hex form of a v4 UUID, which keeps them safe inside the
//! composed row keys produced by [`RowId::qualified`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the account that owns a set of stores
///
/// Owners are assigned by an external authentication layer; this service
/// only scopes operations by them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap an owner identifier
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        OwnerId(s.to_string())
    }
}

/// Unique identifier for a store, assigned at creation and immutable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    /// Wrap an existing store identifier
    pub fn new(id: impl Into<String>) -> Self {
        StoreId(id.into())
    }

    /// Mint a fresh random store identifier
    pub fn random() -> Self {
        StoreId(Uuid::new_v4().simple().to_string())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StoreId {
    fn from(s: &str) -> Self {
        StoreId(s.to_string())
    }
}

/// Per-store unique row identifier
///
/// A `RowId` is the suffix unique within one store. The globally unique
/// backing key is the composition `"{store_id}:{row_id}"` produced by
/// [`RowId::qualified`]; [`RowId::from_qualified`] splits it back apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    /// Wrap an existing row identifier
    pub fn new(id: impl Into<String>) -> Self {
        RowId(id.into())
    }

    /// Mint a fresh random row identifier
    pub fn random() -> Self {
        RowId(Uuid::new_v4().simple().to_string())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compose the globally unique backing key for this row
    pub fn qualified(&self, store_id: &StoreId) -> String {
        format!("{}:{}", store_id, self.0)
    }

    /// Split a backing key back into its row identifier
    ///
    /// Returns `None` when the key does not belong to `store_id`.
    pub fn from_qualified(store_id: &StoreId, key: &str) -> Option<Self> {
        let (prefix, suffix) = key.split_once(':')?;
        if prefix != store_id.as_str() {
            return None;
        }
        Some(RowId(suffix.to_string()))
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        RowId(s.to_string())
    }
}

/// Creation and modification times carried by stores and rows
///
/// `created_at` is set once; `modified_at` is bumped by [`Timestamps::touch`]
/// on every successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Time the record was first written
    pub created_at: DateTime<Utc>,
    /// Time of the most recent write
    pub modified_at: DateTime<Utc>,
}

impl Timestamps {
    /// Both timestamps set to the current instant
    pub fn now() -> Self {
        let now = Utc::now();
        Timestamps {
            created_at: now,
            modified_at: now,
        }
    }

    /// Bump `modified_at` to the current instant
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Policy selecting how concurrent versions of one row collapse
///
/// Concurrent writers that do not observe each other's writes leave more
/// than one version behind. The strategy is store-level and mutable only
/// through an explicit store update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SiblingStrategy {
    /// Deterministic pick: latest `modified_at`, tie-broken by a stable
    /// secondary key over the row contents
    #[default]
    #[serde(rename = "none")]
    LastWriteWins,
    /// Field-level union with per-field most-recent-wins on disagreement
    #[serde(rename = "merge")]
    Merge,
    /// Decline to resolve; surfaces an error the caller may retry after
    #[serde(rename = "reject")]
    Reject,
}

/// Semantic tag describing how row keys should be interpreted by clients
///
/// Structurally inert: the engine never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Row keys are contact identifiers
    Contact,
    /// Row keys carry no declared meaning
    #[default]
    Untyped,
}
