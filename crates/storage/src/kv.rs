//! Backend contract: version sets and secondary indexes
//!
//! ## Version sets
//!
//! A read returns every sibling currently stored under a key. A write
//! names the sibling tokens it observed; the backend atomically retracts
//! exactly those and installs the new entry. Writers that observed
//! nothing (or stale tokens) therefore leave concurrent entries in
//! place, producing a sibling rather than losing data.
//!
//! ## Index terms
//!
//! Index entries travel with the entry they describe. Replacing an entry
//! replaces its terms in the same operation, so no reader observes a key
//! indexed under both old and new values beyond the backend's own
//! consistency window.

use async_trait::async_trait;
use std::cmp::Ordering;

use shelf_core::Result;

/// Logical namespace within the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Store metadata records
    Stores,
    /// Row records
    Rows,
}

impl Bucket {
    /// Bucket name as used in backend keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Stores => "stores",
            Bucket::Rows => "rows",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque token naming one stored sibling
///
/// Tokens are backend-assigned and only meaningful to the backend that
/// issued them. A write that passes tokens back asserts "I observed
/// these"; the backend collapses exactly those siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionToken(pub u64);

/// One stored sibling: the value plus the index terms derived from it
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Token naming this sibling
    pub token: VersionToken,
    /// The stored value
    pub value: serde_json::Value,
    /// Index terms installed with this sibling
    pub indexes: Vec<IndexEntry>,
}

/// Every sibling currently stored under one key
pub type VersionSet = Vec<StoredEntry>;

/// A value a key can be indexed under
///
/// Two families, mirroring binary and integer index terms in secondary
/// index stores: strings compare lexicographically, numbers by total
/// order (`f64::total_cmp`). Numbers sort before strings so ranges never
/// straddle the families.
#[derive(Debug, Clone)]
pub enum IndexValue {
    /// Lexicographically ordered term
    Str(String),
    /// Numerically ordered term
    Num(f64),
}

impl IndexValue {
    fn family(&self) -> u8 {
        match self {
            IndexValue::Num(_) => 0,
            IndexValue::Str(_) => 1,
        }
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexValue::Num(a), IndexValue::Num(b)) => a.total_cmp(b),
            (IndexValue::Str(a), IndexValue::Str(b)) => a.cmp(b),
            _ => self.family().cmp(&other.family()),
        }
    }
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexValue::Str(s) => write!(f, "{}", s),
            IndexValue::Num(n) => write!(f, "{}", n),
        }
    }
}

/// A named index term attached to a stored entry
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Index name; namespaced by the caller so stores never collide
    pub name: String,
    /// Term value
    pub value: IndexValue,
}

impl IndexEntry {
    /// Convenience constructor
    pub fn new(name: impl Into<String>, value: IndexValue) -> Self {
        IndexEntry {
            name: name.into(),
            value,
        }
    }
}

/// Secondary-index lookup
#[derive(Debug, Clone)]
pub enum IndexQuery {
    /// Keys whose term under `name` equals `value`
    Eq {
        /// Index name
        name: String,
        /// Term to match
        value: IndexValue,
    },
    /// Keys with a term under `name` in `[lo, hi]` (inclusive)
    Range {
        /// Index name
        name: String,
        /// Lower bound
        lo: IndexValue,
        /// Upper bound
        hi: IndexValue,
    },
}

impl IndexQuery {
    /// The index name this query targets
    pub fn index_name(&self) -> &str {
        match self {
            IndexQuery::Eq { name, .. } | IndexQuery::Range { name, .. } => name,
        }
    }

    /// Whether `value` satisfies this query's predicate
    pub fn matches(&self, value: &IndexValue) -> bool {
        match self {
            IndexQuery::Eq { value: want, .. } => value == want,
            IndexQuery::Range { lo, hi, .. } => value >= lo && value <= hi,
        }
    }
}

/// A key matched by an index query, with the term that matched
///
/// Returning the term lets callers order and paginate results without a
/// read per key.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// The matching key
    pub key: String,
    /// The term under which it matched
    pub value: IndexValue,
}

/// The backing store contract
///
/// Implementations must be safe for unbounded concurrent use; the engine
/// holds no locks of its own. All methods may suspend on I/O and must
/// tolerate cancellation: a dropped `put` future may or may not have
/// landed, which the engine treats as "unknown" (a safe state, since a
/// retried write at worst produces an additional sibling).
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read the full version set stored under a key
    ///
    /// An absent key is an empty set, not an error.
    async fn get(&self, bucket: Bucket, key: &str) -> Result<VersionSet>;

    /// Install a new entry, retracting the observed siblings
    ///
    /// `observed` carries the tokens of every sibling the writer read
    /// before producing `value`. Those siblings and their index terms are
    /// removed and the new entry installed atomically. Tokens no longer
    /// present are ignored.
    async fn put(
        &self,
        bucket: Bucket,
        key: &str,
        value: serde_json::Value,
        indexes: Vec<IndexEntry>,
        observed: &[VersionToken],
    ) -> Result<VersionToken>;

    /// Remove a key: every sibling and all their index terms
    ///
    /// Idempotent; deleting an absent key succeeds.
    async fn delete(&self, bucket: Bucket, key: &str) -> Result<()>;

    /// Keys whose index terms satisfy the query
    ///
    /// Results are deduplicated by key (a key with several matching
    /// siblings appears once, under its smallest matching term) and carry
    /// no ordering guarantee.
    async fn index_query(&self, bucket: Bucket, query: &IndexQuery) -> Result<Vec<IndexHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_value_numeric_order() {
        assert!(IndexValue::Num(1.0) < IndexValue::Num(2.0));
        assert!(IndexValue::Num(-1.0) < IndexValue::Num(0.0));
    }

    #[test]
    fn test_index_value_string_order() {
        assert!(IndexValue::Str("a".into()) < IndexValue::Str("b".into()));
    }

    #[test]
    fn test_numbers_sort_before_strings() {
        assert!(IndexValue::Num(f64::MAX) < IndexValue::Str(String::new()));
    }

    #[test]
    fn test_eq_query_matches() {
        let q = IndexQuery::Eq {
            name: "s:foo".into(),
            value: IndexValue::Num(1.0),
        };
        assert!(q.matches(&IndexValue::Num(1.0)));
        assert!(!q.matches(&IndexValue::Num(2.0)));
        assert!(!q.matches(&IndexValue::Str("1".into())));
    }

    #[test]
    fn test_range_query_inclusive_bounds() {
        let q = IndexQuery::Range {
            name: "s:n".into(),
            lo: IndexValue::Num(1.0),
            hi: IndexValue::Num(3.0),
        };
        assert!(q.matches(&IndexValue::Num(1.0)));
        assert!(q.matches(&IndexValue::Num(3.0)));
        assert!(!q.matches(&IndexValue::Num(3.5)));
    }
}
