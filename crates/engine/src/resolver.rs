//! Sibling resolution
//!
//! Collapses a version set (two or more divergent rows sharing one id)
//! into a single logical row, per the owning store's strategy. Invoked
//! lazily by reads that observe more than one version; never
//! speculatively, never on a set of one.
//!
//! Determinism is the whole contract here: concurrent readers resolving
//! the same version set must produce identical rows, or the write-back
//! race would manufacture fresh divergence. The total order used
//! everywhere is (`modified_at`, canonical data serialization).

use shelf_core::{Error, JsonMap, Result, Row, SiblingStrategy};

/// Collapse `versions` into one logical row
///
/// The caller must recompute the resolved row's index terms from its
/// `data`; terms are never merged directly. The returned row's `indexes`
/// are cleared to make that explicit.
pub fn resolve(strategy: SiblingStrategy, mut versions: Vec<Row>) -> Result<Row> {
    // Callers only invoke this on divergence; a singleton passes through
    // so a racy caller cannot manufacture a conflict error from one.
    match versions.len() {
        0 => {
            return Err(Error::Internal(
                "resolve called with empty version set".to_string(),
            ))
        }
        1 => return Ok(versions.remove(0)),
        _ => {}
    }

    match strategy {
        SiblingStrategy::Reject => Err(Error::UnresolvedConflict(versions[0].row_id.clone())),
        SiblingStrategy::LastWriteWins => Ok(last_write_wins(versions)),
        SiblingStrategy::Merge => Ok(merge(versions)),
    }
}

/// Deterministic pick: latest `modified_at`, ties broken by canonical
/// data serialization
fn last_write_wins(versions: Vec<Row>) -> Row {
    let mut winner = versions
        .into_iter()
        .max_by(|a, b| {
            a.timestamps
                .modified_at
                .cmp(&b.timestamps.modified_at)
                .then_with(|| a.canonical_data().cmp(&b.canonical_data()))
        })
        .expect("non-empty version set");
    winner.indexes.clear();
    winner
}

/// Field-level union
///
/// Fields present in exactly one version survive unchanged. Fields
/// present in several versions with differing values take the value from
/// the most recent version (same total order as the LWW pick), rather
/// than one version winning wholesale. `created_at` is the earliest
/// across versions, `modified_at` the latest.
fn merge(mut versions: Vec<Row>) -> Row {
    // Ascending order, so later iterations overwrite with newer values.
    versions.sort_by(|a, b| {
        a.timestamps
            .modified_at
            .cmp(&b.timestamps.modified_at)
            .then_with(|| a.canonical_data().cmp(&b.canonical_data()))
    });

    let created_at = versions
        .iter()
        .map(|v| v.timestamps.created_at)
        .min()
        .expect("non-empty version set");

    let mut data = JsonMap::new();
    for version in &versions {
        for (field, value) in &version.data {
            data.insert(field.clone(), value.clone());
        }
    }

    let newest = versions.pop().expect("non-empty version set");
    let mut merged = newest;
    merged.data = data;
    merged.timestamps.created_at = created_at;
    merged.indexes.clear();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use shelf_core::{IndexMap, RowId, StoreId, Timestamps};

    fn version(data: serde_json::Value, modified_offset_secs: i64) -> Row {
        let base = Utc::now();
        Row {
            row_id: RowId::new("r1"),
            store_id: StoreId::new("s1"),
            timestamps: Timestamps {
                created_at: base,
                modified_at: base + Duration::seconds(modified_offset_secs),
            },
            indexes: IndexMap::new(),
            data: data.as_object().expect("object literal").clone(),
        }
    }

    #[test]
    fn test_lww_picks_latest_modified() {
        let older = version(json!({"v": 1}), 0);
        let newer = version(json!({"v": 2}), 10);
        let resolved = resolve(SiblingStrategy::LastWriteWins, vec![older, newer]).unwrap();
        assert_eq!(resolved.data.get("v"), Some(&json!(2)));
    }

    #[test]
    fn test_lww_tie_break_is_deterministic() {
        let a = version(json!({"v": "a"}), 0);
        let b = version(json!({"v": "b"}), 0);
        // Equal modified_at in both orders yields the same winner.
        let first = resolve(SiblingStrategy::LastWriteWins, vec![a.clone(), b.clone()]).unwrap();
        let second = resolve(SiblingStrategy::LastWriteWins, vec![b, a]).unwrap();
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn test_merge_unions_disjoint_fields() {
        let a = version(json!({"left": 1}), 0);
        let b = version(json!({"right": 2}), 1);
        let merged = resolve(SiblingStrategy::Merge, vec![a, b]).unwrap();
        assert_eq!(merged.data.get("left"), Some(&json!(1)));
        assert_eq!(merged.data.get("right"), Some(&json!(2)));
    }

    #[test]
    fn test_merge_conflicting_field_takes_most_recent() {
        let older = version(json!({"shared": "old", "only_old": true}), 0);
        let newer = version(json!({"shared": "new"}), 5);
        let merged = resolve(SiblingStrategy::Merge, vec![newer, older]).unwrap();
        assert_eq!(merged.data.get("shared"), Some(&json!("new")));
        assert_eq!(merged.data.get("only_old"), Some(&json!(true)));
    }

    #[test]
    fn test_merge_timestamps_span_versions() {
        let mut early = version(json!({"a": 1}), 0);
        early.timestamps.created_at = Utc::now() - Duration::days(1);
        let late = version(json!({"b": 2}), 60);
        let late_modified = late.timestamps.modified_at;
        let early_created = early.timestamps.created_at;
        let merged = resolve(SiblingStrategy::Merge, vec![late, early]).unwrap();
        assert_eq!(merged.timestamps.created_at, early_created);
        assert_eq!(merged.timestamps.modified_at, late_modified);
    }

    #[test]
    fn test_merge_order_independent() {
        let a = version(json!({"x": 1, "shared": "a"}), 0);
        let b = version(json!({"y": 2, "shared": "b"}), 3);
        let c = version(json!({"z": 3}), 7);
        let forward =
            resolve(SiblingStrategy::Merge, vec![a.clone(), b.clone(), c.clone()]).unwrap();
        let backward = resolve(SiblingStrategy::Merge, vec![c, b, a]).unwrap();
        assert_eq!(forward.data, backward.data);
        assert_eq!(forward.data.get("shared"), Some(&json!("b")));
    }

    #[test]
    fn test_reject_surfaces_unresolved_conflict() {
        let a = version(json!({"v": 1}), 0);
        let b = version(json!({"v": 2}), 1);
        let err = resolve(SiblingStrategy::Reject, vec![a, b]).unwrap_err();
        assert!(matches!(err, Error::UnresolvedConflict(_)));
    }

    #[test]
    fn test_resolved_indexes_are_cleared() {
        let mut a = version(json!({"v": 1}), 0);
        a.indexes
            .insert("s1:v".into(), vec![json!(1)]);
        let b = version(json!({"v": 2}), 1);
        let resolved = resolve(SiblingStrategy::LastWriteWins, vec![a, b]).unwrap();
        assert!(resolved.indexes.is_empty(), "caller recomputes terms");
    }
}
