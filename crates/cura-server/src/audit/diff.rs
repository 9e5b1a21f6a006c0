//! Snapshot diffing
//!
//! Change sets are never stored; they are recomputed from the two snapshots
//! being compared whenever a query needs them.

use super::models::{PropertyValue, Snapshot};
use cura_common::types::InstanceId;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Names of the properties that differ between two consecutive snapshots
pub type ChangeSet = BTreeSet<String>;

/// References added to and removed from one relation property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDelta {
    pub property: String,
    pub added: BTreeSet<InstanceId>,
    pub removed: BTreeSet<InstanceId>,
}

impl RelationDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Properties of `current` that changed relative to `previous`
///
/// Without a predecessor every property of `current` counts as changed.
/// Scalars compare by value, relations by set equality; a property that is
/// present on one side only is changed.
pub fn changed_properties(current: &Snapshot, previous: Option<&Snapshot>) -> ChangeSet {
    let Some(previous) = previous else {
        return current.state.property_names().map(str::to_string).collect();
    };

    let names: HashSet<&str> = current
        .state
        .property_names()
        .chain(previous.state.property_names())
        .collect();

    names
        .into_iter()
        .filter(|name| current.state.get(name) != previous.state.get(name))
        .map(str::to_string)
        .collect()
}

/// Whether `property` is among the changes of `current` against `previous`
pub fn property_changed(current: &Snapshot, previous: Option<&Snapshot>, property: &str) -> bool {
    match previous {
        None => current.state.get(property).is_some(),
        Some(previous) => current.state.get(property) != previous.state.get(property),
    }
}

/// Members added to and removed from a relation property
///
/// A missing property or a scalar value is treated as an empty relation.
pub fn relation_delta(
    current: &Snapshot,
    previous: Option<&Snapshot>,
    property: &str,
) -> RelationDelta {
    let empty = BTreeSet::new();
    let refs = |snapshot: Option<&Snapshot>| {
        snapshot
            .and_then(|s| s.state.get(property))
            .and_then(PropertyValue::as_relation)
            .unwrap_or(&empty)
            .clone()
    };

    let now = refs(Some(current));
    let before = refs(previous);

    RelationDelta {
        property: property.to_string(),
        added: now.difference(&before).cloned().collect(),
        removed: before.difference(&now).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::{Commit, CommitId, EntityState, SnapshotType};
    use chrono::{TimeZone, Utc};
    use cura_common::types::AuditEntity;

    fn flag(id: i64) -> InstanceId {
        InstanceId::new(AuditEntity::Flag, id)
    }

    fn snapshot(commit: u64, state: EntityState) -> Snapshot {
        Snapshot {
            instance: InstanceId::new(AuditEntity::Gene, 673),
            commit: Commit {
                id: CommitId(commit),
                timestamp: Utc.timestamp_opt(1_700_000_000 + commit as i64, 0).unwrap(),
                author: None,
            },
            version: commit,
            kind: SnapshotType::Update,
            state,
        }
    }

    fn braf(flags: &[i64]) -> EntityState {
        EntityState::new()
            .with("hugoSymbol", PropertyValue::scalar("BRAF"))
            .with("entrezGeneId", PropertyValue::scalar(673))
            .with("flags", PropertyValue::relation(flags.iter().copied().map(flag)))
    }

    #[test]
    fn test_first_snapshot_changes_every_property() {
        let first = snapshot(1, braf(&[1]));
        let changes = changed_properties(&first, None);

        let expected: ChangeSet = ["entrezGeneId", "flags", "hugoSymbol"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(changes, expected);
    }

    #[test]
    fn test_single_scalar_change() {
        let before = snapshot(1, braf(&[1]));
        let after = snapshot(2, braf(&[1]).with("hugoSymbol", PropertyValue::scalar("BRAF1")));

        assert_eq!(
            changed_properties(&after, Some(&before)),
            ChangeSet::from(["hugoSymbol".to_string()])
        );
    }

    #[test]
    fn test_relation_change_reports_property_not_members() {
        let before = snapshot(1, braf(&[1, 2]));
        let after = snapshot(2, braf(&[2, 3]));

        assert_eq!(
            changed_properties(&after, Some(&before)),
            ChangeSet::from(["flags".to_string()])
        );
    }

    #[test]
    fn test_relation_order_is_irrelevant() {
        let before = snapshot(1, braf(&[2, 1]));
        let after = snapshot(2, braf(&[1, 2]));

        assert!(changed_properties(&after, Some(&before)).is_empty());
    }

    #[test]
    fn test_removed_property_is_a_change() {
        let before = snapshot(1, braf(&[1]));
        let after = snapshot(
            2,
            EntityState::new()
                .with("hugoSymbol", PropertyValue::scalar("BRAF"))
                .with("entrezGeneId", PropertyValue::scalar(673)),
        );

        assert_eq!(
            changed_properties(&after, Some(&before)),
            ChangeSet::from(["flags".to_string()])
        );
        assert!(property_changed(&after, Some(&before), "flags"));
        assert!(!property_changed(&after, Some(&before), "hugoSymbol"));
    }

    #[test]
    fn test_identical_states_have_empty_change_set() {
        let before = snapshot(1, braf(&[1]));
        let after = snapshot(2, braf(&[1]));

        assert!(changed_properties(&after, Some(&before)).is_empty());
    }

    #[test]
    fn test_relation_delta() {
        let before = snapshot(1, braf(&[1, 2]));
        let after = snapshot(2, braf(&[2, 3]));

        let delta = relation_delta(&after, Some(&before), "flags");
        assert_eq!(delta.added, BTreeSet::from([flag(3)]));
        assert_eq!(delta.removed, BTreeSet::from([flag(1)]));

        let created = relation_delta(&before, None, "flags");
        assert_eq!(created.added.len(), 2);
        assert!(created.removed.is_empty());

        assert!(relation_delta(&after, Some(&before), "hugoSymbol").is_empty());
    }
}
