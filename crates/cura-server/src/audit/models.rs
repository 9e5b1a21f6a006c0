//! Audit data models
//!
//! A [`Snapshot`] is the immutable state of one [`InstanceId`] as of one
//! [`Commit`]. Snapshots of the same instance form its version history,
//! ordered by `(commit timestamp, commit id)`.

use chrono::{DateTime, Utc};
use cura_common::types::InstanceId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Commits
// ============================================================================

/// Identifier of one logical write event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub u64);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One logical write event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: CommitId,
    #[serde(rename = "commitDate")]
    pub timestamp: DateTime<Utc>,
    pub author: Option<String>,
}

impl Commit {
    /// Position of this commit in the log: timestamp first, id breaks ties
    pub fn position(&self) -> (DateTime<Utc>, CommitId) {
        (self.timestamp, self.id)
    }

    /// Log order of two commits, oldest first
    pub fn log_cmp(&self, other: &Commit) -> Ordering {
        self.position().cmp(&other.position())
    }
}

// ============================================================================
// Snapshot State
// ============================================================================

/// Value of one captured property
///
/// Relation values are sets of references to other versioned entities and
/// compare by set equality. Everything else is an opaque scalar compared by
/// value. JSON arrays of instance ids deserialize as relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Relation(BTreeSet<InstanceId>),
    Scalar(JsonValue),
}

impl PropertyValue {
    pub fn as_relation(&self) -> Option<&BTreeSet<InstanceId>> {
        match self {
            PropertyValue::Relation(refs) => Some(refs),
            PropertyValue::Scalar(_) => None,
        }
    }

    /// The value rendered as a display key, if it is a non-empty scalar
    pub fn as_display_key(&self) -> Option<String> {
        match self {
            PropertyValue::Scalar(JsonValue::String(s)) if !s.trim().is_empty() => {
                Some(s.clone())
            },
            PropertyValue::Scalar(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn relation(refs: impl IntoIterator<Item = InstanceId>) -> Self {
        PropertyValue::Relation(refs.into_iter().collect())
    }

    pub fn scalar(value: impl Into<JsonValue>) -> Self {
        PropertyValue::Scalar(value.into())
    }

    fn to_json(&self) -> JsonValue {
        match self {
            PropertyValue::Relation(refs) => JsonValue::Array(
                refs.iter()
                    .map(|id| serde_json::to_value(id).unwrap_or(JsonValue::Null))
                    .collect(),
            ),
            PropertyValue::Scalar(value) => value.clone(),
        }
    }
}

/// Property map of one snapshot
///
/// Null scalars are never stored: a property that is null is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, PropertyValue>", into = "BTreeMap<String, PropertyValue>")]
pub struct EntityState(BTreeMap<String, PropertyValue>);

impl EntityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; null scalars remove the property
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) {
        let name = name.into();
        if matches!(value, PropertyValue::Scalar(JsonValue::Null)) {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the relation property contains the given reference
    pub fn relation_contains(&self, property: &str, target: &InstanceId) -> bool {
        self.get(property)
            .and_then(PropertyValue::as_relation)
            .is_some_and(|refs| refs.contains(target))
    }

    /// The state as a flat JSON object
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, PropertyValue>> for EntityState {
    fn from(map: BTreeMap<String, PropertyValue>) -> Self {
        map.into_iter()
            .fold(EntityState::new(), |state, (name, value)| state.with(name, value))
    }
}

impl From<EntityState> for BTreeMap<String, PropertyValue> {
    fn from(state: EntityState) -> Self {
        state.0
    }
}

impl FromIterator<(String, PropertyValue)> for EntityState {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(EntityState::new(), |state, (name, value)| state.with(name, value))
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Lifecycle position of a snapshot within its instance's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotType {
    /// First snapshot of an instance (or first after a deletion)
    Initial,
    Update,
    /// The instance was deleted; state is empty
    Terminal,
}

impl SnapshotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Update => "UPDATE",
            Self::Terminal => "TERMINAL",
        }
    }

    /// Action label shown in audit events
    pub fn action(&self) -> &'static str {
        match self {
            Self::Initial => "CREATE",
            Self::Update => "UPDATE",
            Self::Terminal => "DELETE",
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SnapshotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL" => Ok(Self::Initial),
            "UPDATE" => Ok(Self::Update),
            "TERMINAL" => Ok(Self::Terminal),
            other => Err(format!("unknown snapshot type '{}'", other)),
        }
    }
}

/// Immutable capture of one instance's full state at one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub instance: InstanceId,
    pub commit: Commit,
    /// 1-based position in the instance's history
    pub version: u64,
    #[serde(rename = "type")]
    pub kind: SnapshotType,
    pub state: EntityState,
}

impl Snapshot {
    /// Newest-first ordering used by every store read
    pub fn newest_first(a: &Snapshot, b: &Snapshot) -> Ordering {
        b.commit.log_cmp(&a.commit)
    }
}

// ============================================================================
// Write Path Input
// ============================================================================

/// One entity mutation handed to the engine by the owning persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    pub instance: InstanceId,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// Create or update with the full resulting state
    Upsert { state: EntityState },
    Delete,
}

impl EntityChange {
    pub fn upsert(instance: InstanceId, state: EntityState) -> Self {
        Self {
            instance,
            kind: ChangeKind::Upsert { state },
        }
    }

    pub fn delete(instance: InstanceId) -> Self {
        Self {
            instance,
            kind: ChangeKind::Delete,
        }
    }
}
