//! Records, dirty metadata, and mutation operations.
//!
//! Dirty metadata is a per-record map from column identifier to the
//! RFC 3339 UTC timestamp of its last unsynced local edit, plus two
//! reserved markers: [`CREATED_KEY`] (record originated locally and
//! has never been pushed) and [`DELETED_KEY`] (record was locally
//! deleted and the deletion has not been pushed). The union semantics
//! live here as a plain merge-by-key function so they are testable
//! without a storage engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved metadata key: record was created locally, never pushed.
pub const CREATED_KEY: &str = "__created";
/// Reserved metadata key: record was deleted locally, deletion not pushed.
pub const DELETED_KEY: &str = "__deleted";

/// Field values keyed by column identifier.
pub type Fields = BTreeMap<String, Value>;

/// A record as fetched from the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Identifier assigned by the remote service.
    pub remote_id: String,
    /// One value per column the connector fetched.
    pub fields: Fields,
}

impl RemoteRecord {
    /// Convenience constructor.
    #[must_use]
    pub fn new(remote_id: impl Into<String>, fields: Fields) -> Self {
        Self {
            remote_id: remote_id.into(),
            fields,
        }
    }
}

/// A record as held in the local snapshot store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Locally generated, immutable primary identity.
    pub ws_id: String,
    /// Remote identity; `None` until the record exists remotely.
    pub remote_id: Option<String>,
    /// Declared field values.
    pub fields: Fields,
    /// Pending-change metadata at read time.
    pub meta: ChangeMeta,
    /// Summary flag: `true` iff `meta` is non-empty.
    pub dirty: bool,
}

/// Per-record map of column identifier to last-edit timestamp.
///
/// Timestamps are RFC 3339 UTC strings with a fixed millisecond
/// precision, so lexicographic order equals chronological order and
/// "keep latest" reduces to string comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeMeta(BTreeMap<String, String>);

impl ChangeMeta {
    /// Empty metadata (a clean record).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when no pending change is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded keys, reserved markers included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Timestamp recorded for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Record an edit to `column` at `at`, keeping the latest timestamp
    /// if the column was already touched.
    pub fn touch(&mut self, column: &str, at: &str) {
        match self.0.get_mut(column) {
            Some(existing) => {
                if at > existing.as_str() {
                    *existing = at.to_string();
                }
            }
            None => {
                self.0.insert(column.to_string(), at.to_string());
            }
        }
    }

    /// Mark the record as locally created at `at`.
    pub fn mark_created(&mut self, at: &str) {
        self.touch(CREATED_KEY, at);
    }

    /// Mark the record as locally deleted at `at`.
    pub fn mark_deleted(&mut self, at: &str) {
        self.touch(DELETED_KEY, at);
    }

    /// Creation marker timestamp, if the record is locally created.
    #[must_use]
    pub fn created(&self) -> Option<&str> {
        self.get(CREATED_KEY)
    }

    /// Deletion marker timestamp, if the record is locally deleted.
    #[must_use]
    pub fn deleted(&self) -> Option<&str> {
        self.get(DELETED_KEY)
    }

    /// Merge `other` into `self`, keeping the latest timestamp per key.
    pub fn merge(&mut self, other: &ChangeMeta) {
        for (key, at) in &other.0 {
            self.touch(key, at);
        }
    }

    /// Touched column identifiers, reserved markers excluded.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|k| *k != CREATED_KEY && *k != DELETED_KEY)
    }
}

/// One user-originated operation against a mirrored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Insert a new local record; it has no remote counterpart yet.
    Create { data: Fields },
    /// Overwrite the given fields of an existing record.
    Update { ws_id: String, data: Fields },
    /// Soft-delete: mark the record for remote deletion, keep the row.
    Delete { ws_id: String },
}

/// The three disjoint categories of pending local change.
///
/// Each phase requires a different push-back action against the remote
/// service, so workers drain them separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushPhase {
    /// Records with the [`CREATED_KEY`] marker.
    Create,
    /// Dirty records with neither reserved marker.
    Update,
    /// Records with the [`DELETED_KEY`] marker.
    Delete,
}

impl PushPhase {
    /// Wire-format string for diagnostics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for PushPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
