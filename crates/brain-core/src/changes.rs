//! # Pending Changes
//!
//! Records of uncommitted mutations. The node and edge stores each append
//! one `Change` per mutation; `Brain::commit` drains both queues into a delta.
//!
//! A change addresses a whole entity through a typed `ChangePath` and carries
//! the structural diff of that entity's JSON form. Field-level locations live
//! in the diff entries' own paths, so nothing ever parses a path string to
//! find the entity it belongs to.

use crate::diff::{self, DiffEntry};
use crate::hash::content_hash;
use crate::types::{BrainError, ContentHash, EdgeId, NodeId, NodeType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Add,
    Modify,
    Delete,
}

impl ChangeOp {
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Add => Self::Delete,
            Self::Modify => Self::Modify,
            Self::Delete => Self::Add,
        }
    }
}

/// The entity a change touches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum ChangePath {
    Node { kind: NodeType, id: NodeId },
    Edge { id: EdgeId },
}

impl fmt::Display for ChangePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node { kind, id } => write!(f, "nodes.{kind}.{id}"),
            Self::Edge { id } => write!(f, "graph.edges.{id}"),
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub op: ChangeOp,
    pub path: ChangePath,
    pub before_hash: Option<ContentHash>,
    pub after_hash: Option<ContentHash>,
    #[serde(default)]
    pub diff: Option<Vec<DiffEntry>>,
}

impl Change {
    pub fn added(path: ChangePath, after: &Value) -> Result<Self, BrainError> {
        Ok(Self {
            op: ChangeOp::Add,
            path,
            before_hash: None,
            after_hash: Some(content_hash(after)?),
            diff: Some(diff::compute_presence(None, Some(after))),
        })
    }

    pub fn modified(path: ChangePath, before: &Value, after: &Value) -> Result<Self, BrainError> {
        Ok(Self {
            op: ChangeOp::Modify,
            path,
            before_hash: Some(content_hash(before)?),
            after_hash: Some(content_hash(after)?),
            diff: Some(diff::compute(before, after)),
        })
    }

    pub fn deleted(path: ChangePath, before: &Value) -> Result<Self, BrainError> {
        Ok(Self {
            op: ChangeOp::Delete,
            path,
            before_hash: Some(content_hash(before)?),
            after_hash: None,
            diff: Some(diff::compute_presence(Some(before), None)),
        })
    }

    /// The change that undoes this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            op: self.op.inverse(),
            path: self.path.clone(),
            before_hash: self.after_hash.clone(),
            after_hash: self.before_hash.clone(),
            diff: self.diff.as_deref().map(diff::reverse),
        }
    }
}

/// Collapse a sequence of changes to one net change per entity.
///
/// Entities created and deleted inside the sequence vanish, as do entities
/// whose final content hash equals their initial one.
#[must_use]
pub fn compact_changes(changes: &[Change]) -> Vec<Change> {
    struct Net<'a> {
        first: &'a Change,
        last: &'a Change,
        diffs: Vec<DiffEntry>,
        position: usize,
    }

    let mut nets: BTreeMap<&ChangePath, Net<'_>> = BTreeMap::new();
    for (position, change) in changes.iter().enumerate() {
        let entry = nets.entry(&change.path).or_insert_with(|| Net {
            first: change,
            last: change,
            diffs: Vec::new(),
            position,
        });
        entry.last = change;
        entry.position = position;
        entry
            .diffs
            .extend(change.diff.iter().flat_map(|d| d.iter().cloned()));
    }

    let mut ordered: Vec<Net<'_>> = nets.into_values().collect();
    ordered.sort_by_key(|net| net.position);

    ordered
        .into_iter()
        .filter_map(|net| {
            let before = net.first.before_hash.clone();
            let after = net.last.after_hash.clone();
            let op = match (&before, &after) {
                (None, None) => return None,
                (Some(b), Some(a)) if b == a => return None,
                (None, Some(_)) => ChangeOp::Add,
                (Some(_), None) => ChangeOp::Delete,
                (Some(_), Some(_)) => ChangeOp::Modify,
            };
            Some(Change {
                op,
                path: net.first.path.clone(),
                before_hash: before,
                after_hash: after,
                diff: Some(diff::compact(&net.diffs)),
            })
        })
        .collect()
}

/// Per-operation counts, as reported by `Brain::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingCounts {
    pub adds: usize,
    pub modifies: usize,
    pub deletes: usize,
}

impl PendingCounts {
    #[must_use]
    pub fn tally<'a>(changes: impl IntoIterator<Item = &'a Change>) -> Self {
        changes
            .into_iter()
            .fold(Self::default(), |mut counts, change| {
                match change.op {
                    ChangeOp::Add => counts.adds += 1,
                    ChangeOp::Modify => counts.modifies += 1,
                    ChangeOp::Delete => counts.deletes += 1,
                }
                counts
            })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.adds + self.modifies + self.deletes
    }
}
