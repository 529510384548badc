//! # Delta Engine
//!
//! Content-addressed, append-only commit history.
//!
//! Deltas form a singly-linked chain through `parent`. A single `head`
//! pointer names the current version. The engine is pure in-memory
//! bookkeeping; `Brain` decides when deltas and HEAD reach storage.
//!
//! ## State-neutral deltas
//!
//! Rollback and squash commits describe transitions whose effect is already
//! present in their parent's state. A rollback that walks past one must not
//! reverse it again, so `rollback_plan` skips them.

use crate::changes::{Change, ChangePath, compact_changes};
use crate::diff;
use crate::hash;
use crate::types::{BrainError, ContentHash, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// What caused a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    #[default]
    Manual,
    Auto,
    Session,
    Rollback,
    Squash,
}

impl Trigger {
    pub const ALL: [Trigger; 5] = [
        Trigger::Manual,
        Trigger::Auto,
        Trigger::Session,
        Trigger::Rollback,
        Trigger::Squash,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Session => "session",
            Self::Rollback => "rollback",
            Self::Squash => "squash",
        }
    }

    #[must_use]
    pub const fn is_state_neutral(self) -> bool {
        matches!(self, Self::Rollback | Self::Squash)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BrainError::InvalidTrigger(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeltaMetadata {
    pub message: String,
    pub trigger: Trigger,
    /// Set on rollback commits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_target: Option<ContentHash>,
    /// Set on squash commits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub squashed: Vec<ContentHash>,
}

impl DeltaMetadata {
    #[must_use]
    pub fn new(message: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            message: message.into(),
            trigger,
            ..Self::default()
        }
    }
}

/// An immutable commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub hash: ContentHash,
    pub parent: Option<ContentHash>,
    pub timestamp: Timestamp,
    pub changes: Vec<Change>,
    pub metadata: DeltaMetadata,
}

impl Delta {
    /// Build a delta on top of `parent`. The hash covers changes, parent and
    /// timestamp; metadata is descriptive only.
    pub fn new(
        changes: Vec<Change>,
        parent: Option<ContentHash>,
        timestamp: Timestamp,
        metadata: DeltaMetadata,
    ) -> Result<Self, BrainError> {
        let hash = hash::delta_hash(&changes, parent.as_ref(), timestamp)?;
        Ok(Self {
            hash,
            parent,
            timestamp,
            changes,
            metadata,
        })
    }

    #[must_use]
    pub fn is_state_neutral(&self) -> bool {
        self.metadata.trigger.is_state_neutral()
    }
}

/// The changes that undo `delta`: each change inverted, last change first.
#[must_use]
pub fn compute_reverse(delta: &Delta) -> Vec<Change> {
    delta.changes.iter().rev().map(Change::inverse).collect()
}

// =============================================================================
// APPLYING CHANGES
// =============================================================================

/// Entity state that recorded changes can be replayed onto.
///
/// Absent entities read and write as `Value::Null`.
pub trait ChangeTarget {
    fn current(&self, path: &ChangePath) -> Result<Value, BrainError>;

    fn restore(&mut self, path: &ChangePath, value: Value) -> Result<(), BrainError>;
}

/// Replay changes onto `target`, in order, through their structural diffs.
pub fn apply_changes<T: ChangeTarget + ?Sized>(
    target: &mut T,
    changes: &[Change],
) -> Result<(), BrainError> {
    for change in changes {
        let diffs = change
            .diff
            .as_deref()
            .ok_or_else(|| BrainError::MissingDiff(change.path.to_string()))?;
        let before = target.current(&change.path)?;
        let after = diff::apply(&before, diffs)?;
        target.restore(&change.path, after)?;
    }
    Ok(())
}

// =============================================================================
// ENGINE
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct DeltaEngine {
    deltas: BTreeMap<ContentHash, Delta>,
    head: Option<ContentHash>,
}

impl DeltaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_parts(deltas: impl IntoIterator<Item = Delta>, head: Option<ContentHash>) -> Self {
        Self {
            deltas: deltas.into_iter().map(|d| (d.hash.clone(), d)).collect(),
            head,
        }
    }

    #[must_use]
    pub fn head(&self) -> Option<&ContentHash> {
        self.head.as_ref()
    }

    pub fn set_head(&mut self, head: Option<ContentHash>) {
        self.head = head;
    }

    #[must_use]
    pub fn get(&self, hash: &ContentHash) -> Option<&Delta> {
        self.deltas.get(hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Build the next commit on top of HEAD without recording it.
    /// Zero changes means no commit.
    pub fn prepare(
        &self,
        changes: Vec<Change>,
        metadata: DeltaMetadata,
        now: Timestamp,
    ) -> Result<Option<Delta>, BrainError> {
        if changes.is_empty() {
            return Ok(None);
        }
        Delta::new(changes, self.head.clone(), now, metadata).map(Some)
    }

    /// Record a delta and make it HEAD.
    pub fn append(&mut self, delta: Delta) {
        self.head = Some(delta.hash.clone());
        self.deltas.insert(delta.hash.clone(), delta);
    }

    /// `prepare` then `append`.
    pub fn create(
        &mut self,
        changes: Vec<Change>,
        metadata: DeltaMetadata,
        now: Timestamp,
    ) -> Result<Option<Delta>, BrainError> {
        let delta = self.prepare(changes, metadata, now)?;
        if let Some(delta) = &delta {
            self.append(delta.clone());
        }
        Ok(delta)
    }

    /// Walk parent links from `from` (default HEAD), newest first.
    ///
    /// Stops at `limit`, at the root, at a pruned parent, or on a repeated
    /// hash, so the result never contains a cycle.
    #[must_use]
    pub fn history(&self, limit: usize, from: Option<&ContentHash>) -> Vec<&Delta> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        let mut cursor = from.or(self.head.as_ref());
        while let Some(hash) = cursor {
            if out.len() >= limit || !seen.insert(hash) {
                break;
            }
            let Some(delta) = self.deltas.get(hash) else {
                break;
            };
            out.push(delta);
            cursor = delta.parent.as_ref();
        }
        out
    }

    fn ancestors(&self, from: &ContentHash) -> BTreeSet<&ContentHash> {
        self.history(usize::MAX, Some(from))
            .into_iter()
            .map(|d| &d.hash)
            .collect()
    }

    /// Deltas leading from `from` to `to`, newest first.
    ///
    /// Walks `to`'s ancestry until it reaches a hash in `from`'s ancestry.
    /// `None` when the two chains share nothing within retained history.
    #[must_use]
    pub fn get_path(&self, from: &ContentHash, to: &ContentHash) -> Option<Vec<&Delta>> {
        let stop = self.ancestors(from);
        let mut path = Vec::new();
        for delta in self.history(usize::MAX, Some(to)) {
            if stop.contains(&delta.hash) {
                return Some(path);
            }
            path.push(delta);
        }
        None
    }

    /// The changes that take the current state back to `target`.
    ///
    /// Reverses every delta between HEAD and `target`, most recent first,
    /// skipping state-neutral ones. An empty plan means `target` is HEAD.
    pub fn rollback_plan(&self, target: &ContentHash) -> Result<Vec<Change>, BrainError> {
        // A pruned target can still be named by a survivor's dangling parent.
        if !self.deltas.contains_key(target) {
            return Err(BrainError::NotAnAncestor(target.clone()));
        }
        let mut plan = Vec::new();
        let mut seen = BTreeSet::new();
        let mut cursor = self.head.as_ref();
        loop {
            let Some(hash) = cursor else {
                return Err(BrainError::NotAnAncestor(target.clone()));
            };
            if hash == target {
                return Ok(plan);
            }
            if !seen.insert(hash) {
                return Err(BrainError::NotAnAncestor(target.clone()));
            }
            let delta = self
                .deltas
                .get(hash)
                .ok_or_else(|| BrainError::NotAnAncestor(target.clone()))?;
            if !delta.is_state_neutral() {
                plan.extend(compute_reverse(delta));
            }
            cursor = delta.parent.as_ref();
        }
    }

    /// Net changes of the given deltas, concatenated in the order given.
    pub fn squash_changes(&self, hashes: &[ContentHash]) -> Result<Vec<Change>, BrainError> {
        let mut all = Vec::new();
        for hash in hashes {
            let delta = self
                .deltas
                .get(hash)
                .ok_or_else(|| BrainError::DeltaNotFound(hash.clone()))?;
            if !delta.is_state_neutral() {
                all.extend(delta.changes.iter().cloned());
            }
        }
        Ok(compact_changes(&all))
    }

    /// Drop every delta beyond the `keep` most recent in HEAD's ancestry,
    /// plus every delta no longer reachable from HEAD (branches abandoned
    /// by a rollback). HEAD itself is always kept.
    ///
    /// Returns the removed hashes: the truncated ancestry oldest last, then
    /// the unreachable ones in hash order. Descendants of a removed delta
    /// keep their now-dangling `parent`; history and rollback stop at that
    /// boundary.
    pub fn prune(&mut self, keep: usize) -> Vec<ContentHash> {
        let chain: Vec<&ContentHash> = self
            .history(usize::MAX, None)
            .into_iter()
            .map(|d| &d.hash)
            .collect();
        let mut doomed: Vec<ContentHash> = chain
            .iter()
            .skip(keep.max(1))
            .map(|h| (*h).clone())
            .collect();
        let on_chain: BTreeSet<&ContentHash> = chain.into_iter().collect();
        doomed.extend(
            self.deltas
                .keys()
                .filter(|h| !on_chain.contains(h))
                .cloned(),
        );
        for hash in &doomed {
            self.deltas.remove(hash);
        }
        doomed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.deltas.values()
    }
}

// =============================================================================
// TESTS
// =============================================================================
