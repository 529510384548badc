//! # Node Store
//!
//! Owns every learned fact. Each mutation records a pending `Change` that
//! the next commit drains. The store never touches edges: removing a node's
//! relations first is the coordinator's job.

use crate::changes::{Change, ChangePath};
use crate::hash;
use crate::primitives::clamp_unit;
use crate::types::{
    BrainError, Node, NodeContent, NodeContext, NodeId, NodeScore, NodeTimestamps, NodeType,
    Timestamp,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Partial node fields for `NodeStore::update`. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub content: Option<NodeContent>,
    pub context: Option<NodeContext>,
    pub weight: Option<f64>,
    pub usage_count: Option<u64>,
    pub success_rate: Option<f64>,
    pub last_used: Option<Timestamp>,
}

impl NodeUpdate {
    #[must_use]
    pub fn weight(weight: f64) -> Self {
        Self {
            weight: Some(weight),
            ..Self::default()
        }
    }
}

/// Linear-scan filter for `NodeStore::find`. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub types: Option<Vec<NodeType>>,
    pub min_weight: Option<f64>,
    /// Case-insensitive substring over summary, detail and code.
    pub query: Option<String>,
}

impl NodeFilter {
    fn matches(&self, node: &Node, needle: Option<&str>) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&node.kind) {
                return false;
            }
        }
        if let Some(min) = self.min_weight {
            if node.score.weight < min {
                return false;
            }
        }
        match needle {
            None => true,
            Some(needle) => {
                node.content.summary.to_lowercase().contains(needle)
                    || node.content.detail.to_lowercase().contains(needle)
                    || node
                        .content
                        .code
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(needle))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, Node>,
    pending: Vec<Change>,
}

impl NodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted nodes. Nothing is pending afterwards.
    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            pending: Vec::new(),
        }
    }

    /// Create a node with default score and all timestamps at `now`.
    ///
    /// Identity is content-derived: creating the same content of the same
    /// type at the same instant returns the existing node unchanged.
    pub fn create(
        &mut self,
        kind: NodeType,
        content: NodeContent,
        context: NodeContext,
        now: Timestamp,
    ) -> Result<Node, BrainError> {
        let id = hash::node_id(kind, &content, now)?;
        if let Some(existing) = self.nodes.get(&id) {
            return Ok(existing.clone());
        }

        let node = Node {
            id: id.clone(),
            kind,
            content,
            context,
            score: NodeScore::default(),
            timestamps: NodeTimestamps::at(now),
        };
        let change = Change::added(path_of(&node), &to_json(&node)?)?;

        self.nodes.insert(id, node.clone());
        self.pending.push(change);
        Ok(node)
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Merge `update` into the node and bump `updated`.
    /// Scores are clamped into `[0, 1]`. Returns `None` for an unknown id.
    pub fn update(
        &mut self,
        id: &NodeId,
        update: NodeUpdate,
        now: Timestamp,
    ) -> Result<Option<Node>, BrainError> {
        let Some(current) = self.nodes.get(id) else {
            return Ok(None);
        };

        let mut next = current.clone();
        if let Some(content) = update.content {
            next.content = content;
        }
        if let Some(context) = update.context {
            next.context = context;
        }
        if let Some(weight) = update.weight {
            next.score.weight = clamp_unit(weight);
        }
        if let Some(usage) = update.usage_count {
            next.score.usage_count = usage;
        }
        if let Some(rate) = update.success_rate {
            next.score.success_rate = clamp_unit(rate);
        }
        if let Some(last_used) = update.last_used {
            next.timestamps.last_used = last_used;
        }
        next.timestamps.updated = now;

        let change = Change::modified(path_of(&next), &to_json(current)?, &to_json(&next)?)?;
        self.nodes.insert(id.clone(), next.clone());
        self.pending.push(change);
        Ok(Some(next))
    }

    /// Remove a node. Dependent edges must already be gone.
    pub fn delete(&mut self, id: &NodeId) -> Result<bool, BrainError> {
        let Some(node) = self.nodes.get(id) else {
            return Ok(false);
        };
        let change = Change::deleted(path_of(node), &to_json(node)?)?;
        self.nodes.remove(id);
        self.pending.push(change);
        Ok(true)
    }

    /// Nodes matching the filter, in id order.
    #[must_use]
    pub fn find(&self, filter: &NodeFilter) -> Vec<&Node> {
        let needle = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        self.nodes
            .values()
            .filter(|n| filter.matches(n, needle.as_deref()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    #[must_use]
    pub fn of_type(&self, kind: NodeType) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn count_by_type(&self) -> BTreeMap<NodeType, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.kind).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn pending(&self) -> &[Change] {
        &self.pending
    }

    /// Hand over all pending changes and start a fresh queue.
    pub fn get_and_clear_pending(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.pending)
    }

    /// Re-queue changes that were pending when the state was last flushed.
    pub fn resume_pending(&mut self, changes: Vec<Change>) {
        self.pending = changes;
    }

    /// Put a node back to a historical state without recording a change.
    /// `None` removes it. Used when replaying reversed deltas.
    pub fn restore(&mut self, id: &NodeId, node: Option<Node>) {
        match node {
            Some(node) => {
                self.nodes.insert(id.clone(), node);
            }
            None => {
                self.nodes.remove(id);
            }
        }
    }
}

fn path_of(node: &Node) -> ChangePath {
    ChangePath::Node {
        kind: node.kind,
        id: node.id.clone(),
    }
}

pub(crate) fn to_json(node: &Node) -> Result<Value, BrainError> {
    serde_json::to_value(node).map_err(|e| BrainError::SerializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
