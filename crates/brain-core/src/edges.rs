//! # Edge Store
//!
//! Directed, typed, weighted relations with forward and reverse adjacency.
//!
//! Every edge in `edges` appears in `adjacency[source][type]` and in
//! `reverse_adjacency[target][type]`. Inserts and removals always touch all
//! three maps before returning. All maps are `BTreeMap` so traversal order,
//! and therefore path search results, are deterministic.

use crate::changes::{Change, ChangePath};
use crate::hash;
use crate::primitives::{MAX_TRAVERSAL_DEPTH, STRENGTHEN_RATE, clamp_unit};
use crate::types::{
    BrainError, Direction, Edge, EdgeId, EdgeProperties, EdgeType, NodeId, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// `node -> type -> ordered neighbor ids`
pub type Adjacency = BTreeMap<NodeId, BTreeMap<EdgeType, Vec<NodeId>>>;

/// Persisted form of the edge store: the graph aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub edges: BTreeMap<EdgeId, Edge>,
    pub adjacency: Adjacency,
    pub reverse_adjacency: Adjacency,
}

/// Result of `EdgeStore::find_path`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathResult {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<Edge>,
    pub found: bool,
}

impl PathResult {
    fn not_found() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgeStore {
    edges: BTreeMap<EdgeId, Edge>,
    adjacency: Adjacency,
    reverse_adjacency: Adjacency,
    pending: Vec<Change>,
}

impl EdgeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted aggregate, rejecting one whose adjacency maps
    /// disagree with its edge table.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, BrainError> {
        let store = Self {
            edges: snapshot.edges,
            adjacency: snapshot.adjacency,
            reverse_adjacency: snapshot.reverse_adjacency,
            pending: Vec::new(),
        };
        store.check_invariants()?;
        Ok(store)
    }

    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            edges: self.edges.clone(),
            adjacency: self.adjacency.clone(),
            reverse_adjacency: self.reverse_adjacency.clone(),
        }
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Insert an edge, or strengthen the existing one for this pair.
    ///
    /// Fails with `EdgeTypeMismatch` when the pair already carries an edge of
    /// another type.
    pub fn create(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        kind: EdgeType,
        properties: Option<EdgeProperties>,
        now: Timestamp,
    ) -> Result<Edge, BrainError> {
        let id = hash::edge_id(source, target);
        if let Some(existing) = self.edges.get(&id) {
            if existing.kind != kind {
                return Err(BrainError::EdgeTypeMismatch {
                    id,
                    existing: existing.kind,
                    requested: kind,
                });
            }
            return self
                .strengthen(source, target, kind, now)
                .ok_or_else(|| BrainError::CorruptState(format!("edge {id} vanished")));
        }

        let mut properties = properties.unwrap_or_default();
        properties.weight = clamp_unit(properties.weight);
        let edge = Edge {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
            kind,
            properties,
            timestamp: now,
        };
        let change = Change::added(ChangePath::Edge { id }, &to_json(&edge)?)?;

        self.link(edge.clone());
        self.pending.push(change);
        Ok(edge)
    }

    /// Nudge the weight toward 1.0 with diminishing returns.
    ///
    /// Not recorded as a pending change; the next commit that touches the
    /// edge captures whatever weight it has by then.
    pub fn strengthen(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        kind: EdgeType,
        now: Timestamp,
    ) -> Option<Edge> {
        let edge = self.edges.get_mut(&hash::edge_id(source, target))?;
        if edge.kind != kind {
            return None;
        }
        let w = edge.properties.weight;
        edge.properties.weight = clamp_unit(w + (1.0 - w) * STRENGTHEN_RATE);
        edge.timestamp = now;
        Some(edge.clone())
    }

    /// Remove the edge for this pair. With `kind` set, only an edge of that
    /// type is removed.
    pub fn delete(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        kind: Option<EdgeType>,
    ) -> Result<bool, BrainError> {
        let id = hash::edge_id(source, target);
        let Some(edge) = self.edges.get(&id) else {
            return Ok(false);
        };
        if kind.is_some_and(|k| k != edge.kind) {
            return Ok(false);
        }
        let change = Change::deleted(ChangePath::Edge { id: id.clone() }, &to_json(edge)?)?;
        self.unlink(&id);
        self.pending.push(change);
        Ok(true)
    }

    /// Remove every edge touching `node`, in either direction.
    pub fn delete_all(&mut self, node: &NodeId) -> Result<usize, BrainError> {
        let incident: Vec<(NodeId, NodeId)> = self
            .get_edges(node, None, Direction::Both)
            .into_iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();

        let mut removed = 0;
        for (source, target) in incident {
            if self.delete(&source, &target, None)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Put an edge back to a historical state without recording a change.
    pub fn restore(&mut self, id: &EdgeId, edge: Option<Edge>) {
        self.unlink(id);
        if let Some(edge) = edge {
            self.link(edge);
        }
    }

    fn link(&mut self, edge: Edge) {
        push_unique(
            self.adjacency
                .entry(edge.source.clone())
                .or_default()
                .entry(edge.kind)
                .or_default(),
            &edge.target,
        );
        push_unique(
            self.reverse_adjacency
                .entry(edge.target.clone())
                .or_default()
                .entry(edge.kind)
                .or_default(),
            &edge.source,
        );
        self.edges.insert(edge.id.clone(), edge);
    }

    fn unlink(&mut self, id: &EdgeId) {
        let Some(edge) = self.edges.remove(id) else {
            return;
        };
        remove_from(&mut self.adjacency, &edge.source, edge.kind, &edge.target);
        remove_from(
            &mut self.reverse_adjacency,
            &edge.target,
            edge.kind,
            &edge.source,
        );
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    #[must_use]
    pub fn get(&self, source: &NodeId, target: &NodeId, kind: Option<EdgeType>) -> Option<&Edge> {
        self.edges
            .get(&hash::edge_id(source, target))
            .filter(|e| kind.is_none_or(|k| e.kind == k))
    }

    #[must_use]
    pub fn get_by_id(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Edges incident to `node`, resolved through the adjacency maps.
    /// `types = None` means every type.
    #[must_use]
    pub fn get_edges(
        &self,
        node: &NodeId,
        types: Option<&[EdgeType]>,
        direction: Direction,
    ) -> Vec<&Edge> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            for (_, target) in typed_entries(&self.adjacency, node, types) {
                if let Some(e) = self.edges.get(&hash::edge_id(node, target)) {
                    out.push(e);
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for (_, source) in typed_entries(&self.reverse_adjacency, node, types) {
                if let Some(e) = self.edges.get(&hash::edge_id(source, node)) {
                    // A self-loop is already listed from the forward side.
                    if direction == Direction::Both && e.source == e.target {
                        continue;
                    }
                    out.push(e);
                }
            }
        }
        out
    }

    /// Distinct neighbor ids, in first-seen order.
    #[must_use]
    pub fn get_neighbors(
        &self,
        node: &NodeId,
        types: Option<&[EdgeType]>,
        direction: Direction,
    ) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        self.get_edges(node, types, direction)
            .into_iter()
            .filter_map(|e| e.other_end(node))
            .filter(|n| seen.insert((*n).clone()))
            .cloned()
            .collect()
    }

    /// Whether an edge links `a` and `b` in either direction.
    #[must_use]
    pub fn are_connected(&self, a: &NodeId, b: &NodeId, kind: Option<EdgeType>) -> bool {
        self.get(a, b, kind).is_some() || self.get(b, a, kind).is_some()
    }

    /// Number of edges touching `node`, both directions.
    #[must_use]
    pub fn degree(&self, node: &NodeId) -> usize {
        self.get_edges(node, None, Direction::Both).len()
    }

    /// Breadth-first shortest path over the undirected view.
    ///
    /// Explores at most `max_depth` hops (capped at `MAX_TRAVERSAL_DEPTH`).
    #[must_use]
    pub fn find_path(&self, from: &NodeId, to: &NodeId, max_depth: usize) -> PathResult {
        if from == to {
            return PathResult {
                nodes: vec![from.clone()],
                edges: Vec::new(),
                found: true,
            };
        }
        let max_depth = max_depth.min(MAX_TRAVERSAL_DEPTH);

        let mut visited = BTreeSet::new();
        let mut prev: BTreeMap<NodeId, (NodeId, EdgeId)> = BTreeMap::new();
        let mut queue = VecDeque::new();

        visited.insert(from.clone());
        queue.push_back((from.clone(), 0usize));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in self.get_edges(&current, None, Direction::Both) {
                let Some(next) = edge.other_end(&current) else {
                    continue;
                };
                if !visited.insert(next.clone()) {
                    continue;
                }
                prev.insert(next.clone(), (current.clone(), edge.id.clone()));
                if next == to {
                    return self.reconstruct(from, to, &prev);
                }
                queue.push_back((next.clone(), depth.saturating_add(1)));
            }
        }

        PathResult::not_found()
    }

    fn reconstruct(
        &self,
        from: &NodeId,
        to: &NodeId,
        prev: &BTreeMap<NodeId, (NodeId, EdgeId)>,
    ) -> PathResult {
        let mut nodes = vec![to.clone()];
        let mut edges = Vec::new();
        let mut current = to;
        while current != from {
            let Some((parent, edge_id)) = prev.get(current) else {
                return PathResult::not_found();
            };
            if let Some(edge) = self.edges.get(edge_id) {
                edges.push(edge.clone());
            }
            nodes.push(parent.clone());
            current = parent;
        }
        nodes.reverse();
        edges.reverse();
        PathResult {
            nodes,
            edges,
            found: true,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[must_use]
    pub fn count_by_type(&self) -> BTreeMap<EdgeType, usize> {
        let mut counts = BTreeMap::new();
        for edge in self.edges.values() {
            *counts.entry(edge.kind).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn pending(&self) -> &[Change] {
        &self.pending
    }

    pub fn get_and_clear_pending(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.pending)
    }

    pub fn resume_pending(&mut self, changes: Vec<Change>) {
        self.pending = changes;
    }

    // =========================================================================
    // INVARIANTS
    // =========================================================================

    /// Verify that the edge table and both adjacency maps describe the same
    /// set of edges.
    pub fn check_invariants(&self) -> Result<(), BrainError> {
        for (id, edge) in &self.edges {
            if &hash::edge_id(&edge.source, &edge.target) != id {
                return Err(BrainError::CorruptState(format!(
                    "edge {id} is stored under the wrong id"
                )));
            }
            if !listed(&self.adjacency, &edge.source, edge.kind, &edge.target) {
                return Err(BrainError::CorruptState(format!(
                    "edge {id} missing from adjacency of {}",
                    edge.source
                )));
            }
            if !listed(&self.reverse_adjacency, &edge.target, edge.kind, &edge.source) {
                return Err(BrainError::CorruptState(format!(
                    "edge {id} missing from reverse adjacency of {}",
                    edge.target
                )));
            }
        }

        let forward = self.check_adjacency(&self.adjacency, false)?;
        let reverse = self.check_adjacency(&self.reverse_adjacency, true)?;
        if forward != self.edges.len() || reverse != self.edges.len() {
            return Err(BrainError::CorruptState(format!(
                "{} edges but {forward} forward and {reverse} reverse adjacency entries",
                self.edges.len()
            )));
        }
        Ok(())
    }

    /// Every adjacency entry must resolve to a stored edge of the listed type.
    /// Returns the number of entries.
    fn check_adjacency(&self, adjacency: &Adjacency, reverse: bool) -> Result<usize, BrainError> {
        let mut count = 0usize;
        for (node, by_type) in adjacency {
            for (kind, ids) in by_type {
                for other in ids {
                    let id = if reverse {
                        hash::edge_id(other, node)
                    } else {
                        hash::edge_id(node, other)
                    };
                    if !self.edges.get(&id).is_some_and(|e| e.kind == *kind) {
                        return Err(BrainError::CorruptState(format!(
                            "dangling {kind} adjacency entry {node} / {other}"
                        )));
                    }
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

fn typed_entries<'a>(
    adjacency: &'a Adjacency,
    node: &NodeId,
    types: Option<&'a [EdgeType]>,
) -> impl Iterator<Item = (EdgeType, &'a NodeId)> {
    adjacency
        .get(node)
        .into_iter()
        .flat_map(|by_type| by_type.iter())
        .filter(move |(kind, _)| types.is_none_or(|ts| ts.contains(*kind)))
        .flat_map(|(kind, ids)| ids.iter().map(move |id| (*kind, id)))
}

fn listed(adjacency: &Adjacency, node: &NodeId, kind: EdgeType, other: &NodeId) -> bool {
    adjacency
        .get(node)
        .and_then(|by_type| by_type.get(&kind))
        .is_some_and(|ids| ids.contains(other))
}

fn push_unique(ids: &mut Vec<NodeId>, id: &NodeId) {
    if !ids.contains(id) {
        ids.push(id.clone());
    }
}

fn remove_from(adjacency: &mut Adjacency, node: &NodeId, kind: EdgeType, other: &NodeId) {
    let Some(by_type) = adjacency.get_mut(node) else {
        return;
    };
    if let Some(ids) = by_type.get_mut(&kind) {
        ids.retain(|id| id != other);
        if ids.is_empty() {
            by_type.remove(&kind);
        }
    }
    if by_type.is_empty() {
        adjacency.remove(node);
    }
}

pub(crate) fn to_json(edge: &Edge) -> Result<Value, BrainError> {
    serde_json::to_value(edge).map_err(|e| BrainError::SerializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeOp;

    fn id(s: &str) -> NodeId {
        NodeId::new(s)
    }

    fn t(ms: i64) -> Timestamp {
        Timestamp(ms)
    }

    #[test]
    fn create_links_both_adjacency_maps() {
        let mut store = EdgeStore::new();
        let edge = store
            .create(&id("a"), &id("b"), EdgeType::Semantic, None, t(1))
            .expect("create");
        assert_eq!(edge.properties.weight, 0.5);

        let snap = store.snapshot();
        assert_eq!(snap.adjacency[&id("a")][&EdgeType::Semantic], vec![id("b")]);
        assert_eq!(
            snap.reverse_adjacency[&id("b")][&EdgeType::Semantic],
            vec![id("a")]
        );
        store.check_invariants().expect("invariants");
    }

    #[test]
    fn recreate_strengthens_instead_of_duplicating() {
        let mut store = EdgeStore::new();
        store
            .create(&id("a"), &id("b"), EdgeType::File, None, t(1))
            .expect("create");
        let again = store
            .create(&id("a"), &id("b"), EdgeType::File, None, t(2))
            .expect("create");

        assert_eq!(store.len(), 1);
        assert!((again.properties.weight - 0.55).abs() < 1e-12);
        assert_eq!(again.timestamp, t(2));
        // Only the original insert is versioned.
        assert_eq!(store.pending().len(), 1);
    }

    #[test]
    fn create_with_other_type_is_rejected() {
        let mut store = EdgeStore::new();
        store
            .create(&id("a"), &id("b"), EdgeType::File, None, t(1))
            .expect("create");
        let err = store
            .create(&id("a"), &id("b"), EdgeType::Causal, None, t(2))
            .expect_err("mismatch");
        assert!(matches!(
            err,
            BrainError::EdgeTypeMismatch {
                existing: EdgeType::File,
                requested: EdgeType::Causal,
                ..
            }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn strengthen_saturates_at_one() {
        let mut store = EdgeStore::new();
        store
            .create(&id("a"), &id("b"), EdgeType::Semantic, None, t(0))
            .expect("create");
        let mut last = 0.5;
        for i in 0..50 {
            let edge = store
                .strengthen(&id("a"), &id("b"), EdgeType::Semantic, t(i))
                .expect("present");
            assert!(edge.properties.weight > last);
            assert!(edge.properties.weight <= 1.0);
            last = edge.properties.weight;
        }
        assert!(last > 0.99);
        assert!(
            store
                .strengthen(&id("a"), &id("b"), EdgeType::File, t(99))
                .is_none()
        );
    }

    #[test]
    fn delete_removes_both_sides_and_records() {
        let mut store = EdgeStore::new();
        store
            .create(&id("a"), &id("b"), EdgeType::Semantic, None, t(1))
            .expect("create");
        store.get_and_clear_pending();

        assert!(!store.delete(&id("a"), &id("b"), Some(EdgeType::File)).expect("delete"));
        assert!(store.delete(&id("a"), &id("b"), None).expect("delete"));
        assert!(!store.delete(&id("a"), &id("b"), None).expect("delete"));

        let snap = store.snapshot();
        assert!(snap.adjacency.is_empty());
        assert!(snap.reverse_adjacency.is_empty());
        let pending = store.get_and_clear_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].op, ChangeOp::Delete);
        assert!(pending[0].before_hash.is_some());
    }

    #[test]
    fn delete_all_clears_incident_edges() {
        let mut store = EdgeStore::new();
        store
            .create(&id("a"), &id("b"), EdgeType::Semantic, None, t(1))
            .expect("create");
        store
            .create(&id("c"), &id("a"), EdgeType::File, None, t(1))
            .expect("create");
        store
            .create(&id("b"), &id("c"), EdgeType::File, None, t(1))
            .expect("create");

        assert_eq!(store.delete_all(&id("a")).expect("delete_all"), 2);
        assert_eq!(store.len(), 1);
        assert!(store.are_connected(&id("c"), &id("b"), None));
        store.check_invariants().expect("invariants");
    }

    #[test]
    fn neighbors_follow_direction_and_type() {
        let mut store = EdgeStore::new();
        store
            .create(&id("a"), &id("b"), EdgeType::Semantic, None, t(1))
            .expect("create");
        store
            .create(&id("c"), &id("a"), EdgeType::File, None, t(1))
            .expect("create");

        assert_eq!(
            store.get_neighbors(&id("a"), None, Direction::Out),
            vec![id("b")]
        );
        assert_eq!(
            store.get_neighbors(&id("a"), None, Direction::In),
            vec![id("c")]
        );
        assert_eq!(store.get_neighbors(&id("a"), None, Direction::Both).len(), 2);
        assert_eq!(
            store.get_neighbors(&id("a"), Some(&[EdgeType::File][..]), Direction::Both),
            vec![id("c")]
        );
        assert_eq!(store.degree(&id("a")), 2);
    }

    #[test]
    fn find_path_respects_depth() {
        let mut store = EdgeStore::new();
        let ab = store
            .create(&id("A"), &id("B"), EdgeType::Semantic, None, t(1))
            .expect("create");
        let bc = store
            .create(&id("B"), &id("C"), EdgeType::File, None, t(1))
            .expect("create");

        let path = store.find_path(&id("A"), &id("C"), 5);
        assert!(path.found);
        assert_eq!(path.nodes, vec![id("A"), id("B"), id("C")]);
        assert_eq!(path.edges, vec![ab, bc]);

        assert!(!store.find_path(&id("A"), &id("C"), 1).found);
        // Undirected view.
        assert!(store.find_path(&id("C"), &id("A"), 2).found);
    }

    #[test]
    fn restore_keeps_adjacency_consistent() {
        let mut store = EdgeStore::new();
        let edge = store
            .create(&id("a"), &id("b"), EdgeType::Temporal, None, t(1))
            .expect("create");
        store.restore(&edge.id, None);
        assert!(store.is_empty());
        store.check_invariants().expect("invariants");
        store.restore(&edge.id, Some(edge.clone()));
        assert_eq!(store.get_by_id(&edge.id), Some(&edge));
        store.check_invariants().expect("invariants");
    }

    #[test]
    fn from_snapshot_rejects_divergent_adjacency() {
        let mut store = EdgeStore::new();
        store
            .create(&id("a"), &id("b"), EdgeType::Semantic, None, t(1))
            .expect("create");
        let mut snap = store.snapshot();
        snap.reverse_adjacency.clear();
        assert!(matches!(
            EdgeStore::from_snapshot(snap),
            Err(BrainError::CorruptState(_))
        ));
        assert!(EdgeStore::from_snapshot(store.snapshot()).is_ok());
    }
}
