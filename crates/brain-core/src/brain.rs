//! # Brain
//!
//! The graph coordinator and sole owner of mutable graph state.
//!
//! `Brain` composes the node store, edge store, indices and delta engine,
//! and is the only component that talks to a `Persistence` backend.
//!
//! ## Write model
//!
//! Mutations update memory immediately and mark the affected records dirty.
//! Dirty records reach storage on `flush`, on `commit`, or after every
//! mutation when `persistence.flush_on_mutation` is set. Uncommitted changes
//! are flushed too, so a later process can still commit them. `commit`,
//! `rollback` and `squash` write their records in one batch, and leave
//! in-memory state untouched when that batch fails.

use crate::changes::{self, Change, ChangePath, PendingCounts};
use crate::clock::{Clock, SystemClock};
use crate::config::{BrainConfig, StorageBackend};
use crate::delta::{self, ChangeTarget, Delta, DeltaEngine, DeltaMetadata, Trigger};
use crate::edges::{EdgeStore, GraphSnapshot, PathResult};
use crate::formats::{self, Encoding};
use crate::hash;
use crate::index::{DayIndex, IndexKind, Indexes, KeyedIndex};
use crate::nodes::{self, NodeStore, NodeUpdate};
use crate::primitives::{
    DEFAULT_PRUNE_MAX_USAGE, DEFAULT_PRUNE_MIN_WEIGHT, DEFAULT_PRUNE_UNUSED_DAYS,
    RELATED_EDGE_WEIGHT, SUPERSEDE_FACTOR,
};
use crate::query::{QueryEngine, QueryOptions, QueryResult, text_similarity};
use crate::storage::{MemoryStore, Persistence, RedbStore, StoreKey};
use crate::types::{
    BrainError, ContentHash, Edge, EdgeProperties, EdgeType, Node, NodeContent, NodeContext,
    NodeId, NodeType, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// REPORTS & OPTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub head: Option<ContentHash>,
    pub pending: PendingCounts,
    pub clean: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub node_count: usize,
    pub edge_count: usize,
    pub delta_count: usize,
    pub nodes_by_type: BTreeMap<NodeType, usize>,
    pub edges_by_type: BTreeMap<EdgeType, usize>,
}

/// A node is pruned only when all three conditions hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruneOptions {
    /// Weight strictly below this.
    pub min_weight: f64,
    /// Unused for strictly more than this many days.
    pub unused_days: u64,
    /// Used at most this many times.
    pub max_usage: u64,
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self {
            min_weight: DEFAULT_PRUNE_MIN_WEIGHT,
            unused_days: DEFAULT_PRUNE_UNUSED_DAYS,
            max_usage: DEFAULT_PRUNE_MAX_USAGE,
        }
    }
}

/// Uncommitted changes as persisted under `StoreKey::Pending`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingRecord {
    nodes: Vec<Change>,
    edges: Vec<Change>,
}

// =============================================================================
// BRAIN
// =============================================================================

pub struct Brain {
    nodes: NodeStore,
    edges: EdgeStore,
    indexes: Indexes,
    deltas: DeltaEngine,
    store: Box<dyn Persistence>,
    clock: Arc<dyn Clock>,
    config: BrainConfig,
    dirty: BTreeSet<StoreKey>,
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("deltas", &self.deltas.len())
            .field("head", &self.deltas.head())
            .field("dirty", &self.dirty.len())
            .finish_non_exhaustive()
    }
}

impl Brain {
    /// Load every table from `store`.
    pub fn open(
        store: Box<dyn Persistence>,
        clock: Arc<dyn Clock>,
        config: BrainConfig,
    ) -> Result<Self, BrainError> {
        config.validate()?;

        let mut all_nodes = Vec::new();
        for kind in NodeType::ALL {
            if let Some(bytes) = store.load(&StoreKey::Nodes(kind))? {
                let table: Vec<Node> = formats::decode(&bytes)?;
                all_nodes.extend(table);
            }
        }
        let mut nodes = NodeStore::from_nodes(all_nodes);

        let mut edges = match store.load(&StoreKey::Graph)? {
            Some(bytes) => EdgeStore::from_snapshot(formats::decode::<GraphSnapshot>(&bytes)?)?,
            None => EdgeStore::new(),
        };
        for edge in edges.iter() {
            if !nodes.contains(&edge.source) || !nodes.contains(&edge.target) {
                return Err(BrainError::CorruptState(format!(
                    "edge {} references a missing node",
                    edge.id
                )));
            }
        }

        let indexes = load_indexes(store.as_ref(), &nodes)?;

        if let Some(bytes) = store.load(&StoreKey::Pending)? {
            let pending: PendingRecord = formats::decode(&bytes)?;
            nodes.resume_pending(pending.nodes);
            edges.resume_pending(pending.edges);
        }

        let mut history = Vec::new();
        for key in store.keys()? {
            if let StoreKey::Delta(_) = key {
                if let Some(bytes) = store.load(&key)? {
                    history.push(formats::decode::<Delta>(&bytes)?);
                }
            }
        }
        let head = match store.load(&StoreKey::Head)? {
            Some(bytes) => Some(formats::decode::<ContentHash>(&bytes)?),
            None => None,
        };
        let deltas = DeltaEngine::from_parts(history, head);

        tracing::info!(
            nodes = nodes.len(),
            edges = edges.len(),
            deltas = deltas.len(),
            head = deltas.head().map(ContentHash::short),
            "brain opened"
        );

        Ok(Self {
            nodes,
            edges,
            indexes,
            deltas,
            store,
            clock,
            config,
            dirty: BTreeSet::new(),
        })
    }

    /// Open with the backend named in `config.storage`.
    pub fn open_configured(config: BrainConfig) -> Result<Self, BrainError> {
        let store: Box<dyn Persistence> = match config.storage.backend {
            StorageBackend::Redb => Box::new(RedbStore::open(&config.storage.path)?),
            StorageBackend::Memory => Box::new(MemoryStore::new()),
        };
        Self::open(store, Arc::new(SystemClock::new()), config)
    }

    /// Open a redb database at `path` with default settings.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, BrainError> {
        Self::open(
            Box::new(RedbStore::open(path)?),
            Arc::new(SystemClock::new()),
            BrainConfig::default(),
        )
    }

    /// An empty brain that persists nowhere.
    pub fn in_memory() -> Result<Self, BrainError> {
        Self::open(
            Box::new(MemoryStore::new()),
            Arc::new(SystemClock::new()),
            BrainConfig::default(),
        )
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    #[must_use]
    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &EdgeStore {
        &self.edges
    }

    #[must_use]
    pub fn deltas(&self) -> &DeltaEngine {
        &self.deltas
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn head(&self) -> Option<&ContentHash> {
        self.deltas.head()
    }

    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // =========================================================================
    // LEARNING
    // =========================================================================

    /// Record a new fact and link it into the graph.
    ///
    /// Links, each capped at `learn.max_auto_links` except `related`:
    /// - `related`: semantic edges to the given nodes
    /// - summaries at or above `learn.similarity_threshold`: semantic edges
    /// - nodes learned in the same file: file edges
    /// - the most recent node, if within `learn.temporal_window_secs`:
    ///   a forward temporal edge from it to the new node
    ///
    /// Unknown `related` ids fail before anything is created.
    pub fn learn(
        &mut self,
        kind: NodeType,
        content: NodeContent,
        context: NodeContext,
        related: &[NodeId],
    ) -> Result<Node, BrainError> {
        if let Some(missing) = related.iter().find(|id| !self.nodes.contains(id)) {
            return Err(BrainError::NodeNotFound(missing.clone()));
        }

        let now = self.clock.now();
        let id = hash::node_id(kind, &content, now)?;
        if let Some(existing) = self.nodes.get(&id) {
            return Ok(existing.clone());
        }

        let node = self.nodes.create(kind, content, context, now)?;
        self.indexes.insert(&node);

        let links = self.auto_link(&node, related, now)?;

        self.mark_node(&node);
        self.dirty.insert(StoreKey::Graph);
        tracing::debug!(id = %node.id, kind = %node.kind, links, "learned");
        self.after_mutation()?;
        Ok(node)
    }

    fn auto_link(
        &mut self,
        node: &Node,
        related: &[NodeId],
        now: Timestamp,
    ) -> Result<usize, BrainError> {
        let cap = self.config.learn.max_auto_links;
        let mut linked: BTreeSet<NodeId> = BTreeSet::new();
        linked.insert(node.id.clone());

        for other in related {
            if linked.insert(other.clone()) {
                self.edges.create(
                    &node.id,
                    other,
                    EdgeType::Semantic,
                    Some(EdgeProperties::weighted(RELATED_EDGE_WEIGHT).with_reason("related")),
                    now,
                )?;
            }
        }

        let threshold = self.config.learn.similarity_threshold;
        let mut similar: Vec<(f64, NodeId)> = self
            .nodes
            .iter()
            .filter(|n| !linked.contains(&n.id))
            .map(|n| {
                (
                    text_similarity(&node.content.summary, &n.content.summary),
                    n.id.clone(),
                )
            })
            .filter(|(sim, _)| *sim >= threshold && *sim > 0.0)
            .collect();
        similar.sort_by(|a, b| b.0.total_cmp(&a.0));
        for (sim, other) in similar.into_iter().take(cap) {
            linked.insert(other.clone());
            self.edges.create(
                &node.id,
                &other,
                EdgeType::Semantic,
                Some(EdgeProperties::weighted(sim).with_reason("similar summary")),
                now,
            )?;
        }

        if let Some(file) = &node.context.file {
            let mut same_file: Vec<&Node> = self
                .indexes
                .nodes_for_file(file)
                .iter()
                .filter(|id| !linked.contains(*id))
                .filter_map(|id| self.nodes.get(id))
                .collect();
            same_file.sort_by(|a, b| b.timestamps.created.cmp(&a.timestamps.created));
            let targets: Vec<NodeId> = same_file
                .into_iter()
                .take(cap)
                .map(|n| n.id.clone())
                .collect();
            for other in targets {
                linked.insert(other.clone());
                self.edges.create(
                    &node.id,
                    &other,
                    EdgeType::File,
                    Some(EdgeProperties::default().with_reason(file.clone())),
                    now,
                )?;
            }
        }

        let window = self.config.learn.temporal_window_millis();
        let previous = self
            .nodes
            .iter()
            .filter(|n| n.id != node.id)
            .max_by(|a, b| {
                a.timestamps
                    .created
                    .cmp(&b.timestamps.created)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .filter(|n| now.millis().saturating_sub(n.timestamps.created.millis()) <= window)
            .map(|n| n.id.clone());
        if let Some(previous) = previous {
            if linked.insert(previous.clone()) {
                self.edges.create(
                    &previous,
                    &node.id,
                    EdgeType::Temporal,
                    Some(EdgeProperties::default().forward()),
                    now,
                )?;
            }
        }

        Ok(linked.len() - 1)
    }

    /// Merge fields into a node. `None` when the id is unknown.
    pub fn update(&mut self, id: &NodeId, update: NodeUpdate) -> Result<Option<Node>, BrainError> {
        let Some(before) = self.nodes.get(id).cloned() else {
            return Ok(None);
        };
        let now = self.clock.now();
        let Some(after) = self.nodes.update(id, update, now)? else {
            return Ok(None);
        };
        self.indexes.remove(&before);
        self.indexes.insert(&after);
        self.mark_node(&before);
        self.mark_node(&after);
        self.after_mutation()?;
        Ok(Some(after))
    }

    /// Count a use of a node. With an outcome, fold it into `success_rate`
    /// as a running mean.
    pub fn record_usage(
        &mut self,
        id: &NodeId,
        success: Option<bool>,
    ) -> Result<Option<Node>, BrainError> {
        let Some(node) = self.nodes.get(id) else {
            return Ok(None);
        };
        let uses = node.score.usage_count;
        let success_rate = success.map(|ok| {
            let outcome = if ok { 1.0 } else { 0.0 };
            (node.score.success_rate * uses as f64 + outcome) / (uses as f64 + 1.0)
        });
        let now = self.clock.now();
        self.update(
            id,
            NodeUpdate {
                usage_count: Some(uses.saturating_add(1)),
                success_rate,
                last_used: Some(now),
                ..NodeUpdate::default()
            },
        )
    }

    /// Delete a node and every edge touching it.
    pub fn remove_learning(&mut self, id: &NodeId) -> Result<bool, BrainError> {
        let Some(node) = self.nodes.get(id).cloned() else {
            return Ok(false);
        };
        let removed_edges = self.edges.delete_all(id)?;
        self.indexes.remove(&node);
        self.nodes.delete(id)?;

        self.mark_node(&node);
        if removed_edges > 0 {
            self.dirty.insert(StoreKey::Graph);
        }
        tracing::debug!(%id, removed_edges, "learning removed");
        self.after_mutation()?;
        Ok(true)
    }

    /// Mark `old` as replaced by `new`: a supersedes edge `new -> old` and
    /// `old`'s weight halved.
    pub fn supersede(
        &mut self,
        old: &NodeId,
        new: &NodeId,
        reason: Option<&str>,
    ) -> Result<Edge, BrainError> {
        let Some(old_weight) = self.nodes.get(old).map(|n| n.score.weight) else {
            return Err(BrainError::NodeNotFound(old.clone()));
        };
        self.require(new)?;

        // The pair carries one edge; supersession replaces whatever auto-link
        // was there.
        let replaced = self
            .edges
            .get(new, old, None)
            .map(|e| e.kind)
            .filter(|kind| *kind != EdgeType::Supersedes);
        if let Some(kind) = replaced {
            self.edges.delete(new, old, Some(kind))?;
        }

        let mut props = EdgeProperties::default().forward();
        if let Some(reason) = reason {
            props = props.with_reason(reason);
        }
        let edge = self
            .edges
            .create(new, old, EdgeType::Supersedes, Some(props), self.clock.now())?;
        self.dirty.insert(StoreKey::Graph);
        self.update(old, NodeUpdate::weight(old_weight * SUPERSEDE_FACTOR))?;
        Ok(edge)
    }

    /// Create (or strengthen) an edge between two existing nodes.
    pub fn link(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        kind: EdgeType,
        properties: Option<EdgeProperties>,
    ) -> Result<Edge, BrainError> {
        self.require(source)?;
        self.require(target)?;
        let edge = self
            .edges
            .create(source, target, kind, properties, self.clock.now())?;
        self.dirty.insert(StoreKey::Graph);
        self.after_mutation()?;
        Ok(edge)
    }

    pub fn strengthen(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        kind: EdgeType,
    ) -> Result<Option<Edge>, BrainError> {
        let edge = self.edges.strengthen(source, target, kind, self.clock.now());
        if edge.is_some() {
            self.dirty.insert(StoreKey::Graph);
            self.after_mutation()?;
        }
        Ok(edge)
    }

    pub fn unlink(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        kind: Option<EdgeType>,
    ) -> Result<bool, BrainError> {
        let removed = self.edges.delete(source, target, kind)?;
        if removed {
            self.dirty.insert(StoreKey::Graph);
            self.after_mutation()?;
        }
        Ok(removed)
    }

    /// Remove nodes that are light, unused and stale. Returns how many.
    pub fn prune(&mut self, opts: &PruneOptions) -> Result<usize, BrainError> {
        let now = self.clock.now();
        let unused_days = opts.unused_days as f64;
        let doomed: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| {
                n.score.weight < opts.min_weight
                    && n.score.usage_count <= opts.max_usage
                    && n.timestamps.last_used.days_until(now) > unused_days
            })
            .map(|n| n.id.clone())
            .collect();

        for id in &doomed {
            self.remove_learning(id)?;
        }
        tracing::info!(pruned = doomed.len(), "nodes pruned");
        Ok(doomed.len())
    }

    fn require(&self, id: &NodeId) -> Result<(), BrainError> {
        if self.nodes.contains(id) {
            Ok(())
        } else {
            Err(BrainError::NodeNotFound(id.clone()))
        }
    }

    // =========================================================================
    // RETRIEVAL
    // =========================================================================

    /// A query engine over the current state.
    #[must_use]
    pub fn query_engine(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.nodes, &self.edges, &self.indexes, self.clock.now())
    }

    #[must_use]
    pub fn query(&self, opts: &QueryOptions) -> QueryResult {
        self.query_engine().execute(opts)
    }

    /// Query options pre-filled from `[query]` configuration.
    #[must_use]
    pub fn query_options(&self) -> QueryOptions {
        self.config.query.options()
    }

    #[must_use]
    pub fn find_path(&self, from: &NodeId, to: &NodeId, max_depth: usize) -> PathResult {
        self.edges.find_path(from, to, max_depth)
    }

    /// Symbol nodes whose summary is exactly `name`.
    #[must_use]
    pub fn find_symbol(&self, name: &str) -> Vec<&Node> {
        self.indexes
            .symbol(name)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    // =========================================================================
    // VERSIONING
    // =========================================================================

    /// Turn all pending changes into a delta on top of HEAD.
    ///
    /// `Ok(None)` when nothing is pending. The delta, HEAD and every dirty
    /// table are written in one batch; on failure nothing is drained.
    pub fn commit(
        &mut self,
        message: &str,
        trigger: Trigger,
    ) -> Result<Option<ContentHash>, BrainError> {
        let changes: Vec<_> = self
            .nodes
            .pending()
            .iter()
            .chain(self.edges.pending())
            .cloned()
            .collect();
        let Some(delta) = self.deltas.prepare(
            changes,
            DeltaMetadata::new(message, trigger),
            self.clock.now(),
        )?
        else {
            return Ok(None);
        };

        let mut next = self.deltas.clone();
        next.append(delta.clone());
        let mut dirty = self.dirty.clone();
        dirty.insert(StoreKey::Head);
        dirty.remove(&StoreKey::Pending);
        let mut records = self.records(&dirty, &next, Some(&delta))?;
        records.push((
            StoreKey::Pending,
            formats::encode(&PendingRecord::default(), Encoding::Json)?,
        ));
        self.write(&records)?;

        self.nodes.get_and_clear_pending();
        self.edges.get_and_clear_pending();
        self.deltas = next;
        self.dirty.clear();

        tracing::info!(
            hash = delta.hash.short(),
            changes = delta.changes.len(),
            trigger = %trigger,
            "commit created"
        );
        Ok(Some(delta.hash))
    }

    /// Restore the state recorded at `target`, an ancestor of HEAD.
    ///
    /// Rolling back to HEAD, or to a state HEAD already equals, is a no-op.
    /// Otherwise the reversal is recorded as a new rollback delta whose
    /// parent is `target`, so history only grows. Fails without side effects when changes are pending, when
    /// `target` is not reachable from HEAD, or when storage rejects the
    /// write.
    pub fn rollback(&mut self, target: &ContentHash) -> Result<bool, BrainError> {
        if self.deltas.head() == Some(target) {
            return Ok(true);
        }
        let pending = self.nodes.pending().len() + self.edges.pending().len();
        if pending > 0 {
            return Err(BrainError::UncommittedChanges(pending));
        }
        let plan = self.deltas.rollback_plan(target)?;

        let snapshot = (
            self.nodes.clone(),
            self.edges.clone(),
            self.indexes.clone(),
            self.deltas.clone(),
            self.dirty.clone(),
        );
        match self.apply_rollback(target, &plan) {
            Ok(()) => {
                tracing::info!(
                    target = target.short(),
                    reversed = plan.len(),
                    "rollback applied"
                );
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(target = target.short(), error = %e, "rollback aborted");
                let (nodes, edges, indexes, deltas, dirty) = snapshot;
                self.nodes = nodes;
                self.edges = edges;
                self.indexes = indexes;
                self.deltas = deltas;
                self.dirty = dirty;
                Err(e)
            }
        }
    }

    fn apply_rollback(
        &mut self,
        target: &ContentHash,
        plan: &[Change],
    ) -> Result<(), BrainError> {
        let mut state = GraphState {
            nodes: &mut self.nodes,
            edges: &mut self.edges,
            indexes: &mut self.indexes,
        };
        delta::apply_changes(&mut state, plan)?;
        self.edges.check_invariants()?;

        // Net-neutral plans (nothing to undo, or changes that cancel out)
        // leave HEAD and history where they are.
        let net = changes::compact_changes(plan);
        let recorded = if net.is_empty() {
            None
        } else {
            let metadata = DeltaMetadata {
                rollback_target: Some(target.clone()),
                ..DeltaMetadata::new(format!("rollback to {}", target.short()), Trigger::Rollback)
            };
            let delta = Delta::new(net, Some(target.clone()), self.clock.now(), metadata)?;
            self.deltas.append(delta.clone());
            Some(delta)
        };

        self.mark_all();
        let dirty = std::mem::take(&mut self.dirty);
        let records = self.records(&dirty, &self.deltas, recorded.as_ref())?;
        self.write(&records)
    }

    /// Fold the given deltas into one new delta on top of HEAD.
    ///
    /// The originals stay in history. `Ok(None)` when their net effect is
    /// empty.
    pub fn squash(
        &mut self,
        hashes: &[ContentHash],
        message: &str,
    ) -> Result<Option<ContentHash>, BrainError> {
        let changes = self.deltas.squash_changes(hashes)?;
        let metadata = DeltaMetadata {
            squashed: hashes.to_vec(),
            ..DeltaMetadata::new(message, Trigger::Squash)
        };
        let Some(delta) = self.deltas.prepare(changes, metadata, self.clock.now())? else {
            return Ok(None);
        };

        let mut next = self.deltas.clone();
        next.append(delta.clone());
        let records = self.records(&BTreeSet::from([StoreKey::Head]), &next, Some(&delta))?;
        self.write(&records)?;
        self.deltas = next;

        tracing::info!(
            hash = delta.hash.short(),
            squashed = hashes.len(),
            changes = delta.changes.len(),
            "squash created"
        );
        Ok(Some(delta.hash))
    }

    /// Delete all but the `keep` most recent deltas of HEAD's ancestry,
    /// along with deltas a rollback left unreachable.
    ///
    /// Surviving deltas keep their parent links, so history and rollback
    /// end at the new boundary. Storage removal is one batch; on failure
    /// history is left as it was.
    pub fn prune_history(&mut self, keep: usize) -> Result<usize, BrainError> {
        let mut next = self.deltas.clone();
        let removed = next.prune(keep);
        let keys: Vec<StoreKey> = removed.iter().cloned().map(StoreKey::Delta).collect();
        self.store
            .remove_batch(&keys)
            .inspect_err(|e| tracing::warn!(error = %e, "history prune failed"))?;
        self.deltas = next;
        tracing::info!(removed = removed.len(), keep, "history pruned");
        Ok(removed.len())
    }

    /// Newest first, starting at HEAD.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<&Delta> {
        self.deltas.history(limit, None)
    }

    #[must_use]
    pub fn status(&self) -> Status {
        let pending = PendingCounts::tally(self.nodes.pending().iter().chain(self.edges.pending()));
        Status {
            head: self.deltas.head().cloned(),
            clean: pending.total() == 0,
            pending,
        }
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            delta_count: self.deltas.len(),
            nodes_by_type: self.nodes.count_by_type(),
            edges_by_type: self.edges.count_by_type(),
        }
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Write every dirty table.
    pub fn flush(&mut self) -> Result<(), BrainError> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let records = self.records(&self.dirty, &self.deltas, None)?;
        self.write(&records)?;
        tracing::debug!(records = records.len(), "flushed");
        self.dirty.clear();
        Ok(())
    }

    /// Whether any table awaits a flush.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn after_mutation(&mut self) -> Result<(), BrainError> {
        self.dirty.insert(StoreKey::Pending);
        if self.config.persistence.flush_on_mutation {
            self.flush()?;
        }
        Ok(())
    }

    fn mark_node(&mut self, node: &Node) {
        self.dirty.insert(StoreKey::Nodes(node.kind));
        for kind in Indexes::kinds_for(node) {
            self.dirty.insert(StoreKey::Index(kind));
        }
    }

    fn mark_all(&mut self) {
        for kind in NodeType::ALL {
            self.dirty.insert(StoreKey::Nodes(kind));
        }
        for kind in IndexKind::ALL {
            self.dirty.insert(StoreKey::Index(kind));
        }
        self.dirty.insert(StoreKey::Graph);
        self.dirty.insert(StoreKey::Head);
        self.dirty.insert(StoreKey::Pending);
    }

    /// Encode `keys`, plus an optional new delta, against `deltas`.
    fn records(
        &self,
        keys: &BTreeSet<StoreKey>,
        deltas: &DeltaEngine,
        delta: Option<&Delta>,
    ) -> Result<Vec<(StoreKey, Vec<u8>)>, BrainError> {
        let mut records = Vec::with_capacity(keys.len() + 1);
        for key in keys {
            if let Some(bytes) = self.encode_record(key, deltas)? {
                records.push((key.clone(), bytes));
            }
        }
        if let Some(delta) = delta {
            records.push((
                StoreKey::Delta(delta.hash.clone()),
                formats::encode(delta, Encoding::Json)?,
            ));
        }
        Ok(records)
    }

    /// Save records in one batch.
    fn write(&mut self, records: &[(StoreKey, Vec<u8>)]) -> Result<(), BrainError> {
        self.store.save_batch(records).inspect_err(|e| {
            tracing::warn!(records = records.len(), error = %e, "persistence write failed");
        })
    }

    fn encode_record(
        &self,
        key: &StoreKey,
        deltas: &DeltaEngine,
    ) -> Result<Option<Vec<u8>>, BrainError> {
        let bytes = match key {
            StoreKey::Nodes(kind) => formats::encode(&self.nodes.of_type(*kind), Encoding::Postcard)?,
            StoreKey::Graph => formats::encode(&self.edges.snapshot(), Encoding::Postcard)?,
            StoreKey::Index(IndexKind::ByFile) => {
                formats::encode(&self.indexes.by_file, Encoding::Postcard)?
            }
            StoreKey::Index(IndexKind::ByTime) => {
                formats::encode(&self.indexes.by_time, Encoding::Postcard)?
            }
            StoreKey::Index(IndexKind::BySymbol) => {
                formats::encode(&self.indexes.by_symbol, Encoding::Postcard)?
            }
            StoreKey::Head => match deltas.head() {
                Some(head) => formats::encode(head, Encoding::Postcard)?,
                None => return Ok(None),
            },
            StoreKey::Delta(hash) => match deltas.get(hash) {
                Some(delta) => formats::encode(delta, Encoding::Json)?,
                None => return Ok(None),
            },
            StoreKey::Pending => formats::encode(
                &PendingRecord {
                    nodes: self.nodes.pending().to_vec(),
                    edges: self.edges.pending().to_vec(),
                },
                Encoding::Json,
            )?,
        };
        Ok(Some(bytes))
    }
}

fn load_indexes(store: &dyn Persistence, nodes: &NodeStore) -> Result<Indexes, BrainError> {
    let by_file = store.load(&StoreKey::Index(IndexKind::ByFile))?;
    let by_time = store.load(&StoreKey::Index(IndexKind::ByTime))?;
    let by_symbol = store.load(&StoreKey::Index(IndexKind::BySymbol))?;
    match (by_file, by_time, by_symbol) {
        (Some(file), Some(time), Some(symbol)) => Ok(Indexes {
            by_file: formats::decode::<KeyedIndex>(&file)?,
            by_time: formats::decode::<DayIndex>(&time)?,
            by_symbol: formats::decode::<KeyedIndex>(&symbol)?,
        }),
        _ => Ok(Indexes::rebuild(nodes.iter())),
    }
}

// =============================================================================
// CHANGE REPLAY
// =============================================================================

/// Mutable view of the stores that replays recorded changes without
/// queueing new ones, keeping the indices in step.
struct GraphState<'a> {
    nodes: &'a mut NodeStore,
    edges: &'a mut EdgeStore,
    indexes: &'a mut Indexes,
}

impl ChangeTarget for GraphState<'_> {
    fn current(&self, path: &ChangePath) -> Result<Value, BrainError> {
        match path {
            ChangePath::Node { id, .. } => match self.nodes.get(id) {
                Some(node) => nodes::to_json(node),
                None => Ok(Value::Null),
            },
            ChangePath::Edge { id } => match self.edges.get_by_id(id) {
                Some(edge) => crate::edges::to_json(edge),
                None => Ok(Value::Null),
            },
        }
    }

    fn restore(&mut self, path: &ChangePath, value: Value) -> Result<(), BrainError> {
        match path {
            ChangePath::Node { id, .. } => {
                if let Some(old) = self.nodes.get(id) {
                    self.indexes.remove(old);
                }
                let node = from_json::<Node>(value)?;
                if let Some(node) = &node {
                    if &node.id != id {
                        return Err(BrainError::CorruptState(format!(
                            "change for node {id} restores node {}",
                            node.id
                        )));
                    }
                    self.indexes.insert(node);
                }
                self.nodes.restore(id, node);
            }
            ChangePath::Edge { id } => {
                let edge = from_json::<Edge>(value)?;
                self.edges.restore(id, edge);
            }
        }
        Ok(())
    }
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<Option<T>, BrainError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| BrainError::DeserializationError(e.to_string()))
}
