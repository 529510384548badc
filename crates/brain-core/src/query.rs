//! # Query Engine
//!
//! Ranked retrieval over the knowledge graph.
//!
//! A query seeds candidates from up to three sources (text, file, time),
//! scores each with `compute_relevance`, spreads that score across edges,
//! and ranks by a blend of spread activation and base relevance.
//!
//! The engine only borrows the stores. It never mutates the graph, so any
//! number of queries may run against the same snapshot.

use crate::edges::EdgeStore;
use crate::index::Indexes;
use crate::nodes::NodeStore;
use crate::primitives::{
    ACTIVATION_SHARE, CONNECTION_SATURATION, DEFAULT_PATH_DEPTH, DEFAULT_QUERY_DEPTH,
    DEFAULT_QUERY_LIMIT, DEFAULT_SPREAD_DECAY, DEFAULT_SPREAD_ITERATIONS,
    DEFAULT_SPREAD_THRESHOLD, DETAIL_MATCH_FACTOR, MAX_TRAVERSAL_DEPTH, RECENCY_DECAY_DAYS,
    RELEVANCE_CONNECTIONS, RELEVANCE_CONTENT, RELEVANCE_RECENCY, RELEVANCE_SUCCESS,
    RELEVANCE_USAGE, RELEVANCE_WEIGHT, SEMANTIC_SEED_COUNT, USAGE_SATURATION, clamp_unit,
};
use crate::types::{Direction, Edge, EdgeType, Node, NodeId, Timestamp};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// OPTIONS & RESULTS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub query: Option<String>,
    pub file: Option<String>,
    pub since: Option<Timestamp>,
    /// Hops over semantic edges from the text seeds.
    pub depth: usize,
    pub limit: usize,
    pub spread_iterations: usize,
    pub spread_decay: f64,
    pub spread_threshold: f64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            query: None,
            file: None,
            since: None,
            depth: DEFAULT_QUERY_DEPTH,
            limit: DEFAULT_QUERY_LIMIT,
            spread_iterations: DEFAULT_SPREAD_ITERATIONS,
            spread_decay: DEFAULT_SPREAD_DECAY,
            spread_threshold: DEFAULT_SPREAD_THRESHOLD,
        }
    }
}

impl QueryOptions {
    #[must_use]
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    #[must_use]
    pub fn with_since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn query_text(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    fn has_criteria(&self) -> bool {
        self.query_text().is_some() || self.file.is_some() || self.since.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredNode {
    pub node: Node,
    pub relevance: f64,
    pub activation: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    /// Candidates found by the text, file and time passes.
    pub seeds: usize,
    /// Nodes first reached by spreading activation.
    pub activated: usize,
    /// Spreading rounds actually run.
    pub iterations: usize,
    /// Nodes scored before truncation.
    pub scored: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub nodes: Vec<ScoredNode>,
    pub edges: Vec<Edge>,
    pub stats: QueryStats,
    pub truncated: bool,
}

/// Accumulated activation per node plus the number of rounds run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activation {
    pub levels: BTreeMap<NodeId, f64>,
    pub iterations: usize,
}

impl Activation {
    #[must_use]
    pub fn level(&self, id: &NodeId) -> f64 {
        self.levels.get(id).copied().unwrap_or(0.0)
    }
}

// =============================================================================
// TEXT SIMILARITY
// =============================================================================

/// Lowercase alphanumeric words.
#[must_use]
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Bag-of-words overlap: shared words over the larger word count.
#[must_use]
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = tokenize(a);
    let b = tokenize(b);
    let larger = a.len().max(b.len());
    if larger == 0 {
        return 0.0;
    }
    let common = a.intersection(&b).count();
    common as f64 / larger as f64
}

/// Best match of `query` against a node's summary, or its detail at a
/// discount.
fn content_match(node: &Node, query: &str) -> f64 {
    let summary = text_similarity(query, &node.content.summary);
    let detail = text_similarity(query, &node.content.detail) * DETAIL_MATCH_FACTOR;
    summary.max(detail)
}

// =============================================================================
// ENGINE
// =============================================================================

pub struct QueryEngine<'a> {
    nodes: &'a NodeStore,
    edges: &'a EdgeStore,
    indexes: &'a Indexes,
    now: Timestamp,
}

impl<'a> QueryEngine<'a> {
    #[must_use]
    pub fn new(
        nodes: &'a NodeStore,
        edges: &'a EdgeStore,
        indexes: &'a Indexes,
        now: Timestamp,
    ) -> Self {
        Self {
            nodes,
            edges,
            indexes,
            now,
        }
    }

    /// Weighted blend of six signals, each in `[0, 1]`:
    /// content match, recency of use, usage, static weight, connection
    /// density and success rate.
    #[must_use]
    pub fn compute_relevance(&self, node: &Node, opts: &QueryOptions) -> f64 {
        let content = opts
            .query_text()
            .map_or(0.0, |q| content_match(node, q));
        let age_days = node.timestamps.last_used.days_until(self.now);
        let recency = (-age_days / RECENCY_DECAY_DAYS).exp();
        let usage = (node.score.usage_count as f64 / USAGE_SATURATION).min(1.0);
        let connections = (self.edges.degree(&node.id) as f64 / CONNECTION_SATURATION).min(1.0);

        clamp_unit(
            RELEVANCE_CONTENT * content
                + RELEVANCE_RECENCY * recency
                + RELEVANCE_USAGE * usage
                + RELEVANCE_WEIGHT * clamp_unit(node.score.weight)
                + RELEVANCE_CONNECTIONS * connections
                + RELEVANCE_SUCCESS * clamp_unit(node.score.success_rate),
        )
    }

    /// Run a full ranked query.
    #[must_use]
    pub fn execute(&self, opts: &QueryOptions) -> QueryResult {
        let seeds = self.collect_seeds(opts);

        let mut relevance: BTreeMap<NodeId, f64> = BTreeMap::new();
        let mut initial = Vec::with_capacity(seeds.len());
        for node in &seeds {
            let r = self.compute_relevance(node, opts);
            relevance.insert(node.id.clone(), r);
            initial.push((node.id.clone(), r));
        }

        let activation = self.spread_activation(
            &initial,
            opts.spread_iterations,
            opts.spread_decay,
            opts.spread_threshold,
        );

        let mut scored: Vec<ScoredNode> = Vec::new();
        for node in &seeds {
            scored.push(self.score(node, relevance.get(&node.id).copied(), &activation, opts));
        }
        let mut activated = 0;
        for id in activation.levels.keys() {
            if relevance.contains_key(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                activated += 1;
                scored.push(self.score(node, None, &activation, opts));
            }
        }

        // Stable: equal scores keep discovery order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let stats = QueryStats {
            seeds: seeds.len(),
            activated,
            iterations: activation.iterations,
            scored: scored.len(),
        };
        let truncated = scored.len() > opts.limit;
        scored.truncate(opts.limit);

        let members: BTreeSet<&NodeId> = scored.iter().map(|s| &s.node.id).collect();
        let edges = scored
            .iter()
            .flat_map(|s| self.edges.get_edges(&s.node.id, None, Direction::Out))
            .filter(|e| members.contains(&e.target))
            .cloned()
            .collect();

        tracing::debug!(
            seeds = stats.seeds,
            activated = stats.activated,
            iterations = stats.iterations,
            returned = scored.len(),
            truncated,
            "query executed"
        );

        QueryResult {
            nodes: scored,
            edges,
            stats,
            truncated,
        }
    }

    fn score(
        &self,
        node: &Node,
        relevance: Option<f64>,
        activation: &Activation,
        opts: &QueryOptions,
    ) -> ScoredNode {
        let relevance = relevance.unwrap_or_else(|| self.compute_relevance(node, opts));
        let activation = activation.level(&node.id);
        ScoredNode {
            node: node.clone(),
            relevance,
            activation,
            score: ACTIVATION_SHARE * activation + (1.0 - ACTIVATION_SHARE) * relevance,
        }
    }

    /// Union of the text, file and time passes, in discovery order.
    /// With no criteria at all, every node is a candidate.
    fn collect_seeds(&self, opts: &QueryOptions) -> Vec<&'a Node> {
        if !opts.has_criteria() {
            return self.nodes.iter().collect();
        }

        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        let mut push = |id: NodeId| {
            if seen.insert(id.clone()) {
                ordered.push(id);
            }
        };

        if let Some(text) = opts.query_text() {
            for id in self.semantic_candidates(text, opts.depth) {
                push(id);
            }
        }

        if let Some(file) = &opts.file {
            let direct = self.indexes.nodes_for_file(file);
            for id in self.one_hop(&direct, EdgeType::File) {
                push(id);
            }
        }

        if let Some(since) = opts.since {
            let direct: Vec<NodeId> = self
                .indexes
                .nodes_since(since)
                .into_iter()
                .filter(|id| {
                    self.nodes
                        .get(id)
                        .is_some_and(|n| n.timestamps.created >= since)
                })
                .collect();
            for id in self.one_hop(&direct, EdgeType::Temporal) {
                push(id);
            }
        }

        ordered
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Top text matches, then breadth-first over semantic edges.
    fn semantic_candidates(&self, text: &str, depth: usize) -> Vec<NodeId> {
        let mut matches: Vec<(f64, &NodeId)> = self
            .nodes
            .iter()
            .map(|n| (content_match(n, text), &n.id))
            .filter(|(sim, _)| *sim > 0.0)
            .collect();
        matches.sort_by(|a, b| b.0.total_cmp(&a.0));
        matches.truncate(SEMANTIC_SEED_COUNT);

        let depth = depth.min(MAX_TRAVERSAL_DEPTH);
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        for (_, id) in matches {
            if visited.insert(id.clone()) {
                queue.push_back((id.clone(), 0usize));
            }
        }

        while let Some((current, d)) = queue.pop_front() {
            order.push(current.clone());
            if d >= depth {
                continue;
            }
            for next in
                self.edges
                    .get_neighbors(&current, Some(&[EdgeType::Semantic][..]), Direction::Both)
            {
                if visited.insert(next.clone()) {
                    queue.push_back((next, d.saturating_add(1)));
                }
            }
        }
        order
    }

    /// `ids` followed by their neighbors over edges of `kind`.
    fn one_hop(&self, ids: &[NodeId], kind: EdgeType) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = ids.to_vec();
        for id in ids {
            out.extend(
                self.edges
                    .get_neighbors(id, Some(&[kind][..]), Direction::Both),
            );
        }
        out
    }

    /// Spread activation outward from `seeds` across every edge, in both
    /// directions.
    ///
    /// Each round, every node in the frontier pushes
    /// `activation * edge_weight * decay` to each neighbor. Pushes below
    /// `threshold` are dropped. A node's level is the sum of everything it
    /// ever received plus its seed value, so nodes reached along several
    /// paths outrank nodes reached along one. Stops early when a round
    /// produces no push.
    #[must_use]
    pub fn spread_activation(
        &self,
        seeds: &[(NodeId, f64)],
        iterations: usize,
        decay: f64,
        threshold: f64,
    ) -> Activation {
        let mut levels: BTreeMap<NodeId, f64> = BTreeMap::new();
        for (id, value) in seeds {
            *levels.entry(id.clone()).or_insert(0.0) += value;
        }
        let mut frontier = levels.clone();
        let mut rounds = 0;

        for _ in 0..iterations {
            let mut received: BTreeMap<NodeId, f64> = BTreeMap::new();
            for (id, level) in &frontier {
                for edge in self.edges.get_edges(id, None, Direction::Both) {
                    let Some(neighbor) = edge.other_end(id) else {
                        continue;
                    };
                    let push = level * edge.properties.weight * decay;
                    if push < threshold {
                        continue;
                    }
                    *received.entry(neighbor.clone()).or_insert(0.0) += push;
                }
            }
            if received.is_empty() {
                break;
            }
            rounds += 1;
            for (id, push) in &received {
                *levels.entry(id.clone()).or_insert(0.0) += push;
            }
            frontier = received;
        }

        Activation {
            levels,
            iterations: rounds,
        }
    }

    // =========================================================================
    // CONVENIENCE
    // =========================================================================

    /// Nodes learned in `file`.
    #[must_use]
    pub fn by_file(&self, file: &str) -> Vec<&'a Node> {
        self.indexes
            .nodes_for_file(file)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Nodes created within `[from, to]`, newest first.
    #[must_use]
    pub fn by_time_range(&self, from: Timestamp, to: Timestamp) -> Vec<&'a Node> {
        let mut nodes: Vec<&Node> = self
            .indexes
            .nodes_between(from, to)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.timestamps.created >= from && n.timestamps.created <= to)
            .collect();
        nodes.sort_by(|a, b| b.timestamps.created.cmp(&a.timestamps.created));
        nodes
    }

    /// Text-only ranked query.
    #[must_use]
    pub fn semantic_search(&self, text: &str, limit: usize) -> Vec<ScoredNode> {
        self.execute(&QueryOptions::text(text).with_limit(limit)).nodes
    }

    /// Explain how two nodes relate: alternating node and edge lines along
    /// the shortest path. Empty when they are not connected.
    #[must_use]
    pub fn get_context_chain(&self, from: &NodeId, to: &NodeId) -> Vec<String> {
        let path = self.edges.find_path(from, to, DEFAULT_PATH_DEPTH);
        if !path.found {
            return Vec::new();
        }

        let mut lines = Vec::with_capacity(path.nodes.len() * 2);
        for (i, id) in path.nodes.iter().enumerate() {
            lines.push(match self.nodes.get(id) {
                Some(node) => format!("[{}] {}", node.kind, node.content.summary),
                None => format!("[missing] {id}"),
            });
            if let Some(edge) = path.edges.get(i) {
                let arrow = if &edge.source == id { "-->" } else { "<--" };
                let reason = edge
                    .properties
                    .reason
                    .as_deref()
                    .map(|r| format!(": {r}"))
                    .unwrap_or_default();
                lines.push(format!(
                    "  {arrow} {} ({:.2}){reason}",
                    edge.kind, edge.properties.weight
                ));
            }
        }
        lines
    }
}

// =============================================================================
// TESTS
// =============================================================================
