//! # Core Type Definitions
//!
//! This module contains the vocabulary shared by every Brain component:
//! - Identifiers (`NodeId`, `EdgeId`, `ContentHash`, `Timestamp`)
//! - Learned facts (`Node` and its content/context/score/timestamp parts)
//! - Relations (`Edge`, `EdgeProperties`)
//! - Error types (`BrainError`)
//!
//! ## Ordering Guarantees
//!
//! Identifier types implement `Ord` so they can key `BTreeMap`/`BTreeSet`.
//! Every structure that is hashed or persisted iterates in key order, which
//! keeps content hashes stable across runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::primitives::{DEFAULT_EDGE_WEIGHT, DEFAULT_NODE_WEIGHT, DEFAULT_SUCCESS_RATE};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Content-derived identifier of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an edge, derived from its `(source, target)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub String);

impl EdgeId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded BLAKE3 digest of a serialized value.
///
/// Used for delta hashes and for the before/after hashes of pending changes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines and CLI output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub i64);

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

impl Timestamp {
    #[must_use]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    #[must_use]
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// UTC day number, used as the bucket key of the time index.
    #[must_use]
    pub const fn day_bucket(self) -> i64 {
        self.0.div_euclid(MILLIS_PER_DAY)
    }

    /// Fractional days elapsed between `self` and a later `now`.
    /// Never negative.
    #[must_use]
    pub fn days_until(self, now: Timestamp) -> f64 {
        let delta = now.0.saturating_sub(self.0).max(0);
        delta as f64 / MILLIS_PER_DAY as f64
    }

    /// This timestamp shifted back by whole days.
    #[must_use]
    pub const fn minus_days(self, days: i64) -> Self {
        Self(self.0.saturating_sub(days.saturating_mul(MILLIS_PER_DAY)))
    }
}

// =============================================================================
// NODE & EDGE KINDS
// =============================================================================

/// The kind of a learned fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Pattern,
    Convention,
    Symbol,
    Correction,
    Session,
}

impl NodeType {
    pub const ALL: [NodeType; 5] = [
        NodeType::Pattern,
        NodeType::Convention,
        NodeType::Symbol,
        NodeType::Correction,
        NodeType::Session,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Convention => "convention",
            Self::Symbol => "symbol",
            Self::Correction => "correction",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BrainError::InvalidNodeType(s.to_string()))
    }
}

/// The kind of relation an edge expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Semantic,
    File,
    Temporal,
    Causal,
    Supersedes,
}

impl EdgeType {
    pub const ALL: [EdgeType; 5] = [
        EdgeType::Semantic,
        EdgeType::File,
        EdgeType::Temporal,
        EdgeType::Causal,
        EdgeType::Supersedes,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::File => "file",
            Self::Temporal => "temporal",
            Self::Causal => "causal",
            Self::Supersedes => "supersedes",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BrainError::InvalidEdgeType(s.to_string()))
    }
}

// =============================================================================
// NODE
// =============================================================================

/// What was learned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeContent {
    pub summary: String,
    pub detail: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl NodeContent {
    #[must_use]
    pub fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Where it was learned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeContext {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl NodeContext {
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            file: Some(path.into()),
            language: None,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// How much a node is worth. `weight` and `success_rate` live in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeScore {
    pub weight: f64,
    pub usage_count: u64,
    pub success_rate: f64,
}

impl Default for NodeScore {
    fn default() -> Self {
        Self {
            weight: DEFAULT_NODE_WEIGHT,
            usage_count: 0,
            success_rate: DEFAULT_SUCCESS_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeTimestamps {
    pub created: Timestamp,
    pub last_used: Timestamp,
    pub updated: Timestamp,
}

impl NodeTimestamps {
    #[must_use]
    pub const fn at(now: Timestamp) -> Self {
        Self {
            created: now,
            last_used: now,
            updated: now,
        }
    }
}

/// A learned fact: a vertex of the knowledge graph.
///
/// Nodes never embed references to other nodes; every relation is an `Edge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub content: NodeContent,
    pub context: NodeContext,
    pub score: NodeScore,
    pub timestamps: NodeTimestamps,
}

// =============================================================================
// EDGE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    #[default]
    Bidirectional,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeProperties {
    pub weight: f64,
    pub direction: EdgeDirection,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Default for EdgeProperties {
    fn default() -> Self {
        Self {
            weight: DEFAULT_EDGE_WEIGHT,
            direction: EdgeDirection::Bidirectional,
            reason: None,
        }
    }
}

impl EdgeProperties {
    #[must_use]
    pub fn weighted(weight: f64) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn forward(mut self) -> Self {
        self.direction = EdgeDirection::Forward;
        self
    }
}

/// A directed, typed, weighted relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(rename = "type")]
    pub kind: EdgeType,
    pub properties: EdgeProperties,
    /// Last-touched time.
    pub timestamp: Timestamp,
}

impl Edge {
    /// The endpoint opposite `node`, if `node` is one of the two endpoints.
    #[must_use]
    pub fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.source == node {
            Some(&self.target)
        } else if &self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Which adjacency lists a neighborhood lookup follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Out,
    In,
    #[default]
    Both,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Brain.
///
/// - Lookups that miss are `Option::None`, never an error
/// - Invariant violations fail loudly instead of silently no-opping
/// - Storage failures are propagated, never retried here
#[derive(Debug, Error)]
pub enum BrainError {
    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid edge type: {0}")]
    InvalidEdgeType(String),

    #[error("Invalid commit trigger: {0}")]
    InvalidTrigger(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// An edge already exists for this (source, target) pair with another type.
    #[error("Edge {id} already exists with type {existing}, refusing {requested}")]
    EdgeTypeMismatch {
        id: EdgeId,
        existing: EdgeType,
        requested: EdgeType,
    },

    #[error("Delta not found: {0}")]
    DeltaNotFound(ContentHash),

    /// Rollback target is not reachable by walking parents from HEAD.
    #[error("{0} is not an ancestor of HEAD")]
    NotAnAncestor(ContentHash),

    #[error("Cannot roll back with {0} uncommitted change(s)")]
    UncommittedChanges(usize),

    #[error("Change at {0} carries no diff and cannot be applied")]
    MissingDiff(String),

    #[error("Invalid diff path {path}: {reason}")]
    DiffPath { path: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    /// Persisted graph state violates an adjacency invariant.
    #[error("Corrupt state: {0}")]
    CorruptState(String),
}

// =============================================================================
// TESTS
// =============================================================================
