//! # brain-core
//!
//! The versioned knowledge graph behind the editor assistant's memory.
//!
//! Learned facts (nodes) are connected by typed, weighted edges. Every
//! mutation is recorded as a structural change; changes are grouped into
//! content-addressed deltas that form a history which can be walked, rolled
//! back, squashed and pruned. Retrieval combines per-node relevance with
//! spreading activation over the graph.
//!
//! ## Architectural Constraints
//!
//! - `Brain` is the single owner of mutable graph state
//! - Persistence is a collaborator behind the `Persistence` trait; the graph
//!   never does I/O on its own
//! - Everything that is hashed or iterated uses ordered collections, so ids,
//!   hashes and query results are reproducible
//! - NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod brain;
pub mod changes;
pub mod clock;
pub mod config;
pub mod delta;
pub mod diff;
pub mod edges;
pub mod formats;
pub mod hash;
pub mod index;
pub mod nodes;
pub mod primitives;
pub mod query;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    BrainError, ContentHash, Direction, Edge, EdgeDirection, EdgeId, EdgeProperties, EdgeType,
    Node, NodeContent, NodeContext, NodeId, NodeScore, NodeTimestamps, NodeType, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Graph & History
// =============================================================================

pub use brain::{Brain, PruneOptions, Stats, Status};
pub use changes::{Change, ChangeOp, ChangePath, PendingCounts};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BrainConfig, StorageBackend};
pub use delta::{Delta, DeltaEngine, DeltaMetadata, Trigger, compute_reverse};
pub use diff::DiffEntry;
pub use edges::{EdgeStore, PathResult};
pub use index::{IndexKind, Indexes};
pub use nodes::{NodeFilter, NodeStore, NodeUpdate};
pub use query::{QueryEngine, QueryOptions, QueryResult, ScoredNode};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use formats::{Encoding, RecordHeader};
pub use storage::{MemoryStore, Persistence, RedbStore, StoreKey};
