//! # Primitives
//!
//! Hardcoded constants for the Brain.
//!
//! These are compiled into the binary. Tunables that callers may change per
//! request (query depth, limits, spreading parameters) have their defaults
//! here and are overridden through `QueryOptions` or `BrainConfig`.

// =============================================================================
// SCORE DEFAULTS
// =============================================================================

/// Weight assigned to a freshly created node.
pub const DEFAULT_NODE_WEIGHT: f64 = 0.5;

/// Success rate assigned to a node that has never been used.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Weight assigned to an edge created without explicit properties.
pub const DEFAULT_EDGE_WEIGHT: f64 = 0.5;

/// Fraction of the remaining headroom added by one `strengthen` call.
///
/// `weight <- weight + (1 - weight) * STRENGTHEN_RATE`
pub const STRENGTHEN_RATE: f64 = 0.1;

/// Weight of semantic edges created for explicitly related nodes on `learn`.
pub const RELATED_EDGE_WEIGHT: f64 = 0.7;

/// Factor applied to a node's weight when it is superseded.
pub const SUPERSEDE_FACTOR: f64 = 0.5;

// =============================================================================
// RELEVANCE WEIGHTS (must sum to 1.0)
// =============================================================================

pub const RELEVANCE_CONTENT: f64 = 0.30;
pub const RELEVANCE_RECENCY: f64 = 0.20;
pub const RELEVANCE_USAGE: f64 = 0.15;
pub const RELEVANCE_WEIGHT: f64 = 0.15;
pub const RELEVANCE_CONNECTIONS: f64 = 0.10;
pub const RELEVANCE_SUCCESS: f64 = 0.10;

/// Detail text matches count for less than summary matches.
pub const DETAIL_MATCH_FACTOR: f64 = 0.8;

/// Recency half-life style constant: `exp(-age_days / RECENCY_DECAY_DAYS)`.
pub const RECENCY_DECAY_DAYS: f64 = 30.0;

/// Usage count at which the usage component saturates.
pub const USAGE_SATURATION: f64 = 10.0;

/// Incident edge count at which the connection component saturates.
pub const CONNECTION_SATURATION: f64 = 5.0;

/// Final score blend: `ACTIVATION_SHARE * activation + (1 - ACTIVATION_SHARE) * relevance`.
pub const ACTIVATION_SHARE: f64 = 0.6;

// =============================================================================
// QUERY DEFAULTS
// =============================================================================

pub const DEFAULT_QUERY_DEPTH: usize = 2;
pub const DEFAULT_QUERY_LIMIT: usize = 50;
pub const DEFAULT_SPREAD_ITERATIONS: usize = 3;
pub const DEFAULT_SPREAD_DECAY: f64 = 0.5;
pub const DEFAULT_SPREAD_THRESHOLD: f64 = 0.05;

/// Number of text-matched nodes used to seed a semantic query.
pub const SEMANTIC_SEED_COUNT: usize = 10;

/// Default hop bound for `find_path`.
pub const DEFAULT_PATH_DEPTH: usize = 5;

/// Hard upper bound on any traversal depth, whatever the caller asks for.
pub const MAX_TRAVERSAL_DEPTH: usize = 32;

// =============================================================================
// LEARN / PRUNE DEFAULTS
// =============================================================================

/// Summary similarity at which `learn` adds a semantic edge on its own.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Cap on edges `learn` creates per auto-link category.
pub const DEFAULT_MAX_AUTO_LINKS: usize = 5;

/// Window within which consecutive learnings are linked temporally.
pub const DEFAULT_TEMPORAL_WINDOW_SECS: u64 = 3600;

pub const DEFAULT_PRUNE_MIN_WEIGHT: f64 = 0.1;
pub const DEFAULT_PRUNE_UNUSED_DAYS: u64 = 90;
pub const DEFAULT_PRUNE_MAX_USAGE: u64 = 0;

// =============================================================================
// FORMAT
// =============================================================================

/// Magic bytes for persisted records.
pub const MAGIC_BYTES: &[u8; 4] = b"BRAN";

/// Current record format version.
///
/// Increment this when making breaking changes to the persisted layout.
pub const FORMAT_VERSION: u8 = 1;

/// Length of node and edge identifiers, in hex characters.
pub const ID_HEX_LEN: usize = 16;

/// Clamp a score into `[0, 1]`. NaN collapses to 0.
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
