//! # Configuration
//!
//! `BrainConfig` groups every tunable into sections. All fields have
//! defaults, so an empty document is a valid configuration. Parsing the
//! document (TOML in the app) happens outside this crate.

use crate::brain::PruneOptions;
use crate::primitives::{
    DEFAULT_MAX_AUTO_LINKS, DEFAULT_PRUNE_MAX_USAGE, DEFAULT_PRUNE_MIN_WEIGHT,
    DEFAULT_PRUNE_UNUSED_DAYS, DEFAULT_QUERY_DEPTH, DEFAULT_QUERY_LIMIT, DEFAULT_SIMILARITY_THRESHOLD,
    DEFAULT_SPREAD_DECAY, DEFAULT_SPREAD_ITERATIONS, DEFAULT_SPREAD_THRESHOLD,
    DEFAULT_TEMPORAL_WINDOW_SECS,
};
use crate::query::QueryOptions;
use crate::types::BrainError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    pub storage: StorageSection,
    pub learn: LearnSection,
    pub query: QuerySection,
    pub prune: PruneSection,
    pub persistence: PersistenceSection,
}

impl BrainConfig {
    /// Reject values the algorithms cannot work with.
    pub fn validate(&self) -> Result<(), BrainError> {
        if !(0.0..=1.0).contains(&self.learn.similarity_threshold) {
            return Err(BrainError::Config(
                "learn.similarity_threshold must be within [0, 1]".into(),
            ));
        }
        if self.query.limit == 0 {
            return Err(BrainError::Config(
                "query.limit must be greater than 0".into(),
            ));
        }
        if !(self.query.spread_decay > 0.0 && self.query.spread_decay <= 1.0) {
            return Err(BrainError::Config(
                "query.spread_decay must be within (0, 1]".into(),
            ));
        }
        if self.query.spread_threshold < 0.0 {
            return Err(BrainError::Config(
                "query.spread_threshold must not be negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.prune.min_weight) {
            return Err(BrainError::Config(
                "prune.min_weight must be within [0, 1]".into(),
            ));
        }
        if self.prune.keep_deltas == Some(0) {
            return Err(BrainError::Config(
                "prune.keep_deltas must keep at least one delta".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Redb && self.storage.path.as_os_str().is_empty() {
            return Err(BrainError::Config(
                "storage.path is required for the redb backend".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Redb,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redb,
            path: PathBuf::from("brain.redb"),
        }
    }
}

/// Auto-linking on `learn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnSection {
    pub similarity_threshold: f64,
    pub max_auto_links: usize,
    pub temporal_window_secs: u64,
}

impl Default for LearnSection {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_auto_links: DEFAULT_MAX_AUTO_LINKS,
            temporal_window_secs: DEFAULT_TEMPORAL_WINDOW_SECS,
        }
    }
}

impl LearnSection {
    #[must_use]
    pub fn temporal_window_millis(&self) -> i64 {
        i64::try_from(self.temporal_window_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

/// Defaults for queries that do not say otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    pub depth: usize,
    pub limit: usize,
    pub spread_iterations: usize,
    pub spread_decay: f64,
    pub spread_threshold: f64,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            depth: DEFAULT_QUERY_DEPTH,
            limit: DEFAULT_QUERY_LIMIT,
            spread_iterations: DEFAULT_SPREAD_ITERATIONS,
            spread_decay: DEFAULT_SPREAD_DECAY,
            spread_threshold: DEFAULT_SPREAD_THRESHOLD,
        }
    }
}

impl QuerySection {
    /// Query options with these defaults and no search criteria.
    #[must_use]
    pub fn options(&self) -> QueryOptions {
        QueryOptions {
            depth: self.depth,
            limit: self.limit,
            spread_iterations: self.spread_iterations,
            spread_decay: self.spread_decay,
            spread_threshold: self.spread_threshold,
            ..QueryOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneSection {
    pub min_weight: f64,
    pub unused_days: u64,
    pub max_usage: u64,
    /// When set, `prune` also trims delta history to this many commits.
    pub keep_deltas: Option<usize>,
}

impl Default for PruneSection {
    fn default() -> Self {
        Self {
            min_weight: DEFAULT_PRUNE_MIN_WEIGHT,
            unused_days: DEFAULT_PRUNE_UNUSED_DAYS,
            max_usage: DEFAULT_PRUNE_MAX_USAGE,
            keep_deltas: None,
        }
    }
}

impl PruneSection {
    #[must_use]
    pub fn options(&self) -> PruneOptions {
        PruneOptions {
            min_weight: self.min_weight,
            unused_days: self.unused_days,
            max_usage: self.max_usage,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    /// Write dirty tables after every mutation instead of on `flush`/`commit`.
    pub flush_on_mutation: bool,
}
