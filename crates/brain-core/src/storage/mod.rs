//! # Persistence
//!
//! Key-addressed record storage behind the Brain.
//!
//! The Brain owns all in-memory state and decides what to write and when.
//! A backend only stores opaque, already-framed records (see
//! `formats::persistence`) under typed keys. Failures are returned to the
//! caller, never retried here.

pub mod memory;
pub mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::index::IndexKind;
use crate::types::{BrainError, ContentHash, NodeType};
use std::fmt;
use std::str::FromStr;

/// Address of one persisted record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKey {
    /// All nodes of one type.
    Nodes(NodeType),
    /// Edges plus both adjacency maps.
    Graph,
    Delta(ContentHash),
    Head,
    Index(IndexKind),
    /// Changes not yet committed, so they outlive the process.
    Pending,
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes(kind) => write!(f, "nodes/{kind}"),
            Self::Graph => f.write_str("graph"),
            Self::Delta(hash) => write!(f, "delta/{hash}"),
            Self::Head => f.write_str("head"),
            Self::Index(kind) => write!(f, "index/{kind}"),
            Self::Pending => f.write_str("pending"),
        }
    }
}

impl FromStr for StoreKey {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            None if s == "graph" => Ok(Self::Graph),
            None if s == "head" => Ok(Self::Head),
            None if s == "pending" => Ok(Self::Pending),
            Some(("nodes", kind)) => Ok(Self::Nodes(kind.parse()?)),
            Some(("delta", hash)) if !hash.is_empty() => Ok(Self::Delta(ContentHash::new(hash))),
            Some(("index", kind)) => Ok(Self::Index(kind.parse()?)),
            _ => Err(BrainError::StorageError(format!("Unknown record key: {s}"))),
        }
    }
}

/// A key-value backend for framed records.
pub trait Persistence: Send {
    fn load(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, BrainError>;

    fn save(&mut self, key: &StoreKey, value: &[u8]) -> Result<(), BrainError>;

    /// Write several records. Backends with transactions make this atomic.
    fn save_batch(&mut self, records: &[(StoreKey, Vec<u8>)]) -> Result<(), BrainError> {
        for (key, value) in records {
            self.save(key, value)?;
        }
        Ok(())
    }

    /// Returns whether the key existed.
    fn remove(&mut self, key: &StoreKey) -> Result<bool, BrainError>;

    /// Remove several records, returning how many existed. Atomic where
    /// `save_batch` is.
    fn remove_batch(&mut self, keys: &[StoreKey]) -> Result<usize, BrainError> {
        let mut removed = 0;
        for key in keys {
            if self.remove(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Every stored key, in key order.
    fn keys(&self) -> Result<Vec<StoreKey>, BrainError>;
}
