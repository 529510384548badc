//! # Auxiliary Indices
//!
//! Secondary lookups kept alongside the node store:
//! - `by_file`: `context.file` -> node ids
//! - `by_time`: UTC day of `created` -> node ids
//! - `by_symbol`: summary of `symbol` nodes -> node ids
//!
//! Indices are derived data. They can always be rebuilt from the nodes.

use crate::types::{BrainError, Node, NodeId, NodeType, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKind {
    ByFile,
    ByTime,
    BySymbol,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [IndexKind::ByFile, IndexKind::ByTime, IndexKind::BySymbol];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ByFile => "by_file",
            Self::ByTime => "by_time",
            Self::BySymbol => "by_symbol",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| BrainError::DeserializationError(format!("Unknown index: {s}")))
    }
}

pub type KeyedIndex = BTreeMap<String, BTreeSet<NodeId>>;
pub type DayIndex = BTreeMap<i64, BTreeSet<NodeId>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Indexes {
    pub by_file: KeyedIndex,
    pub by_time: DayIndex,
    pub by_symbol: KeyedIndex,
}

impl Indexes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rebuild<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut indexes = Self::new();
        for node in nodes {
            indexes.insert(node);
        }
        indexes
    }

    /// Which indices a node contributes to.
    #[must_use]
    pub fn kinds_for(node: &Node) -> Vec<IndexKind> {
        let mut kinds = vec![IndexKind::ByTime];
        if node.context.file.is_some() {
            kinds.push(IndexKind::ByFile);
        }
        if node.kind == NodeType::Symbol {
            kinds.push(IndexKind::BySymbol);
        }
        kinds
    }

    pub fn insert(&mut self, node: &Node) {
        if let Some(file) = &node.context.file {
            self.by_file
                .entry(file.clone())
                .or_default()
                .insert(node.id.clone());
        }
        self.by_time
            .entry(node.timestamps.created.day_bucket())
            .or_default()
            .insert(node.id.clone());
        if node.kind == NodeType::Symbol {
            self.by_symbol
                .entry(node.content.summary.clone())
                .or_default()
                .insert(node.id.clone());
        }
    }

    pub fn remove(&mut self, node: &Node) {
        if let Some(file) = &node.context.file {
            remove_keyed(&mut self.by_file, file, &node.id);
        }
        let day = node.timestamps.created.day_bucket();
        if let Some(ids) = self.by_time.get_mut(&day) {
            ids.remove(&node.id);
            if ids.is_empty() {
                self.by_time.remove(&day);
            }
        }
        if node.kind == NodeType::Symbol {
            remove_keyed(&mut self.by_symbol, &node.content.summary, &node.id);
        }
    }

    #[must_use]
    pub fn nodes_for_file(&self, file: &str) -> Vec<NodeId> {
        self.by_file
            .get(file)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Candidates created on or after the day of `since`. Callers still
    /// filter by exact timestamp.
    #[must_use]
    pub fn nodes_since(&self, since: Timestamp) -> Vec<NodeId> {
        self.by_time
            .range(since.day_bucket()..)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Candidates created within `[from, to]`, by whole days.
    #[must_use]
    pub fn nodes_between(&self, from: Timestamp, to: Timestamp) -> Vec<NodeId> {
        if from > to {
            return Vec::new();
        }
        self.by_time
            .range(from.day_bucket()..=to.day_bucket())
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn symbol(&self, name: &str) -> Vec<NodeId> {
        self.by_symbol
            .get(name)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn remove_keyed(index: &mut KeyedIndex, key: &str, id: &NodeId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MILLIS_PER_DAY, NodeContent, NodeContext, NodeScore, NodeTimestamps};

    fn node(id: &str, kind: NodeType, summary: &str, file: Option<&str>, day: i64) -> Node {
        Node {
            id: NodeId::new(id),
            kind,
            content: NodeContent::new(summary, ""),
            context: file.map(NodeContext::file).unwrap_or_default(),
            score: NodeScore::default(),
            timestamps: NodeTimestamps::at(Timestamp(day * MILLIS_PER_DAY + 5)),
        }
    }

    #[test]
    fn insert_and_remove_keep_indices_tidy() {
        let a = node("a", NodeType::Symbol, "Brain::open", Some("src/brain.rs"), 3);
        let b = node("b", NodeType::Pattern, "builder", Some("src/brain.rs"), 4);
        let mut idx = Indexes::rebuild([&a, &b]);

        assert_eq!(idx.nodes_for_file("src/brain.rs").len(), 2);
        assert_eq!(idx.symbol("Brain::open"), vec![NodeId::new("a")]);
        assert!(idx.symbol("builder").is_empty());

        idx.remove(&a);
        assert_eq!(idx.nodes_for_file("src/brain.rs"), vec![NodeId::new("b")]);
        assert!(idx.by_symbol.is_empty());
        assert!(!idx.by_time.contains_key(&3));
    }

    #[test]
    fn time_ranges_use_day_buckets() {
        let nodes = [
            node("old", NodeType::Pattern, "x", None, 1),
            node("mid", NodeType::Pattern, "y", None, 5),
            node("new", NodeType::Pattern, "z", None, 9),
        ];
        let idx = Indexes::rebuild(&nodes);

        let since = idx.nodes_since(Timestamp(5 * MILLIS_PER_DAY + 999));
        assert_eq!(since, vec![NodeId::new("mid"), NodeId::new("new")]);

        let between = idx.nodes_between(Timestamp(0), Timestamp(5 * MILLIS_PER_DAY));
        assert_eq!(between, vec![NodeId::new("old"), NodeId::new("mid")]);
        assert!(idx.nodes_between(Timestamp(10), Timestamp(0)).is_empty());
    }

    #[test]
    fn kinds_for_reflects_node_shape() {
        let sym = node("s", NodeType::Symbol, "f", Some("a.rs"), 0);
        assert_eq!(
            Indexes::kinds_for(&sym),
            vec![IndexKind::ByTime, IndexKind::ByFile, IndexKind::BySymbol]
        );
        let bare = node("p", NodeType::Pattern, "f", None, 0);
        assert_eq!(Indexes::kinds_for(&bare), vec![IndexKind::ByTime]);
    }

    #[test]
    fn index_kind_names_round_trip() {
        for kind in IndexKind::ALL {
            assert_eq!(kind.as_str().parse::<IndexKind>().expect("parse"), kind);
        }
    }
}
