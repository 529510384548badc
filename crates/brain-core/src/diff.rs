//! # Structural Diff
//!
//! Minimal structural diffs over JSON values, used to record what a pending
//! change did so it can be reversed on rollback.
//!
//! - `compute` walks two values and emits `Add`/`Delete`/`Replace` entries
//! - `apply` replays entries onto a copy of a base value
//! - `reverse` produces the entries that undo `apply`
//! - `compact` collapses entries that touch the same subtree to their net effect
//!
//! Paths are typed (`DiffPath` of `PathSegment`s). Their textual form is the
//! dot-separated key list, where all-digit segments are read as array indices.
//!
//! Array diffs emit appended elements in ascending index order and removed
//! elements in descending order, so every entry addresses a valid position
//! at the moment it is applied.

use crate::types::BrainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// PATHS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn as_key(&self) -> String {
        match self {
            Self::Key(k) => k.clone(),
            Self::Index(i) => i.to_string(),
        }
    }

    fn as_index(&self) -> Option<usize> {
        match self {
            Self::Key(k) => k.parse().ok(),
            Self::Index(i) => Some(*i),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Location of a value inside a document. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DiffPath(Vec<PathSegment>);

impl DiffPath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `self` is `prefix` or lies below it.
    #[must_use]
    pub fn starts_with(&self, prefix: &DiffPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// `self` relative to `prefix`. Callers check `starts_with` first.
    fn strip(&self, prefix: &DiffPath) -> DiffPath {
        DiffPath(self.0.iter().skip(prefix.0.len()).cloned().collect())
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    /// Parse the dot-separated form. Numeric segments become indices.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::root();
        }
        Self(
            text.split('.')
                .map(|seg| match seg.parse::<usize>() {
                    Ok(i) => PathSegment::Index(i),
                    Err(_) => PathSegment::Key(seg.to_string()),
                })
                .collect(),
        )
    }
}

impl fmt::Display for DiffPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl From<String> for DiffPath {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<DiffPath> for String {
    fn from(path: DiffPath) -> Self {
        path.to_string()
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

/// One structural edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiffEntry {
    /// Value inserted where nothing was.
    Add { path: DiffPath, value: Value },
    /// Value removed; `value` is what was there.
    Delete { path: DiffPath, value: Value },
    /// Value swapped for another of a different type or content.
    Replace { path: DiffPath, from: Value, to: Value },
}

impl DiffEntry {
    #[must_use]
    pub fn path(&self) -> &DiffPath {
        match self {
            Self::Add { path, .. } | Self::Delete { path, .. } | Self::Replace { path, .. } => path,
        }
    }

    /// Value at the path before this entry applies (`None` = absent).
    #[must_use]
    pub fn before(&self) -> Option<&Value> {
        match self {
            Self::Add { .. } => None,
            Self::Delete { value, .. } => Some(value),
            Self::Replace { from, .. } => Some(from),
        }
    }

    /// Value at the path after this entry applies (`None` = absent).
    #[must_use]
    pub fn after(&self) -> Option<&Value> {
        match self {
            Self::Add { value, .. } => Some(value),
            Self::Delete { .. } => None,
            Self::Replace { to, .. } => Some(to),
        }
    }

    /// The entry that undoes this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Add { path, value } => Self::Delete {
                path: path.clone(),
                value: value.clone(),
            },
            Self::Delete { path, value } => Self::Add {
                path: path.clone(),
                value: value.clone(),
            },
            Self::Replace { path, from, to } => Self::Replace {
                path: path.clone(),
                from: to.clone(),
                to: from.clone(),
            },
        }
    }

    fn with_path(&self, path: DiffPath) -> Self {
        match self {
            Self::Add { value, .. } => Self::Add {
                path,
                value: value.clone(),
            },
            Self::Delete { value, .. } => Self::Delete {
                path,
                value: value.clone(),
            },
            Self::Replace { from, to, .. } => Self::Replace {
                path,
                from: from.clone(),
                to: to.clone(),
            },
        }
    }

    fn from_states(path: DiffPath, before: Option<Value>, after: Option<Value>) -> Option<Self> {
        match (before, after) {
            (None, None) => None,
            (None, Some(value)) => Some(Self::Add { path, value }),
            (Some(value), None) => Some(Self::Delete { path, value }),
            (Some(from), Some(to)) if from == to => None,
            (Some(from), Some(to)) => Some(Self::Replace { path, from, to }),
        }
    }
}

// =============================================================================
// COMPUTE
// =============================================================================

/// Diff two values rooted at the document root.
#[must_use]
pub fn compute(before: &Value, after: &Value) -> Vec<DiffEntry> {
    compute_at(before, after, &DiffPath::root())
}

/// Diff two values that live at `path` inside a larger document.
#[must_use]
pub fn compute_at(before: &Value, after: &Value, path: &DiffPath) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    let mut cursor = path.0.clone();
    diff_into(before, after, &mut cursor, &mut out);
    out
}

/// Diff two possibly-absent root values: absent→present is a root `Add`,
/// present→absent a root `Delete`.
#[must_use]
pub fn compute_presence(before: Option<&Value>, after: Option<&Value>) -> Vec<DiffEntry> {
    match (before, after) {
        (Some(b), Some(a)) => compute(b, a),
        (b, a) => DiffEntry::from_states(DiffPath::root(), b.cloned(), a.cloned())
            .into_iter()
            .collect(),
    }
}

fn diff_into(before: &Value, after: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<DiffEntry>) {
    if before == after {
        return;
    }

    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
            for key in keys {
                path.push(PathSegment::Key(key.clone()));
                match (b.get(key), a.get(key)) {
                    (Some(bv), Some(av)) => diff_into(bv, av, path, out),
                    (None, Some(av)) => out.push(DiffEntry::Add {
                        path: DiffPath(path.clone()),
                        value: av.clone(),
                    }),
                    (Some(bv), None) => out.push(DiffEntry::Delete {
                        path: DiffPath(path.clone()),
                        value: bv.clone(),
                    }),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            let common = b.len().min(a.len());
            for i in 0..common {
                path.push(PathSegment::Index(i));
                diff_into(&b[i], &a[i], path, out);
                path.pop();
            }
            for (i, value) in a.iter().enumerate().skip(common) {
                path.push(PathSegment::Index(i));
                out.push(DiffEntry::Add {
                    path: DiffPath(path.clone()),
                    value: value.clone(),
                });
                path.pop();
            }
            for i in (common..b.len()).rev() {
                path.push(PathSegment::Index(i));
                out.push(DiffEntry::Delete {
                    path: DiffPath(path.clone()),
                    value: b[i].clone(),
                });
                path.pop();
            }
        }
        _ => out.push(DiffEntry::Replace {
            path: DiffPath(path.clone()),
            from: before.clone(),
            to: after.clone(),
        }),
    }
}

// =============================================================================
// APPLY / REVERSE / COMPACT
// =============================================================================

/// Apply entries, in order, to a copy of `base`.
///
/// A root `Delete` leaves `Value::Null`, which callers read as "absent".
pub fn apply(base: &Value, diffs: &[DiffEntry]) -> Result<Value, BrainError> {
    let mut doc = base.clone();
    for entry in diffs {
        apply_entry(&mut doc, entry)?;
    }
    Ok(doc)
}

/// The entries that undo `diffs`: inverted, in reverse order.
#[must_use]
pub fn reverse(diffs: &[DiffEntry]) -> Vec<DiffEntry> {
    diffs.iter().rev().map(DiffEntry::inverse).collect()
}

/// Collapse entries to their net effect per touched subtree.
///
/// An entry below a path already touched is folded into that path's net
/// `after`. An entry on an ancestor of touched paths swallows them, with its
/// `before` rewound past their edits. Each net entry spans the state before
/// the first touch to the state after the last, and sits at the position of
/// the last touch. Nets with no effect (added then deleted, or replaced
/// back) disappear.
///
/// Entries that cannot be folded (they would not apply in sequence) are kept
/// on their own path.
#[must_use]
pub fn compact(diffs: &[DiffEntry]) -> Vec<DiffEntry> {
    let mut nets: Vec<Net> = Vec::new();
    for (pos, entry) in diffs.iter().enumerate() {
        match nets.iter().position(|net| entry.path().starts_with(&net.path)) {
            Some(i) => {
                if nets[i].absorb(entry, pos) {
                    continue;
                }
            }
            None => {
                if let Some(net) = Net::enclosing(entry, pos, &mut nets) {
                    nets.push(net);
                    continue;
                }
            }
        }
        nets.push(Net::new(entry, pos));
    }

    nets.sort_by_key(|net| net.last);
    nets.into_iter()
        .filter_map(|net| DiffEntry::from_states(net.path, net.before, net.after))
        .collect()
}

struct Net {
    path: DiffPath,
    before: Option<Value>,
    after: Option<Value>,
    last: usize,
}

impl Net {
    fn new(entry: &DiffEntry, pos: usize) -> Self {
        Self {
            path: entry.path().clone(),
            before: entry.before().cloned(),
            after: entry.after().cloned(),
            last: pos,
        }
    }

    fn absorb(&mut self, entry: &DiffEntry, pos: usize) -> bool {
        let inner = entry.path().strip(&self.path);
        let after = if inner.is_root() {
            entry.after().cloned()
        } else {
            let Some(current) = &self.after else {
                return false;
            };
            match apply(current, &[entry.with_path(inner)]) {
                Ok(next) => Some(next),
                Err(_) => return false,
            }
        };
        self.after = after;
        self.last = pos;
        true
    }

    fn enclosing(entry: &DiffEntry, pos: usize, nets: &mut Vec<Net>) -> Option<Net> {
        let path = entry.path();
        let mut inner: Vec<&Net> = nets.iter().filter(|net| net.path.starts_with(path)).collect();
        if inner.is_empty() {
            return None;
        }
        inner.sort_by_key(|net| net.last);
        let edits: Vec<DiffEntry> = inner
            .iter()
            .filter_map(|net| {
                DiffEntry::from_states(net.path.strip(path), net.before.clone(), net.after.clone())
            })
            .collect();
        let before = apply(entry.before()?, &reverse(&edits)).ok()?;

        nets.retain(|net| !net.path.starts_with(path));
        Some(Net {
            path: path.clone(),
            before: Some(before),
            after: entry.after().cloned(),
            last: pos,
        })
    }
}

fn apply_entry(doc: &mut Value, entry: &DiffEntry) -> Result<(), BrainError> {
    let full = entry.path();
    let Some((last, parents)) = full.segments().split_last() else {
        *doc = match entry {
            DiffEntry::Add { value, .. } => value.clone(),
            DiffEntry::Delete { .. } => Value::Null,
            DiffEntry::Replace { to, .. } => to.clone(),
        };
        return Ok(());
    };

    let mut parent = doc;
    for seg in parents {
        parent = match child_mut(parent, seg) {
            Some(child) => child,
            None => return Err(path_error(full, "missing intermediate value")),
        };
    }

    match entry {
        DiffEntry::Add { value, .. } => match parent {
            Value::Object(map) => {
                map.insert(last.as_key(), value.clone());
                Ok(())
            }
            Value::Array(items) => match last.as_index() {
                Some(i) if i <= items.len() => {
                    items.insert(i, value.clone());
                    Ok(())
                }
                _ => Err(path_error(full, "array index out of range")),
            },
            _ => Err(path_error(full, "parent is not a container")),
        },
        DiffEntry::Delete { .. } => match parent {
            Value::Object(map) => map
                .remove(&last.as_key())
                .map(|_| ())
                .ok_or_else(|| path_error(full, "key not present")),
            Value::Array(items) => match last.as_index() {
                Some(i) if i < items.len() => {
                    items.remove(i);
                    Ok(())
                }
                _ => Err(path_error(full, "array index out of range")),
            },
            _ => Err(path_error(full, "parent is not a container")),
        },
        DiffEntry::Replace { to, .. } => match child_mut(parent, last) {
            Some(slot) => {
                *slot = to.clone();
                Ok(())
            }
            None => Err(path_error(full, "value not present")),
        },
    }
}

fn child_mut<'v>(value: &'v mut Value, seg: &PathSegment) -> Option<&'v mut Value> {
    match value {
        Value::Object(map) => map.get_mut(&seg.as_key()),
        Value::Array(items) => seg.as_index().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

fn path_error(path: &DiffPath, reason: &str) -> BrainError {
    BrainError::DiffPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_values_produce_no_entries() {
        let v = json!({"a": [1, 2, {"b": null}]});
        assert!(compute(&v, &v).is_empty());
    }

    #[test]
    fn nested_field_change_is_a_replace() {
        let before = json!({"score": {"weight": 0.5, "usage_count": 0}});
        let after = json!({"score": {"weight": 0.25, "usage_count": 0}});
        let diffs = compute(&before, &after);
        assert_eq!(
            diffs,
            vec![DiffEntry::Replace {
                path: DiffPath::parse("score.weight"),
                from: json!(0.5),
                to: json!(0.25),
            }]
        );
    }

    #[test]
    fn key_union_yields_add_and_delete() {
        let before = json!({"gone": 1, "kept": 2});
        let after = json!({"kept": 2, "new": 3});
        let diffs = compute(&before, &after);
        assert_eq!(diffs.len(), 2);
        assert!(diffs.contains(&DiffEntry::Delete {
            path: DiffPath::root().key("gone"),
            value: json!(1)
        }));
        assert!(diffs.contains(&DiffEntry::Add {
            path: DiffPath::root().key("new"),
            value: json!(3)
        }));
    }

    #[test]
    fn type_mismatch_is_a_replace() {
        let diffs = compute(&json!({"a": [1]}), &json!({"a": "one"}));
        assert_eq!(diffs.len(), 1);
        assert!(matches!(&diffs[0], DiffEntry::Replace { path, .. } if path.to_string() == "a"));
    }

    #[test]
    fn shrinking_array_round_trips() {
        let before = json!([1, 2, 3, 4]);
        let after = json!([9]);
        let diffs = compute(&before, &after);
        assert_eq!(apply(&before, &diffs).expect("apply"), after);
        assert_eq!(
            apply(&after, &reverse(&diffs)).expect("reverse"),
            before
        );
    }

    #[test]
    fn presence_diff_adds_and_deletes_root() {
        let v = json!({"id": "x"});
        let added = compute_presence(None, Some(&v));
        assert_eq!(apply(&Value::Null, &added).expect("apply"), v);

        let deleted = compute_presence(Some(&v), None);
        assert_eq!(apply(&v, &deleted).expect("apply"), Value::Null);
        assert_eq!(apply(&Value::Null, &reverse(&deleted)).expect("undo"), v);

        assert!(compute_presence(None, None).is_empty());
    }

    #[test]
    fn path_text_coerces_numeric_segments() {
        let path = DiffPath::parse("items.2.name");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("items".into()),
                PathSegment::Index(2),
                PathSegment::Key("name".into())
            ]
        );
        assert_eq!(path.to_string(), "items.2.name");
        assert!(DiffPath::parse("").is_root());
    }

    #[test]
    fn numeric_segment_addresses_object_key() {
        let base = json!({"by_day": {"19000": 1}});
        let entry = DiffEntry::Replace {
            path: DiffPath::parse("by_day.19000"),
            from: json!(1),
            to: json!(2),
        };
        let out = apply(&base, &[entry]).expect("apply");
        assert_eq!(out, json!({"by_day": {"19000": 2}}));
    }

    #[test]
    fn apply_rejects_missing_intermediate() {
        let entry = DiffEntry::Add {
            path: DiffPath::parse("a.b.c"),
            value: json!(1),
        };
        let result = apply(&json!({}), &[entry]);
        assert!(matches!(result, Err(BrainError::DiffPath { .. })));
    }

    #[test]
    fn compact_drops_add_then_delete() {
        let path = DiffPath::parse("tmp");
        let diffs = vec![
            DiffEntry::Add {
                path: path.clone(),
                value: json!(1),
            },
            DiffEntry::Delete {
                path,
                value: json!(1),
            },
        ];
        assert!(compact(&diffs).is_empty());
    }

    #[test]
    fn compact_merges_replacements() {
        let path = DiffPath::parse("w");
        let diffs = vec![
            DiffEntry::Replace {
                path: path.clone(),
                from: json!(1),
                to: json!(2),
            },
            DiffEntry::Replace {
                path: path.clone(),
                from: json!(2),
                to: json!(3),
            },
        ];
        assert_eq!(
            compact(&diffs),
            vec![DiffEntry::Replace {
                path,
                from: json!(1),
                to: json!(3)
            }]
        );
    }

    #[test]
    fn compact_drops_replace_back_to_original() {
        let path = DiffPath::parse("w");
        let diffs = vec![
            DiffEntry::Replace {
                path: path.clone(),
                from: json!(1),
                to: json!(2),
            },
            DiffEntry::Replace {
                path,
                from: json!(2),
                to: json!(1),
            },
        ];
        assert!(compact(&diffs).is_empty());
    }

    #[test]
    fn compact_keeps_distinct_paths_in_order() {
        let before = json!({"a": 1, "b": 1});
        let mid = json!({"a": 2, "b": 1});
        let after = json!({"a": 2, "b": 5});
        let mut diffs = compute(&before, &mid);
        diffs.extend(compute(&mid, &after));
        let compacted = compact(&diffs);
        assert_eq!(compacted.len(), 2);
        assert_eq!(apply(&before, &compacted).expect("apply"), after);
    }

    #[test]
    fn compact_folds_child_edits_into_parent() {
        let before = json!({"a": 5});
        let diffs = vec![
            DiffEntry::Replace {
                path: DiffPath::parse("a"),
                from: json!(5),
                to: json!({"b": 1}),
            },
            DiffEntry::Replace {
                path: DiffPath::parse("a.b"),
                from: json!(1),
                to: json!(2),
            },
            DiffEntry::Delete {
                path: DiffPath::parse("a"),
                value: json!({"b": 2}),
            },
        ];
        let after = apply(&before, &diffs).expect("apply in sequence");

        let compacted = compact(&diffs);
        assert_eq!(
            compacted,
            vec![DiffEntry::Delete {
                path: DiffPath::parse("a"),
                value: json!(5),
            }]
        );
        assert_eq!(apply(&before, &compacted).expect("apply"), after);
        assert_eq!(apply(&after, &reverse(&compacted)).expect("undo"), before);
    }

    #[test]
    fn compact_rewinds_parent_before_past_child_edits() {
        let before = json!({"a": {"b": 1}, "z": 0});
        let mid = json!({"a": {"b": 1, "c": 3}, "z": 0});
        let after = json!({"a": 7, "z": 0});
        let mut diffs = compute(&before, &mid);
        diffs.extend(compute(&mid, &after));

        let compacted = compact(&diffs);
        assert_eq!(
            compacted,
            vec![DiffEntry::Replace {
                path: DiffPath::parse("a"),
                from: json!({"b": 1}),
                to: json!(7),
            }]
        );
        assert_eq!(apply(&before, &compacted).expect("apply"), after);
    }

    #[test]
    fn entries_serialize_with_dotted_paths() {
        let entry = DiffEntry::Add {
            path: DiffPath::parse("context.file"),
            value: json!("src/lib.rs"),
        };
        let text = serde_json::to_string(&entry).expect("serialize");
        assert!(text.contains(r#""kind":"add""#));
        assert!(text.contains(r#""path":"context.file""#));
        let back: DiffEntry = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, entry);
    }
}
