//! # Content Hashing
//!
//! Deterministic identities for nodes, edges, and deltas.
//!
//! Values are serialized to JSON before hashing. Structs serialize their
//! fields in declaration order and `serde_json::Map` is key-sorted, so equal
//! values always produce equal bytes and therefore equal digests.

use crate::types::{BrainError, ContentHash, EdgeId, NodeContent, NodeId, NodeType, Timestamp};
use crate::primitives::ID_HEX_LEN;
use serde::Serialize;

/// BLAKE3 digest of arbitrary bytes, hex encoded.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash(blake3::hash(data).to_hex().to_string())
}

/// Hash any serializable value.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, BrainError> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| BrainError::SerializationError(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}

/// Node identity: `(type, content, created)`.
pub fn node_id(
    kind: NodeType,
    content: &NodeContent,
    created: Timestamp,
) -> Result<NodeId, BrainError> {
    let digest = content_hash(&(kind, content, created))?;
    Ok(NodeId(truncate(&digest)))
}

/// Edge identity: `(source, target)`. The type is deliberately not part of
/// the id, so a pair can only ever carry one edge.
#[must_use]
pub fn edge_id(source: &NodeId, target: &NodeId) -> EdgeId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_str().as_bytes());
    // Separator keeps ("ab", "c") and ("a", "bc") apart.
    hasher.update(&[0]);
    hasher.update(target.as_str().as_bytes());
    EdgeId(truncate(&ContentHash(hasher.finalize().to_hex().to_string())))
}

/// Delta identity: `(changes, parent, timestamp)`.
pub fn delta_hash<T: Serialize + ?Sized>(
    changes: &T,
    parent: Option<&ContentHash>,
    timestamp: Timestamp,
) -> Result<ContentHash, BrainError> {
    content_hash(&(changes, parent, timestamp))
}

fn truncate(digest: &ContentHash) -> String {
    digest.as_str().chars().take(ID_HEX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash(&("x", 1, vec![1.5, 2.5])).expect("hash");
        let b = content_hash(&("x", 1, vec![1.5, 2.5])).expect("hash");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn content_hash_differs_on_change() {
        let a = content_hash(&serde_json::json!({"a": 1})).expect("hash");
        let b = content_hash(&serde_json::json!({"a": 2})).expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn json_key_order_does_not_matter() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).expect("json");
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).expect("json");
        assert_eq!(
            content_hash(&a).expect("hash"),
            content_hash(&b).expect("hash")
        );
    }

    #[test]
    fn node_id_depends_on_timestamp() {
        let content = NodeContent::new("use ? for errors", "");
        let a = node_id(NodeType::Pattern, &content, Timestamp(1)).expect("id");
        let b = node_id(NodeType::Pattern, &content, Timestamp(2)).expect("id");
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), ID_HEX_LEN);
    }

    #[test]
    fn edge_id_is_ordered_pair() {
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        assert_eq!(edge_id(&a, &b), edge_id(&a, &b));
        assert_ne!(edge_id(&a, &b), edge_id(&b, &a));
        assert_ne!(
            edge_id(&NodeId::new("ab"), &NodeId::new("c")),
            edge_id(&NodeId::new("a"), &NodeId::new("bc"))
        );
    }
}
