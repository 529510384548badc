//! # Property-Based Tests
//!
//! Structural invariants of the graph and the delta engine under random
//! operation sequences.

use brain_core::diff;
use brain_core::{
    Brain, BrainConfig, ContentHash, EdgeStore, EdgeType, ManualClock, MemoryStore, NodeContent,
    NodeContext, NodeId, NodeType, NodeUpdate, Timestamp, Trigger,
};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;

fn id(n: u8) -> NodeId {
    NodeId::new(format!("n{n}"))
}

fn edge_type() -> impl Strategy<Value = EdgeType> {
    prop::sample::select(EdgeType::ALL.to_vec())
}

/// Small JSON documents: objects of scalars, arrays and nested objects.
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn brain_at(ms: i64) -> (Brain, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp(ms)));
    let brain = Brain::open(
        Box::new(MemoryStore::new()),
        clock.clone(),
        BrainConfig::default(),
    )
    .expect("open");
    (brain, clock)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Creating the same (source, target) pair again never adds an edge.
    #[test]
    fn edges_are_unique_per_pair(pairs in vec((0u8..6, 0u8..6), 1..40)) {
        let mut store = EdgeStore::new();
        for (s, t) in &pairs {
            store
                .create(&id(*s), &id(*t), EdgeType::Semantic, None, Timestamp(0))
                .expect("create");
        }
        let distinct: std::collections::BTreeSet<_> = pairs.iter().collect();
        prop_assert_eq!(store.len(), distinct.len());
    }

    /// Forward and reverse adjacency stay mirror images through any mix of
    /// creates and deletes.
    #[test]
    fn adjacency_stays_symmetric(
        ops in vec((any::<bool>(), 0u8..5, 0u8..5, edge_type()), 1..60)
    ) {
        let mut store = EdgeStore::new();
        for (add, s, t, kind) in ops {
            if add {
                // a pair already typed differently is a rejected create
                let _ = store.create(&id(s), &id(t), kind, None, Timestamp(0));
            } else {
                store.delete(&id(s), &id(t), None).expect("delete");
            }
            prop_assert!(store.check_invariants().is_ok());
        }
    }

    /// Edge weights never leave [0, 1], however often they are strengthened.
    #[test]
    fn edge_weight_stays_in_unit_range(initial in -2.0f64..3.0, rounds in 0usize..50) {
        let mut store = EdgeStore::new();
        let props = brain_core::EdgeProperties::weighted(initial);
        store.create(&id(0), &id(1), EdgeType::Causal, Some(props), Timestamp(0)).expect("create");
        for _ in 0..rounds {
            store.strengthen(&id(0), &id(1), EdgeType::Causal, Timestamp(0));
        }
        let w = store.get(&id(0), &id(1), None).expect("edge").properties.weight;
        prop_assert!((0.0..=1.0).contains(&w));
    }

    /// apply(before, compute(before, after)) == after, and reversing undoes it.
    #[test]
    fn diff_apply_and_reverse(before in json_value(), after in json_value()) {
        let diffs = diff::compute(&before, &after);
        let forward = diff::apply(&before, &diffs).expect("apply");
        prop_assert_eq!(&forward, &after);

        let back = diff::apply(&forward, &diff::reverse(&diffs)).expect("reverse");
        prop_assert_eq!(back, before);
    }

    /// Diffing a value against itself yields nothing.
    #[test]
    fn diff_of_equal_values_is_empty(value in json_value()) {
        prop_assert!(diff::compute(&value, &value).is_empty());
    }

    /// Every delta's parent is the delta committed just before it.
    #[test]
    fn commit_chain_links_parents(summaries in vec("[a-z]{3,8}", 1..8)) {
        let (mut brain, clock) = brain_at(1_000_000);
        let mut committed: Vec<ContentHash> = Vec::new();
        for summary in &summaries {
            clock.advance_millis(7_200_000);
            brain
                .learn(NodeType::Pattern, NodeContent::new(summary.as_str(), ""), NodeContext::default(), &[])
                .expect("learn");
            if let Some(hash) = brain.commit(summary, Trigger::Auto).expect("commit") {
                committed.push(hash);
            }
        }

        let history = brain.history(usize::MAX);
        prop_assert_eq!(history.len(), committed.len());
        for (delta, expected) in history.iter().zip(committed.iter().rev()) {
            prop_assert_eq!(&delta.hash, expected);
        }
        for pair in history.windows(2) {
            prop_assert_eq!(pair[0].parent.as_ref(), Some(&pair[1].hash));
        }
    }

    /// Rolling back to the first commit restores exactly the first state.
    #[test]
    fn rollback_restores_first_commit(weights in vec(0.0f64..1.0, 1..6)) {
        let (mut brain, clock) = brain_at(1_000_000);
        let first = brain
            .learn(NodeType::Pattern, NodeContent::new("root fact", ""), NodeContext::file("a.rs"), &[])
            .expect("learn");
        let target = brain.commit("init", Trigger::Manual).expect("commit").expect("hash");
        let snapshot = brain.get(&first.id).cloned();

        for (i, w) in weights.iter().enumerate() {
            clock.advance_millis(1_000);
            brain.update(&first.id, NodeUpdate::weight(*w)).expect("update");
            brain
                .learn(NodeType::Convention, NodeContent::new(format!("step {i}"), ""), NodeContext::file("a.rs"), &[])
                .expect("learn");
            brain.commit(&format!("step {i}"), Trigger::Auto).expect("commit");
        }

        brain.rollback(&target).expect("rollback");
        prop_assert_eq!(brain.nodes().len(), 1);
        prop_assert!(brain.edges().is_empty());
        prop_assert_eq!(brain.get(&first.id).cloned(), snapshot);
        prop_assert!(brain.edges().check_invariants().is_ok());
    }
}

#[test]
fn diff_handles_nested_documents() {
    let before = json!({"a": {"b": [1, 2, 3]}, "c": "x"});
    let after = json!({"a": {"b": [1, 5]}, "d": true});
    let diffs = diff::compute(&before, &after);
    assert_eq!(diff::apply(&before, &diffs).expect("apply"), after);
}
