//! End-to-end scenarios through the `Brain` API: learning, retrieval,
//! versioning and persistence against both storage backends.

use brain_core::{
    Brain, BrainConfig, BrainError, EdgeType, ManualClock, MemoryStore, NodeContent, NodeContext,
    NodeId, NodeType, NodeUpdate, Persistence, PruneOptions, QueryOptions, RedbStore, StoreKey,
    Timestamp, Trigger,
};
use std::sync::Arc;
use tempfile::tempdir;

const START: i64 = 1_750_000_000_000;
const HOUR: i64 = 3_600_000;

fn memory_brain() -> (Brain, Arc<ManualClock>, MemoryStore) {
    let clock = Arc::new(ManualClock::new(Timestamp(START)));
    let store = MemoryStore::new();
    let brain = Brain::open(Box::new(store.clone()), clock.clone(), BrainConfig::default())
        .expect("open brain");
    (brain, clock, store)
}

fn learn(brain: &mut Brain, kind: NodeType, summary: &str, file: Option<&str>) -> NodeId {
    brain
        .learn(
            kind,
            NodeContent::new(summary, format!("details about {summary}")),
            file.map(NodeContext::file).unwrap_or_default(),
            &[],
        )
        .expect("learn")
        .id
}

// =============================================================================
// GRAPH
// =============================================================================

#[test]
fn relinking_strengthens_existing_edge() {
    let (mut brain, clock, _) = memory_brain();
    let a = learn(&mut brain, NodeType::Pattern, "alpha", None);
    clock.advance_millis(2 * HOUR);
    let b = learn(&mut brain, NodeType::Pattern, "beta", None);

    brain.link(&a, &b, EdgeType::Causal, None).expect("link");
    let edge = brain.link(&a, &b, EdgeType::Causal, None).expect("relink");
    assert!((edge.properties.weight - 0.55).abs() < 1e-9);
    assert_eq!(brain.edges().len(), 1);

    let err = brain
        .link(&a, &b, EdgeType::Semantic, None)
        .expect_err("other type on same pair");
    assert!(matches!(err, BrainError::EdgeTypeMismatch { .. }));
}

#[test]
fn path_search_follows_edges_either_way() {
    let (mut brain, clock, _) = memory_brain();
    let mut ids = Vec::new();
    for name in ["one", "two", "three", "four"] {
        clock.advance_millis(2 * HOUR);
        ids.push(learn(&mut brain, NodeType::Convention, name, None));
    }
    brain.link(&ids[0], &ids[1], EdgeType::Causal, None).expect("link");
    // reversed on purpose: traversal ignores direction
    brain.link(&ids[2], &ids[1], EdgeType::Causal, None).expect("link");
    brain.link(&ids[2], &ids[3], EdgeType::Causal, None).expect("link");

    let path = brain.find_path(&ids[0], &ids[3], 5);
    assert!(path.found);
    assert_eq!(path.nodes, ids);
    assert_eq!(path.edges.len(), 3);

    assert!(!brain.find_path(&ids[0], &ids[3], 2).found);

    let chain = brain.query_engine().get_context_chain(&ids[0], &ids[2]);
    assert_eq!(chain.len(), 5);
    assert_eq!(chain[0], "[convention] one");
    assert!(chain[3].starts_with("  <-- causal"));
}

#[test]
fn remove_learning_cascades_edges() {
    let (mut brain, clock, _) = memory_brain();
    let a = learn(&mut brain, NodeType::Pattern, "alpha", Some("x.rs"));
    clock.advance_millis(1_000);
    let b = learn(&mut brain, NodeType::Pattern, "beta", Some("x.rs"));
    assert_eq!(brain.edges().len(), 1);

    assert!(brain.remove_learning(&a).expect("remove"));
    assert!(brain.edges().is_empty());
    assert!(!brain.remove_learning(&a).expect("remove again"));
    assert_eq!(brain.query_engine().by_file("x.rs").len(), 1);
    assert!(brain.get(&b).is_some());
}

#[test]
fn prune_spares_used_nodes() {
    let (mut brain, clock, _) = memory_brain();
    let stale = learn(&mut brain, NodeType::Pattern, "alpha", None);
    clock.advance_millis(2 * HOUR);
    let used = learn(&mut brain, NodeType::Pattern, "beta", None);
    brain.update(&stale, NodeUpdate::weight(0.05)).expect("update");
    brain.update(&used, NodeUpdate::weight(0.05)).expect("update");
    brain.record_usage(&used, None).expect("usage");

    clock.advance_days(120);
    assert_eq!(brain.prune(&PruneOptions::default()).expect("prune"), 1);
    assert!(brain.get(&stale).is_none());
    assert!(brain.get(&used).is_some());
}

// =============================================================================
// RETRIEVAL
// =============================================================================

#[test]
fn query_ranks_text_matches_and_pulls_in_neighbours() {
    let (mut brain, clock, _) = memory_brain();
    let hit = learn(&mut brain, NodeType::Pattern, "retry with exponential backoff", None);
    clock.advance_millis(2 * HOUR);
    let neighbour = learn(&mut brain, NodeType::Convention, "circuit breaker thresholds", None);
    clock.advance_millis(2 * HOUR);
    let unrelated = learn(&mut brain, NodeType::Correction, "timezone parsing", None);
    brain
        .link(&hit, &neighbour, EdgeType::Causal, None)
        .expect("link");

    let result = brain.query(&QueryOptions::text("exponential backoff"));
    let ids: Vec<&NodeId> = result.nodes.iter().map(|s| &s.node.id).collect();
    assert_eq!(ids.first(), Some(&&hit));
    assert!(ids.contains(&&neighbour));
    assert!(!ids.contains(&&unrelated));
    assert_eq!(result.edges.len(), 1);
    assert!(result.stats.activated >= 1);

    let neighbour_score = &result.nodes[1];
    assert!(neighbour_score.activation > 0.0);
    assert!(neighbour_score.score < result.nodes[0].score);
}

#[test]
fn query_limit_truncates() {
    let (mut brain, clock, _) = memory_brain();
    for i in 0..6 {
        clock.advance_millis(2 * HOUR);
        learn(&mut brain, NodeType::Pattern, &format!("handler {i}"), Some("api.rs"));
    }
    let result = brain.query(&QueryOptions::default().with_file("api.rs").with_limit(4));
    assert_eq!(result.nodes.len(), 4);
    assert!(result.truncated);
}

#[test]
fn time_queries_use_creation_time() {
    let (mut brain, clock, _) = memory_brain();
    learn(&mut brain, NodeType::Pattern, "old", None);
    clock.advance_days(10);
    let recent = learn(&mut brain, NodeType::Pattern, "recent", None);

    let since = brain.now().minus_days(1);
    let result = brain.query(&QueryOptions::default().with_since(since));
    let ids: Vec<&NodeId> = result.nodes.iter().map(|s| &s.node.id).collect();
    assert_eq!(ids, vec![&recent]);
}

// =============================================================================
// VERSIONING
// =============================================================================

#[test]
fn rollback_twice_is_idempotent() {
    let (mut brain, clock, _) = memory_brain();
    learn(&mut brain, NodeType::Pattern, "alpha", None);
    let first = brain.commit("first", Trigger::Manual).expect("commit").expect("hash");
    clock.advance_millis(1_000);
    learn(&mut brain, NodeType::Pattern, "beta", None);
    brain.commit("second", Trigger::Manual).expect("commit");

    brain.rollback(&first).expect("rollback");
    let after_once = (brain.stats(), brain.nodes().iter().cloned().collect::<Vec<_>>());
    let deltas_once = brain.deltas().len();

    brain.rollback(&first).expect("rollback again");
    let after_twice = (brain.stats(), brain.nodes().iter().cloned().collect::<Vec<_>>());
    assert_eq!(after_once.0.node_count, after_twice.0.node_count);
    assert_eq!(after_once.1, after_twice.1);
    assert_eq!(brain.deltas().len(), deltas_once);
}

#[test]
fn commit_without_changes_is_none() {
    let (mut brain, _, _) = memory_brain();
    assert_eq!(brain.commit("nothing", Trigger::Manual).expect("commit"), None);
    assert!(brain.history(10).is_empty());
}

#[test]
fn unknown_rollback_target_is_rejected() {
    let (mut brain, _, _) = memory_brain();
    learn(&mut brain, NodeType::Pattern, "alpha", None);
    brain.commit("first", Trigger::Manual).expect("commit");
    let err = brain
        .rollback(&brain_core::ContentHash::new("feedface"))
        .expect_err("not an ancestor");
    assert!(matches!(err, BrainError::NotAnAncestor(_)));
}

#[test]
fn rollback_past_pruned_history_is_refused() {
    let (mut brain, clock, store) = memory_brain();
    let mut hashes = Vec::new();
    for summary in ["first", "second", "third"] {
        clock.advance_millis(2 * HOUR);
        learn(&mut brain, NodeType::Pattern, summary, None);
        hashes.push(brain.commit(summary, Trigger::Manual).expect("commit").expect("hash"));
    }
    assert_eq!(brain.prune_history(2).expect("prune"), 1);

    // `second` still names the pruned delta as its parent
    let head = brain.head().cloned();
    let err = brain.rollback(&hashes[0]).expect_err("pruned target");
    assert!(matches!(err, BrainError::NotAnAncestor(_)));
    assert_eq!(brain.head().cloned(), head);
    assert_eq!(brain.history(10).len(), 2);
    assert_eq!(brain.nodes().len(), 3);
    assert_eq!(store.load(&StoreKey::Delta(hashes[0].clone())).expect("load"), None);

    brain.rollback(&hashes[1]).expect("rollback to retained delta");
    assert_eq!(brain.nodes().len(), 2);
}

#[test]
fn storage_failure_surfaces_on_flush() {
    let (mut brain, _, store) = memory_brain();
    learn(&mut brain, NodeType::Pattern, "alpha", None);
    store.set_fail_saves(true);
    assert!(matches!(brain.flush(), Err(BrainError::StorageError(_))));
    assert!(brain.is_dirty());

    store.set_fail_saves(false);
    brain.flush().expect("flush");
    assert!(store.load(&StoreKey::Graph).expect("load").is_some());
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn redb_brain_survives_reopen() {
    let temp = tempdir().expect("temp dir");
    let path = temp.path().join("brain.redb");
    let clock = Arc::new(ManualClock::new(Timestamp(START)));

    let (a, b, head) = {
        let mut brain = Brain::open(
            Box::new(RedbStore::open(&path).expect("open db")),
            clock.clone(),
            BrainConfig::default(),
        )
        .expect("open brain");
        let a = learn(&mut brain, NodeType::Symbol, "parse_header", Some("codec.rs"));
        clock.advance_millis(1_000);
        let b = learn(&mut brain, NodeType::Pattern, "length prefixed frames", Some("codec.rs"));
        let head = brain.commit("codec", Trigger::Session).expect("commit").expect("hash");
        (a, b, head)
    };

    let brain = Brain::open(
        Box::new(RedbStore::open(&path).expect("reopen db")),
        clock.clone(),
        BrainConfig::default(),
    )
    .expect("reopen brain");
    assert_eq!(brain.head(), Some(&head));
    assert_eq!(brain.nodes().len(), 2);
    assert!(brain.edges().are_connected(&a, &b, None));
    assert_eq!(brain.find_symbol("parse_header").len(), 1);
    assert_eq!(brain.history(10)[0].metadata.message, "codec");
}

#[test]
fn corrupt_graph_record_is_rejected() {
    let store = MemoryStore::new();
    let mut handle = store.clone();
    brain_core::Persistence::save(&mut handle, &StoreKey::Graph, b"not a record")
        .expect("save");

    let clock = Arc::new(ManualClock::new(Timestamp(START)));
    let err = Brain::open(Box::new(store), clock, BrainConfig::default()).expect_err("corrupt");
    assert!(matches!(err, BrainError::DeserializationError(_)));
}
