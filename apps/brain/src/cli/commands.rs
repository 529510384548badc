//! # CLI Command Implementations
//!
//! Each command works on an open `Brain` and returns an `Output` carrying
//! both a JSON document and human-readable lines; `main` picks one.

use super::{LearnArgs, QueryArgs};
use brain_core::{
    Brain, BrainConfig, BrainError, ContentHash, Delta, EdgeProperties, EdgeType, NodeContent,
    NodeContext, NodeId, StorageBackend, Trigger,
};
use serde::Serialize;
use serde_json::{Value, json};

// =============================================================================
// OUTPUT
// =============================================================================

/// The result of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub json: Value,
    pub lines: Vec<String>,
}

impl Output {
    fn new(json: Value, lines: Vec<String>) -> Self {
        Self { json, lines }
    }

    /// Pretty JSON in `json_mode`, plain lines otherwise.
    #[must_use]
    pub fn render(&self, json_mode: bool) -> String {
        if json_mode {
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        } else {
            self.lines.join("\n")
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, BrainError> {
    serde_json::to_value(value).map_err(|e| BrainError::SerializationError(e.to_string()))
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Refuse to clobber an existing database unless forced; with `force`,
/// delete it so the following open starts empty.
pub fn prepare_init(config: &BrainConfig, force: bool) -> Result<(), BrainError> {
    if config.storage.backend != StorageBackend::Redb {
        return Ok(());
    }
    let path = &config.storage.path;
    if !path.exists() {
        return Ok(());
    }
    if !force {
        return Err(BrainError::StorageError(format!(
            "Database {} already exists. Use --force to overwrite.",
            path.display()
        )));
    }
    std::fs::remove_file(path).map_err(|e| {
        BrainError::StorageError(format!("Cannot remove {}: {}", path.display(), e))
    })?;
    tracing::info!(path = %path.display(), "existing database removed");
    Ok(())
}

/// Report the freshly opened, empty database.
pub fn cmd_init(brain: &Brain) -> Output {
    let storage = &brain.config().storage;
    let backend = match storage.backend {
        StorageBackend::Redb => "redb",
        StorageBackend::Memory => "memory",
    };
    Output::new(
        json!({
            "backend": backend,
            "database": storage.path.to_string_lossy(),
        }),
        vec![format!(
            "Initialized new {} database at {}",
            backend,
            storage.path.display()
        )],
    )
}

// =============================================================================
// LEARNING COMMANDS
// =============================================================================

/// Record a fact, optionally committing it straight away.
pub fn cmd_learn(brain: &mut Brain, args: LearnArgs) -> Result<Output, BrainError> {
    let related = args
        .related
        .iter()
        .map(|r| resolve_node(brain, r))
        .collect::<Result<Vec<_>, _>>()?;

    let mut content = NodeContent::new(args.summary, args.detail);
    if let Some(code) = args.code {
        content = content.with_code(code);
    }
    let mut context = args.file.map(NodeContext::file).unwrap_or_default();
    if let Some(language) = args.language {
        context = context.with_language(language);
    }

    let node = brain.learn(args.kind, content, context, &related)?;
    let links = brain.edges().degree(&node.id);

    let mut lines = vec![
        format!("Learned [{}] {}", node.kind, node.content.summary),
        format!("  id:    {}", node.id),
        format!("  links: {}", links),
    ];

    let committed = if args.commit {
        let message = args
            .message
            .unwrap_or_else(|| format!("learn {}: {}", node.kind, node.content.summary));
        brain.commit(&message, Trigger::Auto)?
    } else {
        None
    };
    if let Some(hash) = &committed {
        lines.push(format!("Committed {}", hash.short()));
    }

    Ok(Output::new(
        json!({
            "node": to_json(&node)?,
            "links": links,
            "commit": committed,
        }),
        lines,
    ))
}

pub fn cmd_link(
    brain: &mut Brain,
    source: &str,
    target: &str,
    kind: EdgeType,
    reason: Option<&str>,
) -> Result<Output, BrainError> {
    let source = resolve_node(brain, source)?;
    let target = resolve_node(brain, target)?;
    let properties = reason.map(|r| EdgeProperties::default().with_reason(r));
    let edge = brain.link(&source, &target, kind, properties)?;
    Ok(Output::new(
        to_json(&edge)?,
        vec![format!(
            "Linked {} --{}--> {} ({:.2})",
            edge.source, edge.kind, edge.target, edge.properties.weight
        )],
    ))
}

pub fn cmd_supersede(
    brain: &mut Brain,
    old: &str,
    new: &str,
    reason: Option<&str>,
) -> Result<Output, BrainError> {
    let old = resolve_node(brain, old)?;
    let new = resolve_node(brain, new)?;
    let edge = brain.supersede(&old, &new, reason)?;
    Ok(Output::new(
        to_json(&edge)?,
        vec![format!("{} now supersedes {}", new, old)],
    ))
}

pub fn cmd_usage(
    brain: &mut Brain,
    id: &str,
    success: Option<bool>,
) -> Result<Output, BrainError> {
    let id = resolve_node(brain, id)?;
    let node = brain
        .record_usage(&id, success)?
        .ok_or(BrainError::NodeNotFound(id))?;
    Ok(Output::new(
        to_json(&node)?,
        vec![format!(
            "{} used {} time(s), success rate {:.2}",
            node.id, node.score.usage_count, node.score.success_rate
        )],
    ))
}

pub fn cmd_forget(brain: &mut Brain, id: &str) -> Result<Output, BrainError> {
    let id = resolve_node(brain, id)?;
    let removed = brain.remove_learning(&id)?;
    Ok(Output::new(
        json!({ "id": id, "removed": removed }),
        vec![format!("Forgot {}", id)],
    ))
}

// =============================================================================
// RETRIEVAL COMMANDS
// =============================================================================

/// Ranked retrieval. Unset flags fall back to the `[query]` section.
pub fn cmd_query(brain: &Brain, args: QueryArgs) -> Result<Output, BrainError> {
    let mut opts = brain.query_options();
    opts.query = args.text;
    opts.file = args.file;
    opts.since = args.since_days.map(|days| brain.now().minus_days(days));
    if let Some(limit) = args.limit {
        opts.limit = limit;
    }
    if let Some(depth) = args.depth {
        opts.depth = depth;
    }

    let result = brain.query(&opts);

    let mut lines: Vec<String> = result
        .nodes
        .iter()
        .map(|s| {
            format!(
                "{:.3}  [{}] {}  ({})",
                s.score, s.node.kind, s.node.content.summary, s.node.id
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push("No matching facts".to_string());
    }
    if result.truncated {
        lines.push(format!("(showing first {})", opts.limit));
    }

    Ok(Output::new(to_json(&result)?, lines))
}

/// Shortest connection between two facts, explained edge by edge.
pub fn cmd_path(brain: &Brain, from: &str, to: &str, depth: usize) -> Result<Output, BrainError> {
    let from = resolve_node(brain, from)?;
    let to = resolve_node(brain, to)?;
    let path = brain.find_path(&from, &to, depth);

    let lines = if !path.found {
        vec![format!("No path within {} hop(s)", depth)]
    } else {
        let chain = brain.query_engine().get_context_chain(&from, &to);
        if chain.is_empty() {
            path.nodes.iter().map(ToString::to_string).collect()
        } else {
            chain
        }
    };

    Ok(Output::new(to_json(&path)?, lines))
}

// =============================================================================
// VERSIONING COMMANDS
// =============================================================================

pub fn cmd_commit(
    brain: &mut Brain,
    message: &str,
    trigger: Trigger,
) -> Result<Output, BrainError> {
    if trigger.is_state_neutral() {
        return Err(BrainError::InvalidTrigger(format!(
            "{trigger} commits are created by the rollback and squash commands"
        )));
    }
    let hash = brain.commit(message, trigger)?;
    let line = match &hash {
        Some(hash) => format!("Committed {} {}", hash.short(), message),
        None => "Nothing to commit".to_string(),
    };
    Ok(Output::new(json!({ "commit": hash }), vec![line]))
}

pub fn cmd_rollback(brain: &mut Brain, reference: &str) -> Result<Output, BrainError> {
    let target = resolve_delta(brain, reference)?;
    brain.rollback(&target)?;
    let head = brain.head().cloned();
    Ok(Output::new(
        json!({ "target": target, "head": head }),
        vec![format!(
            "Rolled back to {} (HEAD {})",
            target.short(),
            head.as_ref().map_or("none", |h| h.short())
        )],
    ))
}

pub fn cmd_squash(
    brain: &mut Brain,
    references: &[String],
    message: &str,
) -> Result<Output, BrainError> {
    let hashes = references
        .iter()
        .map(|r| resolve_delta(brain, r))
        .collect::<Result<Vec<_>, _>>()?;
    let squashed = brain.squash(&hashes, message)?;
    let line = match &squashed {
        Some(hash) => format!("Squashed {} delta(s) into {}", hashes.len(), hash.short()),
        None => "Deltas cancel out, nothing squashed".to_string(),
    };
    Ok(Output::new(
        json!({ "commit": squashed, "squashed": hashes }),
        vec![line],
    ))
}

pub fn cmd_history(brain: &Brain, limit: usize) -> Result<Output, BrainError> {
    let history = brain.history(limit);
    let entries = history
        .iter()
        .map(|delta| -> Result<Value, BrainError> {
            Ok(json!({
                "hash": delta.hash,
                "parent": delta.parent,
                "timestamp": delta.timestamp.millis(),
                "changes": delta.changes.len(),
                "metadata": to_json(&delta.metadata)?,
            }))
        })
        .collect::<Result<Vec<Value>, BrainError>>()?;

    let mut lines: Vec<String> = history.iter().map(|delta| history_line(delta)).collect();
    if lines.is_empty() {
        lines.push("No commits yet".to_string());
    }
    Ok(Output::new(Value::Array(entries), lines))
}

fn history_line(delta: &Delta) -> String {
    let when = chrono::DateTime::from_timestamp_millis(delta.timestamp.millis())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| delta.timestamp.millis().to_string());
    format!(
        "{}  {}  {:<8} {} ({} change(s))",
        delta.hash.short(),
        when,
        delta.metadata.trigger,
        delta.metadata.message,
        delta.changes.len()
    )
}

// =============================================================================
// INSPECTION COMMANDS
// =============================================================================

pub fn cmd_status(brain: &Brain) -> Result<Output, BrainError> {
    let status = brain.status();
    let lines = vec![
        format!(
            "HEAD:    {}",
            status.head.as_ref().map_or("(no commits)", |h| h.short())
        ),
        format!(
            "Pending: {} added, {} modified, {} deleted",
            status.pending.adds, status.pending.modifies, status.pending.deletes
        ),
        if status.clean {
            "Nothing to commit".to_string()
        } else {
            "Uncommitted changes".to_string()
        },
    ];
    Ok(Output::new(to_json(&status)?, lines))
}

pub fn cmd_stats(brain: &Brain) -> Result<Output, BrainError> {
    let stats = brain.stats();
    let mut lines = vec![
        "Brain Graph Stats".to_string(),
        "=================".to_string(),
        format!("Nodes:  {}", stats.node_count),
    ];
    lines.extend(
        stats
            .nodes_by_type
            .iter()
            .map(|(kind, n)| format!("  {:<12}{}", kind, n)),
    );
    lines.push(format!("Edges:  {}", stats.edge_count));
    lines.extend(
        stats
            .edges_by_type
            .iter()
            .map(|(kind, n)| format!("  {:<12}{}", kind, n)),
    );
    lines.push(format!("Deltas: {}", stats.delta_count));
    Ok(Output::new(to_json(&stats)?, lines))
}

// =============================================================================
// MAINTENANCE COMMANDS
// =============================================================================

/// Prune stale facts; trim history too when a delta budget is given.
pub fn cmd_prune(
    brain: &mut Brain,
    min_weight: Option<f64>,
    unused_days: Option<u64>,
    max_usage: Option<u64>,
    keep_deltas: Option<usize>,
) -> Result<Output, BrainError> {
    let mut opts = brain.config().prune.options();
    if let Some(w) = min_weight {
        opts.min_weight = w;
    }
    if let Some(days) = unused_days {
        opts.unused_days = days;
    }
    if let Some(usage) = max_usage {
        opts.max_usage = usage;
    }
    let keep = keep_deltas.or(brain.config().prune.keep_deltas);

    let nodes = brain.prune(&opts)?;
    let deltas = match keep {
        Some(keep) => brain.prune_history(keep)?,
        None => 0,
    };

    Ok(Output::new(
        json!({ "pruned_nodes": nodes, "pruned_deltas": deltas }),
        vec![format!("Pruned {} fact(s) and {} delta(s)", nodes, deltas)],
    ))
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// A full node id, or a prefix matching exactly one node.
pub fn resolve_node(brain: &Brain, reference: &str) -> Result<NodeId, BrainError> {
    let exact = NodeId::new(reference);
    if brain.get(&exact).is_some() {
        return Ok(exact);
    }
    let mut matches = brain
        .nodes()
        .iter()
        .filter(|n| !reference.is_empty() && n.id.as_str().starts_with(reference));
    match (matches.next(), matches.next()) {
        (Some(node), None) => Ok(node.id.clone()),
        _ => Err(BrainError::NodeNotFound(exact)),
    }
}

/// A full delta hash, or a prefix matching exactly one delta.
pub fn resolve_delta(brain: &Brain, reference: &str) -> Result<ContentHash, BrainError> {
    let exact = ContentHash::new(reference);
    if brain.deltas().get(&exact).is_some() {
        return Ok(exact);
    }
    let mut matches = brain
        .deltas()
        .iter()
        .filter(|d| !reference.is_empty() && d.hash.as_str().starts_with(reference));
    match (matches.next(), matches.next()) {
        (Some(delta), None) => Ok(delta.hash.clone()),
        _ => Err(BrainError::DeltaNotFound(exact)),
    }
}
