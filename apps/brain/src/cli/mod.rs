//! # Brain CLI Module
//!
//! Every invocation opens the graph, runs one command, flushes dirty tables
//! and exits. Uncommitted changes are persisted alongside the graph, so
//! `learn` and `commit` can be separate invocations.
//!
//! ## Available Commands
//!
//! - `init` - Create an empty database
//! - `learn` - Record a fact and auto-link it
//! - `link` / `supersede` / `usage` / `forget` - Edit facts and relations
//! - `query` - Ranked retrieval with spreading activation
//! - `path` - Explain how two facts are connected
//! - `commit` / `rollback` / `squash` / `history` - Versioning
//! - `status` / `stats` - Inspect the graph
//! - `prune` - Drop stale facts and old history

mod commands;

use crate::config;
use brain_core::{Brain, BrainError, EdgeType, NodeType, Trigger};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Brain - versioned knowledge graph for an editor assistant
#[derive(Parser, Debug)]
#[command(name = "brain")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./brain.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the graph database (overrides storage.path)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "memory" (nothing persists)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Record a fact
    Learn(LearnArgs),

    /// Connect two facts
    Link {
        source: String,
        target: String,

        /// Edge type (semantic, file, temporal, causal, supersedes)
        #[arg(short = 't', long, default_value = "semantic")]
        kind: EdgeType,

        /// Why the two are related
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Mark OLD as replaced by NEW
    Supersede {
        old: String,
        new: String,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Record that a fact was used, optionally with its outcome
    Usage {
        id: String,

        /// Whether using the fact helped
        #[arg(long)]
        success: Option<bool>,
    },

    /// Remove a fact and every edge touching it
    Forget { id: String },

    /// Retrieve relevant facts
    Query(QueryArgs),

    /// Show how two facts are connected
    Path {
        from: String,
        to: String,

        /// Maximum number of hops
        #[arg(short, long, default_value = "5")]
        depth: usize,
    },

    /// Turn pending changes into a delta
    Commit {
        /// Commit message
        message: String,

        /// What caused the commit (manual, auto, session)
        #[arg(short, long, default_value = "manual")]
        trigger: Trigger,
    },

    /// Restore the state of an earlier delta (hash or unique prefix)
    Rollback { hash: String },

    /// Fold several deltas into one new delta
    Squash {
        /// Delta hashes or unique prefixes
        #[arg(required = true)]
        hashes: Vec<String>,

        #[arg(short, long, default_value = "squash")]
        message: String,
    },

    /// Show delta history, newest first
    History {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show HEAD and pending changes
    Status,

    /// Show node, edge and delta counts
    Stats,

    /// Remove stale, unused facts and optionally old history
    Prune {
        #[arg(long)]
        min_weight: Option<f64>,

        #[arg(long)]
        unused_days: Option<u64>,

        #[arg(long)]
        max_usage: Option<u64>,

        /// Keep only this many deltas (defaults to prune.keep_deltas)
        #[arg(long)]
        keep_deltas: Option<usize>,
    },
}

#[derive(Args, Debug)]
pub struct LearnArgs {
    /// Node type (pattern, convention, symbol, correction, session)
    pub kind: NodeType,

    /// One-line summary
    pub summary: String,

    #[arg(long, default_value = "")]
    pub detail: String,

    #[arg(long)]
    pub code: Option<String>,

    /// Source file the fact belongs to
    #[arg(short, long)]
    pub file: Option<String>,

    #[arg(short, long)]
    pub language: Option<String>,

    /// Ids of related facts (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub related: Vec<String>,

    /// Commit right after learning
    #[arg(long)]
    pub commit: bool,

    /// Message for --commit
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Free text to match against summaries and details
    pub text: Option<String>,

    #[arg(short, long)]
    pub file: Option<String>,

    /// Only facts created within this many days
    #[arg(long)]
    pub since_days: Option<i64>,

    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Semantic-edge hops followed outward from text matches
    #[arg(short, long)]
    pub depth: Option<usize>,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<Output, BrainError> {
    let config = config::load(cli.config.as_deref())?;
    let config = config::apply_overrides(config, cli.database, cli.backend.as_deref())?;
    let command = cli.command.unwrap_or(Commands::Status);

    if let Commands::Init { force } = &command {
        prepare_init(&config, *force)?;
    }
    let mut brain = Brain::open_configured(config)?;

    let output = match command {
        Commands::Init { .. } => Ok(cmd_init(&brain)),
        Commands::Learn(args) => cmd_learn(&mut brain, args),
        Commands::Link {
            source,
            target,
            kind,
            reason,
        } => cmd_link(&mut brain, &source, &target, kind, reason.as_deref()),
        Commands::Supersede { old, new, reason } => {
            cmd_supersede(&mut brain, &old, &new, reason.as_deref())
        }
        Commands::Usage { id, success } => cmd_usage(&mut brain, &id, success),
        Commands::Forget { id } => cmd_forget(&mut brain, &id),
        Commands::Query(args) => cmd_query(&brain, args),
        Commands::Path { from, to, depth } => cmd_path(&brain, &from, &to, depth),
        Commands::Commit { message, trigger } => cmd_commit(&mut brain, &message, trigger),
        Commands::Rollback { hash } => cmd_rollback(&mut brain, &hash),
        Commands::Squash { hashes, message } => cmd_squash(&mut brain, &hashes, &message),
        Commands::History { limit } => cmd_history(&brain, limit),
        Commands::Status => cmd_status(&brain),
        Commands::Stats => cmd_stats(&brain),
        Commands::Prune {
            min_weight,
            unused_days,
            max_usage,
            keep_deltas,
        } => cmd_prune(&mut brain, min_weight, unused_days, max_usage, keep_deltas),
    }?;

    brain.flush()?;
    Ok(output)
}
