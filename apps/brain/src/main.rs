//! # brain
//!
//! Command-line front end for the brain knowledge graph.
//!
//! ## Usage
//!
//! ```bash
//! brain init
//! brain learn pattern "retry with backoff" --file src/net.rs --commit
//! brain query "backoff" --limit 10
//! brain history
//! brain rollback 3fa2c1
//! ```

use brain::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Initialize tracing: BRAIN_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("BRAIN_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "brain=info,brain_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();
    let json_mode = cli.json;

    match cli::execute(cli) {
        Ok(output) => println!("{}", output.render(json_mode)),
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
