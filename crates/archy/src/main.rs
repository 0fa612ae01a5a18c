// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Archy - staged learning memory for an assistant.
//!
//! This is the binary entry point: store inspection and promotion, bias
//! tuning, similarity search, and the compute worker mode.

mod app;
mod commands;
mod stats;

use std::path::PathBuf;

use archy_config::ArchyConfig;
use archy_core::ArchyError;
use archy_embed::{LocalCompute, serve_stdio};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::app::App;

/// Archy - staged learning memory for an assistant.
#[derive(Parser, Debug)]
#[command(name = "archy", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the default search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show tier counts, cache size and backend health.
    Stats {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Append a fragment to staging.
    Stage {
        role: String,
        content: String,
        /// Intent keyword used for persona alignment (repeatable).
        #[arg(long = "intent")]
        intent: Vec<String>,
    },
    /// List staged fragments, most recent first.
    Staged {
        /// Include promoted fragments.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List validated memories, most recent first.
    Memories {
        /// Include retired memories.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Validate a staged fragment and promote it if it qualifies.
    Promote {
        #[arg(required_unless_present = "batch")]
        id: Option<i64>,
        /// Validate the most recent unpromoted fragments instead.
        #[arg(long, conflicts_with_all = ["id", "force"])]
        batch: bool,
        #[arg(long, requires = "batch")]
        limit: Option<usize>,
        /// Approve as admin, overriding the verdict.
        #[arg(long)]
        force: bool,
    },
    /// Rank active memories by similarity to a query.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Retire a validated memory.
    Retire {
        id: i64,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Retire active memories older than a maximum age.
    Decay {
        #[arg(long)]
        max_age_days: Option<u64>,
    },
    /// Show or change the bias configuration.
    Bias {
        /// `key=value` to change (repeatable).
        #[arg(long = "set")]
        set: Vec<String>,
    },
    /// Inspect or clear the embedding cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Score a text without staging it.
    Validate { text: String },
    /// Serve one compute request from stdin to stdout.
    Worker,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Stats,
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Worker mode keeps stdout for the protocol and needs no configuration.
    if matches!(cli.command, Commands::Worker) {
        init_tracing("warn");
        if let Err(e) = serve_stdio(&LocalCompute::new(), tokio::io::stdin(), tokio::io::stdout()).await {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            archy_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.agent.log_level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<ArchyConfig, Vec<archy_config::ConfigError>> {
    match path {
        Some(path) => archy_config::load_and_validate_path(path),
        None => archy_config::load_and_validate(),
    }
}

async fn run(command: Commands, config: ArchyConfig) -> Result<(), ArchyError> {
    let app = App::open(config).await?;

    let output = match command {
        Commands::Stats { json, plain } => return stats::run_stats(&app, json, plain).await,
        Commands::Stage {
            role,
            content,
            intent,
        } => commands::stage(&app, &role, &content, intent).await?,
        Commands::Staged { all, limit } => commands::staged(&app, all, limit).await?,
        Commands::Memories { all, limit } => commands::memories(&app, all, limit).await?,
        Commands::Promote {
            id,
            batch,
            limit,
            force,
        } => commands::promote(&app, id, batch, limit, force).await?,
        Commands::Search { query, top_k } => commands::search(&app, &query, top_k).await?,
        Commands::Retire { id, reason } => commands::retire(&app, id, &reason).await?,
        Commands::Decay { max_age_days } => commands::decay(&app, max_age_days).await?,
        Commands::Bias { set } => commands::bias(&app, &set).await?,
        Commands::Cache { action } => match action {
            CacheAction::Stats => commands::cache_stats(&app).await?,
            CacheAction::Clear => commands::cache_clear(&app).await?,
        },
        Commands::Validate { text } => commands::validate(&app, &text).await?,
        Commands::Worker => {
            return Err(ArchyError::Internal(
                "worker mode runs without configuration".to_string(),
            ));
        }
    };
    print_json(&output)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), ArchyError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ArchyError::Internal(format!("failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Initialize the tracing subscriber with an env filter. Logs go to stderr so
/// stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("archy={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
