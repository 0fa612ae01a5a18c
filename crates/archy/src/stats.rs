// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `archy stats` command implementation.
//!
//! Reports tier counts, embedding cache size and compute backend health.

use std::io::IsTerminal;

use archy_core::{ArchyError, HealthStatus};
use archy_embed::CacheStats;
use archy_memory::MemoryStats;
use serde::Serialize;

use crate::app::App;

/// Structured stats output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub memory: MemoryStats,
    pub cache: CacheStats,
    pub backend: String,
    pub backend_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_detail: Option<String>,
}

/// Format a byte count with a binary unit.
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

pub async fn collect_stats(app: &App) -> Result<StatsResponse, ArchyError> {
    let memory = app.store.get_memory_stats().await?;
    let cache = app.cache.get_cache_stats().await;
    let backend = app.cache.backend();
    let (backend_healthy, backend_detail) = match backend.health_check().await? {
        HealthStatus::Healthy => (true, None),
        HealthStatus::Degraded(detail) => (true, Some(detail)),
        HealthStatus::Unhealthy(detail) => (false, Some(detail)),
    };
    Ok(StatsResponse {
        memory,
        cache,
        backend: backend.name().to_string(),
        backend_healthy,
        backend_detail,
    })
}

/// Run the `archy stats` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_stats(app: &App, json: bool, plain: bool) -> Result<(), ArchyError> {
    let stats = collect_stats(app).await?;
    if json {
        crate::print_json(&stats)
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_stats(&stats, use_color);
        Ok(())
    }
}

fn print_stats(stats: &StatsResponse, use_color: bool) {
    let staging = &stats.memory.staging;
    let validated = &stats.memory.validated;

    println!();
    println!("  archy stats");
    println!("  {}", "-".repeat(40));
    println!(
        "    Staging:    {} total ({} unpromoted, {} promoted)",
        staging.total, staging.unpromoted, staging.promoted
    );
    println!(
        "    Validated:  {} total ({} active, {} retired)",
        validated.total, validated.active, validated.retired
    );
    println!(
        "    Cache:      {} entries, {}",
        stats.cache.entry_count,
        format_bytes(stats.cache.size_bytes)
    );

    let detail = stats
        .backend_detail
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default();
    if use_color {
        use colored::Colorize;
        let mark = if stats.backend_healthy {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("    Backend:    {mark} {}{detail}", stats.backend);
    } else {
        let mark = if stats.backend_healthy { "[OK]" } else { "[FAIL]" };
        println!("    Backend:    {mark} {}{detail}", stats.backend);
    }
    println!();
}
