// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Archy learning pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.
//!
//! The runtime-tunable scoring weights live in the bias document owned by
//! `archy-scoring`; this file only configures where that document lives.

use serde::{Deserialize, Serialize};

/// Top-level Archy configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchyConfig {
    /// Process-level settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// SQLite two-tier store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Scoring engine settings.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Promotion and lifecycle settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Embedding cache and compute worker settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn data_path(file: &str) -> String {
    dirs::data_dir()
        .map(|p| p.join("archy").join(file))
        .unwrap_or_else(|| std::path::PathBuf::from("brain").join(file))
        .display()
        .to_string()
}

fn default_database_path() -> String {
    data_path("brain.db")
}

fn default_wal_mode() -> bool {
    true
}

/// Scoring engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Path to the persisted bias document (weights, thresholds, seen set).
    #[serde(default = "default_bias_path")]
    pub bias_path: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bias_path: default_bias_path(),
        }
    }
}

fn default_bias_path() -> String {
    data_path("bias.json")
}

/// Promotion and memory lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Score at or above which a non-rejected fragment is promoted even when
    /// its verdict is `needs_review`.
    #[serde(default = "default_auto_promote_score")]
    pub auto_promote_score: f64,

    /// Default number of staged fragments processed by one batch promotion.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Default number of rows returned by list operations.
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,

    /// Default age after which active memories are retired by decay.
    #[serde(default = "default_decay_max_age_secs")]
    pub decay_max_age_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            auto_promote_score: default_auto_promote_score(),
            batch_limit: default_batch_limit(),
            list_limit: default_list_limit(),
            decay_max_age_secs: default_decay_max_age_secs(),
        }
    }
}

fn default_auto_promote_score() -> f64 {
    0.8
}

fn default_batch_limit() -> usize {
    50
}

fn default_list_limit() -> usize {
    100
}

fn default_decay_max_age_secs() -> u64 {
    60 * 60 * 24 * 30 // 30 days
}

/// Embedding cache and compute worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Path to the persisted embedding cache document.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    /// Default embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Default number of results returned by similarity search.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// External worker executable. `None` uses the in-process backend.
    #[serde(default)]
    pub worker_path: Option<String>,

    /// Arguments passed to the worker executable.
    #[serde(default)]
    pub worker_args: Vec<String>,

    /// Upper bound on a single worker invocation.
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            dimension: default_dimension(),
            top_k: default_top_k(),
            worker_path: None,
            worker_args: Vec::new(),
            worker_timeout_secs: default_worker_timeout_secs(),
        }
    }
}

fn default_cache_path() -> String {
    data_path("cache/embeddings.json")
}

fn default_dimension() -> usize {
    128
}

fn default_top_k() -> usize {
    5
}

fn default_worker_timeout_secs() -> u64 {
    30
}
