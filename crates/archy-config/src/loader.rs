// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./archy.toml` > `~/.config/archy/archy.toml` > `/etc/archy/archy.toml`
//! with environment variable overrides via `ARCHY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ArchyConfig;

/// Config sections that `ARCHY_<SECTION>_<KEY>` env vars map into.
const SECTIONS: &[&str] = &["agent", "storage", "scoring", "memory", "embedding"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/archy/archy.toml` (system-wide)
/// 3. `~/.config/archy/archy.toml` (user XDG config)
/// 4. `./archy.toml` (local directory)
/// 5. `ARCHY_*` environment variables
pub fn load_config() -> Result<ArchyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ArchyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ArchyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ArchyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ArchyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ArchyConfig::default()))
        .merge(Toml::file("/etc/archy/archy.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("archy/archy.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("archy.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `ARCHY_EMBEDDING_WORKER_TIMEOUT_SECS` must map to
/// `embedding.worker_timeout_secs`, not `embedding.worker.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("ARCHY_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a prefix-stripped env var name to a dotted config path.
///
/// Figment hands the name over in its original case.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(
            map_env_key("embedding_worker_timeout_secs"),
            "embedding.worker_timeout_secs"
        );
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
        assert_eq!(map_env_key("memory_auto_promote_score"), "memory.auto_promote_score");
    }

    #[test]
    fn env_keys_are_matched_case_insensitively() {
        assert_eq!(
            map_env_key("EMBEDDING_WORKER_TIMEOUT_SECS"),
            "embedding.worker_timeout_secs"
        );
        assert_eq!(map_env_key("Scoring_Bias_Path"), "scoring.bias_path");
    }

    #[test]
    fn unknown_section_is_left_alone() {
        assert_eq!(map_env_key("logging_level"), "logging_level");
    }
}
