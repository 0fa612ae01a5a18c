// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, bounded scores and positive sizes.

use crate::diagnostic::ConfigError;
use crate::model::ArchyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ArchyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.agent.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level `{}` must be one of {}",
                config.agent.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    for (key, value) in [
        ("storage.database_path", &config.storage.database_path),
        ("scoring.bias_path", &config.scoring.bias_path),
        ("embedding.cache_path", &config.embedding.cache_path),
    ] {
        if value.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{key} must not be empty"),
            });
        }
    }

    let floor = config.memory.auto_promote_score;
    if !(0.0..=1.0).contains(&floor) {
        errors.push(ConfigError::Validation {
            message: format!("memory.auto_promote_score must be within [0, 1], got {floor}"),
        });
    }

    if config.memory.batch_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.batch_limit must be at least 1".to_string(),
        });
    }

    if config.embedding.dimension == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.dimension must be at least 1".to_string(),
        });
    }

    if config.embedding.top_k == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.top_k must be at least 1".to_string(),
        });
    }

    if config.embedding.worker_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.worker_timeout_secs must be at least 1".to_string(),
        });
    }

    if matches!(&config.embedding.worker_path, Some(path) if path.trim().is_empty()) {
        errors.push(ConfigError::Validation {
            message: "embedding.worker_path must not be empty when set".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = ArchyConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = ArchyConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "database_path"));
    }

    #[test]
    fn out_of_range_auto_promote_score_fails() {
        let mut config = ArchyConfig::default();
        config.memory.auto_promote_score = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "auto_promote_score"));
    }

    #[test]
    fn zero_sizes_are_all_reported() {
        let mut config = ArchyConfig::default();
        config.embedding.dimension = 0;
        config.embedding.top_k = 0;
        config.embedding.worker_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn blank_worker_path_fails() {
        let mut config = ArchyConfig::default();
        config.embedding.worker_path = Some("  ".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "worker_path"));
    }

    #[test]
    fn unknown_log_level_fails() {
        let mut config = ArchyConfig::default();
        config.agent.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "log_level"));
    }
}
