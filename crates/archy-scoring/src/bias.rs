// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persisted bias document: weights, thresholds, safety rules and the
//! novelty seen-set.

use serde::{Deserialize, Serialize};

use archy_core::ArchyError;

use crate::seen::SeenSet;

/// Tunable scoring configuration.
///
/// Keys missing from a persisted document take their default value; unknown
/// keys make the document invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BiasConfig {
    /// Weight of persona/intent alignment.
    pub personality_weight: f64,
    /// Divisor applied to the raw score. Values above 1 make promotion harder.
    pub safety_bias: f64,
    /// Reward for content not seen before.
    pub novelty_weight: f64,
    /// Weight of the length heuristic.
    pub length_weight: f64,
    /// Score at or above which a fragment is an accept candidate.
    pub promotion_threshold: f64,
    /// Score at or above which a fragment needs review instead of rejection.
    pub review_threshold: f64,
    /// Case-insensitive substrings that force a rejection.
    pub forbidden_patterns: Vec<String>,
    /// Case-insensitive substrings that raise persona alignment.
    pub preferred_keywords: Vec<String>,
    /// Hashes of promoted content, oldest first.
    pub seen_hashes: SeenSet,
    pub max_seen: usize,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            personality_weight: 0.5,
            safety_bias: 1.0,
            novelty_weight: 0.3,
            length_weight: 0.1,
            promotion_threshold: 0.80,
            review_threshold: 0.65,
            forbidden_patterns: [
                "sudo rm -rf /",
                "exfiltrate",
                "bypass_auth",
                "disable security",
                "kill -9 1",
            ]
            .map(String::from)
            .to_vec(),
            preferred_keywords: ["helpful", "efficient", "safe", "explain", "understand"]
                .map(String::from)
                .to_vec(),
            seen_hashes: SeenSet::default(),
            max_seen: 500,
        }
    }
}

impl BiasConfig {
    /// Check the constraints the scorer relies on.
    pub fn validate(&self) -> Result<(), ArchyError> {
        let weights = [
            ("personality_weight", self.personality_weight),
            ("novelty_weight", self.novelty_weight),
            ("length_weight", self.length_weight),
        ];
        for (key, value) in weights {
            if !value.is_finite() {
                return Err(ArchyError::Config(format!("{key} must be a finite number")));
            }
        }
        if !(self.safety_bias >= 1.0 && self.safety_bias.is_finite()) {
            return Err(ArchyError::Config(format!(
                "safety_bias must be a finite number >= 1, got {}",
                self.safety_bias
            )));
        }
        if self.review_threshold > self.promotion_threshold {
            return Err(ArchyError::Config(format!(
                "review_threshold ({}) must not exceed promotion_threshold ({})",
                self.review_threshold, self.promotion_threshold
            )));
        }
        if self.max_seen == 0 {
            return Err(ArchyError::Config("max_seen must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Merge `changes` over this configuration.
    ///
    /// Returns the merged configuration, with `seen_hashes` re-bounded to
    /// `max_seen`, or a `Config` error naming the offending key. `self` is
    /// never modified.
    pub fn merged(
        &self,
        changes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<BiasConfig, ArchyError> {
        let mut document = serde_json::to_value(self)
            .map_err(|e| ArchyError::Internal(format!("failed to encode bias config: {e}")))?;
        let Some(fields) = document.as_object_mut() else {
            return Err(ArchyError::Internal("bias config is not a JSON object".into()));
        };
        fields.extend(changes);

        let mut next: BiasConfig = serde_json::from_value(document)
            .map_err(|e| ArchyError::Config(format!("invalid bias update: {e}")))?;
        next.validate()?;
        next.seen_hashes.bound(next.max_seen);
        Ok(next)
    }
}
