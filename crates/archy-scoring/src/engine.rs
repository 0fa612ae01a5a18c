// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic fragment scoring against the persisted bias configuration.
//!
//! Scoring is a pure function of the content, its metadata and the current
//! configuration. The only state it consults is the seen-set, which is
//! updated through [`ScoringEngine::register_seen`] after promotion.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use archy_core::fs::write_atomic;
use archy_core::types::{FragmentMetadata, FragmentScore, ScoreBreakdown, Verdict, now_ts};
use archy_core::ArchyError;

use crate::bias::BiasConfig;

/// Length at which the length heuristic saturates.
const LENGTH_NORMALIZER: f64 = 512.0;

/// Fragments shorter than this (in characters) have their length score cut.
const SHORT_FRAGMENT_CHARS: usize = 32;
const SHORT_FRAGMENT_PENALTY: f64 = 0.3;

/// Scores fragments and owns the bias configuration lifecycle.
///
/// Shared by reference (`Arc<ScoringEngine>`); all mutation goes through an
/// internal mutex and is followed by an atomic write of the bias document.
pub struct ScoringEngine {
    path: Option<PathBuf>,
    config: Mutex<BiasConfig>,
}

impl ScoringEngine {
    /// Load the bias document at `path`.
    ///
    /// A missing file is created with defaults. An unreadable or invalid file
    /// is logged and replaced in memory by defaults; it is overwritten on the
    /// next mutation.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(text) => match parse_document(&text) {
                Ok(config) => {
                    debug!(path = %path.display(), seen = config.seen_hashes.len(), "bias config loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "bias config is invalid, using defaults");
                    BiasConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = BiasConfig::default();
                if let Err(e) = write_document(&path, &config) {
                    warn!(path = %path.display(), error = %e, "failed to write default bias config");
                }
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read bias config, using defaults");
                BiasConfig::default()
            }
        };

        Self {
            path: Some(path),
            config: Mutex::new(config),
        }
    }

    /// An engine that never touches the filesystem.
    pub fn in_memory(config: BiasConfig) -> Self {
        Self {
            path: None,
            config: Mutex::new(config),
        }
    }

    /// Location of the bias document, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A copy of the current configuration.
    pub fn snapshot(&self) -> BiasConfig {
        self.lock().clone()
    }

    /// Grade `content`. Never fails.
    pub fn score_fragment(&self, content: &str, metadata: &FragmentMetadata) -> FragmentScore {
        let config = self.lock();
        let lower = content.to_lowercase();

        // Safety first: any forbidden pattern short-circuits.
        let safety_issues: Vec<String> = config
            .forbidden_patterns
            .iter()
            .filter(|pattern| lower.contains(&pattern.to_lowercase()))
            .map(|pattern| format!("forbidden_pattern:{pattern}"))
            .collect();
        if !safety_issues.is_empty() {
            return FragmentScore {
                score: 0.0,
                verdict: Verdict::Reject,
                breakdown: ScoreBreakdown::Safety { safety: 0.0 },
                safety_issues,
                ts: now_ts(),
            };
        }

        let novelty = if config.seen_hashes.contains(&content_hash(content)) {
            0.0
        } else {
            1.0
        };

        let chars = content.chars().count();
        let mut length_score = (chars as f64 / LENGTH_NORMALIZER).min(1.0);
        if chars < SHORT_FRAGMENT_CHARS {
            length_score *= SHORT_FRAGMENT_PENALTY;
        }

        let mut persona_score = 0.5;
        if !config.preferred_keywords.is_empty() {
            let fraction = match_fraction(&lower, &config.preferred_keywords);
            persona_score = (0.5 + fraction * 0.5).min(1.0);
        }
        if !metadata.intent_keywords.is_empty() {
            let intent = match_fraction(&lower, &metadata.intent_keywords);
            persona_score = (persona_score + intent) / 2.0;
        }

        let raw_score = config.personality_weight * persona_score
            + config.novelty_weight * novelty
            + config.length_weight * length_score;
        let quotient = raw_score / config.safety_bias;
        let score = if quotient.is_finite() {
            quotient.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let verdict = if score >= config.promotion_threshold {
            Verdict::AcceptCandidate
        } else if score >= config.review_threshold {
            Verdict::NeedsReview
        } else {
            Verdict::Reject
        };

        FragmentScore {
            score,
            verdict,
            breakdown: ScoreBreakdown::Components {
                persona_score,
                novelty,
                length_score,
                raw_score,
                safety_bias: config.safety_bias,
            },
            safety_issues,
            ts: now_ts(),
        }
    }

    /// Record `content` as seen. Returns `true` if it was not seen before.
    ///
    /// Already-seen content is a no-op and triggers no write.
    pub fn register_seen(&self, content: &str) -> Result<bool, ArchyError> {
        let mut config = self.lock();
        let max_seen = config.max_seen;
        if !config.seen_hashes.insert(content_hash(content), max_seen) {
            return Ok(false);
        }
        self.persist(&config)?;
        Ok(true)
    }

    /// Whether `content` has been registered as seen.
    pub fn is_seen(&self, content: &str) -> bool {
        self.lock().seen_hashes.contains(&content_hash(content))
    }

    /// Merge `changes` into the configuration and persist it.
    ///
    /// On error the in-memory configuration is left untouched.
    pub fn update(
        &self,
        changes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ArchyError> {
        let mut config = self.lock();
        let keys: Vec<String> = changes.keys().cloned().collect();
        let next = config.merged(changes)?;
        self.persist(&next)?;
        *config = next;
        debug!(?keys, "bias config updated");
        Ok(())
    }

    /// Append a compact bias hint (and optional tone) to a prompt template.
    pub fn apply_to_prompt(&self, template: &str, tone: Option<&str>) -> String {
        let config = self.lock();
        let mut prompt = format!(
            "{template}\n[BIAS: personality_weight={:?}, safety_bias={:?}]",
            config.personality_weight, config.safety_bias
        );
        if let Some(tone) = tone.filter(|t| !t.is_empty()) {
            prompt.push_str(&format!(" [TONE: {tone}]"));
        }
        prompt
    }

    fn lock(&self) -> MutexGuard<'_, BiasConfig> {
        // No code path leaves the config half-modified across a panic.
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, config: &BiasConfig) -> Result<(), ArchyError> {
        match &self.path {
            Some(path) => write_document(path, config),
            None => Ok(()),
        }
    }
}

/// SHA-256 hex digest used as the seen-set key.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn match_fraction(lower_content: &str, keywords: &[String]) -> f64 {
    let matches = keywords
        .iter()
        .filter(|k| lower_content.contains(&k.to_lowercase()))
        .count();
    matches as f64 / keywords.len() as f64
}

fn parse_document(text: &str) -> Result<BiasConfig, ArchyError> {
    let mut config: BiasConfig =
        serde_json::from_str(text).map_err(|e| ArchyError::Config(e.to_string()))?;
    config.validate()?;
    config.seen_hashes.bound(config.max_seen);
    Ok(config)
}

fn write_document(path: &Path, config: &BiasConfig) -> Result<(), ArchyError> {
    let bytes = serde_json::to_vec_pretty(config).map_err(ArchyError::storage)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn engine() -> ScoringEngine {
        ScoringEngine::in_memory(BiasConfig::default())
    }

    fn no_meta() -> FragmentMetadata {
        FragmentMetadata::default()
    }

    #[test]
    fn forbidden_pattern_rejects_with_issue() {
        let result = engine().score_fragment("sudo rm -rf /", &no_meta());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.verdict, Verdict::Reject);
        assert_eq!(result.safety_issues, vec!["forbidden_pattern:sudo rm -rf /"]);
        assert_eq!(result.breakdown, ScoreBreakdown::Safety { safety: 0.0 });
    }

    #[test]
    fn forbidden_match_is_case_insensitive_and_lists_every_pattern() {
        let result = engine().score_fragment("Please EXFILTRATE data then Disable Security", &no_meta());
        assert_eq!(result.verdict, Verdict::Reject);
        assert_eq!(
            result.safety_issues,
            vec!["forbidden_pattern:exfiltrate", "forbidden_pattern:disable security"]
        );
    }

    #[test]
    fn metadata_cannot_rescue_forbidden_content() {
        let meta = FragmentMetadata::with_intent_keywords(["bypass_auth"]);
        let result = engine().score_fragment("how to bypass_auth", &meta);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.verdict, Verdict::Reject);
    }

    #[test]
    fn short_novel_fragment_components() {
        // 11 chars: length = 11/512 * 0.3, persona = 0.5, novelty = 1.
        let result = engine().score_fragment("hello world", &no_meta());
        let ScoreBreakdown::Components {
            persona_score,
            novelty,
            length_score,
            raw_score,
            safety_bias,
        } = result.breakdown
        else {
            panic!("expected component breakdown");
        };
        assert_eq!(persona_score, 0.5);
        assert_eq!(novelty, 1.0);
        assert!((length_score - 11.0 / 512.0 * 0.3).abs() < 1e-12);
        assert!((raw_score - (0.25 + 0.3 + 0.1 * length_score)).abs() < 1e-12);
        assert_eq!(safety_bias, 1.0);
        assert_eq!(result.verdict, Verdict::Reject);
    }

    #[test]
    fn preferred_keywords_raise_persona() {
        let result = engine().score_fragment("a helpful and safe answer", &no_meta());
        let ScoreBreakdown::Components { persona_score, .. } = result.breakdown else {
            panic!("expected component breakdown");
        };
        // 2 of 5 keywords: 0.5 + 0.4 * 0.5
        assert!((persona_score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn intent_keywords_blend_with_persona() {
        let meta = FragmentMetadata::with_intent_keywords(["nmap", "scan", "ports"]);
        let result = engine().score_fragment("nmap can scan a host", &meta);
        let ScoreBreakdown::Components { persona_score, .. } = result.breakdown else {
            panic!("expected component breakdown");
        };
        // persona 0.5 (no preferred matches), intent 2/3
        assert!((persona_score - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn seen_content_loses_novelty() {
        let engine = engine();
        let content = "explain how to be helpful and efficient";
        let before = engine.score_fragment(content, &no_meta());
        assert!(engine.register_seen(content).unwrap());
        let after = engine.score_fragment(content, &no_meta());
        assert!((before.score - after.score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn long_keyword_rich_fragment_is_accept_candidate() {
        let content = format!(
            "{} helpful efficient safe explain understand",
            "x".repeat(600)
        );
        let result = engine().score_fragment(&content, &no_meta());
        // 0.5*1.0 + 0.3*1.0 + 0.1*1.0 = 0.9
        assert!((result.score - 0.9).abs() < 1e-12);
        assert_eq!(result.verdict, Verdict::AcceptCandidate);
    }

    #[test]
    fn safety_bias_makes_promotion_harder() {
        let engine = engine();
        engine.update(json!({"safety_bias": 2.0}).as_object().unwrap().clone()).unwrap();
        let content = format!("{} helpful efficient safe explain understand", "x".repeat(600));
        let result = engine.score_fragment(&content, &no_meta());
        assert!((result.score - 0.45).abs() < 1e-12);
        assert_eq!(result.verdict, Verdict::Reject);
    }

    #[test]
    fn non_finite_weights_clamp_to_zero() {
        let config = BiasConfig {
            personality_weight: f64::NAN,
            ..BiasConfig::default()
        };
        let result = ScoringEngine::in_memory(config).score_fragment("anything at all", &no_meta());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn register_seen_is_idempotent_and_bounded() {
        let engine = ScoringEngine::in_memory(BiasConfig {
            max_seen: 2,
            ..BiasConfig::default()
        });
        assert!(engine.register_seen("one").unwrap());
        assert!(!engine.register_seen("one").unwrap());
        engine.register_seen("two").unwrap();
        engine.register_seen("three").unwrap();
        assert!(!engine.is_seen("one"));
        assert!(engine.is_seen("two"));
        assert!(engine.is_seen("three"));
        assert_eq!(engine.snapshot().seen_hashes.len(), 2);
    }

    #[test]
    fn load_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brain").join("bias.json");
        let engine = ScoringEngine::load(&path);
        assert_eq!(engine.snapshot(), BiasConfig::default());
        let written: BiasConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, BiasConfig::default());
    }

    #[test]
    fn load_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bias.json");
        std::fs::write(&path, "{ not json").unwrap();
        let engine = ScoringEngine::load(&path);
        assert_eq!(engine.snapshot(), BiasConfig::default());
        // The corrupt file is left alone until the next mutation.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn mutations_persist_across_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bias.json");
        let engine = ScoringEngine::load(&path);
        engine.register_seen("remember me").unwrap();
        engine
            .update(json!({"promotion_threshold": 0.9}).as_object().unwrap().clone())
            .unwrap();

        let reloaded = ScoringEngine::load(&path);
        assert!(reloaded.is_seen("remember me"));
        assert_eq!(reloaded.snapshot().promotion_threshold, 0.9);
    }

    #[test]
    fn failed_update_leaves_config_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bias.json");
        let engine = ScoringEngine::load(&path);
        let before = std::fs::read_to_string(&path).unwrap();

        let result = engine.update(json!({"novelty_weight": "high"}).as_object().unwrap().clone());
        assert!(matches!(result, Err(ArchyError::Config(_))));
        assert_eq!(engine.snapshot(), BiasConfig::default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn apply_to_prompt_appends_hints() {
        let engine = engine();
        assert_eq!(
            engine.apply_to_prompt("You are Archy.", None),
            "You are Archy.\n[BIAS: personality_weight=0.5, safety_bias=1.0]"
        );
        assert_eq!(
            engine.apply_to_prompt("You are Archy.", Some("calm")),
            "You are Archy.\n[BIAS: personality_weight=0.5, safety_bias=1.0] [TONE: calm]"
        );
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
