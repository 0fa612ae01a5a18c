// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model shared across the scoring, storage, memory and embedding crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current wall-clock time as unix seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Compute,
    Storage,
}

// --- Scoring ---

/// Categorical outcome of scoring a fragment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Reject,
    NeedsReview,
    AcceptCandidate,
}

/// Per-component breakdown of a fragment score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreBreakdown {
    /// Full weighted composition for content that passed the safety check.
    Components {
        persona_score: f64,
        novelty: f64,
        length_score: f64,
        raw_score: f64,
        safety_bias: f64,
    },
    /// Safety short-circuit: nothing else was computed.
    Safety { safety: f64 },
}

/// The result of grading one fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentScore {
    /// Final score, always within `[0.0, 1.0]`.
    pub score: f64,
    pub verdict: Verdict,
    pub breakdown: ScoreBreakdown,
    /// `forbidden_pattern:<pattern>` for every matched pattern.
    #[serde(default)]
    pub safety_issues: Vec<String>,
    /// Unix seconds at scoring time.
    pub ts: i64,
}

/// Caller-supplied metadata attached to a staged fragment.
///
/// `intent_keywords` is the only field the scorer reads; everything else is
/// carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intent_keywords: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FragmentMetadata {
    /// Metadata carrying only intent keywords.
    pub fn with_intent_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            intent_keywords: keywords.into_iter().map(Into::into).collect(),
            extra: serde_json::Map::new(),
        }
    }
}

// --- Two-tier store ---

/// A row in the staging tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedFragment {
    pub id: i64,
    pub ts: i64,
    pub role: String,
    pub content: String,
    pub metadata: FragmentMetadata,
    /// Result of the latest validation attempt, if any.
    pub validator_result: Option<FragmentScore>,
    pub promoted: bool,
}

/// Where a validated memory came from. Immutable after promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub staging_id: i64,
    pub ts: i64,
    pub validator_score: f64,
}

/// Mutable annotations on a validated memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMeta {
    pub validator: FragmentScore,
    pub original_meta: FragmentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retired_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retired_ts: Option<i64>,
}

/// A row in the validated tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedMemory {
    pub id: i64,
    pub ts: i64,
    pub content: String,
    pub provenance: Provenance,
    pub meta: MemoryMeta,
    pub retired: bool,
    pub version: i64,
}

// --- Compute worker ---

/// One entry of a similarity ranking returned by a compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedIndex {
    /// Position in the candidate list that was submitted.
    pub index: usize,
    pub score: f32,
}

/// Secondary validation result produced by a compute backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentValidation {
    pub validation_score: f32,
    pub length_ok: bool,
    pub has_content: bool,
    pub suspicious: bool,
}
