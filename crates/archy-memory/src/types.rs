// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result types for the promotion state machine.

use serde::{Deserialize, Serialize};

use archy_core::types::FragmentScore;

/// What a validation attempt did to a staged fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionOutcome {
    /// A validated memory was created.
    Promoted { memory_id: i64 },
    /// Scored `reject`; the fragment stays staged.
    Rejected,
    /// Scored between the thresholds; the fragment stays staged.
    NeedsReview,
}

impl PromotionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionOutcome::Promoted { .. } => "promoted",
            PromotionOutcome::Rejected => "rejected",
            PromotionOutcome::NeedsReview => "needs_review",
        }
    }
}

/// Outcome of `validate_and_promote` together with the score it stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub staging_id: i64,
    #[serde(flatten)]
    pub outcome: PromotionOutcome,
    pub result: FragmentScore,
}

/// Aggregate counts from a batch promotion run.
///
/// `processed` counts only fragments that reached an outcome; items that
/// failed are logged and left out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub promoted: usize,
    pub rejected: usize,
    pub needs_review: usize,
}

impl BatchSummary {
    pub(crate) fn record(&mut self, outcome: PromotionOutcome) {
        self.processed += 1;
        match outcome {
            PromotionOutcome::Promoted { .. } => self.promoted += 1,
            PromotionOutcome::Rejected => self.rejected += 1,
            PromotionOutcome::NeedsReview => self.needs_review += 1,
        }
    }
}

/// Row counts for the staging tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingCounts {
    pub unpromoted: u64,
    pub promoted: u64,
    pub total: u64,
}

/// Row counts for the validated tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedCounts {
    pub active: u64,
    pub retired: u64,
    pub total: u64,
}

/// Snapshot of both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub staging: StagingCounts,
    pub validated: ValidatedCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(PromotionOutcome::Promoted { memory_id: 3 }).unwrap();
        assert_eq!(json["outcome"], "promoted");
        assert_eq!(json["memory_id"], 3);
        assert_eq!(
            serde_json::to_value(PromotionOutcome::NeedsReview).unwrap()["outcome"],
            "needs_review"
        );
    }

    #[test]
    fn batch_summary_counts_each_outcome() {
        let mut summary = BatchSummary::default();
        summary.record(PromotionOutcome::Rejected);
        summary.record(PromotionOutcome::Promoted { memory_id: 1 });
        summary.record(PromotionOutcome::NeedsReview);
        assert_eq!(
            summary,
            BatchSummary {
                processed: 3,
                promoted: 1,
                rejected: 1,
                needs_review: 1
            }
        );
    }
}
