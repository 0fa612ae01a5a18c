// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two-tier memory store and its promotion state machine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use archy_core::types::{FragmentMetadata, StagedFragment, ValidatedMemory, Verdict, now_ts};
use archy_core::ArchyError;
use archy_scoring::ScoringEngine;
use archy_storage::queries::{memories, staging};
use archy_storage::{Database, Grading};

use crate::types::{
    BatchSummary, MemoryStats, PromotionOutcome, StagingCounts, ValidatedCounts, Validation,
};

/// Default score at or above which a non-rejected fragment is promoted even
/// if its verdict is only `needs_review`.
pub const DEFAULT_AUTO_PROMOTE_SCORE: f64 = 0.8;

/// Staging and validated tiers over one SQLite database.
///
/// Promotion is the only path from staging to validated memory. It runs as a
/// single transaction on the database writer thread, so concurrent attempts
/// on the same fragment produce exactly one memory.
pub struct MemoryStore {
    db: Database,
    scoring: Arc<ScoringEngine>,
    auto_promote_score: f64,
}

impl MemoryStore {
    pub fn new(db: Database, scoring: Arc<ScoringEngine>) -> Self {
        Self {
            db,
            scoring,
            auto_promote_score: DEFAULT_AUTO_PROMOTE_SCORE,
        }
    }

    /// Override the auto-promotion floor.
    pub fn with_auto_promote_score(mut self, score: f64) -> Self {
        self.auto_promote_score = score;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn scoring(&self) -> &Arc<ScoringEngine> {
        &self.scoring
    }

    /// Append a fragment to staging. Returns its id.
    pub async fn stage_experience(
        &self,
        role: &str,
        content: &str,
        metadata: &FragmentMetadata,
    ) -> Result<i64, ArchyError> {
        let id = staging::insert_staged(&self.db, role, content, metadata).await?;
        debug!(staging_id = id, role, "fragment staged");
        Ok(id)
    }

    pub async fn get_staged(&self, staging_id: i64) -> Result<Option<StagedFragment>, ArchyError> {
        staging::get_staged(&self.db, staging_id).await
    }

    /// Staged fragments, most recent first.
    pub async fn list_staged(
        &self,
        limit: usize,
        unpromoted_only: bool,
    ) -> Result<Vec<StagedFragment>, ArchyError> {
        staging::list_staged(&self.db, limit, unpromoted_only).await
    }

    /// Score a staged fragment and promote it if it qualifies.
    ///
    /// The score is stored on the staged row whatever the outcome. A `reject`
    /// verdict is final unless `admin_approve` is set. Otherwise the fragment
    /// is promoted when it is an accept candidate, when the admin approves,
    /// or when its score reaches the auto-promotion floor.
    ///
    /// # Errors
    ///
    /// [`ArchyError::NotFound`] for an unknown id and
    /// [`ArchyError::AlreadyPromoted`] if the fragment was promoted earlier,
    /// including by a concurrent call that won the race.
    pub async fn validate_and_promote(
        &self,
        staging_id: i64,
        admin_approve: bool,
    ) -> Result<Validation, ArchyError> {
        let scoring = Arc::clone(&self.scoring);
        let floor = self.auto_promote_score;
        let record = staging::grade(&self.db, staging_id, move |fragment| {
            let result = scoring.score_fragment(&fragment.content, &fragment.metadata);
            let promote = match result.verdict {
                Verdict::Reject => admin_approve,
                Verdict::AcceptCandidate => true,
                Verdict::NeedsReview => admin_approve || result.score >= floor,
            };
            Grading { result, promote }
        })
        .await?;

        let Some(result) = record.fragment.validator_result else {
            return Err(ArchyError::Internal(format!(
                "staged fragment {staging_id} has no validator result after grading"
            )));
        };

        let outcome = match (record.memory_id, result.verdict) {
            (Some(memory_id), _) => {
                info!(
                    staging_id,
                    memory_id,
                    score = result.score,
                    verdict = %result.verdict,
                    admin_approve,
                    "fragment promoted"
                );
                if let Err(e) = self.register_seen(record.fragment.content.clone()).await {
                    warn!(staging_id, error = %e, "failed to register promoted content as seen");
                }
                PromotionOutcome::Promoted { memory_id }
            }
            (None, Verdict::Reject) => PromotionOutcome::Rejected,
            (None, _) => PromotionOutcome::NeedsReview,
        };
        debug!(staging_id, outcome = outcome.as_str(), score = result.score, "fragment validated");

        Ok(Validation {
            staging_id,
            outcome,
            result,
        })
    }

    /// Seen-set updates write the bias document, so they run off the runtime.
    async fn register_seen(&self, content: String) -> Result<bool, ArchyError> {
        let scoring = Arc::clone(&self.scoring);
        tokio::task::spawn_blocking(move || scoring.register_seen(&content))
            .await
            .map_err(|e| ArchyError::Internal(format!("seen-set update task failed: {e}")))?
    }

    /// Validate up to `limit` unpromoted fragments, most recent first.
    ///
    /// Per-item failures are logged and skipped.
    pub async fn batch_validate_and_promote(&self, limit: usize) -> Result<BatchSummary, ArchyError> {
        let ids = staging::unpromoted_ids(&self.db, limit).await?;
        let mut summary = BatchSummary::default();
        for staging_id in ids {
            match self.validate_and_promote(staging_id, false).await {
                Ok(validation) => summary.record(validation.outcome),
                Err(e) => warn!(staging_id, error = %e, "skipping fragment in batch promotion"),
            }
        }
        info!(
            processed = summary.processed,
            promoted = summary.promoted,
            rejected = summary.rejected,
            needs_review = summary.needs_review,
            "batch promotion complete"
        );
        Ok(summary)
    }

    pub async fn get_memory(&self, memory_id: i64) -> Result<Option<ValidatedMemory>, ArchyError> {
        memories::get_memory(&self.db, memory_id).await
    }

    /// Validated memories, most recent first.
    pub async fn list_memories(
        &self,
        include_retired: bool,
        limit: usize,
    ) -> Result<Vec<ValidatedMemory>, ArchyError> {
        memories::list_memories(&self.db, include_retired, limit).await
    }

    /// Content of up to `limit` active memories, for similarity search.
    pub async fn active_contents(&self, limit: usize) -> Result<Vec<String>, ArchyError> {
        memories::active_contents(&self.db, limit).await
    }

    /// Soft-delete a memory. Returns `false` if no memory has this id.
    pub async fn retire_memory(&self, memory_id: i64, reason: &str) -> Result<bool, ArchyError> {
        let retired = memories::retire_memory(&self.db, memory_id, reason, now_ts()).await?;
        if retired {
            info!(memory_id, reason, "memory retired");
        }
        Ok(retired)
    }

    /// Retire every active memory older than `max_age`. Returns the count.
    pub async fn decay_old_memories(&self, max_age: Duration) -> Result<usize, ArchyError> {
        let now = now_ts();
        let age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(age);
        let count = memories::retire_older_than(&self.db, cutoff, "decay", now).await?;
        info!(count, cutoff, "decayed old memories");
        Ok(count)
    }

    pub async fn get_memory_stats(&self) -> Result<MemoryStats, ArchyError> {
        let (unpromoted, promoted) = staging::staging_counts(&self.db).await?;
        let (active, retired) = memories::memory_counts(&self.db).await?;
        Ok(MemoryStats {
            staging: StagingCounts {
                unpromoted,
                promoted,
                total: unpromoted + promoted,
            },
            validated: ValidatedCounts {
                active,
                retired,
                total: active + retired,
            },
        })
    }
}
