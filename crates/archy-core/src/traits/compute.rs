// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compute backend trait for the numeric work behind the embedding cache.

use async_trait::async_trait;

use crate::error::ArchyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{FragmentValidation, RankedIndex};

/// A backend that embeds text, ranks vectors by similarity and runs the
/// secondary fragment validation heuristic.
///
/// Implementations may run in-process or delegate to an external worker.
/// Every method is one logical request; errors are recoverable and callers
/// are expected to degrade rather than propagate them on read paths.
#[async_trait]
pub trait ComputeBackend: PluginAdapter {
    /// Embeds every text into a vector of length `dim`, in input order.
    async fn embed(&self, texts: &[String], dim: usize) -> Result<Vec<Vec<f32>>, ArchyError>;

    /// Ranks `candidates` by cosine similarity to `query`, descending,
    /// returning at most `top_k` entries.
    async fn rank(
        &self,
        query: &[f32],
        candidates: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<RankedIndex>, ArchyError>;

    /// Runs the secondary validation heuristic on a single text.
    async fn validate(&self, text: &str) -> Result<FragmentValidation, ArchyError>;
}
