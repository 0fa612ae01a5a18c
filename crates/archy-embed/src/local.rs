// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process compute backend.
//!
//! Embeddings are deterministic pseudo-random unit vectors derived from the
//! text's SHA-256 digest. They carry no semantic meaning, but they are stable
//! across runs and builds, which is all the cache and the ranking path need.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use archy_core::types::{FragmentValidation, RankedIndex};
use archy_core::{AdapterType, ArchyError, ComputeBackend, HealthStatus, PluginAdapter};

const MIN_FRAGMENT_BYTES: usize = 10;
const MAX_FRAGMENT_BYTES: usize = 10_000;
const SUSPICIOUS_MARKERS: [&str; 3] = ["rm -rf", "exfiltrate", "bypass"];

/// Compute backend that runs every task on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCompute;

impl LocalCompute {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PluginAdapter for LocalCompute {
    fn name(&self) -> &str {
        "local"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Compute
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchyError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ComputeBackend for LocalCompute {
    async fn embed(&self, texts: &[String], dim: usize) -> Result<Vec<Vec<f32>>, ArchyError> {
        Ok(texts.iter().map(|t| pseudo_embedding(t, dim)).collect())
    }

    async fn rank(
        &self,
        query: &[f32],
        candidates: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<RankedIndex>, ArchyError> {
        Ok(rank_by_cosine(query, candidates, top_k))
    }

    async fn validate(&self, text: &str) -> Result<FragmentValidation, ArchyError> {
        Ok(validation_heuristic(text))
    }
}

/// Deterministic unit vector of length `dim` for `text`.
pub fn pseudo_embedding(text: &str, dim: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    let mut rng = u64::from_le_bytes(seed);

    let mut v: Vec<f32> = (0..dim)
        .map(|_| {
            rng = rng.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            ((rng / 65_536) % 1_000) as f32 / 1_000.0 - 0.5
        })
        .collect();

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Cosine similarity; 0 for vectors of different length or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Score every candidate against `query` and keep the best `top_k`.
pub fn rank_by_cosine(query: &[f32], candidates: &[Vec<f32>], top_k: usize) -> Vec<RankedIndex> {
    let mut ranked: Vec<RankedIndex> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| RankedIndex {
            index,
            score: cosine_similarity(query, c),
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    ranked.truncate(top_k);
    ranked
}

/// Secondary fragment check: size bounds, non-blank content and a short list
/// of dangerous markers.
pub fn validation_heuristic(text: &str) -> FragmentValidation {
    let len = text.len();
    let length_ok = (MIN_FRAGMENT_BYTES..=MAX_FRAGMENT_BYTES).contains(&len);
    let has_content = !text.trim().is_empty();
    let suspicious = SUSPICIOUS_MARKERS.iter().any(|m| text.contains(m));

    let validation_score = if length_ok && has_content && !suspicious {
        (len as f32 / 512.0).min(1.0) * 0.8 + 0.2
    } else {
        0.0
    };

    FragmentValidation {
        validation_score,
        length_ok,
        has_content,
        suspicious,
    }
}
