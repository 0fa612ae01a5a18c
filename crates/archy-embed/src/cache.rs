// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed embedding cache.
//!
//! Vectors are keyed by `"{sha256_hex(text)}_{dim}"` and persisted as one flat
//! JSON object. Only cache misses reach the compute backend, batched into a
//! single request. Every read path degrades instead of failing: a broken
//! backend yields zero vectors, an empty ranking or a 0.0 validation score.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use archy_core::fs::write_atomic;
use archy_core::{ArchyError, ComputeBackend};

/// Cache key for `text` embedded at `dim` dimensions.
pub fn cache_key(text: &str, dim: usize) -> String {
    format!("{}_{dim}", hex::encode(Sha256::digest(text.as_bytes())))
}

/// Vectors for one `embed_texts` call, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingBatch {
    pub embeddings: Vec<Vec<f32>>,
    /// Input positions that received a zero-vector fallback.
    pub fallback: Vec<usize>,
    /// Inputs served from the cache.
    pub cache_hits: usize,
    /// Distinct texts sent to the backend.
    pub requested: usize,
}

impl EmbeddingBatch {
    /// True when at least one vector is a fallback.
    pub fn degraded(&self) -> bool {
        !self.fallback.is_empty()
    }
}

/// A ranked candidate returned by [`EmbeddingCache::find_similar`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCandidate {
    pub text: String,
    pub score: f32,
    /// Position in the submitted candidate list.
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: usize,
    /// Size of the persisted cache document, 0 when it does not exist.
    pub size_bytes: u64,
}

pub struct EmbeddingCache {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<String, Vec<f32>>>,
    backend: Arc<dyn ComputeBackend>,
    flush_lock: Mutex<()>,
}

impl EmbeddingCache {
    /// Open the cache persisted at `path`.
    ///
    /// A missing file starts an empty cache. An unreadable or corrupt file is
    /// logged and also starts empty; it is replaced on the next flush.
    pub fn open(path: impl Into<PathBuf>, backend: Arc<dyn ComputeBackend>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        debug!(path = %path.display(), entries = entries.len(), "embedding cache loaded");
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
            backend,
            flush_lock: Mutex::new(()),
        }
    }

    /// A cache that never touches disk.
    pub fn in_memory(backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
            backend,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    /// Embed `texts` at `dim` dimensions.
    ///
    /// With `use_cache` false every text is recomputed; the results are still
    /// written to the cache.
    pub async fn embed_texts(&self, texts: &[String], dim: usize, use_cache: bool) -> EmbeddingBatch {
        let keys: Vec<String> = texts.iter().map(|t| cache_key(t, dim)).collect();
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut batch = EmbeddingBatch::default();

        if use_cache {
            let entries = self.entries.read().await;
            for (slot, key) in slots.iter_mut().zip(&keys) {
                if let Some(v) = entries.get(key) {
                    *slot = Some(v.clone());
                    batch.cache_hits += 1;
                }
            }
        }

        // Distinct misses, first occurrence order.
        let mut miss_texts: Vec<String> = Vec::new();
        let mut miss_keys: Vec<&str> = Vec::new();
        for (i, slot) in slots.iter().enumerate() {
            if slot.is_none() && !miss_keys.contains(&keys[i].as_str()) {
                miss_keys.push(&keys[i]);
                miss_texts.push(texts[i].clone());
            }
        }
        batch.requested = miss_texts.len();

        if !miss_texts.is_empty() {
            match self.compute(&miss_texts, dim).await {
                Ok(vectors) => {
                    let computed: HashMap<&str, Vec<f32>> =
                        miss_keys.iter().copied().zip(vectors).collect();
                    for (slot, key) in slots.iter_mut().zip(&keys) {
                        if slot.is_none() {
                            *slot = computed.get(key.as_str()).cloned();
                        }
                    }
                    {
                        let mut entries = self.entries.write().await;
                        for (key, v) in computed {
                            entries.insert(key.to_string(), v);
                        }
                    }
                    if let Err(e) = self.flush().await {
                        warn!(error = %e, "failed to persist embedding cache");
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        misses = miss_texts.len(),
                        backend = self.backend.name(),
                        "embedding backend failed; using zero vectors"
                    );
                }
            }
        }

        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(v) => batch.embeddings.push(v),
                None => {
                    batch.fallback.push(i);
                    batch.embeddings.push(vec![0.0; dim]);
                }
            }
        }
        batch
    }

    async fn compute(&self, texts: &[String], dim: usize) -> Result<Vec<Vec<f32>>, ArchyError> {
        let vectors = self.backend.embed(texts, dim).await?;
        if vectors.len() != texts.len() || vectors.iter().any(|v| v.len() != dim) {
            return Err(ArchyError::worker(format!(
                "backend returned {} vectors for {} texts at dim {dim}",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    /// Rank `candidates` by similarity to `query`, best first, at most `top_k`.
    pub async fn find_similar(
        &self,
        query: &str,
        candidates: &[String],
        top_k: usize,
        dim: usize,
    ) -> Vec<SimilarCandidate> {
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(query.to_string());
        texts.extend(candidates.iter().cloned());

        let batch = self.embed_texts(&texts, dim, true).await;
        if batch.fallback.first() == Some(&0) {
            debug!("query embedding unavailable; no similarity results");
            return Vec::new();
        }
        let mut vectors = batch.embeddings.into_iter();
        let Some(query_vec) = vectors.next() else {
            return Vec::new();
        };
        let candidate_vecs: Vec<Vec<f32>> = vectors.collect();

        let ranked = match self.backend.rank(&query_vec, &candidate_vecs, top_k).await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "similarity ranking failed");
                return Vec::new();
            }
        };

        let mut results: Vec<SimilarCandidate> = ranked
            .into_iter()
            .filter_map(|r| {
                candidates.get(r.index).map(|text| SimilarCandidate {
                    text: text.clone(),
                    score: r.score,
                    index: r.index,
                })
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        results
    }

    /// Secondary validation score for `text`; 0.0 if the backend fails.
    pub async fn validate_fragment(&self, text: &str) -> f32 {
        match self.backend.validate(text).await {
            Ok(v) => v.validation_score,
            Err(e) => {
                warn!(error = %e, "fragment validation failed");
                0.0
            }
        }
    }

    /// Drop every entry and persist the empty cache.
    pub async fn clear_cache(&self) -> Result<(), ArchyError> {
        let dropped = {
            let mut entries = self.entries.write().await;
            let n = entries.len();
            entries.clear();
            n
        };
        self.flush().await?;
        debug!(dropped, "embedding cache cleared");
        Ok(())
    }

    pub async fn get_cache_stats(&self) -> CacheStats {
        let entry_count = self.entries.read().await.len();
        let size_bytes = match &self.path {
            Some(path) => tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0),
            None => 0,
        };
        CacheStats {
            entry_count,
            size_bytes,
        }
    }

    /// Write the current entries to disk. The flush lock orders concurrent
    /// flushes so the last write always carries the newest snapshot.
    async fn flush(&self) -> Result<(), ArchyError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        let bytes = {
            let entries = self.entries.read().await;
            serde_json::to_vec(&*entries)
                .map_err(|e| ArchyError::Internal(format!("failed to encode embedding cache: {e}")))?
        };
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| ArchyError::Internal(format!("cache flush task failed: {e}")))?
    }
}

fn load_entries(path: &Path) -> HashMap<String, Vec<f32>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read embedding cache; starting empty");
            return HashMap::new();
        }
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "corrupt embedding cache; starting empty");
        HashMap::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCompute;
    use archy_core::types::{FragmentValidation, RankedIndex};
    use archy_core::{AdapterType, HealthStatus, PluginAdapter};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    /// Records every embed request and can be told to misbehave.
    #[derive(Default)]
    struct Recording {
        requests: StdMutex<Vec<Vec<String>>>,
        fail: bool,
        short: bool,
        bogus_rank: bool,
    }

    impl Recording {
        fn requests(&self) -> Vec<Vec<String>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PluginAdapter for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Compute
        }
        async fn health_check(&self) -> Result<HealthStatus, ArchyError> {
            Ok(HealthStatus::Healthy)
        }
    }

    #[async_trait]
    impl ComputeBackend for Recording {
        async fn embed(&self, texts: &[String], dim: usize) -> Result<Vec<Vec<f32>>, ArchyError> {
            self.requests.lock().unwrap().push(texts.to_vec());
            if self.fail {
                return Err(ArchyError::worker("no worker"));
            }
            let mut out = LocalCompute.embed(texts, dim).await?;
            if self.short {
                out.pop();
            }
            Ok(out)
        }

        async fn rank(
            &self,
            query: &[f32],
            candidates: &[Vec<f32>],
            top_k: usize,
        ) -> Result<Vec<RankedIndex>, ArchyError> {
            if self.fail {
                return Err(ArchyError::worker("no worker"));
            }
            let mut ranked = LocalCompute.rank(query, candidates, top_k).await?;
            if self.bogus_rank {
                ranked.insert(0, RankedIndex { index: 99, score: 2.0 });
            }
            Ok(ranked)
        }

        async fn validate(&self, text: &str) -> Result<FragmentValidation, ArchyError> {
            if self.fail {
                return Err(ArchyError::Timeout {
                    duration: std::time::Duration::from_secs(30),
                });
            }
            LocalCompute.validate(text).await
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cache_key_includes_dimension() {
        let key = cache_key("hello", 128);
        assert!(key.ends_with("_128"));
        assert_eq!(key.len(), 64 + 4);
        assert_ne!(cache_key("hello", 64), key);
    }

    #[tokio::test]
    async fn second_call_requests_only_uncached_texts() {
        let backend = Arc::new(Recording::default());
        let dir = tempdir().unwrap();
        let cache = EmbeddingCache::open(dir.path().join("cache.json"), backend.clone());

        let first = cache.embed_texts(&strings(&["a", "b"]), 8, true).await;
        assert_eq!(first.requested, 2);
        assert!(!first.degraded());

        let second = cache.embed_texts(&strings(&["b", "c", "a"]), 8, true).await;
        assert_eq!(second.cache_hits, 2);
        assert_eq!(backend.requests(), vec![strings(&["a", "b"]), strings(&["c"])]);
        assert_eq!(second.embeddings[0], first.embeddings[1]);
        assert_eq!(second.embeddings[2], first.embeddings[0]);
    }

    #[tokio::test]
    async fn duplicate_inputs_are_requested_once() {
        let backend = Arc::new(Recording::default());
        let cache = EmbeddingCache::in_memory(backend.clone());

        let batch = cache.embed_texts(&strings(&["x", "y", "x"]), 4, true).await;
        assert_eq!(backend.requests(), vec![strings(&["x", "y"])]);
        assert_eq!(batch.embeddings.len(), 3);
        assert_eq!(batch.embeddings[0], batch.embeddings[2]);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let original = {
            let cache = EmbeddingCache::open(&path, Arc::new(Recording::default()));
            cache.embed_texts(&strings(&["persist me"]), 16, true).await
        };

        let backend = Arc::new(Recording::default());
        let reopened = EmbeddingCache::open(&path, backend.clone());
        let again = reopened.embed_texts(&strings(&["persist me"]), 16, true).await;
        assert!(backend.requests().is_empty());
        assert_eq!(again.embeddings, original.embeddings);
        assert_eq!(reopened.get_cache_stats().await.entry_count, 1);
    }

    #[tokio::test]
    async fn failing_backend_yields_zero_vectors() {
        let backend = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let cache = EmbeddingCache::in_memory(backend);

        let batch = cache.embed_texts(&strings(&["a", "b"]), 4, true).await;
        assert!(batch.degraded());
        assert_eq!(batch.fallback, vec![0, 1]);
        assert_eq!(batch.embeddings, vec![vec![0.0; 4]; 2]);
        assert_eq!(cache.get_cache_stats().await.entry_count, 0);
    }

    #[tokio::test]
    async fn short_response_is_treated_as_failure() {
        let backend = Arc::new(Recording {
            short: true,
            ..Default::default()
        });
        let cache = EmbeddingCache::in_memory(backend);

        let batch = cache.embed_texts(&strings(&["a", "b"]), 4, true).await;
        assert_eq!(batch.fallback, vec![0, 1]);
        assert_eq!(cache.get_cache_stats().await.entry_count, 0);
    }

    #[tokio::test]
    async fn bypassing_the_cache_recomputes_but_still_stores() {
        let backend = Arc::new(Recording::default());
        let cache = EmbeddingCache::in_memory(backend.clone());

        cache.embed_texts(&strings(&["a"]), 4, false).await;
        cache.embed_texts(&strings(&["a"]), 4, false).await;
        assert_eq!(backend.requests().len(), 2);
        assert_eq!(cache.get_cache_stats().await.entry_count, 1);

        let batch = cache.embed_texts(&strings(&["a"]), 4, true).await;
        assert_eq!(batch.cache_hits, 1);
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn bypassed_results_are_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let cache = EmbeddingCache::open(&path, Arc::new(Recording::default()));

        cache.embed_texts(&strings(&["persist me"]), 4, false).await;

        let reopened = EmbeddingCache::open(&path, Arc::new(Recording::default()));
        assert_eq!(reopened.get_cache_stats().await.entry_count, 1);
    }

    #[tokio::test]
    async fn find_similar_ranks_exact_match_first() {
        let cache = EmbeddingCache::in_memory(Arc::new(Recording::default()));
        let candidates = strings(&["unrelated words", "rust ownership", "more filler"]);

        let results = cache.find_similar("rust ownership", &candidates, 2, 32).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 1);
        assert_eq!(results[0].text, "rust ownership");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn find_similar_discards_out_of_range_indices() {
        let backend = Arc::new(Recording {
            bogus_rank: true,
            ..Default::default()
        });
        let cache = EmbeddingCache::in_memory(backend);
        let candidates = strings(&["one", "two"]);

        let results = cache.find_similar("one", &candidates, 5, 8).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.index < candidates.len()));
    }

    #[tokio::test]
    async fn find_similar_with_broken_backend_is_empty() {
        let backend = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let cache = EmbeddingCache::in_memory(backend);
        assert!(cache.find_similar("q", &strings(&["a"]), 3, 8).await.is_empty());
        assert!(cache.find_similar("q", &[], 3, 8).await.is_empty());
    }

    #[tokio::test]
    async fn validate_fragment_degrades_to_zero() {
        let ok = EmbeddingCache::in_memory(Arc::new(Recording::default()));
        assert!(ok.validate_fragment("a reasonably long fragment").await > 0.2);

        let broken = EmbeddingCache::in_memory(Arc::new(Recording {
            fail: true,
            ..Default::default()
        }));
        assert_eq!(broken.validate_fragment("a reasonably long fragment").await, 0.0);
    }

    #[tokio::test]
    async fn clear_cache_persists_empty_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = EmbeddingCache::open(&path, Arc::new(Recording::default()));
        cache.embed_texts(&strings(&["a", "b"]), 4, true).await;
        assert!(cache.get_cache_stats().await.size_bytes > 2);

        cache.clear_cache().await.unwrap();
        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.entry_count, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert_eq!(stats.size_bytes, 2);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = EmbeddingCache::open(&path, Arc::new(Recording::default()));
        assert_eq!(cache.get_cache_stats().await.entry_count, 0);

        cache.embed_texts(&strings(&["a"]), 4, true).await;
        let reloaded: HashMap<String, Vec<f32>> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded.len(), 1);
    }
}
