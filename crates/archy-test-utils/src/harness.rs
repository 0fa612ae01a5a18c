// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full pipeline (temp SQLite store, file-backed
//! scoring engine and embedding cache) around a [`StubCompute`] backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use archy_config::model::{ArchyConfig, EmbeddingConfig, MemoryConfig, ScoringConfig, StorageConfig};
use archy_core::{ArchyError, ComputeBackend};
use archy_embed::EmbeddingCache;
use archy_memory::MemoryStore;
use archy_scoring::{BiasConfig, ScoringEngine};
use archy_storage::Database;

use crate::stub_compute::StubCompute;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    bias: Option<BiasConfig>,
    auto_promote_score: f64,
    compute: Option<Arc<StubCompute>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            bias: None,
            auto_promote_score: MemoryConfig::default().auto_promote_score,
            compute: None,
        }
    }

    /// Seed the bias document before the scoring engine loads it.
    pub fn with_bias(mut self, bias: BiasConfig) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn with_auto_promote_score(mut self, score: f64) -> Self {
        self.auto_promote_score = score;
        self
    }

    /// Use a pre-configured stub instead of a fresh one.
    pub fn with_compute(mut self, compute: Arc<StubCompute>) -> Self {
        self.compute = Some(compute);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ArchyError> {
        let temp_dir = tempfile::TempDir::new().map_err(ArchyError::storage)?;
        let root = temp_dir.path();

        let config = ArchyConfig {
            storage: StorageConfig {
                database_path: path_string(&root.join("brain.db")),
                wal_mode: true,
            },
            scoring: ScoringConfig {
                bias_path: path_string(&root.join("bias.json")),
            },
            memory: MemoryConfig {
                auto_promote_score: self.auto_promote_score,
                ..MemoryConfig::default()
            },
            embedding: EmbeddingConfig {
                cache_path: path_string(&root.join("embeddings.json")),
                ..EmbeddingConfig::default()
            },
            ..ArchyConfig::default()
        };

        if let Some(bias) = &self.bias {
            let bytes = serde_json::to_vec_pretty(bias)
                .map_err(|e| ArchyError::Internal(format!("failed to encode bias: {e}")))?;
            archy_core::fs::write_atomic(Path::new(&config.scoring.bias_path), &bytes)?;
        }

        let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
        let scoring = Arc::new(ScoringEngine::load(&config.scoring.bias_path));
        let store = MemoryStore::new(db, scoring.clone())
            .with_auto_promote_score(config.memory.auto_promote_score);

        let compute = self.compute.unwrap_or_else(|| Arc::new(StubCompute::new()));
        let cache = EmbeddingCache::open(
            &config.embedding.cache_path,
            compute.clone() as Arc<dyn ComputeBackend>,
        );

        Ok(TestHarness {
            store,
            scoring,
            cache,
            compute,
            config,
            _temp_dir: temp_dir,
        })
    }
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

/// A complete test environment with a stub backend and temp storage.
pub struct TestHarness {
    /// Two-tier store (temp DB, cleaned up on drop).
    pub store: MemoryStore,
    /// Scoring engine shared with the store.
    pub scoring: Arc<ScoringEngine>,
    /// Embedding cache backed by `compute`.
    pub cache: EmbeddingCache,
    pub compute: Arc<StubCompute>,
    /// Configuration pointing at the temp directory.
    pub config: ArchyConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Root of the harness's temp directory.
    pub fn dir(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Stage `content` as an assistant turn and return its id.
    pub async fn stage(&self, content: &str) -> Result<i64, ArchyError> {
        self.store
            .stage_experience("assistant", content, &Default::default())
            .await
    }

    /// Reopen the embedding cache from disk with the same backend.
    pub fn reopen_cache(&self) -> EmbeddingCache {
        EmbeddingCache::open(
            &self.config.embedding.cache_path,
            self.compute.clone() as Arc<dyn ComputeBackend>,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::builder().build().await.unwrap();
        let stats = harness.store.get_memory_stats().await.unwrap();
        assert_eq!(stats.staging.total, 0);
        assert_eq!(stats.validated.total, 0);
        assert!(harness.dir().join("bias.json").exists());
    }

    #[tokio::test]
    async fn with_bias_seeds_the_scoring_engine() {
        let bias = BiasConfig {
            safety_bias: 2.0,
            ..BiasConfig::default()
        };
        let harness = TestHarness::builder().with_bias(bias).build().await.unwrap();
        assert_eq!(harness.scoring.snapshot().safety_bias, 2.0);
    }

    #[tokio::test]
    async fn temp_db_is_unique_per_harness() {
        let h1 = TestHarness::builder().build().await.unwrap();
        let h2 = TestHarness::builder().build().await.unwrap();

        h1.stage("only in the first harness").await.unwrap();
        assert_eq!(h1.store.get_memory_stats().await.unwrap().staging.total, 1);
        assert_eq!(h2.store.get_memory_stats().await.unwrap().staging.total, 0);
    }

    #[tokio::test]
    async fn cache_uses_the_stub_backend() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness
            .cache
            .embed_texts(&["hello".to_string()], 8, true)
            .await;
        assert_eq!(harness.compute.embedded_text_count().await, 1);

        let reopened = harness.reopen_cache();
        assert_eq!(reopened.get_cache_stats().await.entry_count, 1);
    }
}
