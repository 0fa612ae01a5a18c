// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring from configuration to the running pipeline.

use std::sync::Arc;
use std::time::Duration;

use archy_config::ArchyConfig;
use archy_config::model::EmbeddingConfig;
use archy_core::{ArchyError, ComputeBackend};
use archy_embed::{EmbeddingCache, LocalCompute, SubprocessWorker};
use archy_memory::MemoryStore;
use archy_scoring::ScoringEngine;
use archy_storage::Database;
use tracing::debug;

/// Everything a command needs: the store (with its scoring engine) and the
/// embedding cache.
pub struct App {
    pub config: ArchyConfig,
    pub store: MemoryStore,
    pub cache: EmbeddingCache,
}

impl App {
    pub async fn open(config: ArchyConfig) -> Result<Self, ArchyError> {
        let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
        let scoring = Arc::new(ScoringEngine::load(&config.scoring.bias_path));
        let store = MemoryStore::new(db, scoring)
            .with_auto_promote_score(config.memory.auto_promote_score);

        let backend = compute_backend(&config.embedding);
        debug!(backend = backend.name(), "compute backend selected");
        let cache = EmbeddingCache::open(&config.embedding.cache_path, backend);

        Ok(Self {
            config,
            store,
            cache,
        })
    }

    pub fn scoring(&self) -> &Arc<ScoringEngine> {
        self.store.scoring()
    }
}

/// The external worker when one is configured, otherwise in-process compute.
pub fn compute_backend(config: &EmbeddingConfig) -> Arc<dyn ComputeBackend> {
    match &config.worker_path {
        Some(path) => Arc::new(
            SubprocessWorker::new(path)
                .with_args(config.worker_args.iter().cloned())
                .with_timeout(Duration::from_secs(config.worker_timeout_secs)),
        ),
        None => Arc::new(LocalCompute::new()),
    }
}
