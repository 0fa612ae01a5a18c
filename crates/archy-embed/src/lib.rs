// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding cache and compute backends for Archy.
//!
//! [`EmbeddingCache`] serves vectors by content hash and sends only misses to
//! a [`ComputeBackend`](archy_core::ComputeBackend). Two backends ship here:
//! [`SubprocessWorker`] talks the JSON worker protocol to an external program,
//! and [`LocalCompute`] implements the same tasks in-process.

pub mod cache;
pub mod local;
pub mod protocol;
pub mod subprocess;

pub use cache::{CacheStats, EmbeddingBatch, EmbeddingCache, SimilarCandidate, cache_key};
pub use local::LocalCompute;
pub use protocol::{
    DEFAULT_DIM, DEFAULT_TOP_K, Task, WorkerRequest, WorkerResponse, handle_document,
    handle_request,
};
pub use subprocess::{DEFAULT_WORKER_TIMEOUT, SubprocessWorker, serve_stdio};
