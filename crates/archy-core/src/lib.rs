// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Archy learning pipeline.
//!
//! This crate provides the error type, the data model shared by the scoring
//! engine, the two-tier store and the embedding cache, and the
//! [`ComputeBackend`] trait that the cache delegates numeric work to.

pub mod error;
pub mod fs;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ArchyError;
pub use types::{
    AdapterType, FragmentMetadata, FragmentScore, FragmentValidation, HealthStatus, MemoryMeta,
    Provenance, RankedIndex, ScoreBreakdown, StagedFragment, ValidatedMemory, Verdict,
};

pub use traits::{ComputeBackend, PluginAdapter};
