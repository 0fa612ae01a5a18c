// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-tier memory for the Archy learning pipeline.
//!
//! Every interaction fragment is appended to the staging tier. Validation
//! scores it with the [`ScoringEngine`](archy_scoring::ScoringEngine) and, if
//! it qualifies, promotes it exactly once into the validated tier, where it
//! stays until retired.
//!
//! ## Architecture
//!
//! - **MemoryStore**: promotion state machine over `archy-storage`
//! - **Types**: PromotionOutcome, Validation, BatchSummary, MemoryStats

pub mod store;
pub mod types;

pub use store::{DEFAULT_AUTO_PROMOTE_SCORE, MemoryStore};
pub use types::*;
