// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fragment scoring for the Archy learning pipeline.
//!
//! [`ScoringEngine`] grades content fragments against a persisted
//! [`BiasConfig`]: a safety check against forbidden patterns, then a weighted
//! blend of persona alignment, novelty and length. The verdict decides
//! whether a staged fragment may be promoted to validated memory.

pub mod bias;
pub mod engine;
pub mod seen;

pub use bias::BiasConfig;
pub use engine::{ScoringEngine, content_hash};
pub use seen::SeenSet;
