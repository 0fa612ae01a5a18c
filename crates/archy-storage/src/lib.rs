// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Archy two-tier memory store.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for the
//! staging and validated tiers. The promotion transaction lives in
//! [`queries::staging::grade`].

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::{Database, flatten_call_err, map_tr_err};
pub use queries::staging::{GradeRecord, Grading};
