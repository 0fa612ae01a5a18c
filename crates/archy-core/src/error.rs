// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Archy learning pipeline.

use thiserror::Error;

/// The primary error type used across all Archy crates.
#[derive(Debug, Error)]
pub enum ArchyError {
    /// Configuration errors (invalid TOML, bad bias keys, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, file I/O).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A staged fragment or validated memory with the given id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    /// The staged fragment has already been promoted to validated memory.
    #[error("staged fragment {staging_id} is already promoted")]
    AlreadyPromoted { staging_id: i64 },

    /// Compute worker errors (missing binary, non-zero exit, malformed output).
    #[error("worker error: {message}")]
    Worker {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ArchyError {
    /// Wrap an I/O or serialization failure as a storage error.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ArchyError::Storage {
            source: source.into(),
        }
    }

    /// Build a worker error without an underlying source.
    pub fn worker(message: impl Into<String>) -> Self {
        ArchyError::Worker {
            message: message.into(),
            source: None,
        }
    }
}
