// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per tier.

pub mod memories;
pub mod staging;

use rusqlite::types::Type;
use serde::de::DeserializeOwned;

/// Decode a JSON TEXT column into `T`, surfacing parse failures as
/// conversion errors on that column.
pub(crate) fn json_column<T: DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
