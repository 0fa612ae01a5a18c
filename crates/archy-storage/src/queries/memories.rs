// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validated tier operations. Rows are created only by
//! [`grade`](crate::queries::staging::grade); here they are read and retired.

use rusqlite::{OptionalExtension, params};

use archy_core::ArchyError;
use archy_core::types::ValidatedMemory;

use crate::database::{Database, map_tr_err};
use crate::queries::json_column;

const MEMORY_COLUMNS: &str = "id, ts, content, provenance, meta, retired, version";

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<ValidatedMemory> {
    Ok(ValidatedMemory {
        id: row.get(0)?,
        ts: row.get(1)?,
        content: row.get(2)?,
        provenance: json_column(row, 3)?,
        meta: json_column(row, 4)?,
        retired: row.get::<_, i64>(5)? != 0,
        version: row.get(6)?,
    })
}

/// Fetch a single validated memory.
pub async fn get_memory(db: &Database, id: i64) -> Result<Option<ValidatedMemory>, ArchyError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {MEMORY_COLUMNS} FROM validated_memories WHERE id = ?1");
            conn.query_row(&sql, params![id], row_to_memory).optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List validated memories, most recent first.
pub async fn list_memories(
    db: &Database,
    include_retired: bool,
    limit: usize,
) -> Result<Vec<ValidatedMemory>, ArchyError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let filter = if include_retired { "" } else { "WHERE retired = 0" };
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM validated_memories {filter}
                 ORDER BY ts DESC, id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit], row_to_memory)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Content of up to `limit` active memories, most recent first.
pub async fn active_contents(db: &Database, limit: usize) -> Result<Vec<String>, ArchyError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT content FROM validated_memories WHERE retired = 0
                 ORDER BY ts DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a memory retired, recording `reason` and `ts` in its meta.
///
/// Returns `false` when no memory has this id. Retiring an already retired
/// memory returns `true` and keeps the original reason.
pub async fn retire_memory(
    db: &Database,
    id: i64,
    reason: &str,
    ts: i64,
) -> Result<bool, ArchyError> {
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE validated_memories
                 SET retired = 1,
                     meta = json_set(meta, '$.retired_reason', ?2, '$.retired_ts', ?3)
                 WHERE id = ?1 AND retired = 0",
                params![id, reason, ts],
            )?;
            if changed > 0 {
                return Ok(true);
            }
            let exists = conn
                .query_row(
                    "SELECT 1 FROM validated_memories WHERE id = ?1",
                    params![id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok(exists)
        })
        .await
        .map_err(map_tr_err)
}

/// Retire every active memory promoted before `cutoff`. Returns the count.
pub async fn retire_older_than(
    db: &Database,
    cutoff: i64,
    reason: &str,
    ts: i64,
) -> Result<usize, ArchyError> {
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE validated_memories
                 SET retired = 1,
                     meta = json_set(meta, '$.retired_reason', ?2, '$.retired_ts', ?3)
                 WHERE ts < ?1 AND retired = 0",
                params![cutoff, reason, ts],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// `(active, retired)` row counts.
pub async fn memory_counts(db: &Database) -> Result<(u64, u64), ArchyError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(retired = 0), 0), COALESCE(SUM(retired = 1), 0)
                 FROM validated_memories",
                [],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
            )
        })
        .await
        .map_err(map_tr_err)
}
