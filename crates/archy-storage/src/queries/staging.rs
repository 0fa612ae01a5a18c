// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Staging tier operations, including the atomic promotion transaction.

use rusqlite::{OptionalExtension, params};

use archy_core::ArchyError;
use archy_core::types::{
    FragmentMetadata, FragmentScore, MemoryMeta, Provenance, StagedFragment, now_ts,
};

use crate::database::{Database, flatten_call_err, map_tr_err};
use crate::queries::json_column;

const STAGED_COLUMNS: &str = "id, ts, role, content, metadata, validator_result, promoted";

/// Decision produced by a grading closure for one staged fragment.
#[derive(Debug, Clone)]
pub struct Grading {
    pub result: FragmentScore,
    pub promote: bool,
}

/// What [`grade`] did to a staged fragment.
#[derive(Debug, Clone)]
pub struct GradeRecord {
    /// The fragment as it now stands, with the new validator result.
    pub fragment: StagedFragment,
    /// Id of the validated memory created, when the fragment was promoted.
    pub memory_id: Option<i64>,
}

fn row_to_staged(row: &rusqlite::Row<'_>) -> rusqlite::Result<StagedFragment> {
    let validator_result: Option<String> = row.get(5)?;
    let validator_result = validator_result
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })
        })
        .transpose()?;
    Ok(StagedFragment {
        id: row.get(0)?,
        ts: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        metadata: json_column(row, 4)?,
        validator_result,
        promoted: row.get::<_, i64>(6)? != 0,
    })
}

/// Append a fragment to the staging tier. Returns the new row id.
pub async fn insert_staged(
    db: &Database,
    role: &str,
    content: &str,
    metadata: &FragmentMetadata,
) -> Result<i64, ArchyError> {
    let role = role.to_string();
    let content = content.to_string();
    let metadata = serde_json::to_string(metadata).map_err(ArchyError::storage)?;
    let ts = now_ts();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO staging_experiences (ts, role, content, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![ts, role, content, metadata],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a single staged fragment.
pub async fn get_staged(db: &Database, id: i64) -> Result<Option<StagedFragment>, ArchyError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {STAGED_COLUMNS} FROM staging_experiences WHERE id = ?1");
            conn.query_row(&sql, params![id], row_to_staged).optional()
        })
        .await
        .map_err(map_tr_err)
}

/// List staged fragments, most recent first.
pub async fn list_staged(
    db: &Database,
    limit: usize,
    unpromoted_only: bool,
) -> Result<Vec<StagedFragment>, ArchyError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let filter = if unpromoted_only { "WHERE promoted = 0" } else { "" };
            let sql = format!(
                "SELECT {STAGED_COLUMNS} FROM staging_experiences {filter}
                 ORDER BY ts DESC, id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit], row_to_staged)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Ids of up to `limit` unpromoted fragments, most recent first.
pub async fn unpromoted_ids(db: &Database, limit: usize) -> Result<Vec<i64>, ArchyError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM staging_experiences WHERE promoted = 0
                 ORDER BY ts DESC, id DESC LIMIT ?1",
            )?;
            let ids = stmt
                .query_map(params![limit], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// `(unpromoted, promoted)` row counts.
pub async fn staging_counts(db: &Database) -> Result<(u64, u64), ArchyError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(promoted = 0), 0), COALESCE(SUM(promoted = 1), 0)
                 FROM staging_experiences",
                [],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Grade a staged fragment and, if the grader says so, promote it.
///
/// Everything happens in one transaction on the writer thread: the row is
/// read, `grader` runs, the validator result is stored, and on promotion the
/// `promoted` flag is flipped with a check-and-set before the validated
/// memory is inserted. If the flag flip does not affect exactly one row the
/// transaction rolls back and [`ArchyError::AlreadyPromoted`] is returned.
pub async fn grade<F>(db: &Database, staging_id: i64, grader: F) -> Result<GradeRecord, ArchyError>
where
    F: FnOnce(&StagedFragment) -> Grading + Send + 'static,
{
    db.connection()
        .call(move |conn| -> Result<GradeRecord, ArchyError> {
            let tx = conn.transaction().map_err(ArchyError::storage)?;

            let sql = format!("SELECT {STAGED_COLUMNS} FROM staging_experiences WHERE id = ?1");
            let mut fragment = tx
                .query_row(&sql, params![staging_id], row_to_staged)
                .optional()
                .map_err(ArchyError::storage)?
                .ok_or(ArchyError::NotFound {
                    kind: "staged fragment",
                    id: staging_id,
                })?;
            if fragment.promoted {
                return Err(ArchyError::AlreadyPromoted { staging_id });
            }

            let Grading { result, promote } = grader(&fragment);
            let encoded = serde_json::to_string(&result).map_err(ArchyError::storage)?;
            tx.execute(
                "UPDATE staging_experiences SET validator_result = ?1 WHERE id = ?2",
                params![encoded, staging_id],
            )
            .map_err(ArchyError::storage)?;

            let memory_id = if promote {
                let flipped = tx
                    .execute(
                        "UPDATE staging_experiences SET promoted = 1 WHERE id = ?1 AND promoted = 0",
                        params![staging_id],
                    )
                    .map_err(ArchyError::storage)?;
                if flipped != 1 {
                    // Dropping the transaction rolls back the validator result too.
                    return Err(ArchyError::AlreadyPromoted { staging_id });
                }

                let ts = now_ts();
                let provenance = Provenance {
                    staging_id,
                    ts,
                    validator_score: result.score,
                };
                let meta = MemoryMeta {
                    validator: result.clone(),
                    original_meta: fragment.metadata.clone(),
                    retired_reason: None,
                    retired_ts: None,
                };
                tx.execute(
                    "INSERT INTO validated_memories (ts, staging_id, content, provenance, meta)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        ts,
                        staging_id,
                        fragment.content,
                        serde_json::to_string(&provenance).map_err(ArchyError::storage)?,
                        serde_json::to_string(&meta).map_err(ArchyError::storage)?,
                    ],
                )
                .map_err(ArchyError::storage)?;
                fragment.promoted = true;
                Some(tx.last_insert_rowid())
            } else {
                None
            };

            tx.commit().map_err(ArchyError::storage)?;
            fragment.validator_result = Some(result);
            Ok(GradeRecord {
                fragment,
                memory_id,
            })
        })
        .await
        .map_err(flatten_call_err)
}
