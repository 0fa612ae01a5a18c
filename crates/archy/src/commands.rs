// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store, scoring and cache subcommands.
//!
//! Each command returns a JSON value; `main` prints it.

use std::sync::Arc;
use std::time::Duration;

use archy_core::{ArchyError, FragmentMetadata};
use serde_json::{Map, Value, json};

use crate::app::App;

const SECS_PER_DAY: u64 = 86_400;

pub async fn stage(
    app: &App,
    role: &str,
    content: &str,
    intent_keywords: Vec<String>,
) -> Result<Value, ArchyError> {
    let metadata = FragmentMetadata::with_intent_keywords(intent_keywords);
    let id = app.store.stage_experience(role, content, &metadata).await?;
    Ok(json!({ "staging_id": id }))
}

pub async fn staged(app: &App, all: bool, limit: Option<usize>) -> Result<Value, ArchyError> {
    let limit = limit.unwrap_or(app.config.memory.list_limit);
    let rows = app.store.list_staged(limit, !all).await?;
    to_json(&rows)
}

pub async fn memories(app: &App, all: bool, limit: Option<usize>) -> Result<Value, ArchyError> {
    let limit = limit.unwrap_or(app.config.memory.list_limit);
    let rows = app.store.list_memories(all, limit).await?;
    to_json(&rows)
}

/// Validate one fragment (`force` approves it as admin) or a batch.
pub async fn promote(
    app: &App,
    id: Option<i64>,
    batch: bool,
    limit: Option<usize>,
    force: bool,
) -> Result<Value, ArchyError> {
    if batch {
        let limit = limit.unwrap_or(app.config.memory.batch_limit);
        let summary = app.store.batch_validate_and_promote(limit).await?;
        return to_json(&summary);
    }
    let Some(id) = id else {
        return Err(ArchyError::Config(
            "promote needs a staging id or --batch".to_string(),
        ));
    };
    let validation = app.store.validate_and_promote(id, force).await?;
    to_json(&validation)
}

pub async fn retire(app: &App, id: i64, reason: &str) -> Result<Value, ArchyError> {
    let retired = app.store.retire_memory(id, reason).await?;
    Ok(json!({ "memory_id": id, "retired": retired }))
}

pub async fn decay(app: &App, max_age_days: Option<u64>) -> Result<Value, ArchyError> {
    let secs = max_age_days
        .map(|days| days.saturating_mul(SECS_PER_DAY))
        .unwrap_or(app.config.memory.decay_max_age_secs);
    let retired = app.store.decay_old_memories(Duration::from_secs(secs)).await?;
    Ok(json!({ "retired": retired, "max_age_secs": secs }))
}

/// Parse `key=value`. The value is read as JSON when it parses, otherwise
/// as a plain string, so `safety_bias=1.5` is a number and
/// `forbidden_patterns=["x"]` a list.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), ArchyError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(ArchyError::Config(format!(
            "expected key=value, got `{raw}`"
        )));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(ArchyError::Config(format!("missing key in `{raw}`")));
    }
    let value = value.trim();
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

/// Apply `--set` assignments, then show the bias configuration. The seen set
/// is summarized by its size.
pub async fn bias(app: &App, assignments: &[String]) -> Result<Value, ArchyError> {
    if !assignments.is_empty() {
        let changes = assignments
            .iter()
            .map(|a| parse_assignment(a))
            .collect::<Result<Map<String, Value>, _>>()?;
        let scoring = Arc::clone(app.scoring());
        tokio::task::spawn_blocking(move || scoring.update(changes))
            .await
            .map_err(|e| ArchyError::Internal(format!("bias update task failed: {e}")))??;
    }

    let snapshot = app.scoring().snapshot();
    let seen = snapshot.seen_hashes.len();
    let mut value = to_json(&snapshot)?;
    if let Some(fields) = value.as_object_mut() {
        fields.insert("seen_hashes".to_string(), json!(seen));
    }
    Ok(value)
}

/// Rank active memories against `query`.
pub async fn search(app: &App, query: &str, top_k: Option<usize>) -> Result<Value, ArchyError> {
    let top_k = top_k.unwrap_or(app.config.embedding.top_k);
    let contents = app.store.active_contents(app.config.memory.list_limit).await?;
    let results = app
        .cache
        .find_similar(query, &contents, top_k, app.config.embedding.dimension)
        .await;
    to_json(&results)
}

pub async fn cache_stats(app: &App) -> Result<Value, ArchyError> {
    to_json(&app.cache.get_cache_stats().await)
}

pub async fn cache_clear(app: &App) -> Result<Value, ArchyError> {
    app.cache.clear_cache().await?;
    cache_stats(app).await
}

/// Score `text` with the scoring engine and the backend's secondary check.
/// Nothing is staged.
pub async fn validate(app: &App, text: &str) -> Result<Value, ArchyError> {
    let score = app.scoring().score_fragment(text, &FragmentMetadata::default());
    let validation_score = app.cache.validate_fragment(text).await;
    Ok(json!({
        "score": score,
        "validation_score": validation_score,
    }))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ArchyError> {
    serde_json::to_value(value)
        .map_err(|e| ArchyError::Internal(format!("failed to encode output: {e}")))
}
