// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON request/response contract between the cache and a compute worker.
//!
//! One request document in, one response document out:
//!
//! ```json
//! {"task": "embed_texts", "payload": {"texts": ["a", "b"], "dim": 128}}
//! {"status": "ok", "embeddings": [[...], [...]]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{AsRefStr, Display, EnumString};

use archy_core::types::{FragmentValidation, RankedIndex};
use archy_core::{ArchyError, ComputeBackend};

/// Embedding dimension used when a request omits `dim`.
pub const DEFAULT_DIM: usize = 128;

/// Result count used when a request omits `top_k`.
pub const DEFAULT_TOP_K: usize = 5;

/// Tasks a worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Task {
    EmbedTexts,
    CosineRank,
    ValidateFragment,
}

/// A single worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task: String,
    #[serde(default)]
    pub payload: Value,
}

impl WorkerRequest {
    pub fn embed_texts(texts: &[String], dim: usize) -> Self {
        Self::new(Task::EmbedTexts, json!({ "texts": texts, "dim": dim }))
    }

    pub fn cosine_rank(query: &[f32], candidates: &[Vec<f32>], top_k: usize) -> Self {
        Self::new(
            Task::CosineRank,
            json!({ "query": query, "candidates": candidates, "top_k": top_k }),
        )
    }

    pub fn validate_fragment(text: &str) -> Self {
        Self::new(Task::ValidateFragment, json!({ "text": text }))
    }

    fn new(task: Task, payload: Value) -> Self {
        Self {
            task: task.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// A worker's reply. Exactly one of `result`, `embeddings` or `error` is
/// expected to be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `cosine_rank` result body: parallel arrays, best match first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub indices: Vec<usize>,
    pub scores: Vec<f32>,
}

impl WorkerResponse {
    pub fn with_result(result: Value) -> Self {
        Self {
            status: ResponseStatus::Ok,
            result: Some(result),
            embeddings: None,
            error: None,
        }
    }

    pub fn with_embeddings(embeddings: Vec<Vec<f32>>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            result: None,
            embeddings: Some(embeddings),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            embeddings: None,
            error: Some(message.into()),
        }
    }

    fn ensure_ok(self) -> Result<Self, ArchyError> {
        match self.status {
            ResponseStatus::Ok => Ok(self),
            ResponseStatus::Error => Err(ArchyError::worker(
                self.error
                    .unwrap_or_else(|| "worker reported an error".to_string()),
            )),
        }
    }

    fn take_result<T: serde::de::DeserializeOwned>(self, task: Task) -> Result<T, ArchyError> {
        let result = self
            .ensure_ok()?
            .result
            .ok_or_else(|| ArchyError::worker(format!("{task} response has no result")))?;
        serde_json::from_value(result).map_err(|e| ArchyError::Worker {
            message: format!("malformed {task} result"),
            source: Some(Box::new(e)),
        })
    }

    /// Extract `expected` embeddings of length `dim`.
    pub fn into_embeddings(self, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>, ArchyError> {
        let embeddings = self
            .ensure_ok()?
            .embeddings
            .ok_or_else(|| ArchyError::worker("embed_texts response has no embeddings"))?;
        if embeddings.len() != expected {
            return Err(ArchyError::worker(format!(
                "expected {expected} embeddings, got {}",
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
            return Err(ArchyError::worker(format!(
                "expected embeddings of length {dim}, got {}",
                bad.len()
            )));
        }
        Ok(embeddings)
    }

    pub fn into_ranking(self) -> Result<Vec<RankedIndex>, ArchyError> {
        let ranking: Ranking = self.take_result(Task::CosineRank)?;
        Ok(ranking
            .indices
            .into_iter()
            .zip(ranking.scores)
            .map(|(index, score)| RankedIndex { index, score })
            .collect())
    }

    pub fn into_validation(self) -> Result<FragmentValidation, ArchyError> {
        self.take_result(Task::ValidateFragment)
    }
}

#[derive(Deserialize)]
struct EmbedPayload {
    texts: Vec<String>,
    #[serde(default = "default_dim")]
    dim: usize,
}

#[derive(Deserialize)]
struct RankPayload {
    query: Vec<f32>,
    candidates: Vec<Vec<f32>>,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

#[derive(Deserialize)]
struct ValidatePayload {
    text: String,
}

fn default_dim() -> usize {
    DEFAULT_DIM
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn parse_payload<T: serde::de::DeserializeOwned>(task: Task, payload: Value) -> Result<T, WorkerResponse> {
    serde_json::from_value(payload)
        .map_err(|e| WorkerResponse::failure(format!("invalid {task} payload: {e}")))
}

/// Serve one request with `backend`. Never fails: every problem becomes an
/// error response.
pub async fn handle_request(backend: &dyn ComputeBackend, request: WorkerRequest) -> WorkerResponse {
    let Ok(task) = request.task.parse::<Task>() else {
        return WorkerResponse::failure(format!("Unknown task: {}", request.task));
    };

    let outcome = match task {
        Task::EmbedTexts => match parse_payload::<EmbedPayload>(task, request.payload) {
            Ok(p) => backend
                .embed(&p.texts, p.dim)
                .await
                .map(WorkerResponse::with_embeddings),
            Err(response) => return response,
        },
        Task::CosineRank => match parse_payload::<RankPayload>(task, request.payload) {
            Ok(p) => backend.rank(&p.query, &p.candidates, p.top_k).await.map(|ranked| {
                let (indices, scores) = ranked.into_iter().map(|r| (r.index, r.score)).unzip();
                WorkerResponse::with_result(json!(Ranking { indices, scores }))
            }),
            Err(response) => return response,
        },
        Task::ValidateFragment => match parse_payload::<ValidatePayload>(task, request.payload) {
            Ok(p) => backend
                .validate(&p.text)
                .await
                .map(|v| WorkerResponse::with_result(json!(v))),
            Err(response) => return response,
        },
    };

    outcome.unwrap_or_else(|e| WorkerResponse::failure(e.to_string()))
}

/// Parse a raw request document and serve it.
pub async fn handle_document(backend: &dyn ComputeBackend, input: &str) -> WorkerResponse {
    match serde_json::from_str::<WorkerRequest>(input) {
        Ok(request) => handle_request(backend, request).await,
        Err(e) => WorkerResponse::failure(format!("Invalid JSON: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCompute;

    #[test]
    fn request_builders_use_wire_task_names() {
        let req = WorkerRequest::embed_texts(&["a".to_string()], 8);
        assert_eq!(req.task, "embed_texts");
        assert_eq!(req.payload["dim"], 8);
        assert_eq!(WorkerRequest::validate_fragment("x").task, "validate_fragment");
        assert_eq!(WorkerRequest::cosine_rank(&[1.0], &[], 3).payload["top_k"], 3);
    }

    #[test]
    fn error_response_omits_empty_fields() {
        let text = serde_json::to_string(&WorkerResponse::failure("boom")).unwrap();
        assert_eq!(text, r#"{"status":"error","error":"boom"}"#);
    }

    #[test]
    fn error_status_becomes_worker_error() {
        let err = WorkerResponse::failure("boom").into_embeddings(1, 4).unwrap_err();
        assert!(matches!(err, ArchyError::Worker { message, .. } if message == "boom"));
    }

    #[test]
    fn short_embedding_batch_is_rejected() {
        let response = WorkerResponse::with_embeddings(vec![vec![0.0; 4]]);
        assert!(response.clone().into_embeddings(2, 4).is_err());
        assert!(response.clone().into_embeddings(1, 5).is_err());
        assert_eq!(response.into_embeddings(1, 4).unwrap().len(), 1);
    }

    #[test]
    fn ranking_result_zips_indices_and_scores() {
        let response = WorkerResponse::with_result(json!({"indices": [2, 0], "scores": [0.9, 0.1]}));
        let ranked = response.into_ranking().unwrap();
        assert_eq!(ranked, vec![
            RankedIndex { index: 2, score: 0.9 },
            RankedIndex { index: 0, score: 0.1 },
        ]);
    }

    #[test]
    fn malformed_result_is_worker_error() {
        let response = WorkerResponse::with_result(json!({"indices": "nope"}));
        assert!(matches!(response.into_ranking(), Err(ArchyError::Worker { .. })));
    }

    #[tokio::test]
    async fn handle_document_dispatches_each_task() {
        let backend = LocalCompute::new();

        let embed = handle_document(&backend, r#"{"task":"embed_texts","payload":{"texts":["hi","yo"],"dim":16}}"#).await;
        assert_eq!(embed.status, ResponseStatus::Ok);
        assert_eq!(embed.into_embeddings(2, 16).unwrap().len(), 2);

        let rank = handle_document(
            &backend,
            r#"{"task":"cosine_rank","payload":{"query":[1.0,0.0],"candidates":[[0.0,1.0],[1.0,0.0]],"top_k":1}}"#,
        )
        .await;
        let ranked = rank.into_ranking().unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].index, 1);

        let validate = handle_document(
            &backend,
            r#"{"task":"validate_fragment","payload":{"text":"a perfectly ordinary sentence"}}"#,
        )
        .await;
        assert!(validate.into_validation().unwrap().validation_score > 0.0);
    }

    #[tokio::test]
    async fn handle_document_reports_bad_input() {
        let backend = LocalCompute::new();

        let unknown = handle_document(&backend, r#"{"task":"dance","payload":{}}"#).await;
        assert_eq!(unknown.error.as_deref(), Some("Unknown task: dance"));

        let missing = handle_document(&backend, r#"{"task":"embed_texts","payload":{}}"#).await;
        assert_eq!(missing.status, ResponseStatus::Error);
        assert!(missing.error.unwrap().contains("texts"));

        let garbage = handle_document(&backend, "not json").await;
        assert!(garbage.error.unwrap().starts_with("Invalid JSON"));
    }
}
