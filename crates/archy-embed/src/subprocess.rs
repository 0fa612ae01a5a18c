// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Out-of-process compute backend.
//!
//! Each request spawns the worker program, writes one JSON request to its
//! stdin and reads one JSON response from its stdout. The exchange is bounded
//! by a timeout; the child is killed if the timeout fires.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use archy_core::types::{FragmentValidation, RankedIndex};
use archy_core::{AdapterType, ArchyError, ComputeBackend, HealthStatus, PluginAdapter};

use crate::protocol::{WorkerRequest, WorkerResponse, handle_document};

/// Default bound on one worker exchange.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Compute backend that delegates every task to an external worker process.
#[derive(Debug, Clone)]
pub struct SubprocessWorker {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessWorker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_WORKER_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Run one request/response exchange.
    pub async fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, ArchyError> {
        let input = serde_json::to_vec(request)
            .map_err(|e| ArchyError::Internal(format!("failed to encode worker request: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ArchyError::Worker {
                message: format!("failed to start worker {}: {e}", self.program.display()),
                source: Some(Box::new(e)),
            })?;

        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(&input).await {
                    // The worker may exit before draining stdin; its exit
                    // status and output decide the outcome.
                    debug!(error = %e, "worker closed stdin early");
                }
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ArchyError::Worker {
                    message: format!("worker I/O failed: {e}"),
                    source: Some(Box::new(e)),
                });
            }
            Err(_) => {
                warn!(
                    task = %request.task,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "worker timed out"
                );
                return Err(ArchyError::Timeout {
                    duration: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            return Err(ArchyError::worker(format!(
                "worker exited with code {code}: {}",
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ArchyError::Worker {
            message: format!("malformed worker output: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

#[async_trait]
impl PluginAdapter for SubprocessWorker {
    fn name(&self) -> &str {
        "subprocess"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Compute
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchyError> {
        match self.call(&WorkerRequest::validate_fragment("health check")).await {
            Ok(response) => match response.into_validation() {
                Ok(_) => Ok(HealthStatus::Healthy),
                Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
            },
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl ComputeBackend for SubprocessWorker {
    async fn embed(&self, texts: &[String], dim: usize) -> Result<Vec<Vec<f32>>, ArchyError> {
        self.call(&WorkerRequest::embed_texts(texts, dim))
            .await?
            .into_embeddings(texts.len(), dim)
    }

    async fn rank(
        &self,
        query: &[f32],
        candidates: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<RankedIndex>, ArchyError> {
        self.call(&WorkerRequest::cosine_rank(query, candidates, top_k))
            .await?
            .into_ranking()
    }

    async fn validate(&self, text: &str) -> Result<FragmentValidation, ArchyError> {
        self.call(&WorkerRequest::validate_fragment(text))
            .await?
            .into_validation()
    }
}

/// Worker side of the exchange: read one request document from `reader`,
/// serve it with `backend` and write the response to `writer`.
pub async fn serve_stdio<R, W>(
    backend: &dyn ComputeBackend,
    mut reader: R,
    mut writer: W,
) -> Result<(), ArchyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut input = String::new();
    let response = match reader.read_to_string(&mut input).await {
        Ok(_) => handle_document(backend, &input).await,
        Err(e) => WorkerResponse::failure(format!("Invalid JSON: {e}")),
    };

    let mut out = serde_json::to_vec(&response)
        .map_err(|e| ArchyError::Internal(format!("failed to encode worker response: {e}")))?;
    out.push(b'\n');
    writer.write_all(&out).await.map_err(ArchyError::storage)?;
    writer.flush().await.map_err(ArchyError::storage)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCompute;

    #[cfg(unix)]
    fn script(body: &str) -> SubprocessWorker {
        SubprocessWorker::new("sh").with_args(["-c", body])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn parses_worker_response() {
        let worker = script(r#"cat >/dev/null; echo '{"status":"ok","embeddings":[[1.0,0.0],[0.0,1.0]]}'"#);
        let embeddings = worker
            .embed(&["a".to_string(), "b".to_string()], 2)
            .await
            .unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn worker_sees_request_on_stdin() {
        // Echo the request's task name back as an error so the test can see it.
        let worker = script(
            r#"task=$(cat | sed 's/.*"task":"\([a-z_]*\)".*/\1/'); printf '{"status":"error","error":"%s"}' "$task""#,
        );
        let err = worker.validate("hello there").await.unwrap_err();
        assert!(matches!(err, ArchyError::Worker { message, .. } if message == "validate_fragment"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_includes_stderr() {
        let worker = script("cat >/dev/null; echo 'model exploded' >&2; exit 3");
        let err = worker.validate("hello there").await.unwrap_err();
        let ArchyError::Worker { message, .. } = err else {
            panic!("expected worker error, got {err:?}");
        };
        assert!(message.contains("code 3"), "{message}");
        assert!(message.contains("model exploded"), "{message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn malformed_output_is_worker_error() {
        let worker = script("cat >/dev/null; echo 'not json'");
        let err = worker.validate("hello there").await.unwrap_err();
        assert!(matches!(err, ArchyError::Worker { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_worker_times_out() {
        let worker = script("sleep 5").with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = worker.validate("hello there").await.unwrap_err();
        assert!(matches!(err, ArchyError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_worker_error() {
        let worker = SubprocessWorker::new("/nonexistent/archy-worker-binary");
        let err = worker.embed(&["x".to_string()], 4).await.unwrap_err();
        assert!(matches!(err, ArchyError::Worker { .. }));
        assert!(matches!(
            worker.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn serve_stdio_writes_one_response_line() {
        let request = br#"{"task":"embed_texts","payload":{"texts":["a"],"dim":4}}"#;
        let mut out = Vec::new();
        serve_stdio(&LocalCompute::new(), &request[..], &mut out)
            .await
            .unwrap();

        assert_eq!(out.last(), Some(&b'\n'));
        let response: WorkerResponse = serde_json::from_slice(&out).unwrap();
        assert_eq!(response.into_embeddings(1, 4).unwrap()[0].len(), 4);
    }
}
