// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stub compute backend for deterministic testing.
//!
//! `StubCompute` answers every task with the in-process implementation,
//! records each embed request, and can be scripted to fail.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use archy_core::types::{FragmentValidation, RankedIndex};
use archy_core::{AdapterType, ArchyError, ComputeBackend, HealthStatus, PluginAdapter};
use archy_embed::LocalCompute;

/// A compute backend that counts calls and fails on demand.
///
/// Scripted failures are consumed FIFO by the next calls of any task. With
/// `set_unavailable(true)` every call fails until it is switched back.
pub struct StubCompute {
    inner: LocalCompute,
    embed_requests: Arc<Mutex<Vec<Vec<String>>>>,
    scripted_failures: Arc<Mutex<VecDeque<String>>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl StubCompute {
    pub fn new() -> Self {
        Self {
            inner: LocalCompute::new(),
            embed_requests: Arc::new(Mutex::new(Vec::new())),
            scripted_failures: Arc::new(Mutex::new(VecDeque::new())),
            unavailable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// A backend that fails every call.
    pub fn unavailable() -> Self {
        let stub = Self::new();
        stub.set_unavailable(true);
        stub
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next call fail with `message`.
    pub async fn fail_next(&self, message: impl Into<String>) {
        self.scripted_failures.lock().await.push_back(message.into());
    }

    /// Every batch of texts passed to `embed`, in call order.
    pub async fn embed_requests(&self) -> Vec<Vec<String>> {
        self.embed_requests.lock().await.clone()
    }

    /// Total texts requested across all `embed` calls.
    pub async fn embedded_text_count(&self) -> usize {
        self.embed_requests.lock().await.iter().map(Vec::len).sum()
    }

    /// Calls of any task, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn check(&self) -> Result<(), ArchyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.scripted_failures.lock().await.pop_front() {
            return Err(ArchyError::worker(message));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ArchyError::worker("stub compute unavailable"));
        }
        Ok(())
    }
}

impl Default for StubCompute {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for StubCompute {
    fn name(&self) -> &str {
        "stub-compute"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Compute
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("stub compute unavailable".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }
}

#[async_trait]
impl ComputeBackend for StubCompute {
    async fn embed(&self, texts: &[String], dim: usize) -> Result<Vec<Vec<f32>>, ArchyError> {
        self.embed_requests.lock().await.push(texts.to_vec());
        self.check().await?;
        self.inner.embed(texts, dim).await
    }

    async fn rank(
        &self,
        query: &[f32],
        candidates: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<RankedIndex>, ArchyError> {
        self.check().await?;
        self.inner.rank(query, candidates, top_k).await
    }

    async fn validate(&self, text: &str) -> Result<FragmentValidation, ArchyError> {
        self.check().await?;
        self.inner.validate(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_embed_requests() {
        let stub = StubCompute::new();
        stub.embed(&["a".into(), "b".into()], 4).await.unwrap();
        stub.embed(&["c".into()], 4).await.unwrap();

        assert_eq!(stub.embed_requests().await.len(), 2);
        assert_eq!(stub.embedded_text_count().await, 3);
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let stub = StubCompute::new();
        stub.fail_next("boom").await;

        assert!(stub.validate("some fragment text").await.is_err());
        assert!(stub.validate("some fragment text").await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_stub_fails_every_call() {
        let stub = StubCompute::unavailable();
        assert!(stub.embed(&["a".into()], 4).await.is_err());
        assert!(stub.rank(&[1.0], &[vec![1.0]], 1).await.is_err());
        assert!(matches!(
            stub.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));

        stub.set_unavailable(false);
        assert!(stub.embed(&["a".into()], 4).await.is_ok());
    }
}
