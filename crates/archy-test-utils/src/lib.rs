// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Archy integration tests.
//!
//! Provides a stub compute backend and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without an external worker.
//!
//! # Components
//!
//! - [`StubCompute`] - In-process backend with call recording and scripted failures
//! - [`TestHarness`] - Temp store, scoring engine and embedding cache wired together

pub mod harness;
pub mod stub_compute;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use stub_compute::StubCompute;
