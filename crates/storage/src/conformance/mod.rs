//! Conformance test suite for `VersionStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `VersionStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Insert**: record creation, defaults, duplicate-key detection, key validation
//! - **Transitions**: Pending -> terminal, idempotent replay, conflicts, not-found
//! - **Listing**: per-prompt listing and status filtering
//! - **Concurrency**: racing decisions where exactly one write lands
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use promptgate_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         SqliteVersionStore::open_in_memory().unwrap()
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod insert;
mod list;
mod transition;

use std::fmt;
use std::future::Future;

use crate::record::VersionRecord;
use crate::{StorageError, VersionStore};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "transition").
    pub category: String,
    /// Test name (e.g. "put_then_get_returns_pending").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: VersionStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(transition::run_transition_tests(&factory).await);
    results.extend(list::run_list_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_record(prompt_id: &str, version: &str) -> VersionRecord {
    VersionRecord::pending(prompt_id, version, format!("prompt {prompt_id} v{version}"))
}

/// Insert a Pending record, mapping errors to strings.
async fn seed<S: VersionStore>(s: &S, prompt_id: &str, version: &str) -> Result<(), String> {
    s.put(make_record(prompt_id, version))
        .await
        .map_err(|e| format!("seed {prompt_id}/{version}: {e}"))
}

fn describe(result: &Result<impl fmt::Debug, StorageError>) -> String {
    format!("{:?}", result)
}
