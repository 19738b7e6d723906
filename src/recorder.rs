//! Per-test lifecycle: start bookkeeping and result finalization.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::evidence::strip_ansi;
use crate::runner::{TestEntry, TestOutcome, TestResult, TestStatus, format_duration};
use crate::step::TestContext;
use crate::store::ResultStore;

/// `PROJ-123:` at the very start of a test title
static TEST_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+-\d+):").expect("test key pattern is valid"));

/// Pull the issue key out of a title such as `"PXX-10: login works"`
pub fn extract_test_key(title: &str) -> Option<&str> {
    TEST_KEY_PATTERN
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub struct ResultRecorder {
    store: Arc<dyn ResultStore>,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Reset the step list and start the clock
    pub fn on_test_start(&self, ctx: &mut TestContext) {
        ctx.steps.clear();
        ctx.started_at = Utc::now();
        debug!(title = ctx.title(), "test started");
    }

    /// Build and persist the result for a finished test.
    ///
    /// Titles without a key produce nothing. A store failure is logged; the
    /// result is still returned so the caller can report it.
    pub fn on_test_end(&self, ctx: &TestContext, outcome: &TestOutcome) -> Option<TestResult> {
        let Some(test_key) = extract_test_key(ctx.title()) else {
            debug!(title = ctx.title(), "no test key in title, not recording");
            return None;
        };

        let finish = Utc::now();
        let duration = format_duration(finish - ctx.started_at());
        let status = if outcome.status.is_failing() {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };
        let comment = match (&outcome.error, status) {
            (Some(message), _) => format!("{}\n\nDuration: {}", strip_ansi(message), duration),
            (None, TestStatus::Passed) => format!("Test completed successfully\nDuration: {}", duration),
            (None, TestStatus::Failed) => format!("Test finished as {:?}\n\nDuration: {}", outcome.status, duration),
        };

        let result = TestResult {
            entry: TestEntry {
                test_key: test_key.to_string(),
                start: ctx.started_at(),
                finish,
                status,
                comment,
                steps: ctx.steps().to_vec(),
            },
            spec_file: ctx.spec_file().to_string(),
            target_execution_key: ctx.target_execution_key(),
        };

        info!(test_key, status = ?status, duration = %duration, "test result collected");
        if let Err(e) = self.store.persist(&result) {
            error!(test_key, error = %e, "failed to persist test result");
        }
        Some(result)
    }
}
