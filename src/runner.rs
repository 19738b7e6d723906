//! Types for test run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::step::StepRecord;

/// Final status of a test as reported upstream. There is no third state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Passed,
    Failed,
}

/// What the test runner says about a finished test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    Passed,
    Failed,
    TimedOut,
    Interrupted,
    Skipped,
}

impl RunnerStatus {
    /// Only an explicit pass counts as non-failing
    pub fn is_failing(&self) -> bool {
        !matches!(self, RunnerStatus::Passed)
    }
}

/// Runner verdict plus the error that caused a failure, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub status: RunnerStatus,
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn passed() -> Self {
        Self {
            status: RunnerStatus::Passed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunnerStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn with_status(status: RunnerStatus, error: Option<String>) -> Self {
        Self { status, error }
    }
}

/// The part of a result that is sent to the test-management service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEntry {
    pub test_key: String,

    #[serde(with = "iso8601")]
    pub start: DateTime<Utc>,

    #[serde(with = "iso8601")]
    pub finish: DateTime<Utc>,

    pub status: TestStatus,

    pub comment: String,

    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

/// One finished test, written once to the result store and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    #[serde(flatten)]
    pub entry: TestEntry,

    /// Base name of the spec file that produced this test; used to group uploads
    #[serde(default)]
    pub spec_file: String,

    /// Explicit execution requested through a test annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_execution_key: Option<String>,
}

impl TestResult {
    pub fn test_key(&self) -> &str {
        &self.entry.test_key
    }

    pub fn status(&self) -> TestStatus {
        self.entry.status
    }
}

/// Render a duration the way result comments show it, e.g. `1m 5s`
pub fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!("{}m {}s", total / 60, total % 60)
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix
mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
