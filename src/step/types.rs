use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::evidence::{Evidence, ScreenshotOptions};

/// Status of a single step as reported to the test-management service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Not executed because an earlier step failed
    Todo,
}

/// Outcome of one step, immutable once appended to a test's step list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub status: StepStatus,

    /// Step name, decorated with the failure message or a skip marker
    pub actual_result: String,

    #[serde(default)]
    pub evidences: Vec<Evidence>,
}

impl StepRecord {
    pub fn passed(name: &str) -> Self {
        Self {
            status: StepStatus::Passed,
            actual_result: name.to_string(),
            evidences: Vec::new(),
        }
    }

    pub fn skipped(name: &str) -> Self {
        Self {
            status: StepStatus::Todo,
            actual_result: format!("{} (Skipped)", name),
            evidences: Vec::new(),
        }
    }

    /// Flip a pending record to FAILED, keeping the step name in front of the message
    pub fn fail(&mut self, name: &str, message: &str) {
        self.status = StepStatus::Failed;
        self.actual_result = format!("{} - FAILED: {}", name, message);
    }
}

/// Per-call step options
#[derive(Debug, Clone)]
pub struct StepOptions {
    /// Take a screenshot after a passing step
    pub capture_screenshot: bool,

    /// Pre-existing files attached as `application/octet-stream`
    pub additional_evidences: Vec<PathBuf>,

    /// Forwarded to the success screenshot; failures always capture the full page
    pub screenshot: ScreenshotOptions,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            capture_screenshot: true,
            additional_evidences: Vec::new(),
            screenshot: ScreenshotOptions::default(),
        }
    }
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_screenshot(mut self, capture: bool) -> Self {
        self.capture_screenshot = capture;
        self
    }

    pub fn evidence(mut self, path: impl Into<PathBuf>) -> Self {
        self.additional_evidences.push(path.into());
        self
    }

    pub fn screenshot(mut self, options: ScreenshotOptions) -> Self {
        self.screenshot = options;
        self
    }
}

/// Errors raised by the step machinery itself (body errors pass through untouched)
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{inner}' started while step '{outer}' is still running")]
    Reentrant { outer: String, inner: String },
}
