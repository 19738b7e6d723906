use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::TestEntry;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Xray credentials are not configured (set XRAY_CLIENT_ID and XRAY_CLIENT_SECRET)")]
    MissingCredentials,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Xray returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Metadata for a newly created test execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub summary: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_plan_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Body of one import call.
///
/// Exactly one of `test_execution_key` (append) and `info` (create) is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub tests: Vec<TestEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_execution_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ExecutionInfo>,
}

impl ImportRequest {
    pub fn append(key: impl Into<String>, tests: Vec<TestEntry>) -> Self {
        Self {
            tests,
            test_execution_key: Some(key.into()),
            info: None,
        }
    }

    pub fn create(info: ExecutionInfo, tests: Vec<TestEntry>) -> Self {
        Self {
            tests,
            test_execution_key: None,
            info: Some(info),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResponse {
    pub key: String,

    #[serde(default)]
    pub id: Option<String>,
}
