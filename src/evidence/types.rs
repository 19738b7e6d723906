// Core types for evidence capture

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::backend::CaptureBackend;

/// MIME type attached to an evidence payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "text/plain")]
    TextPlain,
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "application/octet-stream")]
    OctetStream,
}

impl ContentType {
    /// Pick a content type from a file extension.
    ///
    /// Anything that is neither JSON nor PNG is treated as a text log, which is
    /// what the collector writes for `Text` content.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => ContentType::Json,
            Some("png") => ContentType::Png,
            _ => ContentType::TextPlain,
        }
    }

    /// File extension used when the collector materializes this kind of content
    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::TextPlain => "txt",
            ContentType::Json => "json",
            ContentType::Png => "png",
            ContentType::OctetStream => "bin",
        }
    }
}

/// A captured artifact, inlined as base64 so it can travel inside a result file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// Base64-encoded payload
    pub data: String,

    /// File name shown by the test-management service
    pub filename: String,

    pub content_type: ContentType,
}

impl Evidence {
    /// Build evidence from raw bytes
    pub fn from_bytes(filename: impl Into<String>, bytes: &[u8], content_type: ContentType) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            filename: filename.into(),
            content_type,
        }
    }

    /// Read a file from disk and inline it
    pub fn from_file(path: &Path, content_type: ContentType) -> EvidenceResult<Self> {
        let bytes = fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self::from_bytes(filename, &bytes, content_type))
    }

    /// Decode the payload back into bytes
    pub fn decode(&self) -> EvidenceResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| EvidenceError::Capture(format!("Invalid base64 payload: {}", e)))
    }
}

/// Content handed to the evidence collector.
///
/// The variant is chosen by the caller; the collector never guesses.
pub enum EvidenceContent<'a> {
    /// Plain text log, written as `.txt`
    Text(String),

    /// Key/value data, written as pretty-printed `.json`
    Structured(serde_json::Value),

    /// Something that can take a screenshot, written as `.png`
    Image(&'a mut dyn CaptureBackend),

    /// An operation to run first; the page is screenshotted afterwards if one is available
    Deferred(Box<dyn FnOnce() -> anyhow::Result<()> + 'a>),
}

impl<'a> EvidenceContent<'a> {
    pub fn text(text: impl Into<String>) -> Self {
        EvidenceContent::Text(text.into())
    }

    /// Serialize any value into the structured variant
    pub fn structured<T: Serialize>(value: &T) -> EvidenceResult<Self> {
        Ok(EvidenceContent::Structured(serde_json::to_value(value)?))
    }

    pub fn deferred<F>(op: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + 'a,
    {
        EvidenceContent::Deferred(Box::new(op))
    }

    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            EvidenceContent::Text(_) => "text",
            EvidenceContent::Structured(_) => "json",
            EvidenceContent::Image(_) => "screenshot",
            EvidenceContent::Deferred(_) => "deferred",
        }
    }
}

impl std::fmt::Debug for EvidenceContent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceContent::Text(text) => f.debug_tuple("Text").field(text).finish(),
            EvidenceContent::Structured(value) => f.debug_tuple("Structured").field(value).finish(),
            EvidenceContent::Image(backend) => f.debug_tuple("Image").field(&backend.source_type()).finish(),
            EvidenceContent::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Result type for evidence operations
pub type EvidenceResult<T> = Result<T, EvidenceError>;

/// Error types for evidence operations
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// Error during screenshot capture or encoding
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<image::ImageError> for EvidenceError {
    fn from(err: image::ImageError) -> Self {
        EvidenceError::Capture(err.to_string())
    }
}
