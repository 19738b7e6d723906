//! Private per-test execution state.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{StepRecord, StepStatus};
use crate::evidence::CaptureBackend;

/// Annotation type that overrides the upload target of a single test
pub const EXECUTION_ANNOTATION: &str = "xray_execution";

/// A free-form annotation attached to a test by its author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub kind: String,
    pub description: String,
}

/// Evidence accumulated while a step body runs
#[derive(Debug, Default)]
pub(crate) struct ActiveStep {
    pub(crate) name: String,
    pub(crate) evidences: Vec<PathBuf>,
}

/// Mutable state owned by exactly one running test.
///
/// Nothing in here is shared with other tests, so none of it is synchronized.
pub struct TestContext {
    title: String,
    spec_file: String,
    output_dir: PathBuf,
    pub(crate) steps: Vec<StepRecord>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) active_step: Option<ActiveStep>,
    pub(crate) orphan_evidences: Vec<PathBuf>,
    annotations: Vec<Annotation>,
    page: Option<Box<dyn CaptureBackend>>,
}

impl TestContext {
    pub fn new(title: impl Into<String>, spec_file: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            spec_file: spec_file.into(),
            output_dir: output_dir.into(),
            steps: Vec::new(),
            started_at: Utc::now(),
            active_step: None,
            orphan_evidences: Vec::new(),
            annotations: Vec::new(),
            page: None,
        }
    }

    /// Attach the page used for automatic screenshots
    pub fn with_page(mut self, page: Box<dyn CaptureBackend>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn spec_file(&self) -> &str {
        &self.spec_file
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Make sure the output directory exists and return it
    pub(crate) fn ensure_output_dir(&self) -> std::io::Result<&Path> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(&self.output_dir)
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True once any step in this test has failed
    pub fn has_failed_step(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// Name of the step currently running, if any
    pub fn active_step(&self) -> Option<&str> {
        self.active_step.as_ref().map(|s| s.name.as_str())
    }

    /// Evidence written while no step was running
    pub fn orphan_evidences(&self) -> &[PathBuf] {
        &self.orphan_evidences
    }

    pub fn annotate(&mut self, kind: impl Into<String>, description: impl Into<String>) {
        self.annotations.push(Annotation {
            kind: kind.into(),
            description: description.into(),
        });
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Explicit upload target requested through an `xray_execution` annotation
    pub fn target_execution_key(&self) -> Option<String> {
        self.annotations
            .iter()
            .find(|a| a.kind == EXECUTION_ANNOTATION)
            .map(|a| a.description.clone())
    }

    pub fn has_page(&self) -> bool {
        self.page.is_some()
    }

    /// Temporarily take the page out so it can be borrowed alongside `self`.
    /// Callers must hand it back with [`TestContext::restore_page`].
    pub(crate) fn take_page(&mut self) -> Option<Box<dyn CaptureBackend>> {
        self.page.take()
    }

    pub(crate) fn restore_page(&mut self, page: Option<Box<dyn CaptureBackend>>) {
        if page.is_some() {
            self.page = page;
        }
    }

    /// Route a freshly written evidence file to the running step, or keep it at test level
    pub(crate) fn register_evidence(&mut self, path: PathBuf) {
        match self.active_step.as_mut() {
            Some(step) => step.evidences.push(path),
            None => self.orphan_evidences.push(path),
        }
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("title", &self.title)
            .field("spec_file", &self.spec_file)
            .field("output_dir", &self.output_dir)
            .field("steps", &self.steps.len())
            .field("active_step", &self.active_step())
            .field("has_page", &self.has_page())
            .finish()
    }
}
