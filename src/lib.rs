//! Xray Harness - step-level evidence for UI tests and batched Xray uploads.
//!
//! This crate provides:
//! - A step executor that stops a test at its first failing step and marks the rest TODO
//! - Named evidence capture (text, JSON, screenshots) attached to the running step
//! - Per-test result files that survive multi-process test runs
//! - An end-of-run orchestrator that groups results by spec, uploads them in
//!   batches and always leaves a manual-import bundle behind
//!
//! # Example
//!
//! ```rust,no_run
//! use xray_harness::{TestCase, TestHarness, UploadOrchestrator, XrayClient, XrayConfig};
//! use xray_harness::upload::OrchestratorSettings;
//!
//! let harness = TestHarness::builder().build();
//! harness.run_test(TestCase::new("PXX-1: home page loads", "home.spec.js"), |t| {
//!     t.step("open", |_| Ok(()))
//! });
//!
//! let mut client = XrayClient::new(XrayConfig::default()).unwrap();
//! let report = UploadOrchestrator::new(OrchestratorSettings::default())
//!     .run(harness.store().as_ref(), Some(&mut client));
//! println!("uploaded to {:?}", report.execution_keys());
//! ```

pub mod config;
pub mod evidence;
pub mod harness;
pub mod recorder;
pub mod runner;
pub mod step;
pub mod store;
pub mod upload;

// Re-export evidence types and backends
pub use evidence::{
    CaptureBackend, CaptureResult, ContentType, Evidence, EvidenceCollector, EvidenceContent, EvidenceError,
    EvidenceResult, MockFramebuffer, ScreenshotOptions,
};

// Re-export step execution
pub use step::{Annotation, EXECUTION_ANNOTATION, StepError, StepExecutor, StepOptions, StepRecord, StepStatus, TestContext};

// Re-export result lifecycle
pub use harness::{HarnessBuilder, TestCase, TestHarness, TestRun, TestScope};
pub use recorder::{ResultRecorder, extract_test_key};
pub use runner::{RunnerStatus, TestEntry, TestOutcome, TestResult, TestStatus};
pub use store::{ResultStore, RunStore, StoreError, StoreResult};

// Re-export upload
pub use upload::{
    ExecutionTarget, OrchestrationReport, UploadClient, UploadError, UploadOrchestrator, XrayClient, XrayConfig,
};
