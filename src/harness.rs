//! Explicit composition of the per-test pieces.
//!
//! A [`TestHarness`] owns the step executor, the evidence collector and the
//! result recorder. Each call to [`TestHarness::run_test`] builds a fresh
//! [`TestContext`], hands the test body a [`TestScope`] over it, and records the
//! outcome once the body returns.
//!
//! ```rust,no_run
//! use xray_harness::{EvidenceContent, MockFramebuffer, TestCase, TestHarness};
//!
//! let harness = TestHarness::builder().results_dir(".xray-results").build();
//! let run = harness.run_test(
//!     TestCase::new("PXX-10: login works", "login.spec.js").page(Box::new(MockFramebuffer::new(320, 200))),
//!     |t| {
//!         t.step("open login page", |_| Ok(()))?;
//!         t.step("submit credentials", |t| {
//!             t.snap("request", EvidenceContent::text("user=alice"))?;
//!             Ok(())
//!         })
//!     },
//! );
//! assert!(run.result.is_some());
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config;
use crate::evidence::{CaptureBackend, EvidenceCollector, EvidenceContent, sanitize_name};
use crate::recorder::ResultRecorder;
use crate::runner::{TestOutcome, TestResult};
use crate::step::{StepExecutor, StepOptions, TestContext, panic_message};
use crate::store::{ResultStore, RunStore};

pub struct HarnessBuilder {
    output_root: PathBuf,
    store: Option<Arc<dyn ResultStore>>,
    executor: StepExecutor,
    collector: EvidenceCollector,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            output_root: config::output_dir(),
            store: None,
            executor: StepExecutor::new(),
            collector: EvidenceCollector::new(),
        }
    }
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root under which every test gets its own evidence directory
    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_root = dir.into();
        self
    }

    pub fn store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a file-backed [`RunStore`] in `dir`
    pub fn results_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.store(Arc::new(RunStore::new(dir)))
    }

    pub fn collector(mut self, collector: EvidenceCollector) -> Self {
        self.collector = collector;
        self
    }

    pub fn build(self) -> TestHarness {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(RunStore::new(config::results_dir())));
        TestHarness {
            output_root: self.output_root,
            executor: self.executor,
            collector: self.collector,
            recorder: ResultRecorder::new(store),
        }
    }
}

/// Identity of one test invocation
pub struct TestCase {
    pub title: String,
    pub spec_file: String,
    pub page: Option<Box<dyn CaptureBackend>>,
    pub annotations: Vec<(String, String)>,
}

impl TestCase {
    pub fn new(title: impl Into<String>, spec_file: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            spec_file: spec_file.into(),
            page: None,
            annotations: Vec::new(),
        }
    }

    pub fn page(mut self, page: Box<dyn CaptureBackend>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn annotate(mut self, kind: impl Into<String>, description: impl Into<String>) -> Self {
        self.annotations.push((kind.into(), description.into()));
        self
    }
}

/// What came out of one `run_test` call
#[derive(Debug)]
pub struct TestRun {
    pub outcome: TestOutcome,
    /// `None` when the title carries no test key
    pub result: Option<TestResult>,
    pub context: TestContext,
}

impl TestRun {
    pub fn passed(&self) -> bool {
        !self.outcome.status.is_failing()
    }
}

pub struct TestHarness {
    output_root: PathBuf,
    executor: StepExecutor,
    collector: EvidenceCollector,
    recorder: ResultRecorder,
}

impl TestHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        self.recorder.store()
    }

    /// Run one test body and record its result.
    ///
    /// An error or panic escaping the body fails the test; neither escapes this
    /// call.
    pub fn run_test<F>(&self, case: TestCase, body: F) -> TestRun
    where
        F: FnOnce(&mut TestScope<'_>) -> anyhow::Result<()>,
    {
        let output_dir = self.output_root.join(sanitize_name(&case.title));
        let mut ctx = TestContext::new(case.title, case.spec_file, output_dir);
        if let Some(page) = case.page {
            ctx = ctx.with_page(page);
        }
        for (kind, description) in case.annotations {
            ctx.annotate(kind, description);
        }

        info!(title = ctx.title(), spec = ctx.spec_file(), "starting test");
        self.recorder.on_test_start(&mut ctx);

        let outcome = {
            let mut scope = TestScope {
                ctx: &mut ctx,
                executor: &self.executor,
                collector: &self.collector,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| body(&mut scope))) {
                Ok(Ok(())) => TestOutcome::passed(),
                Ok(Err(e)) => TestOutcome::failed(format!("{:#}", e)),
                Err(payload) => TestOutcome::failed(panic_message(payload.as_ref())),
            }
        };

        if let Some(error) = &outcome.error {
            warn!(title = ctx.title(), error = %error, "test failed");
        }
        let result = self.recorder.on_test_end(&ctx, &outcome);
        TestRun {
            outcome,
            result,
            context: ctx,
        }
    }
}

/// Handle a test body uses to run steps and capture evidence
pub struct TestScope<'a> {
    ctx: &'a mut TestContext,
    executor: &'a StepExecutor,
    collector: &'a EvidenceCollector,
}

impl TestScope<'_> {
    /// Run a step with default options
    pub fn step<F>(&mut self, name: &str, body: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut TestScope<'_>) -> anyhow::Result<()>,
    {
        self.step_with(name, StepOptions::default(), body)
    }

    pub fn step_with<F>(&mut self, name: &str, options: StepOptions, body: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut TestScope<'_>) -> anyhow::Result<()>,
    {
        let executor = self.executor;
        let collector = self.collector;
        executor.run(
            self.ctx,
            name,
            |ctx| {
                body(&mut TestScope {
                    ctx,
                    executor,
                    collector,
                })
            },
            options,
        )
    }

    pub fn snap(&mut self, name: &str, content: EvidenceContent<'_>) -> anyhow::Result<Option<PathBuf>> {
        self.collector.snap(self.ctx, name, content)
    }

    /// Screenshot the page attached to this test
    pub fn snap_page(&mut self, name: &str) -> anyhow::Result<Option<PathBuf>> {
        self.collector.snap_page(self.ctx, name)
    }

    pub fn annotate(&mut self, kind: impl Into<String>, description: impl Into<String>) {
        self.ctx.annotate(kind, description);
    }

    pub fn context(&self) -> &TestContext {
        self.ctx
    }
}
