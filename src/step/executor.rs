//! Step execution state machine.
//!
//! Once a step fails, every later step in the same test is recorded as TODO and
//! its body is never called.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::context::{ActiveStep, TestContext};
use super::types::{StepError, StepOptions, StepRecord};
use crate::evidence::collector::read_evidences;
use crate::evidence::{ContentType, Evidence, ScreenshotOptions, strip_ansi};

/// How a step body ended
enum BodyOutcome {
    Passed,
    Failed(anyhow::Error),
    Panicked(Box<dyn Any + Send>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StepExecutor;

impl StepExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `body` as the step `name`.
    ///
    /// Appends exactly one record to `ctx`. A failing body is recorded as FAILED
    /// and its error is returned unchanged; a panicking body is recorded the same
    /// way and the panic is resumed.
    pub fn run<F>(&self, ctx: &mut TestContext, name: &str, body: F, options: StepOptions) -> anyhow::Result<()>
    where
        F: FnOnce(&mut TestContext) -> anyhow::Result<()>,
    {
        if ctx.has_failed_step() {
            info!(step = name, "skipping step, a previous step failed");
            ctx.steps.push(StepRecord::skipped(name));
            return Ok(());
        }

        if let Some(outer) = ctx.active_step() {
            let err = StepError::Reentrant {
                outer: outer.to_string(),
                inner: name.to_string(),
            };
            warn!(step = name, "{}", err);
            return Err(err.into());
        }

        info!(step = name, "running step");
        let step_number = ctx.steps.len() + 1;
        ctx.active_step = Some(ActiveStep {
            name: name.to_string(),
            evidences: Vec::new(),
        });

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(&mut *ctx))) {
            Ok(Ok(())) => BodyOutcome::Passed,
            Ok(Err(e)) => BodyOutcome::Failed(e),
            Err(payload) => BodyOutcome::Panicked(payload),
        };
        let active = ctx.active_step.take().unwrap_or_default();
        let mut record = StepRecord::passed(name);

        let message = match &outcome {
            BodyOutcome::Passed => None,
            BodyOutcome::Failed(e) => Some(format!("{:#}", e)),
            BodyOutcome::Panicked(payload) => Some(panic_message(payload.as_ref())),
        };

        match message {
            None => {
                if options.capture_screenshot {
                    let filename = format!("step-{}-success.png", step_number);
                    record.evidences.extend(self.screenshot(ctx, &filename, &options.screenshot));
                }
            }
            Some(message) => {
                warn!(step = name, error = %message, "step failed");
                let mut full_page = options.screenshot;
                full_page.full_page = true;
                let filename = format!("step-{}-failure.png", step_number);
                record.evidences.extend(self.screenshot(ctx, &filename, &full_page));
                record.fail(name, &strip_ansi(&message));
            }
        }

        record
            .evidences
            .extend(gather_evidences(&active.evidences, &options.additional_evidences));
        ctx.steps.push(record);

        match outcome {
            BodyOutcome::Passed => Ok(()),
            BodyOutcome::Failed(e) => Err(e),
            BodyOutcome::Panicked(payload) => panic::resume_unwind(payload),
        }
    }

    /// Best-effort screenshot of the context's page
    fn screenshot(&self, ctx: &mut TestContext, filename: &str, options: &ScreenshotOptions) -> Option<Evidence> {
        let mut page = ctx.take_page()?;
        let shot = page.capture(options);
        ctx.restore_page(Some(page));
        match shot {
            Ok(capture) => Some(Evidence::from_bytes(filename, &capture.image_data, ContentType::Png)),
            Err(e) => {
                warn!(evidence = filename, error = %e, "failed to capture step screenshot");
                None
            }
        }
    }
}

/// Evidence written during the step first, then extra files not already included
fn gather_evidences(collected: &[PathBuf], additional: &[PathBuf]) -> Vec<Evidence> {
    let mut seen: HashSet<&Path> = collected.iter().map(PathBuf::as_path).collect();
    let mut evidences = read_evidences(collected.iter().map(PathBuf::as_path), ContentType::from_path);
    let extra: Vec<&Path> = additional
        .iter()
        .map(PathBuf::as_path)
        .filter(|p| seen.insert(*p))
        .collect();
    evidences.extend(read_evidences(extra, |_| ContentType::OctetStream));
    evidences
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "step panicked".to_string()
    }
}
