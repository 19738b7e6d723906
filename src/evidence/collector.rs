//! Named evidence capture.
//!
//! `snap` materializes one piece of evidence under the test's output directory and
//! hands the path to the step that is currently running, so the step executor can
//! inline it when the step is finalized.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::backend::{CaptureBackend, ScreenshotOptions};
use super::types::{ContentType, Evidence, EvidenceContent, EvidenceResult};
use super::utils::{sanitize_name, unique_path};
use crate::step::TestContext;

#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceCollector {
    screenshot: ScreenshotOptions,
}

impl EvidenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used for `Image` and `Deferred` screenshots
    pub fn with_screenshot_options(mut self, options: ScreenshotOptions) -> Self {
        self.screenshot = options;
        self
    }

    /// Capture `content` under `name`.
    ///
    /// Write and capture failures are logged and yield `Ok(None)`. Only an error
    /// raised by a `Deferred` operation is returned, since that is test logic.
    pub fn snap(
        &self,
        ctx: &mut TestContext,
        name: &str,
        content: EvidenceContent<'_>,
    ) -> anyhow::Result<Option<PathBuf>> {
        let stem = sanitize_name(name);
        debug!(evidence = name, kind = content.kind(), "snapping evidence");

        let written = match content {
            EvidenceContent::Text(text) => self.write_file(ctx, &stem, ContentType::TextPlain, text.as_bytes()),
            EvidenceContent::Structured(value) => match serde_json::to_vec_pretty(&value) {
                Ok(bytes) => self.write_file(ctx, &stem, ContentType::Json, &bytes),
                Err(e) => {
                    warn!(evidence = name, error = %e, "could not serialize structured evidence");
                    None
                }
            },
            EvidenceContent::Image(backend) => self.write_screenshot(ctx, &stem, backend),
            EvidenceContent::Deferred(op) => {
                op()?;
                match ctx.take_page() {
                    Some(mut page) => {
                        let written = self.write_screenshot(ctx, &stem, page.as_mut());
                        ctx.restore_page(Some(page));
                        written
                    }
                    None => {
                        warn!(evidence = name, "deferred evidence ran but no page is available to screenshot");
                        None
                    }
                }
            }
        };

        if let Some(path) = &written {
            info!(evidence = name, path = %path.display(), "evidence captured");
            ctx.register_evidence(path.clone());
        }
        Ok(written)
    }

    /// Screenshot the test's own page
    pub fn snap_page(&self, ctx: &mut TestContext, name: &str) -> anyhow::Result<Option<PathBuf>> {
        let Some(mut page) = ctx.take_page() else {
            warn!(evidence = name, "no page attached to this test, nothing to screenshot");
            return Ok(None);
        };
        let result = self.snap(ctx, name, EvidenceContent::Image(page.as_mut()));
        ctx.restore_page(Some(page));
        result
    }

    fn write_file(&self, ctx: &TestContext, stem: &str, kind: ContentType, bytes: &[u8]) -> Option<PathBuf> {
        let result: EvidenceResult<PathBuf> = (|| {
            let path = unique_path(ctx.ensure_output_dir()?, stem, kind.extension());
            fs::write(&path, bytes)?;
            Ok(path)
        })();
        result
            .map_err(|e| warn!(evidence = stem, error = %e, "failed to write evidence"))
            .ok()
    }

    fn write_screenshot(&self, ctx: &TestContext, stem: &str, backend: &mut dyn CaptureBackend) -> Option<PathBuf> {
        match backend.capture(&self.screenshot) {
            Ok(shot) => self.write_file(ctx, stem, ContentType::Png, &shot.image_data),
            Err(e) => {
                warn!(evidence = stem, source = backend.source_type(), error = %e, "screenshot capture failed");
                None
            }
        }
    }
}

/// Inline every readable file; unreadable ones are logged and dropped
pub(crate) fn read_evidences<'p>(
    paths: impl IntoIterator<Item = &'p Path>,
    content_type: impl Fn(&Path) -> ContentType,
) -> Vec<Evidence> {
    paths
        .into_iter()
        .filter_map(|path| match Evidence::from_file(path, content_type(path)) {
            Ok(evidence) => Some(evidence),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable evidence");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceError, MockFramebuffer};
    use crate::step::ActiveStep;
    use serde_json::json;

    struct BrokenCamera;

    impl CaptureBackend for BrokenCamera {
        fn capture(&mut self, _: &ScreenshotOptions) -> EvidenceResult<crate::evidence::CaptureResult> {
            Err(EvidenceError::Capture("lens cap on".to_string()))
        }

        fn source_type(&self) -> &str {
            "broken"
        }
    }

    fn context(dir: &Path) -> TestContext {
        TestContext::new("PXX-1: collector", "collector.spec.js", dir.join("out"))
    }

    #[test]
    fn test_text_and_json_are_written_with_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let collector = EvidenceCollector::new();

        let text = collector
            .snap(&mut ctx, "Console Log", EvidenceContent::text("line 1"))
            .unwrap()
            .unwrap();
        assert!(text.ends_with("Console_Log.txt"));
        assert_eq!(fs::read_to_string(&text).unwrap(), "line 1");

        let data = collector
            .snap(&mut ctx, "api/response", EvidenceContent::Structured(json!({"ok": true})))
            .unwrap()
            .unwrap();
        assert!(data.ends_with("api_response.json"));
        let parsed: serde_json::Value = serde_json::from_slice(&fs::read(&data).unwrap()).unwrap();
        assert_eq!(parsed, json!({"ok": true}));

        // no step running, both stay at test level
        assert_eq!(ctx.orphan_evidences().len(), 2);
    }

    #[test]
    fn test_serializable_value_becomes_json_evidence() {
        #[derive(serde::Serialize)]
        struct Response {
            status: u16,
            items: Vec<&'static str>,
        }

        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let content = EvidenceContent::structured(&Response {
            status: 201,
            items: vec!["apple"],
        })
        .unwrap();

        let path = EvidenceCollector::new().snap(&mut ctx, "response", content).unwrap().unwrap();
        assert!(path.ends_with("response.json"));
        let parsed: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed, json!({"status": 201, "items": ["apple"]}));
    }

    #[test]
    fn test_unwritable_output_dir_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out"), "a file, not a directory").unwrap();
        let mut ctx = context(dir.path());

        let written = EvidenceCollector::new()
            .snap(&mut ctx, "log", EvidenceContent::text("lost"))
            .unwrap();
        assert!(written.is_none());
        assert!(ctx.orphan_evidences().is_empty());
    }

    #[test]
    fn test_screenshot_options_apply_to_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let mut page = MockFramebuffer::new(16, 40).with_viewport(10);

        let viewport = EvidenceCollector::new()
            .snap(&mut ctx, "viewport", EvidenceContent::Image(&mut page))
            .unwrap()
            .unwrap();
        let whole = EvidenceCollector::new()
            .with_screenshot_options(ScreenshotOptions::full_page())
            .snap(&mut ctx, "whole", EvidenceContent::Image(&mut page))
            .unwrap()
            .unwrap();

        let height = |path: &Path| MockFramebuffer::from_png_bytes(&fs::read(path).unwrap()).unwrap().height();
        assert_eq!(height(viewport.as_path()), 10);
        assert_eq!(height(whole.as_path()), 40);
    }

    #[test]
    fn test_same_name_twice_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let collector = EvidenceCollector::new();

        let a = collector.snap(&mut ctx, "log", EvidenceContent::text("a")).unwrap().unwrap();
        let b = collector.snap(&mut ctx, "log", EvidenceContent::text("b")).unwrap().unwrap();
        assert_ne!(a, b);
        assert_eq!(fs::read_to_string(a).unwrap(), "a");
        assert_eq!(fs::read_to_string(b).unwrap(), "b");
    }

    #[test]
    fn test_evidence_goes_to_active_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.active_step = Some(ActiveStep {
            name: "step".to_string(),
            evidences: Vec::new(),
        });

        let mut fb = MockFramebuffer::with_color(16, 16, [1, 2, 3]);
        let path = EvidenceCollector::new()
            .snap(&mut ctx, "widget", EvidenceContent::Image(&mut fb))
            .unwrap()
            .unwrap();

        assert!(path.ends_with("widget.png"));
        assert_eq!(ctx.active_step.as_ref().unwrap().evidences, vec![path]);
        assert!(ctx.orphan_evidences().is_empty());
    }

    #[test]
    fn test_failed_capture_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let mut camera = BrokenCamera;

        let written = EvidenceCollector::new()
            .snap(&mut ctx, "shot", EvidenceContent::Image(&mut camera))
            .unwrap();
        assert!(written.is_none());
        assert!(ctx.orphan_evidences().is_empty());
    }

    #[test]
    fn test_deferred_runs_then_screenshots_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path()).with_page(Box::new(MockFramebuffer::new(8, 8)));
        let mut ran = false;

        let written = EvidenceCollector::new()
            .snap(
                &mut ctx,
                "after click",
                EvidenceContent::deferred(|| {
                    ran = true;
                    Ok(())
                }),
            )
            .unwrap();

        assert!(ran);
        assert!(written.unwrap().ends_with("after_click.png"));
        assert!(ctx.has_page(), "page must be handed back after the screenshot");
    }

    #[test]
    fn test_deferred_without_page_or_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let collector = EvidenceCollector::new();

        let written = collector
            .snap(&mut ctx, "noop", EvidenceContent::deferred(|| Ok(())))
            .unwrap();
        assert!(written.is_none());

        let err = collector
            .snap(&mut ctx, "boom", EvidenceContent::deferred(|| anyhow::bail!("assertion failed")))
            .unwrap_err();
        assert_eq!(err.to_string(), "assertion failed");
    }
}
