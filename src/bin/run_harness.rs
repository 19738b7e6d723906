//! Demo run: a few tests against mock pages, then the usual end-of-run upload.
//!
//! Upload only happens with `UPLOAD_JIRA=on` and credentials set; otherwise the
//! manual bundle is written and the result files are cleaned up.

use serde_json::json;
use tracing_subscriber::EnvFilter;

use xray_harness::upload::{OrchestratorSettings, UploadOrchestrator, XrayClient, XrayConfig};
use xray_harness::{EXECUTION_ANNOTATION, EvidenceContent, MockFramebuffer, StepOptions, TestCase, TestHarness, UploadClient};

fn page(title: &str) -> Box<MockFramebuffer> {
    let mut fb = MockFramebuffer::with_color(480, 900, [240, 240, 240]).with_viewport(320);
    fb.draw_rect(0, 0, 480, 40, [30, 60, 120]);
    fb.draw_text(12, 16, title, [255, 255, 255], [30, 60, 120]);
    Box::new(fb)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let harness = TestHarness::builder().output_root("./harness_output").build();

    harness.run_test(TestCase::new("PXX-10: login succeeds", "login.spec.js").page(page("Login")), |t| {
        t.step("open login page", |_| Ok(()))?;
        t.step("fill credentials", |t| {
            t.snap("form", EvidenceContent::Structured(json!({"user": "alice", "remember": true})))?;
            Ok(())
        })?;
        t.step("submit", |t| {
            t.snap_page("dashboard")?;
            Ok(())
        })
    });

    harness.run_test(TestCase::new("PXX-11: wrong password is rejected", "login.spec.js").page(page("Login")), |t| {
        t.step("open login page", |_| Ok(()))?;
        t.step_with(
            "submit wrong password",
            StepOptions::new().capture_screenshot(false),
            |t| {
                t.snap("console", EvidenceContent::text("POST /login 401"))?;
                anyhow::bail!("expected error banner to be visible")
            },
        )?;
        t.step("check banner text", |_| Ok(()))
    });

    harness.run_test(
        TestCase::new("PXX-20: cart keeps items", "cart.spec.js")
            .page(page("Cart"))
            .annotate(EXECUTION_ANNOTATION, "PXX-500"),
        |t| t.step("add item", |_| Ok(())),
    );

    let settings = OrchestratorSettings::default();
    let mut client = if settings.upload_enabled {
        XrayClient::new(XrayConfig::default())
            .map_err(|e| eprintln!("Upload skipped: {}", e))
            .ok()
    } else {
        None
    };

    let report = UploadOrchestrator::new(settings)
        .run(harness.store().as_ref(), client.as_mut().map(|c| c as &mut dyn UploadClient));

    println!("Demo run finished: {} results", report.results);
    for spec in &report.specs {
        println!("  {} -> {:?}", spec.name, spec.target);
    }
    if let Some(dir) = report.bundle_dir {
        println!("Manual bundle: {}", dir.display());
    }
}
