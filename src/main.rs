use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use xray_harness::config::{self, parse_key_list};
use xray_harness::upload::{OrchestratorSettings, UploadOrchestrator, XrayClient, XrayConfig};
use xray_harness::{CaptureBackend, MockFramebuffer, ResultStore, RunStore, ScreenshotOptions};

/// Xray Harness - consolidate and upload step-level UI test results
#[derive(Parser, Debug)]
#[command(
    name = "xray-harness",
    about = "Consolidate step-level UI test results and upload them to Xray in batches",
    after_help = "ENVIRONMENT VARIABLES:\n\
        XRAY_CLIENT_ID / XRAY_CLIENT_SECRET   Xray API credentials\n\
        XRAY_BASE_URL                         Xray API base URL\n\
        XRAY_TEST_EXECUTION_KEY               Execution keys, one per spec (JSON array or comma list)\n\
        XRAY_TEST_SUMMARY                     Summaries for new executions\n\
        XRAY_TEST_PLAN_KEY / XRAY_PROJECT_KEY Links for new executions\n\
        UPLOAD_JIRA                           Enable upload (on/true/1/yes)\n\
        XRAY_RESULTS_DIR                      Per-test result files\n\
        RUST_LOG                              Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bundle persisted results and upload them to Xray
    Upload {
        /// Directory holding per-test result files
        #[arg(long, env = "XRAY_RESULTS_DIR", default_value = config::DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,

        /// Root directory for manual import bundles
        #[arg(long, env = "XRAY_MANUAL_DIR", default_value = config::DEFAULT_MANUAL_DIR)]
        manual_dir: PathBuf,

        /// Execution keys, one per spec in name order (overrides XRAY_TEST_EXECUTION_KEY)
        #[arg(long)]
        execution_keys: Option<String>,

        /// Summaries for new executions (overrides XRAY_TEST_SUMMARY)
        #[arg(long)]
        summaries: Option<String>,

        /// Upload even if UPLOAD_JIRA is not set
        #[arg(long, conflicts_with = "no_upload")]
        upload: bool,

        /// Only write the manual bundle
        #[arg(long)]
        no_upload: bool,
    },

    /// List persisted results without uploading them
    Results {
        /// Directory holding per-test result files
        #[arg(long, env = "XRAY_RESULTS_DIR", default_value = config::DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,

        /// Print the raw result JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a mock page screenshot for testing
    Mock {
        /// Width in pixels
        #[arg(short = 'W', long, default_value_t = config::DEFAULT_MOCK_WIDTH)]
        width: u32,

        /// Height in pixels
        #[arg(short = 'H', long, default_value_t = config::DEFAULT_MOCK_HEIGHT)]
        height: u32,

        /// Viewport height; without --full-page the capture is cropped to it
        #[arg(long)]
        viewport: Option<u32>,

        /// Capture the whole page
        #[arg(long)]
        full_page: bool,

        /// Output file path
        #[arg(short, long, default_value = "./mock_screenshot.png")]
        output: PathBuf,

        /// Fill color as hex (e.g., "ff0000" for red)
        #[arg(short, long, default_value = "000000")]
        color: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Some(Commands::Upload {
            results_dir,
            manual_dir,
            execution_keys,
            summaries,
            upload,
            no_upload,
        }) => {
            let mut settings = OrchestratorSettings::default();
            settings.manual_dir = manual_dir;
            if let Some(keys) = execution_keys {
                settings.execution_keys = parse_key_list(&keys);
            }
            if let Some(summaries) = summaries {
                settings.summaries = parse_key_list(&summaries);
            }
            settings.upload_enabled = (settings.upload_enabled || upload) && !no_upload;

            let mut client = if settings.upload_enabled {
                match XrayClient::new(XrayConfig::default()) {
                    Ok(client) => Some(client),
                    Err(e) => {
                        tracing::error!(error = %e, "cannot create Xray client");
                        None
                    }
                }
            } else {
                None
            };

            let store = RunStore::new(results_dir);
            let report = UploadOrchestrator::new(settings)
                .run(&store, client.as_mut().map(|c| c as &mut dyn xray_harness::UploadClient));

            println!("Results: {}", report.results);
            for spec in &report.specs {
                println!(
                    "  {} ({} tests) -> {} [{}/{} batches ok]",
                    spec.name,
                    spec.tests,
                    spec.execution_key.as_deref().unwrap_or("not uploaded"),
                    spec.batches - spec.failed_batches,
                    spec.batches
                );
            }
            if let Some(dir) = &report.bundle_dir {
                println!("Manual bundle: {}", dir.display());
            }
            if report.batches_failed() > 0 {
                bail!("{} of {} batches failed", report.batches_failed(), report.batches_attempted());
            }
        }

        Some(Commands::Results { results_dir, json }) => {
            let store = RunStore::new(&results_dir);
            let results = store.collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results in {}", results_dir.display());
            } else {
                for result in &results {
                    println!(
                        "{:<12} {:<7?} {:>3} steps  {}",
                        result.test_key(),
                        result.status(),
                        result.entry.steps.len(),
                        result.spec_file
                    );
                }
            }
        }

        Some(Commands::Mock {
            width,
            height,
            viewport,
            full_page,
            output,
            color,
        }) => {
            let color_bytes = parse_hex_color(&color)?;
            let mut fb = MockFramebuffer::with_color(width, height, color_bytes);
            if let Some(viewport) = viewport {
                fb = fb.with_viewport(viewport);
            }
            fb.draw_text(10, 10, "Mock Page", [255, 255, 255], color_bytes);

            let options = if full_page {
                ScreenshotOptions::full_page()
            } else {
                ScreenshotOptions::default()
            };
            let shot = fb.capture(&options).context("capturing mock page")?;
            std::fs::write(&output, &shot.image_data)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Mock screenshot saved to: {} ({}x{})", output.display(), shot.width, shot.height);
        }

        None => {
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn parse_hex_color(hex: &str) -> anyhow::Result<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        bail!("Color must be 6 hex digits (e.g., 'ff0000')");
    }
    let r = u8::from_str_radix(&hex[0..2], 16)?;
    let g = u8::from_str_radix(&hex[2..4], 16)?;
    let b = u8::from_str_radix(&hex[4..6], 16)?;
    Ok([r, g, b])
}
