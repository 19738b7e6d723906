//! Configuration management with environment variable support.
//!
//! Everything the harness and the upload step need is read from the environment
//! once and cached. Each value has a default, except the API credentials.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `XRAY_CLIENT_ID` | Xray API client id | unset |
//! | `XRAY_CLIENT_SECRET` | Xray API client secret | unset |
//! | `XRAY_BASE_URL` | Xray API base URL | `https://xray.cloud.getxray.app/api/v2` |
//! | `XRAY_TEST_EXECUTION_KEY` | Execution keys, one per spec in name order | empty |
//! | `XRAY_TEST_SUMMARY` | Summaries for newly created executions | empty |
//! | `XRAY_TEST_PLAN_KEY` | Test plan linked to new executions | unset |
//! | `XRAY_PROJECT_KEY` | Project for new executions | unset |
//! | `UPLOAD_JIRA` | Enable upload (`on`, `true`, `1`, `yes`) | off |
//! | `XRAY_RESULTS_DIR` | Per-test result files | `.xray-results` |
//! | `XRAY_MANUAL_DIR` | Manual import bundles | `manual-reports` |
//! | `XRAY_HTML_REPORT` | HTML report moved into the bundle | `custom-report/index.html` |
//! | `XRAY_DEBUG_FILE` | Payload of the last failed upload | `xray-results-debug.json` |
//! | `XRAY_OUTPUT_DIR` | Evidence output root | `test-results` |
//!
//! Key and summary lists accept a JSON array or a comma-separated string:
//!
//! ```bash
//! export XRAY_TEST_EXECUTION_KEY='["PXX-1","","PXX-3"]'
//! export XRAY_TEST_SUMMARY="Nightly login, Nightly checkout"
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default Xray cloud API base
pub const DEFAULT_BASE_URL: &str = "https://xray.cloud.getxray.app/api/v2";

/// Default directory for per-test result files
pub const DEFAULT_RESULTS_DIR: &str = ".xray-results";

/// Default root for manual import bundles
pub const DEFAULT_MANUAL_DIR: &str = "manual-reports";

/// Default location of the generated HTML report
pub const DEFAULT_HTML_REPORT: &str = "custom-report/index.html";

/// Default dump file for failed upload payloads
pub const DEFAULT_DEBUG_FILE: &str = "xray-results-debug.json";

/// Default root for evidence files
pub const DEFAULT_OUTPUT_DIR: &str = "test-results";

/// Default HTTP timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 60;

/// Default mock screenshot width (pixels)
pub const DEFAULT_MOCK_WIDTH: u32 = 800;

/// Default mock screenshot height (pixels)
pub const DEFAULT_MOCK_HEIGHT: u32 = 600;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_CLIENT_ID: &str = "XRAY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "XRAY_CLIENT_SECRET";
pub const ENV_BASE_URL: &str = "XRAY_BASE_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "XRAY_REQUEST_TIMEOUT";
pub const ENV_EXECUTION_KEYS: &str = "XRAY_TEST_EXECUTION_KEY";
pub const ENV_SUMMARIES: &str = "XRAY_TEST_SUMMARY";
pub const ENV_TEST_PLAN_KEY: &str = "XRAY_TEST_PLAN_KEY";
pub const ENV_PROJECT_KEY: &str = "XRAY_PROJECT_KEY";
pub const ENV_UPLOAD_ENABLED: &str = "UPLOAD_JIRA";
pub const ENV_RESULTS_DIR: &str = "XRAY_RESULTS_DIR";
pub const ENV_MANUAL_DIR: &str = "XRAY_MANUAL_DIR";
pub const ENV_HTML_REPORT: &str = "XRAY_HTML_REPORT";
pub const ENV_DEBUG_FILE: &str = "XRAY_DEBUG_FILE";
pub const ENV_OUTPUT_DIR: &str = "XRAY_OUTPUT_DIR";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub xray: XraySettings,
    pub upload: UploadSettings,
    pub paths: PathSettings,
    pub defaults: DefaultSettings,
}

/// API connection settings
#[derive(Debug, Clone)]
pub struct XraySettings {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Per-request timeout (seconds)
    pub request_timeout: u64,
}

/// What to upload and where
#[derive(Debug, Clone, Default)]
pub struct UploadSettings {
    pub enabled: bool,
    /// Positional: entry `i` belongs to the `i`-th spec in name order
    pub execution_keys: Vec<String>,
    /// Consumed in order by specs that create a new execution
    pub summaries: Vec<String>,
    pub test_plan_key: Option<String>,
    pub project_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub results_dir: PathBuf,
    pub manual_dir: PathBuf,
    pub html_report: PathBuf,
    pub debug_file: PathBuf,
    pub output_dir: PathBuf,
}

/// Default values for CLI arguments
#[derive(Debug, Clone)]
pub struct DefaultSettings {
    pub mock_width: u32,
    pub mock_height: u32,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            xray: XraySettings::from_env(),
            upload: UploadSettings::from_env(),
            paths: PathSettings::from_env(),
            defaults: DefaultSettings::defaults(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            xray: XraySettings::defaults(),
            upload: UploadSettings::default(),
            paths: PathSettings::defaults(),
            defaults: DefaultSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl XraySettings {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            client_id: non_empty_var(ENV_CLIENT_ID),
            client_secret: non_empty_var(ENV_CLIENT_SECRET),
            request_timeout: env::var(ENV_REQUEST_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: None,
            client_secret: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl UploadSettings {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var(ENV_UPLOAD_ENABLED).map(|v| parse_flag(&v)).unwrap_or(false),
            execution_keys: env::var(ENV_EXECUTION_KEYS)
                .map(|v| parse_key_list(&v))
                .unwrap_or_default(),
            summaries: env::var(ENV_SUMMARIES)
                .map(|v| parse_key_list(&v))
                .unwrap_or_default(),
            test_plan_key: non_empty_var(ENV_TEST_PLAN_KEY),
            project_key: non_empty_var(ENV_PROJECT_KEY),
        }
    }
}

impl PathSettings {
    pub fn from_env() -> Self {
        let path = |name: &str, default: &str| PathBuf::from(env::var(name).unwrap_or_else(|_| default.to_string()));
        Self {
            results_dir: path(ENV_RESULTS_DIR, DEFAULT_RESULTS_DIR),
            manual_dir: path(ENV_MANUAL_DIR, DEFAULT_MANUAL_DIR),
            html_report: path(ENV_HTML_REPORT, DEFAULT_HTML_REPORT),
            debug_file: path(ENV_DEBUG_FILE, DEFAULT_DEBUG_FILE),
            output_dir: path(ENV_OUTPUT_DIR, DEFAULT_OUTPUT_DIR),
        }
    }

    pub fn defaults() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            manual_dir: PathBuf::from(DEFAULT_MANUAL_DIR),
            html_report: PathBuf::from(DEFAULT_HTML_REPORT),
            debug_file: PathBuf::from(DEFAULT_DEBUG_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl DefaultSettings {
    pub fn defaults() -> Self {
        Self {
            mock_width: DEFAULT_MOCK_WIDTH,
            mock_height: DEFAULT_MOCK_HEIGHT,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse the upload switch; `on`, `true`, `1` and `yes` in any case enable it
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "on" | "true" | "1" | "yes")
}

/// Parse a key or summary list.
///
/// Accepts `["A","B"]` or `A, "B", 'C'`. Entries keep their position, so an
/// empty entry still occupies its slot.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if raw.starts_with('[') && raw.ends_with(']') {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(raw) {
            return values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect();
        }
        return split_list(raw.trim_start_matches('[').trim_end_matches(']'));
    }

    split_list(raw)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|item| strip_quotes(item.trim()).to_string()).collect()
}

/// Remove one leading and one trailing quote character
fn strip_quotes(item: &str) -> &str {
    let item = item.strip_prefix(['"', '\'']).unwrap_or(item);
    item.strip_suffix(['"', '\'']).unwrap_or(item)
}

/// Directory for per-test result files (convenience function)
pub fn results_dir() -> PathBuf {
    get().paths.results_dir.clone()
}

/// Evidence output root (convenience function)
pub fn output_dir() -> PathBuf {
    get().paths.output_dir.clone()
}
