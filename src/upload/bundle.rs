//! Manual-import bundle.
//!
//! Written on every run, before any network call, so results can be imported by
//! hand when the upload fails or is disabled:
//!
//! ```text
//! manual-reports/
//!   17102026143005/
//!     login.json
//!     checkout.json
//!     report.html
//! ```

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::types::ExecutionInfo;
use crate::evidence::generate_timestamp;
use crate::runner::{TestEntry, TestResult};

/// One `<spec>.json` file in the bundle
#[derive(Debug, Serialize)]
pub struct ManualReport<'a> {
    pub info: ExecutionInfo,
    pub tests: Vec<&'a TestEntry>,
}

/// Writes one import file per spec group into a timestamped directory
#[derive(Debug, Clone)]
pub struct ManualBundle {
    root: PathBuf,
    project_key: Option<String>,
    test_plan_key: Option<String>,
}

impl ManualBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            project_key: None,
            test_plan_key: None,
        }
    }

    pub fn project_key(mut self, key: Option<String>) -> Self {
        self.project_key = key;
        self
    }

    pub fn test_plan_key(mut self, key: Option<String>) -> Self {
        self.test_plan_key = key;
        self
    }

    /// Write every group and return the bundle directory
    pub fn write(&self, groups: &BTreeMap<String, Vec<TestResult>>) -> io::Result<PathBuf> {
        let dir = create_fresh_dir(&self.root, &generate_timestamp())?;

        let exported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let host = host_name();
        for (filename, results) in groups {
            let report = ManualReport {
                info: ExecutionInfo {
                    summary: format!("Manual Test Export - {}", exported_at),
                    description: format!("Generated on {} for manual Xray import ({})", host, filename),
                    test_plan_key: self.test_plan_key.clone(),
                    project: self.project_key.clone(),
                },
                tests: results.iter().map(|r| &r.entry).collect(),
            };
            let path = dir.join(filename);
            fs::write(&path, serde_json::to_string_pretty(&report)?)?;
            info!(file = %path.display(), tests = results.len(), "manual import file written");
        }

        Ok(dir)
    }
}

/// Create `root/name`, or `root/name-N` for the first N not taken yet.
///
/// An existing bundle is never reused, so two runs in the same second keep both exports.
fn create_fresh_dir(root: &Path, name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(root)?;
    let mut suffix = 0u32;
    loop {
        let dir = match suffix {
            0 => root.join(name),
            n => root.join(format!("{}-{}", name, n)),
        };
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Move the generated HTML report into the bundle as `report.html`.
///
/// Falls back to copy and delete when a rename is not possible, and removes the
/// report's directory once it is empty. Returns `None` when there is no report.
pub fn relocate_html_report(source: &Path, bundle_dir: &Path) -> io::Result<Option<PathBuf>> {
    if !source.is_file() {
        return Ok(None);
    }

    let dest = bundle_dir.join("report.html");
    if let Err(e) = fs::rename(source, &dest) {
        warn!(error = %e, "rename failed, copying HTML report instead");
        fs::copy(source, &dest)?;
        fs::remove_file(source)?;
    }
    info!(path = %dest.display(), "HTML report moved into bundle");

    if let Some(parent) = source.parent().filter(|p| !p.as_os_str().is_empty()) {
        if fs::read_dir(parent)?.next().is_none() {
            fs::remove_dir(parent)?;
        }
    }

    Ok(Some(dest))
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown host".to_string())
}
