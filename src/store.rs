//! Per-run result storage.
//!
//! Test workers may run in separate processes, so every finished test is written
//! to its own file in the results directory. The same process also keeps an
//! in-memory copy that the orchestrator falls back to when the directory is gone.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

use crate::evidence::{sanitize_name, unique_path};
use crate::runner::TestResult;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where finished results go and where the orchestrator finds them
pub trait ResultStore: Send + Sync {
    /// Durably record one result; returns the file it was written to
    fn persist(&self, result: &TestResult) -> StoreResult<PathBuf>;

    /// Every result of this run, from disk first and from memory as a fallback
    fn collect(&self) -> Vec<TestResult>;

    /// Drop everything; safe to call repeatedly
    fn clear(&self) -> StoreResult<()>;
}

/// File-backed store with a process-local fallback list
#[derive(Debug)]
pub struct RunStore {
    dir: PathBuf,
    local: Mutex<Vec<TestResult>>,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            local: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Results held in this process only
    pub fn local_results(&self) -> Vec<TestResult> {
        self.local().clone()
    }

    fn local(&self) -> MutexGuard<'_, Vec<TestResult>> {
        // A poisoned list still holds valid results
        self.local.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// List result files in name order
    pub fn list_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

impl ResultStore for RunStore {
    fn persist(&self, result: &TestResult) -> StoreResult<PathBuf> {
        self.local().push(result.clone());

        fs::create_dir_all(&self.dir)?;
        let path = unique_path(&self.dir, &result_file_stem(result.test_key()), "json");
        fs::write(&path, serde_json::to_string_pretty(result)?)?;
        debug!(test_key = result.test_key(), file = %path.display(), "result persisted");
        Ok(path)
    }

    /// Result files win whenever the directory holds any; the local list is
    /// only used when the directory is absent or has no result files.
    fn collect(&self) -> Vec<TestResult> {
        match self.list_files() {
            Ok(files) if !files.is_empty() => read_results(files),
            Ok(_) => self.local_results(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot list results directory");
                self.local_results()
            }
        }
    }

    fn clear(&self) -> StoreResult<()> {
        self.local().clear();
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

fn read_results(files: Vec<PathBuf>) -> Vec<TestResult> {
    files
        .into_iter()
        .filter_map(|path| match read_result(&path) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable result file");
                None
            }
        })
        .collect()
}

fn read_result(path: &Path) -> StoreResult<TestResult> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// `result-<key>-<nanos>-<pid>`, unique across concurrently running workers
pub fn result_file_stem(test_key: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!(
        "result-{}-{}-{}",
        sanitize_name(test_key).replace(['.', '-'], "_"),
        nanos,
        std::process::id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{TestEntry, TestStatus};
    use chrono::Utc;

    fn result(key: &str) -> TestResult {
        TestResult {
            entry: TestEntry {
                test_key: key.to_string(),
                start: Utc::now(),
                finish: Utc::now(),
                status: TestStatus::Passed,
                comment: String::new(),
                steps: Vec::new(),
            },
            spec_file: "a.spec.js".to_string(),
            target_execution_key: None,
        }
    }

    #[test]
    fn test_result_file_stem() {
        let name = result_file_stem("PXX-10");
        assert!(name.starts_with("result-PXX_10-"));
        assert!(name.ends_with(&format!("-{}", std::process::id())));
    }

    #[test]
    fn test_same_key_twice_gives_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("results"));

        let a = store.persist(&result("PXX-1")).unwrap();
        let b = store.persist(&result("PXX-1")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list_files().unwrap().len(), 2);
        assert_eq!(store.collect().len(), 2);
    }

    #[test]
    fn test_collect_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store.persist(&result("PXX-2")).unwrap();
        fs::write(dir.path().join("result-garbage.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let results = store.collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].test_key(), "PXX-2");
    }

    #[test]
    fn test_falls_back_to_local_list_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("results"));
        store.persist(&result("PXX-3")).unwrap();
        fs::remove_dir_all(store.dir()).unwrap();

        let results = store.collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].test_key(), "PXX-3");
    }

    #[test]
    fn test_unreadable_files_do_not_fall_back_to_local_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("results"));
        let path = store.persist(&result("PXX-5")).unwrap();
        fs::write(&path, "{truncated").unwrap();

        assert!(store.collect().is_empty());
        assert_eq!(store.local_results().len(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("results"));
        store.persist(&result("PXX-4")).unwrap();

        store.clear().unwrap();
        assert!(!store.dir().exists());
        assert!(store.local_results().is_empty());
        store.clear().unwrap();
        assert!(store.collect().is_empty());
    }
}
