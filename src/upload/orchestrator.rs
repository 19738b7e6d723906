//! End-of-run consolidation and upload.
//!
//! Results are grouped by spec file, each spec is mapped to an existing or a new
//! test execution, and tests are sent in batches of [`BATCH_SIZE`]. A manual
//! bundle is written first, and the result store is always cleared at the end.

use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::bundle::{ManualBundle, relocate_html_report};
use super::client::UploadClient;
use super::types::{ExecutionInfo, ImportRequest};
use crate::config::{self, Config};
use crate::runner::{TestEntry, TestResult};
use crate::store::ResultStore;

/// Maximum number of tests in one import call
pub const BATCH_SIZE: usize = 20;

/// Bundle name for results that carry no spec file
pub const CONSOLIDATED_BUNDLE: &str = "consolidated.json";

const UPLOAD_DESCRIPTION: &str = "Imported via xray-harness";

/// Where one spec's results go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// Append to an execution that already exists
    Existing(String),
    /// Create a new execution, optionally with a custom summary
    New { summary: Option<String> },
}

/// `login.spec.js` becomes `login.json`; an empty name becomes `consolidated.json`
pub fn bundle_name(spec_file: &str) -> String {
    if spec_file.is_empty() {
        return CONSOLIDATED_BUNDLE.to_string();
    }
    let stem = spec_file
        .strip_suffix(".spec.js")
        .or_else(|| spec_file.strip_suffix(".js"));
    match stem {
        Some(stem) => format!("{}.json", stem),
        None if spec_file.ends_with(".json") => spec_file.to_string(),
        None => format!("{}.json", spec_file),
    }
}

/// Group results by bundle name, keeping each group's insertion order
pub fn group_by_spec(results: Vec<TestResult>) -> BTreeMap<String, Vec<TestResult>> {
    let mut groups: BTreeMap<String, Vec<TestResult>> = BTreeMap::new();
    for result in results {
        groups.entry(bundle_name(&result.spec_file)).or_default().push(result);
    }
    groups
}

/// Map sorted spec names to execution targets.
///
/// Spec `i` appends to `execution_keys[i]` when that entry is non-empty. Every
/// other spec creates a new execution and takes the next unused summary.
pub fn resolve_targets(specs: &[String], execution_keys: &[String], summaries: &[String]) -> Vec<ExecutionTarget> {
    let mut next_summary = summaries.iter();
    specs
        .iter()
        .enumerate()
        .map(|(index, _)| match execution_keys.get(index).map(|k| k.trim()) {
            Some(key) if !key.is_empty() => ExecutionTarget::Existing(key.to_string()),
            _ => ExecutionTarget::New {
                summary: next_summary.next().cloned().filter(|s| !s.is_empty()),
            },
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub upload_enabled: bool,
    pub execution_keys: Vec<String>,
    pub summaries: Vec<String>,
    pub test_plan_key: Option<String>,
    pub project_key: Option<String>,
    pub manual_dir: PathBuf,
    pub html_report: PathBuf,
    pub debug_file: PathBuf,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_enabled: config.upload.enabled,
            execution_keys: config.upload.execution_keys.clone(),
            summaries: config.upload.summaries.clone(),
            test_plan_key: config.upload.test_plan_key.clone(),
            project_key: config.upload.project_key.clone(),
            manual_dir: config.paths.manual_dir.clone(),
            html_report: config.paths.html_report.clone(),
            debug_file: config.paths.debug_file.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(config::get())
    }
}

/// What happened to one spec group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecReport {
    pub name: String,
    pub tests: usize,
    pub target: ExecutionTarget,
    pub batches: usize,
    pub failed_batches: usize,
    /// Execution the tests ended up in, when known
    pub execution_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestrationReport {
    pub results: usize,
    pub specs: Vec<SpecReport>,
    pub bundle_dir: Option<PathBuf>,
    pub uploaded: bool,
}

impl OrchestrationReport {
    pub fn batches_attempted(&self) -> usize {
        self.specs.iter().map(|s| s.batches).sum()
    }

    pub fn batches_failed(&self) -> usize {
        self.specs.iter().map(|s| s.failed_batches).sum()
    }

    pub fn execution_keys(&self) -> Vec<&str> {
        self.specs.iter().filter_map(|s| s.execution_key.as_deref()).collect()
    }
}

pub struct UploadOrchestrator {
    settings: OrchestratorSettings,
}

impl UploadOrchestrator {
    pub fn new(settings: OrchestratorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Consolidate everything in `store`, upload it when enabled, then clear the store.
    ///
    /// Never fails: every problem is logged and reflected in the report.
    pub fn run(&self, store: &dyn ResultStore, client: Option<&mut dyn UploadClient>) -> OrchestrationReport {
        let results = store.collect();
        let mut report = OrchestrationReport {
            results: results.len(),
            ..Default::default()
        };

        if results.is_empty() {
            info!("no test results to process");
            self.cleanup(store);
            return report;
        }

        let groups = group_by_spec(results);
        info!(results = report.results, specs = groups.len(), "consolidating test results");
        report.bundle_dir = self.write_bundle(&groups);

        let specs: Vec<String> = groups.keys().cloned().collect();
        let targets = resolve_targets(&specs, &self.settings.execution_keys, &self.settings.summaries);

        let client = match client {
            Some(client) if self.settings.upload_enabled => Some(client),
            Some(_) => {
                info!("upload disabled, skipping Xray upload");
                None
            }
            None if self.settings.upload_enabled => {
                warn!("upload enabled but no Xray client available, skipping upload");
                None
            }
            None => None,
        };
        report.uploaded = client.is_some();

        match client {
            Some(client) => {
                for ((name, results), target) in groups.iter().zip(targets) {
                    report.specs.push(self.upload_spec(client, name, results, target));
                }
            }
            None => {
                for ((name, results), target) in groups.iter().zip(targets) {
                    report.specs.push(SpecReport {
                        name: name.clone(),
                        tests: results.len(),
                        execution_key: match &target {
                            ExecutionTarget::Existing(key) => Some(key.clone()),
                            ExecutionTarget::New { .. } => None,
                        },
                        target,
                        batches: 0,
                        failed_batches: 0,
                    });
                }
            }
        }

        if report.uploaded {
            info!(
                batches = report.batches_attempted(),
                failed = report.batches_failed(),
                "upload finished"
            );
        }
        self.cleanup(store);
        report
    }

    fn upload_spec(
        &self,
        client: &mut dyn UploadClient,
        name: &str,
        results: &[TestResult],
        target: ExecutionTarget,
    ) -> SpecReport {
        let entries: Vec<TestEntry> = results.iter().map(|r| r.entry.clone()).collect();
        let total_batches = entries.len().div_ceil(BATCH_SIZE);
        let (mut execution_key, summary) = match &target {
            ExecutionTarget::Existing(key) => {
                info!(spec = name, execution = %key, "appending to existing execution");
                (Some(key.clone()), None)
            }
            ExecutionTarget::New { summary } => {
                info!(spec = name, summary = summary.as_deref().unwrap_or("<default>"), "creating new execution");
                (None, summary.clone())
            }
        };

        let mut failed_batches = 0;
        for (index, chunk) in entries.chunks(BATCH_SIZE).enumerate() {
            let batch = index + 1;
            info!(spec = name, batch, total = total_batches, tests = chunk.len(), "uploading batch");

            let request = match &execution_key {
                Some(key) => ImportRequest::append(key.clone(), chunk.to_vec()),
                None => ImportRequest::create(self.execution_info(summary.as_deref()), chunk.to_vec()),
            };

            match client.upload(&request) {
                Ok(response) => {
                    if execution_key.is_none() {
                        info!(spec = name, execution = %response.key, "secured test execution key");
                        execution_key = Some(response.key);
                    }
                }
                Err(e) => {
                    failed_batches += 1;
                    error!(spec = name, batch, error = %e, "failed to upload batch");
                    self.dump_failed_batch(&request.tests);
                }
            }
        }

        SpecReport {
            name: name.to_string(),
            tests: entries.len(),
            target,
            batches: total_batches,
            failed_batches,
            execution_key,
        }
    }

    fn execution_info(&self, summary: Option<&str>) -> ExecutionInfo {
        ExecutionInfo {
            summary: summary.map(str::to_string).unwrap_or_else(|| {
                format!(
                    "Automated Test Execution - {}",
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
                )
            }),
            description: UPLOAD_DESCRIPTION.to_string(),
            test_plan_key: self.settings.test_plan_key.clone(),
            project: self.settings.project_key.clone(),
        }
    }

    fn write_bundle(&self, groups: &BTreeMap<String, Vec<TestResult>>) -> Option<PathBuf> {
        let bundle = ManualBundle::new(&self.settings.manual_dir)
            .project_key(self.settings.project_key.clone())
            .test_plan_key(self.settings.test_plan_key.clone());

        let dir = match bundle.write(groups) {
            Ok(dir) => dir,
            Err(e) => {
                error!(dir = %self.settings.manual_dir.display(), error = %e, "failed to write manual bundle");
                return None;
            }
        };

        if let Err(e) = relocate_html_report(&self.settings.html_report, &dir) {
            error!(source = %self.settings.html_report.display(), error = %e, "failed to move HTML report");
        }
        info!(dir = %dir.display(), "manual import bundle ready");
        Some(dir)
    }

    /// Overwrites the debug file with the tests of the batch that just failed
    fn dump_failed_batch(&self, tests: &[TestEntry]) {
        let path = &self.settings.debug_file;
        let written = serde_json::to_string_pretty(tests)
            .map_err(std::io::Error::from)
            .and_then(|json| fs::write(path, json));
        match written {
            Ok(()) => info!(file = %path.display(), "saved failed upload payload"),
            Err(e) => error!(file = %path.display(), error = %e, "could not save failed upload payload"),
        }
    }

    fn cleanup(&self, store: &dyn ResultStore) {
        if let Err(e) = store.clear() {
            error!(error = %e, "failed to clear result store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TestStatus;
    use crate::store::RunStore;
    use crate::upload::{ImportResponse, UploadError, UploadResult};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    /// Records every request; creations get `NEW-<n>`, the listed calls fail
    #[derive(Default)]
    struct RecordingClient {
        requests: Vec<ImportRequest>,
        fail_calls: Vec<usize>,
    }

    impl UploadClient for RecordingClient {
        fn upload(&mut self, request: &ImportRequest) -> UploadResult<ImportResponse> {
            self.requests.push(request.clone());
            let call = self.requests.len();
            if self.fail_calls.contains(&call) {
                return Err(UploadError::Http {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let key = request
                .test_execution_key
                .clone()
                .unwrap_or_else(|| format!("NEW-{}", call));
            Ok(ImportResponse { key, id: None })
        }
    }

    fn result(key: &str, spec: &str) -> TestResult {
        TestResult {
            entry: TestEntry {
                test_key: key.to_string(),
                start: Utc::now(),
                finish: Utc::now(),
                status: TestStatus::Passed,
                comment: String::new(),
                steps: Vec::new(),
            },
            spec_file: spec.to_string(),
            target_execution_key: None,
        }
    }

    fn settings(dir: &Path) -> OrchestratorSettings {
        OrchestratorSettings {
            upload_enabled: true,
            execution_keys: Vec::new(),
            summaries: Vec::new(),
            test_plan_key: Some("PXX-PLAN".to_string()),
            project_key: Some("PXX".to_string()),
            manual_dir: dir.join("manual"),
            html_report: dir.join("custom-report/index.html"),
            debug_file: dir.join("debug.json"),
        }
    }

    fn store_with(dir: &Path, results: &[TestResult]) -> RunStore {
        let store = RunStore::new(dir.join("results"));
        for r in results {
            store.persist(r).unwrap();
        }
        store
    }

    #[test]
    fn test_bundle_name() {
        assert_eq!(bundle_name("login.spec.js"), "login.json");
        assert_eq!(bundle_name("legacy.js"), "legacy.json");
        assert_eq!(bundle_name("a.spec.json"), "a.spec.json");
        assert_eq!(bundle_name(""), "consolidated.json");
    }

    #[test]
    fn test_resolve_targets_index_mapping() {
        let specs = vec!["a.json".to_string(), "b.json".to_string(), "c.json".to_string()];
        let targets = resolve_targets(
            &specs,
            &["".to_string(), "PXX-2".to_string()],
            &["First".to_string(), "Second".to_string()],
        );
        assert_eq!(
            targets,
            vec![
                ExecutionTarget::New {
                    summary: Some("First".to_string())
                },
                ExecutionTarget::Existing("PXX-2".to_string()),
                ExecutionTarget::New {
                    summary: Some("Second".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_one_key_two_specs() {
        let specs = vec!["a.json".to_string(), "b.json".to_string()];
        let targets = resolve_targets(&specs, &["K1".to_string()], &[]);
        assert_eq!(
            targets,
            vec![
                ExecutionTarget::Existing("K1".to_string()),
                ExecutionTarget::New { summary: None },
            ]
        );
    }

    #[test]
    fn test_batches_of_twenty_and_key_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let results: Vec<TestResult> = (1..=45).map(|i| result(&format!("PXX-{}", i), "big.spec.js")).collect();
        let store = store_with(dir.path(), &results);
        let mut client = RecordingClient::default();

        let report = UploadOrchestrator::new(settings(dir.path())).run(&store, Some(&mut client));

        let sizes: Vec<usize> = client.requests.iter().map(|r| r.tests.len()).collect();
        assert_eq!(sizes, vec![20, 20, 5]);

        let first = &client.requests[0];
        assert_eq!(first.test_execution_key, None);
        let info = first.info.as_ref().unwrap();
        assert!(info.summary.starts_with("Automated Test Execution - "));
        assert_eq!(info.project.as_deref(), Some("PXX"));
        assert_eq!(info.test_plan_key.as_deref(), Some("PXX-PLAN"));

        for later in &client.requests[1..] {
            assert_eq!(later.test_execution_key.as_deref(), Some("NEW-1"));
            assert!(later.info.is_none());
        }
        assert_eq!(report.batches_attempted(), 3);
        assert_eq!(report.execution_keys(), vec!["NEW-1"]);
    }

    #[test]
    fn test_specs_map_to_keys_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            dir.path(),
            &[result("PXX-1", "b.spec.js"), result("PXX-2", "a.spec.js")],
        );
        let mut settings = settings(dir.path());
        settings.execution_keys = vec!["K1".to_string()];
        settings.summaries = vec!["Custom".to_string()];
        let mut client = RecordingClient::default();

        let report = UploadOrchestrator::new(settings).run(&store, Some(&mut client));

        assert_eq!(client.requests.len(), 2);
        assert_eq!(client.requests[0].test_execution_key.as_deref(), Some("K1"));
        assert_eq!(client.requests[0].tests[0].test_key, "PXX-2");
        assert!(client.requests[0].info.is_none());
        assert_eq!(client.requests[1].info.as_ref().unwrap().summary, "Custom");
        assert_eq!(client.requests[1].tests[0].test_key, "PXX-1");

        let names: Vec<&str> = report.specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_failed_batch_is_dumped_and_processing_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut results: Vec<TestResult> = (1..=25).map(|i| result(&format!("PXX-{}", i), "a.spec.js")).collect();
        results.push(result("PXX-99", "b.spec.js"));
        let store = store_with(dir.path(), &results);
        let mut client = RecordingClient {
            fail_calls: vec![1],
            ..Default::default()
        };

        let report = UploadOrchestrator::new(settings(dir.path())).run(&store, Some(&mut client));

        assert_eq!(client.requests.len(), 3);
        // the creation failed, so the second batch tries to create again
        assert!(client.requests[1].info.is_some());
        assert_eq!(report.batches_failed(), 1);
        assert_eq!(report.specs[0].execution_key.as_deref(), Some("NEW-2"));

        let dumped: Vec<TestEntry> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("debug.json")).unwrap()).unwrap();
        assert_eq!(dumped.len(), 20);
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_disabled_upload_still_bundles_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), &[result("PXX-1", "a.spec.js"), result("PXX-2", "")]);
        let mut settings = settings(dir.path());
        settings.upload_enabled = false;
        let mut client = RecordingClient::default();

        let report = UploadOrchestrator::new(settings).run(&store, Some(&mut client));

        assert!(client.requests.is_empty());
        assert!(!report.uploaded);
        let bundle = report.bundle_dir.unwrap();
        assert!(bundle.join("a.json").exists());
        assert!(bundle.join("consolidated.json").exists());
        assert!(!store.dir().exists());
        assert!(store.collect().is_empty());
    }

    #[test]
    fn test_no_results_only_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("results"));
        fs::create_dir_all(store.dir()).unwrap();
        let mut client = RecordingClient::default();

        let report = UploadOrchestrator::new(settings(dir.path())).run(&store, Some(&mut client));

        assert_eq!(report, OrchestrationReport::default());
        assert!(client.requests.is_empty());
        assert!(!store.dir().exists());
        assert!(!dir.path().join("manual").exists());
    }

    #[test]
    fn test_repeated_runs_keep_earlier_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = UploadOrchestrator::new(settings(dir.path()));

        let first_store = store_with(dir.path(), &[result("PXX-1", "a.spec.js")]);
        let first = orchestrator.run(&first_store, None).bundle_dir.unwrap();
        let second_store = store_with(dir.path(), &[result("PXX-2", "a.spec.js")]);
        let second = orchestrator.run(&second_store, None).bundle_dir.unwrap();

        assert_ne!(first, second);
        let earlier: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(first.join("a.json")).unwrap()).unwrap();
        assert_eq!(earlier["tests"][0]["testKey"], "PXX-1");
        let later: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(second.join("a.json")).unwrap()).unwrap();
        assert_eq!(later["tests"][0]["testKey"], "PXX-2");
    }

    #[test]
    fn test_enabled_upload_without_client_still_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(dir.path(), &[result("PXX-1", "a.spec.js"), result("PXX-2", "b.spec.js")]);
        let mut settings = settings(dir.path());
        settings.execution_keys = vec!["K1".to_string()];

        let report = UploadOrchestrator::new(settings).run(&store, None);

        assert!(!report.uploaded);
        assert_eq!(report.batches_attempted(), 0);
        assert_eq!(report.execution_keys(), vec!["K1"]);
        assert!(report.bundle_dir.unwrap().join("b.json").exists());
        assert!(!store.dir().exists());
        assert!(!dir.path().join("debug.json").exists());
    }

    #[test]
    fn test_html_report_is_moved_into_bundle() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("custom-report")).unwrap();
        fs::write(dir.path().join("custom-report/index.html"), "report").unwrap();
        let store = store_with(dir.path(), &[result("PXX-1", "a.spec.js")]);

        let report = UploadOrchestrator::new(settings(dir.path())).run(&store, None);

        assert!(report.bundle_dir.unwrap().join("report.html").exists());
        assert!(!dir.path().join("custom-report").exists());
    }
}
