pub mod bundle;
pub mod client;
pub mod orchestrator;
pub mod types;

pub use bundle::{ManualBundle, ManualReport, relocate_html_report};
pub use client::{UploadClient, XrayClient, XrayConfig};
pub use orchestrator::{
    BATCH_SIZE, CONSOLIDATED_BUNDLE, ExecutionTarget, OrchestrationReport, OrchestratorSettings, SpecReport,
    UploadOrchestrator, bundle_name, group_by_spec, resolve_targets,
};
pub use types::{ExecutionInfo, ImportRequest, ImportResponse, UploadError, UploadResult};
