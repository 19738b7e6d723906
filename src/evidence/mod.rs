pub mod backend;
pub mod collector;
pub mod types;
pub mod utils;

pub use backend::{CaptureBackend, CaptureResult, MockFramebuffer, ScreenshotOptions};
pub use collector::EvidenceCollector;
pub use types::{ContentType, Evidence, EvidenceContent, EvidenceError, EvidenceResult};
pub use utils::{generate_timestamp, sanitize_name, strip_ansi, unique_path};
