pub mod context;
pub mod executor;
pub mod types;

pub(crate) use context::ActiveStep;
pub use context::{Annotation, EXECUTION_ANNOTATION, TestContext};
pub(crate) use executor::panic_message;
pub use executor::StepExecutor;
pub use types::{StepError, StepOptions, StepRecord, StepStatus};
