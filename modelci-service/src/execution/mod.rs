// Execution Module
// Job state machine, per-job context, progress events and matrix fan-out

pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod fanout;
pub mod models;
pub mod steps;

// Re-export key types
pub use context::ExecutionContext;
pub use error::JobError;
pub use events::{
    progress_channel, EventSender, ExecutionEvent, LogLevel, ProgressReceiver, ProgressSender,
};
pub use executor::JobExecutor;
pub use fanout::{Fanout, FanoutSummary};
pub use models::{
    Device, JobResult, JobState, JobStatus, JobVariant, StepResult, StepStatus, ValidationMode,
    ValidationPass,
};
pub use steps::JobStep;
