// Execution Events
// Progress reporting and event types for matrix job execution

use super::models::{JobState, JobStatus, JobVariant, StepStatus};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while matrix entries execute.
///
/// Every text payload has already been passed through the job's redactor.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Fan-out over a matrix started
    FanoutStarted {
        total_jobs: usize,
        variant: JobVariant,
    },

    /// All jobs of a fan-out finished
    FanoutCompleted {
        succeeded: usize,
        failed: usize,
        duration: Duration,
    },

    /// Job execution started
    JobStarted {
        job_name: String,
        repo_name: String,
        runner_label: String,
        total_steps: usize,
    },

    /// Job execution completed
    JobCompleted {
        job_name: String,
        status: JobStatus,
        reached: Option<JobState>,
        duration: Duration,
    },

    /// Step execution started
    StepStarted {
        job_name: String,
        step_name: String,
        step_index: usize,
    },

    /// One line of step output (stdout/stderr)
    StepOutput {
        job_name: String,
        step_index: usize,
        output: String,
        is_error: bool,
    },

    /// Step execution completed
    StepCompleted {
        job_name: String,
        step_name: String,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    },

    /// Step was skipped because an earlier step failed
    StepSkipped {
        job_name: String,
        step_name: String,
        step_index: usize,
        reason: String,
    },

    /// Informational message about a job
    Log {
        level: LogLevel,
        message: String,
        job_name: Option<String>,
    },

    /// Execution error occurred
    Error {
        message: String,
        job_name: Option<String>,
        step_index: Option<usize>,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
}

impl ExecutionEvent {
    pub fn fanout_started(total_jobs: usize, variant: JobVariant) -> Self {
        Self::FanoutStarted {
            total_jobs,
            variant,
        }
    }

    pub fn fanout_completed(succeeded: usize, failed: usize, duration: Duration) -> Self {
        Self::FanoutCompleted {
            succeeded,
            failed,
            duration,
        }
    }

    /// Create a job started event
    pub fn job_started(
        job_name: impl Into<String>,
        repo_name: impl Into<String>,
        runner_label: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self::JobStarted {
            job_name: job_name.into(),
            repo_name: repo_name.into(),
            runner_label: runner_label.into(),
            total_steps,
        }
    }

    /// Create a job completed event
    pub fn job_completed(
        job_name: impl Into<String>,
        status: JobStatus,
        reached: Option<JobState>,
        duration: Duration,
    ) -> Self {
        Self::JobCompleted {
            job_name: job_name.into(),
            status,
            reached,
            duration,
        }
    }

    /// Create a step started event
    pub fn step_started(
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
    ) -> Self {
        Self::StepStarted {
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
        }
    }

    /// Create a step output event
    pub fn step_output(
        job_name: impl Into<String>,
        step_index: usize,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::StepOutput {
            job_name: job_name.into(),
            step_index,
            output: output.into(),
            is_error,
        }
    }

    /// Create a step completed event
    pub fn step_completed(
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::StepCompleted {
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
            status,
            duration,
            exit_code,
        }
    }

    pub fn step_skipped(
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::StepSkipped {
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
            reason: reason.into(),
        }
    }

    /// Create an info log event
    pub fn info(message: impl Into<String>, job_name: Option<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
            job_name,
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>, job_name: Option<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
            job_name,
        }
    }

    /// Create an execution error event
    pub fn execution_error(
        message: impl Into<String>,
        job_name: Option<String>,
        step_index: Option<usize>,
    ) -> Self {
        Self::Error {
            message: message.into(),
            job_name,
            step_index,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
