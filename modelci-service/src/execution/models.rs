// Execution Models
// Job variants, validation passes, job states and step/job results

use crate::matrix::MatrixEntry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Device a validation pass runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the converted model is exercised during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Eager run with just-in-time compilation
    Compile,
    /// Ahead-of-time compiled artifact
    Aoti,
    /// Evaluation run
    Eval,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Compile => "compile",
            ValidationMode::Aoti => "aoti",
            ValidationMode::Eval => "eval",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `validate(model, device, mode)` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidationPass {
    pub device: Device,
    pub mode: ValidationMode,
}

impl ValidationPass {
    pub const fn new(device: Device, mode: ValidationMode) -> Self {
        Self { device, mode }
    }
}

impl fmt::Display for ValidationPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.mode)
    }
}

const CPU_COMPILE: [ValidationPass; 1] =
    [ValidationPass::new(Device::Cpu, ValidationMode::Compile)];
const CPU_AOTI: [ValidationPass; 1] = [ValidationPass::new(Device::Cpu, ValidationMode::Aoti)];
const GPU_ALL: [ValidationPass; 3] = [
    ValidationPass::new(Device::Cuda, ValidationMode::Compile),
    ValidationPass::new(Device::Cuda, ValidationMode::Aoti),
    ValidationPass::new(Device::Cuda, ValidationMode::Eval),
];

/// Which executor variant a matrix entry is run under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobVariant {
    /// CPU job with a single compile pass
    CpuCompile,
    /// CPU job with a single ahead-of-time pass
    CpuAoti,
    /// GPU job with compile, aoti and eval passes
    Gpu,
}

impl JobVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobVariant::CpuCompile => "cpu-compile",
            JobVariant::CpuAoti => "cpu-aoti",
            JobVariant::Gpu => "gpu",
        }
    }

    /// Validation passes, in execution order
    pub fn passes(&self) -> &'static [ValidationPass] {
        match self {
            JobVariant::CpuCompile => &CPU_COMPILE,
            JobVariant::CpuAoti => &CPU_AOTI,
            JobVariant::Gpu => &GPU_ALL,
        }
    }

    pub fn device(&self) -> Device {
        match self {
            JobVariant::CpuCompile | JobVariant::CpuAoti => Device::Cpu,
            JobVariant::Gpu => Device::Cuda,
        }
    }

    /// Whether entries built for `platform` can run under this variant
    pub fn supports_platform(&self, platform: &str) -> bool {
        let is_cuda = platform == Device::Cuda.as_str();
        match self.device() {
            Device::Cuda => is_cuda,
            Device::Cpu => !is_cuda,
        }
    }
}

impl fmt::Display for JobVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu-compile" => Ok(JobVariant::CpuCompile),
            "cpu-aoti" => Ok(JobVariant::CpuAoti),
            "gpu" => Ok(JobVariant::Gpu),
            other => Err(format!(
                "unknown job variant '{}' (expected cpu-compile, cpu-aoti or gpu)",
                other
            )),
        }
    }
}

/// States of the per-entry job state machine.
///
/// Transitions only ever move forward:
/// `Init → DependenciesInstalled → CheckpointAcquired → CheckpointConverted
/// → Validated(pass)… → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    DependenciesInstalled,
    CheckpointAcquired,
    CheckpointConverted,
    Validated(ValidationPass),
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Init => f.write_str("Init"),
            JobState::DependenciesInstalled => f.write_str("DependenciesInstalled"),
            JobState::CheckpointAcquired => f.write_str("CheckpointAcquired"),
            JobState::CheckpointConverted => f.write_str("CheckpointConverted"),
            JobState::Validated(pass) => write!(f, "Validated({})", pass),
            JobState::Done => f.write_str("Done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub exit_code: Option<i32>,
}

impl StepResult {
    pub fn skipped(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped,
            output: String::new(),
            error: None,
            duration: Duration::ZERO,
            exit_code: None,
        }
    }
}

/// Outcome of one matrix entry's execution
#[derive(Debug)]
pub struct JobResult {
    pub job_name: String,
    pub entry: MatrixEntry,
    pub variant: JobVariant,
    pub status: JobStatus,
    /// Last state the job fully reached (None if `Init` itself failed)
    pub reached: Option<JobState>,
    /// State whose step failed, if any
    pub failed_state: Option<JobState>,
    /// Human readable failure, already free of secrets
    pub error: Option<String>,
    pub steps: Vec<StepResult>,
    pub duration: Duration,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Steps that actually ran (not skipped)
    pub fn executed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps
            .iter()
            .filter(|s| s.status != StepStatus::Skipped)
    }
}
