// Execution Context
// Per-job transient state, created at job start and dropped at job end

use super::error::JobError;
use super::models::{Device, JobState, ValidationMode, ValidationPass};
use crate::config::{CommandLine, ServiceConfig, ROOT_ENV};
use crate::matrix::MatrixEntry;
use crate::runners::StepCommand;

use std::collections::HashMap;
use std::path::PathBuf;

/// State owned by one job execution. Never shared between jobs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub job_name: String,
    /// Working root every command runs in
    pub root: PathBuf,
    pub repo_name: String,
    /// Environment bindings derived from the matrix entry
    pub env: HashMap<String, String>,
    /// Where the checkpoint is downloaded to
    pub checkpoint_dir: PathBuf,
    /// Converted model artifact, set once conversion succeeded
    pub model_path: Option<PathBuf>,
    /// Device and mode of the current validation pass
    pub device: Option<Device>,
    pub mode: Option<ValidationMode>,
    /// Last state fully reached
    pub state: Option<JobState>,
}

impl ExecutionContext {
    /// Establish the working root and bind the entry's environment (the `Init` state)
    pub fn init(config: &ServiceConfig, entry: &MatrixEntry) -> Result<Self, JobError> {
        if !config.root.is_dir() {
            return Err(JobError::MissingRoot(config.root.clone()));
        }

        let mut env = HashMap::new();
        env.insert(ROOT_ENV.to_string(), config.root.display().to_string());
        env.insert("REPO_NAME".to_string(), entry.repo_name.clone());
        env.insert("MODEL_NAME".to_string(), entry.model_name.clone());
        env.insert("RUNNER".to_string(), entry.runner_label.clone());
        env.insert("PLATFORM".to_string(), entry.platform.clone());

        Ok(Self {
            job_name: entry.job_name(),
            root: config.root.clone(),
            repo_name: entry.repo_name.clone(),
            env,
            checkpoint_dir: config.checkpoint_dir(&entry.repo_name),
            model_path: None,
            device: None,
            mode: None,
            state: Some(JobState::Init),
        })
    }

    /// Build a command rooted at the working directory with the job's env bindings
    pub fn command<I, S>(&self, line: &CommandLine, extra: I) -> StepCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        line.to_command(extra, &self.root).with_env(&self.env)
    }

    /// Record a newly reached state
    pub fn advance(&mut self, state: JobState) {
        self.state = Some(state);
    }

    /// Select the pass the next validation command runs, exposing it as `DEVICE` and `MODE`
    pub fn enter_validation(&mut self, pass: ValidationPass) {
        self.device = Some(pass.device);
        self.mode = Some(pass.mode);
        self.env.insert("DEVICE".to_string(), pass.device.to_string());
        self.env.insert("MODE".to_string(), pass.mode.to_string());
    }
}
