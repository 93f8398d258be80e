// Job Executor
// Drives one matrix entry through the job state machine

use super::context::ExecutionContext;
use super::error::JobError;
use super::events::{EventSender, ExecutionEvent, ProgressSender};
use super::models::{JobResult, JobState, JobStatus, JobVariant, StepResult, StepStatus};
use super::steps::JobStep;
use crate::checkpoint::{
    converted_model_path, prepare_checkpoint_dir, EnvSecretStore, Redactor, SecretStore,
};
use crate::config::ServiceConfig;
use crate::matrix::MatrixEntry;
use crate::runners::{ShellConfig, ShellOutput, ShellRunner, StepCommand, StepRunner};
use crate::utils::{bytes_to_readable, dir_size};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Executes matrix entries. Cheap to clone; clones share config, runner and secrets.
#[derive(Clone)]
pub struct JobExecutor {
    config: Arc<ServiceConfig>,
    runner: Arc<dyn StepRunner>,
    secrets: Arc<dyn SecretStore>,
    event_tx: Option<ProgressSender>,
}

impl JobExecutor {
    /// Executor that spawns real processes and reads secrets from the environment
    pub fn new(config: ServiceConfig) -> Self {
        let runner = ShellRunner::with_config(ShellConfig {
            timeout: config.step_timeout(),
        });
        Self {
            config: Arc::new(config),
            runner: Arc::new(runner),
            secrets: Arc::new(EnvSecretStore),
            event_tx: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn StepRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> &Option<ProgressSender> {
        &self.event_tx
    }

    /// Run every step for `entry` under `variant`.
    ///
    /// Never panics on step failure: the first failing step ends the job, the
    /// remaining steps are recorded as skipped and the outcome is returned.
    pub async fn execute(&self, entry: &MatrixEntry, variant: JobVariant) -> JobResult {
        let start = Instant::now();
        let job_name = entry.job_name();
        let steps = JobStep::plan(variant, entry);

        info!(job = %job_name, %variant, steps = steps.len(), "job started");
        self.event_tx.send_event(ExecutionEvent::job_started(
            &job_name,
            &entry.repo_name,
            &entry.runner_label,
            steps.len(),
        ));

        let mut failure: Option<(JobState, JobError)> = None;
        let mut ctx = match self.init(entry, variant) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                failure = Some((JobState::Init, e));
                None
            }
        };

        let mut results = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let ctx = match ctx.as_mut() {
                Some(ctx) if failure.is_none() => ctx,
                _ => {
                    let name = step.name();
                    self.event_tx.send_event(ExecutionEvent::step_skipped(
                        &job_name,
                        &name,
                        index,
                        "an earlier step failed",
                    ));
                    results.push(StepResult::skipped(name));
                    continue;
                }
            };

            if let JobStep::Validate(pass) = step {
                ctx.enter_validation(*pass);
            }

            let (result, error) = self.run_step(*step, index, ctx, entry).await;
            results.push(result);

            match error {
                None => {
                    let state = step.target_state();
                    ctx.advance(state);
                    self.after_step(*step, ctx);
                    info!(job = %job_name, %state, "state reached");
                }
                Some(e) => {
                    warn!(job = %job_name, step = %step, error = %e, "step failed");
                    self.event_tx.send_event(ExecutionEvent::execution_error(
                        e.to_string(),
                        Some(job_name.clone()),
                        Some(index),
                    ));
                    failure = Some((step.target_state(), e));
                }
            }
        }

        if failure.is_none() {
            if let Some(ctx) = ctx.as_mut() {
                ctx.advance(JobState::Done);
            }
        }

        let reached = ctx.as_ref().and_then(|c| c.state);
        let duration = start.elapsed();
        let status = if failure.is_none() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };

        let (failed_state, error) = match failure {
            Some((state, e)) => (Some(state), Some(e.to_string())),
            None => (None, None),
        };

        match &error {
            None => info!(job = %job_name, ?duration, "job succeeded"),
            Some(message) => warn!(job = %job_name, ?failed_state, error = %message, "job failed"),
        }
        self.event_tx.send_event(ExecutionEvent::job_completed(
            &job_name, status, reached, duration,
        ));

        JobResult {
            job_name,
            entry: entry.clone(),
            variant,
            status,
            reached,
            failed_state,
            error,
            steps: results,
            duration,
        }
    }

    /// The `Init` state: variant check, then the working context
    fn init(&self, entry: &MatrixEntry, variant: JobVariant) -> Result<ExecutionContext, JobError> {
        if !variant.supports_platform(&entry.platform) {
            return Err(JobError::VariantMismatch {
                variant,
                platform: entry.platform.clone(),
            });
        }
        ExecutionContext::init(&self.config, entry)
    }

    async fn run_step(
        &self,
        step: JobStep,
        index: usize,
        ctx: &ExecutionContext,
        entry: &MatrixEntry,
    ) -> (StepResult, Option<JobError>) {
        let start = Instant::now();
        let name = step.name();
        self.event_tx
            .send_event(ExecutionEvent::step_started(&ctx.job_name, &name, index));

        let mut stdout = Vec::new();
        let mut exit_code = None;
        let error = match self.step_commands(step, ctx, entry).await {
            Err(e) => Some(e),
            Ok(commands) => {
                // Only secrets bound to this step's commands; dropped when the step ends
                let redactor = Redactor::new(
                    commands
                        .iter()
                        .flat_map(|c| c.secrets.iter().map(|binding| &binding.token)),
                );
                let mut error = None;
                for command in &commands {
                    let output = self
                        .run_command(command, index, &ctx.job_name, &redactor)
                        .await;
                    exit_code = output.exit_code;
                    if !output.stdout.is_empty() {
                        stdout.push(redactor.redact(&output.stdout));
                    }
                    if !output.success() {
                        let detail = redactor.redact(&failure_detail(command, &output));
                        error = Some(step.failure(&ctx.repo_name, detail));
                        break;
                    }
                }
                error
            }
        };

        let status = if error.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Succeeded
        };
        let duration = start.elapsed();

        self.event_tx.send_event(ExecutionEvent::step_completed(
            &ctx.job_name,
            &name,
            index,
            status,
            duration,
            exit_code,
        ));

        let result = StepResult {
            step_name: name,
            status,
            output: stdout.join("\n"),
            error: error.as_ref().map(|e| e.to_string()),
            duration,
            exit_code,
        };
        (result, error)
    }

    async fn step_commands(
        &self,
        step: JobStep,
        ctx: &ExecutionContext,
        entry: &MatrixEntry,
    ) -> Result<Vec<StepCommand>, JobError> {
        if let JobStep::AcquireCheckpoint(_) = step {
            prepare_checkpoint_dir(ctx).await.map_err(|e| {
                step.failure(
                    &ctx.repo_name,
                    format!("cannot create {}: {}", ctx.checkpoint_dir.display(), e),
                )
            })?;
        }
        step.commands(ctx, entry, &self.config, self.secrets.as_ref())
    }

    async fn run_command(
        &self,
        command: &StepCommand,
        index: usize,
        job_name: &str,
        redactor: &Redactor,
    ) -> ShellOutput {
        let events = &self.event_tx;
        let sink = |line: &str, is_error: bool| {
            events.send_event(ExecutionEvent::step_output(
                job_name,
                index,
                redactor.redact(line),
                is_error,
            ));
        };
        self.runner.run(command, &sink).await
    }

    fn after_step(&self, step: JobStep, ctx: &mut ExecutionContext) {
        match step {
            JobStep::AcquireCheckpoint(_) => match dir_size(&ctx.checkpoint_dir) {
                Ok(size) => {
                    let size = bytes_to_readable(size);
                    info!(
                        job = %ctx.job_name,
                        dir = %ctx.checkpoint_dir.display(),
                        %size,
                        "checkpoint downloaded"
                    );
                    self.event_tx.send_event(ExecutionEvent::info(
                        format!(
                            "checkpoint downloaded to {} ({})",
                            ctx.checkpoint_dir.display(),
                            size
                        ),
                        Some(ctx.job_name.clone()),
                    ));
                }
                Err(e) => {
                    debug!(job = %ctx.job_name, error = %e, "could not size checkpoint dir");
                    self.event_tx.send_event(ExecutionEvent::warning(
                        format!("could not size {}: {}", ctx.checkpoint_dir.display(), e),
                        Some(ctx.job_name.clone()),
                    ));
                }
            },
            JobStep::ConvertCheckpoint => {
                ctx.model_path = Some(converted_model_path(ctx, &self.config));
            }
            JobStep::InstallDependencies | JobStep::Validate(_) => {}
        }
    }
}

/// Short description of why a command failed
fn failure_detail(command: &StepCommand, output: &ShellOutput) -> String {
    let last_stderr = output
        .stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty());

    match (output.exit_code, last_stderr) {
        (Some(code), Some(line)) => {
            format!("'{}' exited with code {}: {}", command.program, code, line)
        }
        (Some(code), None) => format!("'{}' exited with code {}", command.program, code),
        // Spawn failures and timeouts explain themselves on stderr
        (None, Some(_)) => output.stderr.trim().to_string(),
        (None, None) => format!("'{}' was terminated", command.program),
    }
}
