// Job Steps
// The ordered steps of a matrix job and the commands each one issues

use super::context::ExecutionContext;
use super::error::JobError;
use super::models::{JobState, JobVariant, ValidationPass};
use crate::checkpoint::{acquisition_commands, conversion_command, InstallMethod, SecretStore};
use crate::config::ServiceConfig;
use crate::matrix::MatrixEntry;
use crate::runners::StepCommand;

use std::fmt;

/// One step of the job state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStep {
    InstallDependencies,
    AcquireCheckpoint(InstallMethod),
    ConvertCheckpoint,
    Validate(ValidationPass),
}

impl JobStep {
    /// Steps for an entry under a variant, in execution order
    pub fn plan(variant: JobVariant, entry: &MatrixEntry) -> Vec<JobStep> {
        let mut steps = vec![
            JobStep::InstallDependencies,
            JobStep::AcquireCheckpoint(entry.install_method),
            JobStep::ConvertCheckpoint,
        ];
        steps.extend(variant.passes().iter().copied().map(JobStep::Validate));
        steps
    }

    pub fn name(&self) -> String {
        match self {
            JobStep::InstallDependencies => "install-dependencies".to_string(),
            JobStep::AcquireCheckpoint(method) => format!("download-checkpoint ({})", method),
            JobStep::ConvertCheckpoint => "convert-checkpoint".to_string(),
            JobStep::Validate(pass) => format!("validate {}", pass),
        }
    }

    /// State the job reaches when this step succeeds
    pub fn target_state(&self) -> JobState {
        match self {
            JobStep::InstallDependencies => JobState::DependenciesInstalled,
            JobStep::AcquireCheckpoint(_) => JobState::CheckpointAcquired,
            JobStep::ConvertCheckpoint => JobState::CheckpointConverted,
            JobStep::Validate(pass) => JobState::Validated(*pass),
        }
    }

    /// Commands to run for this step, in order
    pub fn commands(
        &self,
        ctx: &ExecutionContext,
        entry: &MatrixEntry,
        config: &ServiceConfig,
        secrets: &dyn SecretStore,
    ) -> Result<Vec<StepCommand>, JobError> {
        match self {
            JobStep::InstallDependencies => Ok(vec![ctx.command(
                &config.commands.install_dependencies,
                Vec::<String>::new(),
            )]),
            JobStep::AcquireCheckpoint(_) => acquisition_commands(ctx, entry, config, secrets),
            JobStep::ConvertCheckpoint => Ok(vec![conversion_command(ctx, config)]),
            JobStep::Validate(pass) => {
                let model_path = ctx.model_path.as_ref().ok_or_else(|| JobError::Validation {
                    pass: *pass,
                    detail: "no converted model artifact".to_string(),
                })?;
                Ok(vec![ctx.command(
                    &config.commands.validate,
                    [
                        model_path.display().to_string(),
                        pass.device.to_string(),
                        pass.mode.to_string(),
                    ],
                )])
            }
        }
    }

    /// The job error for this step failing with `detail`
    pub fn failure(&self, repo_name: &str, detail: impl Into<String>) -> JobError {
        let detail = detail.into();
        match self {
            JobStep::InstallDependencies => JobError::DependencyInstall { detail },
            JobStep::AcquireCheckpoint(_) => JobError::Download {
                repo: repo_name.to_string(),
                detail,
            },
            JobStep::ConvertCheckpoint => JobError::Conversion {
                repo: repo_name.to_string(),
                detail,
            },
            JobStep::Validate(pass) => JobError::Validation {
                pass: *pass,
                detail,
            },
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::StaticSecretStore;
    use crate::execution::models::{Device, ValidationMode};
    use crate::matrix::MatrixGenerator;

    fn periodic_entry(index: usize) -> MatrixEntry {
        MatrixGenerator::new()
            .generate("periodic", "cpu")
            .unwrap()
            .include
            .remove(index)
    }

    #[test]
    fn test_plan_order() {
        let entry = periodic_entry(0);
        let steps = JobStep::plan(JobVariant::Gpu, &entry);

        let states: Vec<_> = steps.iter().map(|s| s.target_state()).collect();
        assert_eq!(
            states,
            vec![
                JobState::DependenciesInstalled,
                JobState::CheckpointAcquired,
                JobState::CheckpointConverted,
                JobState::Validated(ValidationPass::new(Device::Cuda, ValidationMode::Compile)),
                JobState::Validated(ValidationPass::new(Device::Cuda, ValidationMode::Aoti)),
                JobState::Validated(ValidationPass::new(Device::Cuda, ValidationMode::Eval)),
            ]
        );
        assert_eq!(JobStep::plan(JobVariant::CpuAoti, &entry).len(), 4);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(JobStep::InstallDependencies.name(), "install-dependencies");
        assert_eq!(
            JobStep::AcquireCheckpoint(InstallMethod::HuggingFaceCli).name(),
            "download-checkpoint (huggingface-cli)"
        );
        assert_eq!(
            JobStep::Validate(ValidationPass::new(Device::Cpu, ValidationMode::Aoti)).to_string(),
            "validate cpu/aoti"
        );
    }

    #[test]
    fn test_validation_command_arguments() {
        let temp = tempfile::tempdir().unwrap();
        let config = ServiceConfig::default().with_root(temp.path());
        let entry = periodic_entry(0);
        let mut ctx = ExecutionContext::init(&config, &entry).unwrap();
        let pass = ValidationPass::new(Device::Cuda, ValidationMode::Eval);
        let step = JobStep::Validate(pass);

        // Not converted yet
        assert!(matches!(
            step.commands(&ctx, &entry, &config, &StaticSecretStore::new()),
            Err(JobError::Validation { .. })
        ));

        ctx.model_path = Some(config.model_path(&entry.repo_name));
        let commands = step
            .commands(&ctx, &entry, &config, &StaticSecretStore::new())
            .unwrap();
        let args = &commands[0].args;
        assert_eq!(args[args.len() - 2], "cuda");
        assert_eq!(args[args.len() - 1], "eval");
        assert!(args[args.len() - 3].ends_with("model.pth"));
    }

    #[test]
    fn test_failure_mapping() {
        let err = JobStep::ConvertCheckpoint.failure("org/model", "exit code 2");
        assert!(matches!(err, JobError::Conversion { .. }));
        assert!(err.to_string().contains("org/model"));

        let err = JobStep::InstallDependencies.failure("org/model", "boom");
        assert!(matches!(err, JobError::DependencyInstall { .. }));
    }
}
