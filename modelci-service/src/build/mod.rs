// Native Build Module
// Builds the native runner executables through git, Python and CMake

pub mod args;
pub mod plan;

pub use args::{BuildArgsError, BuildTarget, NativeBuildArgs, ParsedBuildArgs, USAGE};

use crate::config::ServiceConfig;
use crate::runners::{OutputSink, ShellConfig, ShellOutput, ShellRunner, StepCommand, StepRunner};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Required tool '{tool}' not found: {source}")]
    ToolNotFound {
        tool: String,
        #[source]
        source: which::Error,
    },

    #[error("Build step '{step}' failed{}", exit_suffix(.exit_code))]
    StepFailed {
        step: &'static str,
        exit_code: Option<i32>,
    },

    #[error("Could not determine the torch CMake prefix: {0}")]
    Probe(String),
}

fn exit_suffix(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

/// Runs the native build plan
#[derive(Clone)]
pub struct NativeBuilder {
    config: ServiceConfig,
    runner: Arc<dyn StepRunner>,
}

impl NativeBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        let runner = ShellRunner::with_config(ShellConfig {
            timeout: config.step_timeout(),
        });
        Self {
            config,
            runner: Arc::new(runner),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn StepRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Check that every tool the build shells out to is on PATH
    pub fn preflight(&self) -> Result<(), BuildError> {
        let commands = &self.config.commands;
        for tool in [&commands.git, &commands.python, &commands.cmake] {
            which::which(tool).map_err(|source| BuildError::ToolNotFound {
                tool: tool.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Run the build and return the artifact path
    pub async fn build(
        &self,
        args: &NativeBuildArgs,
        on_output: OutputSink<'_>,
    ) -> Result<PathBuf, BuildError> {
        info!(runtime = %args.target, link_torchao = args.link_torchao, "native build started");

        for command in plan::submodule_commands(&self.config) {
            self.step("submodules", &command, on_output).await?;
        }

        if plan::needs_executorch_install(args, &self.config) {
            let command = plan::executorch_install_command(&self.config);
            self.step("install-executorch", &command, on_output).await?;
        } else if args.target == BuildTarget::Et {
            info!("skipping ExecuTorch install");
        }

        let probe = plan::torch_prefix_probe(&self.config);
        let output = self.step("torch-prefix", &probe, on_output).await?;
        let prefix = output
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| BuildError::Probe("python printed nothing".to_string()))?
            .to_string();

        let configure = plan::configure_command(args, &self.config, &prefix);
        self.step("configure", &configure, on_output).await?;

        let build = plan::build_command(args, &self.config);
        self.step("build", &build, on_output).await?;

        let artifact = plan::artifact_path(args, &self.config);
        info!(artifact = %artifact.display(), "native build finished");
        Ok(artifact)
    }

    async fn step(
        &self,
        step: &'static str,
        command: &StepCommand,
        on_output: OutputSink<'_>,
    ) -> Result<ShellOutput, BuildError> {
        info!(step, command = %command, "running");
        let output = self.runner.run(command, on_output).await;
        if output.success() {
            Ok(output)
        } else {
            warn!(
                step,
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "build step failed"
            );
            Err(BuildError::StepFailed {
                step,
                exit_code: output.exit_code,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    /// Records commands; the torch probe prints a prefix, lines containing `fail_on` fail
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingRunner {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl StepRunner for RecordingRunner {
        async fn run(&self, command: &StepCommand, _on_output: OutputSink<'_>) -> ShellOutput {
            let line = command.to_string();
            self.calls.lock().unwrap().push(line.clone());

            let failed = self.fail_on.is_some_and(|m| line.contains(m));
            let stdout = if line.contains(plan::TORCH_PREFIX_PROBE) {
                "/opt/torch/share/cmake\n".to_string()
            } else {
                String::new()
            };
            ShellOutput {
                stdout,
                stderr: String::new(),
                exit_code: Some(if failed { 2 } else { 0 }),
            }
        }
    }

    fn ignore(_: &str, _: bool) {}

    fn builder(root: &std::path::Path, runner: Arc<RecordingRunner>) -> NativeBuilder {
        NativeBuilder::new(ServiceConfig::default().with_root(root)).with_runner(runner)
    }

    fn parse(tokens: &[&str]) -> NativeBuildArgs {
        match NativeBuildArgs::parse(tokens).unwrap() {
            ParsedBuildArgs::Build(args) => args,
            ParsedBuildArgs::Help => panic!("unexpected help"),
        }
    }

    #[tokio::test]
    async fn test_aoti_link_torchao_builds() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());

        let artifact = builder(temp.path(), runner.clone())
            .build(&parse(&["aoti", "link_torchao"]), &ignore)
            .await
            .unwrap();

        assert_eq!(artifact, temp.path().join("cmake-out/aoti_run"));
        let calls = runner.calls();
        assert_eq!(calls[0], "git submodule update --init");
        assert_eq!(calls[1], "git submodule sync");
        assert!(calls[2].starts_with("python3 -c"));
        assert!(calls[3].contains("-DCMAKE_PREFIX_PATH=/opt/torch/share/cmake"));
        assert!(calls[3].contains("-DLINK_TORCHAO=ON"));
        assert_eq!(calls[4], "cmake --build ./cmake-out --target aoti_run");
        assert_eq!(calls.len(), 5);
    }

    #[tokio::test]
    async fn test_et_installs_executorch_when_missing() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());

        builder(temp.path(), runner.clone())
            .build(&parse(&["et"]), &ignore)
            .await
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[2], "bash ./install/install_et.sh");
        assert!(calls.last().unwrap().ends_with("--target et_run"));
    }

    #[tokio::test]
    async fn test_et_install_skipped() {
        let temp = tempfile::tempdir().unwrap();

        // Explicitly skipped
        let runner = Arc::new(RecordingRunner::default());
        builder(temp.path(), runner.clone())
            .build(&parse(&["et", "skip_et_install"]), &ignore)
            .await
            .unwrap();
        assert!(runner.calls().iter().all(|c| !c.contains("install_et")));

        // Already installed
        std::fs::create_dir_all(temp.path().join("et-build/install")).unwrap();
        let runner = Arc::new(RecordingRunner::default());
        builder(temp.path(), runner.clone())
            .build(&parse(&["et"]), &ignore)
            .await
            .unwrap();
        assert!(runner.calls().iter().all(|c| !c.contains("install_et")));
    }

    #[tokio::test]
    async fn test_failed_step_stops_build() {
        let temp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner {
            fail_on: Some("-S ."),
            ..RecordingRunner::default()
        });

        let err = builder(temp.path(), runner.clone())
            .build(&parse(&["aoti"]), &ignore)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::StepFailed {
                step: "configure",
                exit_code: Some(2)
            }
        ));
        assert!(runner.calls().iter().all(|c| !c.contains("--build")));
    }

    #[test]
    fn test_preflight_reports_missing_tool() {
        let mut config = ServiceConfig::default();
        config.commands.cmake = "definitely-not-cmake-xyz".to_string();
        let err = NativeBuilder::new(config).preflight().unwrap_err();
        // git/python3 may be missing too on minimal hosts
        assert!(matches!(err, BuildError::ToolNotFound { .. }));
    }
}
