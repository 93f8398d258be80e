// ModelCI Service Library
// Matrix generation, per-entry job execution and native runner builds for model CI

pub mod build;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod execution;
pub mod matrix;
pub mod runners;
pub mod utils;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

pub use config::{CommandLine, CommandsConfig, ConfigError, ServiceConfig};

// Re-export matrix types
pub use matrix::{Backend, Matrix, MatrixEntry, MatrixError, MatrixGenerator, ModelCatalog};

// Re-export execution types
pub use execution::{
    progress_channel, ExecutionEvent, Fanout, FanoutSummary, JobError, JobExecutor, JobResult,
    JobState, JobVariant, ProgressSender,
};

// Re-export checkpoint and runner types
pub use checkpoint::{EnvSecretStore, InstallMethod, SecretStore, SecretToken};
pub use runners::{ShellRunner, StepCommand, StepRunner};

// Re-export native build types
pub use build::{
    BuildArgsError, BuildError, BuildTarget, NativeBuildArgs, NativeBuilder, ParsedBuildArgs,
};
