// Service Configuration
// Explicit workspace settings threaded through every step instead of ambient env lookups

use crate::runners::StepCommand;
use crate::utils::resolve_working_dir;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that names the repository working directory
pub const ROOT_ENV: &str = "MODELCI_ROOT";

/// Config file looked up at the working root
pub const CONFIG_FILE_NAME: &str = "modelci.yaml";

/// File name of the converted model inside a checkpoint directory
pub const MODEL_FILE_NAME: &str = "model.pth";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Command '{0}' has an empty program")]
    EmptyCommand(&'static str),
}

/// An external program invocation: program plus leading arguments.
///
/// Step-specific arguments (repo name, model path, ...) are appended after
/// `args` when the command is materialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Materialise into a step command with extra trailing arguments
    pub fn to_command<I, S>(&self, extra: I, working_dir: &Path) -> StepCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = self.args.clone();
        args.extend(extra.into_iter().map(Into::into));
        StepCommand::new(self.program.clone(), args, working_dir)
    }
}

/// The external collaborators invoked by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Installs Python and native dependencies
    pub install_dependencies: CommandLine,
    /// Direct fetch; the target directory and URL are appended
    pub wget: CommandLine,
    /// Authenticated fetch tool
    pub huggingface_cli: CommandLine,
    /// Converts a downloaded checkpoint; the repo name is appended
    pub convert_checkpoint: CommandLine,
    /// Validation pass; model path, device and mode are appended
    pub validate: CommandLine,
    /// Installs ExecuTorch libraries for the `et` native target
    pub install_executorch: CommandLine,
    /// Python interpreter used to probe the torch CMake prefix
    pub python: String,
    pub git: String,
    pub cmake: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            install_dependencies: CommandLine::new("bash", ["./install/install_requirements.sh"]),
            wget: CommandLine::new("wget", ["--no-verbose"]),
            huggingface_cli: CommandLine::new("huggingface-cli", Vec::<String>::new()),
            convert_checkpoint: CommandLine::new("bash", [".ci/scripts/convert_checkpoint.sh"]),
            validate: CommandLine::new("bash", [".ci/scripts/validate.sh"]),
            install_executorch: CommandLine::new("bash", ["./install/install_et.sh"]),
            python: "python3".to_string(),
            git: "git".to_string(),
            cmake: "cmake".to_string(),
        }
    }
}

impl CommandsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let programs = [
            ("install_dependencies", self.install_dependencies.program.as_str()),
            ("wget", self.wget.program.as_str()),
            ("huggingface_cli", self.huggingface_cli.program.as_str()),
            ("convert_checkpoint", self.convert_checkpoint.program.as_str()),
            ("validate", self.validate.program.as_str()),
            ("install_executorch", self.install_executorch.program.as_str()),
            ("python", self.python.as_str()),
            ("git", self.git.as_str()),
            ("cmake", self.cmake.as_str()),
        ];
        for (name, program) in programs {
            if program.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(name));
            }
        }
        Ok(())
    }
}

/// Workspace configuration for matrix jobs and native builds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Repository working directory; always resolved at load time
    #[serde(skip)]
    pub root: PathBuf,
    /// Checkpoint directory, relative to the root
    pub checkpoints_dir: PathBuf,
    /// Name of the secret holding the gated-download token
    pub secret_env: String,
    /// ExecuTorch build directory, relative to the root
    pub et_build_dir: PathBuf,
    /// CMake output directory, relative to the root
    pub cmake_out_dir: PathBuf,
    /// Per-command timeout in seconds (None = no timeout)
    pub step_timeout_secs: Option<u64>,
    pub commands: CommandsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            checkpoints_dir: PathBuf::from("checkpoints"),
            secret_env: "HF_TOKEN".to_string(),
            et_build_dir: PathBuf::from("et-build"),
            cmake_out_dir: PathBuf::from("cmake-out"),
            step_timeout_secs: None,
            commands: CommandsConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration for the given root (or the detected repository root).
    ///
    /// Looks for `modelci.yaml` at the root first, then `~/.modelci/config.yaml`,
    /// and falls back to defaults when neither exists.
    pub fn load(root: Option<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.unwrap_or_else(resolve_working_dir);
        Self::load_from(root)
    }

    /// Load configuration for an explicit root
    pub fn load_from(root: PathBuf) -> Result<Self, ConfigError> {
        let local = root.join(CONFIG_FILE_NAME);
        let config = if local.is_file() {
            Self::from_file(&local)?
        } else {
            match user_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            }
        };
        Ok(config.with_root(root))
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.commands.validate()?;
        Ok(config)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Directory that holds the downloaded checkpoint for a repo
    pub fn checkpoint_dir(&self, repo_name: &str) -> PathBuf {
        self.root.join(&self.checkpoints_dir).join(repo_name)
    }

    /// Canonical converted model artifact for a repo
    pub fn model_path(&self, repo_name: &str) -> PathBuf {
        self.checkpoint_dir(repo_name).join(MODEL_FILE_NAME)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

/// `~/.modelci/config.yaml`
fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".modelci").join("config.yaml"))
}
