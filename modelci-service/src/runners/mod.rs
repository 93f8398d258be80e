// Runners Module
// External command execution behind a trait seam

pub mod shell;

pub use shell::{ShellConfig, ShellOutput, ShellRunner};

use crate::checkpoint::SecretToken;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Callback receiving each output line; the flag is true for stderr
pub type OutputSink<'a> = &'a (dyn Fn(&str, bool) + Send + Sync);

/// A secret exposed to exactly one child process as an environment variable
#[derive(Debug, Clone)]
pub struct SecretBinding {
    pub env_name: String,
    pub token: SecretToken,
}

/// One external program invocation issued by a step
#[derive(Debug, Clone)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub secrets: Vec<SecretBinding>,
    pub working_dir: PathBuf,
}

impl StepCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, working_dir: &Path) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            secrets: Vec::new(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn with_env(mut self, env: &HashMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_secret(mut self, env_name: impl Into<String>, token: SecretToken) -> Self {
        self.secrets.push(SecretBinding {
            env_name: env_name.into(),
            token,
        });
        self
    }
}

impl fmt::Display for StepCommand {
    /// Command line for logs. Secret values are never part of it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Executes step commands
#[async_trait::async_trait]
pub trait StepRunner: Send + Sync {
    /// Run a command to completion, streaming each output line to `on_output`
    async fn run(&self, command: &StepCommand, on_output: OutputSink<'_>) -> ShellOutput;
}
