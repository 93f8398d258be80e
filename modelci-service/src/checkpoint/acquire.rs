// Checkpoint Acquisition
// Commands that fetch a checkpoint into its directory, by install method

use super::{InstallMethod, SecretStore};
use crate::config::ServiceConfig;
use crate::execution::{ExecutionContext, JobError};
use crate::matrix::MatrixEntry;
use crate::runners::StepCommand;

use std::io;

/// Create the checkpoint directory if it does not exist yet
pub async fn prepare_checkpoint_dir(ctx: &ExecutionContext) -> io::Result<()> {
    tokio::fs::create_dir_all(&ctx.checkpoint_dir).await
}

/// Commands that acquire the entry's checkpoint, in execution order.
///
/// The gated-download secret is looked up here and bound only to the
/// huggingface-cli child; no other command ever carries it.
pub fn acquisition_commands(
    ctx: &ExecutionContext,
    entry: &MatrixEntry,
    config: &ServiceConfig,
    secrets: &dyn SecretStore,
) -> Result<Vec<StepCommand>, JobError> {
    match entry.install_method {
        InstallMethod::Wget => wget_commands(ctx, entry, config),
        InstallMethod::HuggingFaceCli => huggingface_commands(ctx, entry, config, secrets),
    }
}

fn wget_commands(
    ctx: &ExecutionContext,
    entry: &MatrixEntry,
    config: &ServiceConfig,
) -> Result<Vec<StepCommand>, JobError> {
    if entry.resources.is_empty() {
        return Err(JobError::Download {
            repo: entry.repo_name.clone(),
            detail: "no resources to download".to_string(),
        });
    }

    let dir = ctx.checkpoint_dir.display().to_string();
    Ok(entry
        .resources
        .iter()
        .map(|url| {
            ctx.command(
                &config.commands.wget,
                ["--directory-prefix", dir.as_str(), url.as_str()],
            )
        })
        .collect())
}

fn huggingface_commands(
    ctx: &ExecutionContext,
    entry: &MatrixEntry,
    config: &ServiceConfig,
    secrets: &dyn SecretStore,
) -> Result<Vec<StepCommand>, JobError> {
    let token = secrets
        .get(&config.secret_env)
        .ok_or_else(|| JobError::Download {
            repo: entry.repo_name.clone(),
            detail: format!("secret {} is not set", config.secret_env),
        })?;

    let dir = ctx.checkpoint_dir.display().to_string();
    let command = ctx
        .command(
            &config.commands.huggingface_cli,
            [
                "download",
                entry.repo_name.as_str(),
                "--local-dir",
                dir.as_str(),
            ],
        )
        .with_secret(config.secret_env.clone(), token);

    Ok(vec![command])
}
