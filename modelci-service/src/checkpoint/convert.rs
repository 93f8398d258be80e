// Checkpoint Conversion
// Turns a downloaded checkpoint into the canonical model artifact

use crate::config::ServiceConfig;
use crate::execution::ExecutionContext;
use crate::runners::StepCommand;

use std::path::PathBuf;

/// The conversion command for the context's repo
pub fn conversion_command(ctx: &ExecutionContext, config: &ServiceConfig) -> StepCommand {
    ctx.command(&config.commands.convert_checkpoint, [ctx.repo_name.as_str()])
}

/// Where conversion leaves the model artifact
pub fn converted_model_path(ctx: &ExecutionContext, config: &ServiceConfig) -> PathBuf {
    config.model_path(&ctx.repo_name)
}
