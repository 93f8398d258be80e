use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use super::progress;
use modelci_service::execution::{progress_channel, JobExecutor};
use modelci_service::{JobVariant, MatrixEntry, ServiceConfig};

/// Run a single matrix entry (the body of one fan-out job)
#[derive(Args, Debug)]
pub struct JobArgs {
    /// The matrix entry as JSON, e.g. `${{ toJSON(matrix) }}`
    #[arg(long, value_name = "JSON")]
    pub entry_json: String,

    /// Job variant (cpu-compile, cpu-aoti, gpu)
    #[arg(long)]
    pub variant: JobVariant,
}

pub async fn execute(args: JobArgs, root: Option<PathBuf>) -> Result<()> {
    let entry = MatrixEntry::from_json(&args.entry_json)?;
    let config = ServiceConfig::load(root)?;
    let variant = args.variant;

    output::status("Job", &format!("{} ({})", entry.job_name(), variant));

    let (tx, rx) = progress_channel();
    let executor = JobExecutor::new(config).with_progress(tx);

    let handle = tokio::spawn(async move { executor.execute(&entry, variant).await });
    let result = progress::drive(handle, rx).await?;

    if result.succeeded() {
        output::success(&format!(
            "{} passed in {:.2}s",
            result.job_name,
            result.duration.as_secs_f64()
        ));
        Ok(())
    } else {
        output::failure(&format!(
            "{} failed: {}",
            result.job_name,
            result.error.as_deref().unwrap_or("unknown error")
        ));
        std::process::exit(1);
    }
}
