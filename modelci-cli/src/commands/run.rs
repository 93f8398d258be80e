use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use super::progress;
use modelci_service::execution::{progress_channel, Fanout, FanoutSummary, JobExecutor};
use modelci_service::{Backend, JobVariant, ServiceConfig};

/// Generate the matrix for an event and run every entry locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Trigger event (pull_request, push, periodic)
    #[arg(long, default_value = "pull_request")]
    pub event: String,

    /// Backend to generate for (cpu or gpu)
    #[arg(long, default_value = "cpu")]
    pub backend: String,

    /// Job variant (cpu-compile, cpu-aoti, gpu); defaults from the backend
    #[arg(long)]
    pub variant: Option<JobVariant>,

    /// Maximum jobs running at once (0 = unlimited)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub max_parallel: usize,

    /// Only run these models (can be repeated)
    #[arg(long, value_name = "MODEL")]
    pub only: Vec<String>,

    /// Model catalog YAML (default: built-in catalog)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,
}

pub async fn execute(args: RunArgs, root: Option<PathBuf>) -> Result<()> {
    let config = ServiceConfig::load(root)?;
    let generator = super::generator(args.catalog.as_deref())?;

    let backend: Backend = args.backend.parse()?;
    let variant = args.variant.unwrap_or(match backend {
        Backend::Cpu => JobVariant::CpuCompile,
        Backend::Gpu => JobVariant::Gpu,
    });

    let mut entries = generator.generate_for(&args.event, backend).include;
    if !args.only.is_empty() {
        entries.retain(|entry| args.only.contains(&entry.model_name));
    }

    output::status("Root", &config.root.display().to_string());
    if entries.is_empty() {
        output::warning(&format!(
            "No jobs for event '{}' on {}",
            args.event, backend
        ));
        return Ok(());
    }
    output::info(&format!(
        "{} jobs for event '{}' on {}",
        entries.len(),
        args.event,
        backend
    ));

    let (tx, rx) = progress_channel();
    let executor = JobExecutor::new(config).with_progress(tx);
    let fanout = Fanout::new(executor).with_max_parallel(args.max_parallel);

    // Spawn execution in background, process events in the foreground
    let handle = tokio::spawn(async move { fanout.run(entries, variant).await });
    let summary = progress::drive(handle, rx).await?;

    print_summary(&summary);

    if !summary.success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_summary(summary: &FanoutSummary) {
    println!();
    output::header("Summary");
    for result in &summary.results {
        let line = format!(
            "{:<48} {:>8.2}s",
            result.job_name,
            result.duration.as_secs_f64()
        );
        if result.succeeded() {
            output::success(&line);
        } else {
            output::failure(&line);
            if let Some(error) = &result.error {
                output::dim_failure(&format!("      {}", error));
            }
        }
    }
}
