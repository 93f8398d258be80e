use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::info;

/// Name of the step output the workflow reads the matrix from
const OUTPUT_NAME: &str = "models";

/// Print the test matrix for a trigger event and backend
#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Trigger event (pull_request, push, periodic)
    #[arg(long)]
    pub event: String,

    /// Backend to generate for (cpu or gpu)
    #[arg(long)]
    pub backend: String,

    /// Model catalog YAML (default: built-in catalog)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Also append `models=<json>` to the file named by $GITHUB_OUTPUT
    #[arg(long)]
    pub github_output: bool,

    /// Pretty-print the JSON
    #[arg(long)]
    pub pretty: bool,
}

pub fn execute(args: MatrixArgs) -> Result<()> {
    let generator = super::generator(args.catalog.as_deref())?;
    let matrix = generator.generate(&args.event, &args.backend)?;

    info!(
        event = %args.event,
        backend = %args.backend,
        entries = matrix.len(),
        "matrix generated"
    );

    let json = if args.pretty {
        matrix.to_json_pretty()?
    } else {
        matrix.to_json()?
    };
    println!("{}", json);

    if args.github_output {
        let path = github_output_path(std::env::var_os("GITHUB_OUTPUT"))?;
        append_output(&path, OUTPUT_NAME, &matrix.to_json()?)?;
    }

    Ok(())
}

fn github_output_path(var: Option<OsString>) -> Result<PathBuf> {
    var.filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| eyre!("--github-output requires GITHUB_OUTPUT to be set"))
}

/// Append `name=value` to the workflow's step output file
fn append_output(path: &Path, name: &str, value: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}={}", name, value)?;
    Ok(())
}
