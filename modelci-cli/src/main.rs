mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use commands::{build, job, matrix, run};

/// Model validation CI: test matrices, matrix jobs and native runner builds
#[derive(Parser, Debug)]
#[command(name = "modelci", version, about)]
struct Cli {
    /// Repository working root (default: enclosing git repository or current directory)
    #[arg(long, global = true, env = "MODELCI_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Matrix(matrix::MatrixArgs),
    Run(run::RunArgs),
    Job(job::JobArgs),
    // Help tokens belong to the strict build parser
    #[command(disable_help_flag = true)]
    Build(build::BuildArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Matrix(args) => matrix::execute(args),
        Command::Run(args) => run::execute(args, cli.root).await,
        Command::Job(args) => job::execute(args, cli.root).await,
        Command::Build(args) => build::execute(args, cli.root).await,
    }
}

/// Diagnostics go to stderr, filtered by RUST_LOG (warnings by default)
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_tokens_pass_through() {
        let cli = Cli::try_parse_from(["modelci", "build", "aoti", "--help"]).unwrap();
        match cli.command {
            Command::Build(args) => assert_eq!(args.tokens, vec!["aoti", "--help"]),
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["modelci", "build"]).unwrap();
        assert!(matches!(cli.command, Command::Build(args) if args.tokens.is_empty()));
    }

    #[test]
    fn test_job_variant_parsing() {
        let cli = Cli::try_parse_from([
            "modelci",
            "job",
            "--entry-json",
            "{}",
            "--variant",
            "cpu-aoti",
        ])
        .unwrap();
        match cli.command {
            Command::Job(args) => assert_eq!(args.variant, modelci_service::JobVariant::CpuAoti),
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["modelci", "job", "--entry-json", "{}", "--variant", "tpu"])
            .is_err());
    }

    #[test]
    fn test_root_from_environment() {
        std::env::set_var("MODELCI_ROOT", "/from/env");

        let cli = Cli::try_parse_from(["modelci", "matrix", "--event", "push", "--backend", "cpu"])
            .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/from/env")));

        // The flag wins over the environment
        let cli =
            Cli::try_parse_from(["modelci", "--root", "/from/flag", "build", "aoti"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/from/flag")));

        std::env::remove_var("MODELCI_ROOT");
    }
}
