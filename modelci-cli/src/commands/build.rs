use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use modelci_service::build::USAGE;
use modelci_service::{NativeBuildArgs, NativeBuilder, ParsedBuildArgs, ServiceConfig};

/// Build a native runner: [aoti|et] [link_torchao] [skip_et_install]
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build tokens, parsed strictly in order. `--root DIR` may also appear among them.
    #[arg(value_name = "TOKEN", trailing_var_arg = true, allow_hyphen_values = true)]
    pub tokens: Vec<String>,
}

/// Separate a `--root DIR` / `--root=DIR` given after the build tokens.
///
/// A trailing `--root` without a value stays a token and fails strict parsing.
fn split_root(tokens: Vec<String>) -> (Vec<String>, Option<PathBuf>) {
    let mut rest = Vec::with_capacity(tokens.len());
    let mut root = None;
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if let Some(dir) = token.strip_prefix("--root=") {
            root = Some(PathBuf::from(dir));
        } else if token == "--root" && iter.peek().is_some() {
            root = iter.next().map(PathBuf::from);
        } else {
            rest.push(token);
        }
    }
    (rest, root)
}

pub async fn execute(args: BuildArgs, root: Option<PathBuf>) -> Result<()> {
    let (tokens, token_root) = split_root(args.tokens);
    let root = token_root.or(root);

    let build_args = match NativeBuildArgs::parse(&tokens) {
        Ok(ParsedBuildArgs::Help) => {
            println!("{}", USAGE);
            return Ok(());
        }
        Ok(ParsedBuildArgs::Build(build_args)) => build_args,
        Err(e) => {
            output::error(&e.to_string());
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    let config = ServiceConfig::load(root)?;
    let builder = NativeBuilder::new(config);
    builder.preflight()?;

    output::status(
        "Building",
        &format!(
            "{} runner{}",
            build_args.target,
            if build_args.link_torchao { " (torchao)" } else { "" }
        ),
    );

    let sink = |line: &str, is_error: bool| {
        if is_error {
            output::step_error(line);
        } else {
            output::step_output(line);
        }
    };
    let artifact = builder.build(&build_args, &sink).await?;

    output::success(&format!("Built {}", artifact.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_root_after_build_tokens() {
        let (rest, root) = split_root(tokens(&["aoti", "--root", "/src/repo", "link_torchao"]));
        assert_eq!(rest, vec!["aoti", "link_torchao"]);
        assert_eq!(root, Some(PathBuf::from("/src/repo")));

        let (rest, root) = split_root(tokens(&["et", "--root=/src/repo"]));
        assert_eq!(rest, vec!["et"]);
        assert_eq!(root, Some(PathBuf::from("/src/repo")));
    }

    #[test]
    fn test_dangling_root_stays_a_token() {
        let (rest, root) = split_root(tokens(&["aoti", "--root"]));
        assert_eq!(rest, vec!["aoti", "--root"]);
        assert!(root.is_none());
        assert!(NativeBuildArgs::parse(&rest).is_err());
    }

    #[test]
    fn test_no_root_leaves_tokens_untouched() {
        let (rest, root) = split_root(tokens(&["-h", "aoti"]));
        assert_eq!(rest, vec!["-h", "aoti"]);
        assert!(root.is_none());
    }
}
