// Native Build Arguments
// Strict positional token parsing for the native runner build

use std::fmt;
use thiserror::Error;

pub const USAGE: &str = "\
Usage: modelci build [aoti|et] [link_torchao] [skip_et_install]

Build the native runner for the selected target.

Targets:
  aoti              Ahead-of-time inductor runner (produces ./cmake-out/aoti_run)
  et                ExecuTorch runner (produces ./cmake-out/et_run)

Options:
  link_torchao      Link torchao kernels into the runner
  skip_et_install   Do not install ExecuTorch even if it is missing (et only)
  -h, --help        Show this help";

/// Native runtime the runner is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    Aoti,
    Et,
}

impl BuildTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTarget::Aoti => "aoti",
            BuildTarget::Et => "et",
        }
    }

    /// CMake target and artifact file name, e.g. `aoti_run`
    pub fn artifact_name(&self) -> String {
        format!("{}_run", self.as_str())
    }

    /// Value for `-D_GLIBCXX_USE_CXX11_ABI`
    pub fn cxx11_abi(&self) -> u8 {
        match self {
            BuildTarget::Aoti => 0,
            BuildTarget::Et => 1,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "aoti" => Some(BuildTarget::Aoti),
            "et" => Some(BuildTarget::Et),
            _ => None,
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildArgsError {
    #[error("No arguments provided")]
    NoArguments,

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("No target selected (expected aoti or et)")]
    MissingTarget,

    #[error("Conflicting targets: '{first}' and '{second}'")]
    ConflictingTargets {
        first: BuildTarget,
        second: BuildTarget,
    },
}

/// A validated build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBuildArgs {
    pub target: BuildTarget,
    /// Pass `-DLINK_TORCHAO=ON`
    pub link_torchao: bool,
    /// Install ExecuTorch when the `et` target needs it and it is missing
    pub install_et: bool,
}

impl NativeBuildArgs {
    pub fn new(target: BuildTarget) -> Self {
        Self {
            target,
            link_torchao: false,
            install_et: true,
        }
    }

    /// Parse positional tokens.
    ///
    /// Tokens are read in order; a help flag wins as soon as it is seen, any
    /// unknown token fails immediately.
    pub fn parse<I, S>(tokens: I) -> Result<ParsedBuildArgs, BuildArgsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut target: Option<BuildTarget> = None;
        let mut link_torchao = false;
        let mut install_et = true;
        let mut seen_any = false;

        for token in tokens {
            seen_any = true;
            let token = token.as_ref();
            match token {
                "-h" | "--help" => return Ok(ParsedBuildArgs::Help),
                "link_torchao" => link_torchao = true,
                "skip_et_install" => install_et = false,
                other => match (BuildTarget::from_token(other), target) {
                    (Some(second), Some(first)) => {
                        return Err(BuildArgsError::ConflictingTargets { first, second })
                    }
                    (Some(selected), None) => target = Some(selected),
                    (None, _) => return Err(BuildArgsError::InvalidOption(other.to_string())),
                },
            }
        }

        if !seen_any {
            return Err(BuildArgsError::NoArguments);
        }

        let target = target.ok_or(BuildArgsError::MissingTarget)?;
        Ok(ParsedBuildArgs::Build(NativeBuildArgs {
            target,
            link_torchao,
            install_et,
        }))
    }
}

/// Result of parsing build tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedBuildArgs {
    /// Help was requested; print usage and exit successfully
    Help,
    Build(NativeBuildArgs),
}
