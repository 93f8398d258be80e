// Checkpoint Module
// Acquisition strategies, conversion and the secrets gated downloads need

pub mod acquire;
pub mod convert;
pub mod secret;

pub use acquire::{acquisition_commands, prepare_checkpoint_dir};
pub use convert::{conversion_command, converted_model_path};
pub use secret::{EnvSecretStore, Redactor, SecretStore, SecretToken, StaticSecretStore, REDACTED};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a checkpoint is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InstallMethod {
    /// Direct download of every listed resource URL
    Wget,
    /// Authenticated hub download using a gated-access token
    HuggingFaceCli,
}

/// Raised for install method names with no acquisition strategy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown install method '{0}' (expected wget or huggingface-cli)")]
pub struct UnknownInstallMethod(pub String);

impl InstallMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMethod::Wget => "wget",
            InstallMethod::HuggingFaceCli => "huggingface-cli",
        }
    }
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallMethod {
    type Err = UnknownInstallMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wget" => Ok(InstallMethod::Wget),
            "huggingface-cli" => Ok(InstallMethod::HuggingFaceCli),
            other => Err(UnknownInstallMethod(other.to_string())),
        }
    }
}

impl TryFrom<String> for InstallMethod {
    type Error = UnknownInstallMethod;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstallMethod> for String {
    fn from(method: InstallMethod) -> Self {
        method.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_method_parse() {
        assert_eq!("wget".parse(), Ok(InstallMethod::Wget));
        assert_eq!("huggingface-cli".parse(), Ok(InstallMethod::HuggingFaceCli));
        assert_eq!(
            "curl".parse::<InstallMethod>(),
            Err(UnknownInstallMethod("curl".to_string()))
        );
    }

    #[test]
    fn test_install_method_serde() {
        let json = serde_json::to_string(&InstallMethod::HuggingFaceCli).unwrap();
        assert_eq!(json, "\"huggingface-cli\"");

        let err = serde_json::from_str::<InstallMethod>("\"scp\"").unwrap_err();
        assert!(err.to_string().contains("unknown install method 'scp'"));
    }
}
