// Service Errors
// Crate-level error that wraps the per-module error types

use crate::build::{BuildArgsError, BuildError};
use crate::checkpoint::UnknownInstallMethod;
use crate::config::ConfigError;
use crate::execution::JobError;
use crate::matrix::{EntryError, MatrixError};

use thiserror::Error;

/// Any failure surfaced by the service library
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Entry(#[from] EntryError),

    #[error(transparent)]
    InstallMethod(#[from] UnknownInstallMethod),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    BuildArgs(#[from] BuildArgsError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_display() {
        let err: ServiceError = BuildArgsError::InvalidOption("xyz".to_string()).into();
        assert_eq!(err.to_string(), "Invalid option: xyz");

        let err: ServiceError = MatrixError::UnknownBackend("tpu".to_string()).into();
        assert!(err.to_string().contains("tpu"));
    }
}
