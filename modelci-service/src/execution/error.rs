// Job Errors
// Failure taxonomy for a single matrix entry; every variant is fatal to its job only

use super::models::{JobVariant, ValidationPass};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Working root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Variant '{variant}' cannot run entries built for platform '{platform}'")]
    VariantMismatch {
        variant: JobVariant,
        platform: String,
    },

    #[error("Dependency install failed: {detail}")]
    DependencyInstall { detail: String },

    #[error("Checkpoint download for '{repo}' failed: {detail}")]
    Download { repo: String, detail: String },

    #[error("Checkpoint conversion for '{repo}' failed: {detail}")]
    Conversion { repo: String, detail: String },

    #[error("Validation {pass} failed: {detail}")]
    Validation { pass: ValidationPass, detail: String },

    #[error("Job task aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
