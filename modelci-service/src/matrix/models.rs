// Matrix Models
// Matrix entries as consumed by the CI fan-out

use crate::checkpoint::InstallMethod;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default job timeout in minutes, carried for the external scheduler
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 90;

/// Target backend of a matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Cpu,
    Gpu,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Backend::Cpu),
            "gpu" => Ok(Backend::Gpu),
            other => Err(MatrixError::UnknownBackend(other.to_string())),
        }
    }
}

/// Errors raised while generating a matrix
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Unknown backend '{0}' (expected cpu or gpu)")]
    UnknownBackend(String),

    #[error("Failed to read catalog {path}: {source}")]
    CatalogIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    CatalogYaml(#[from] serde_yaml::Error),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
}

/// Errors raised while reading a serialized matrix entry
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Invalid matrix entry: {0}")]
    Json(#[from] serde_json::Error),
}

/// One fan-out unit: a model, the runner it targets and how to fetch it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub model_name: String,
    pub repo_name: String,
    #[serde(rename = "runner")]
    pub runner_label: String,
    #[serde(with = "comma_list")]
    pub resources: Vec<String>,
    pub install_method: InstallMethod,
    pub platform: String,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT_MINUTES
}

impl MatrixEntry {
    /// Parse an entry as emitted by `Matrix::to_json`
    pub fn from_json(json: &str) -> Result<Self, EntryError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Stable display name of the job running this entry
    pub fn job_name(&self) -> String {
        format!("{} ({})", self.model_name, self.runner_label)
    }
}

/// The generated matrix, `{ "include": [...] }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    pub include: Vec<MatrixEntry>,
}

impl Matrix {
    pub fn len(&self) -> usize {
        self.include.len()
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// `resources` travels through the CI as one comma-joined string
mod comma_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&items.join(","))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }
}
