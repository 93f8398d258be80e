// Model Catalog
// Known model repositories, the events that select them and the runners per backend

use super::models::{Backend, MatrixError};
use crate::checkpoint::InstallMethod;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A model repository that can be tested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Repository identifier, e.g. `tinyllamas/stories15M`
    pub repo_name: String,
    #[serde(default = "default_install_method")]
    pub install_method: InstallMethod,
    /// Source URLs (wget) or hub identifiers (huggingface-cli)
    #[serde(default)]
    pub resources: Vec<String>,
    /// Trigger events that select this model
    #[serde(default)]
    pub events: Vec<String>,
    /// Whether the model also runs on macOS runners
    #[serde(default)]
    pub macos: bool,
}

fn default_install_method() -> InstallMethod {
    InstallMethod::Wget
}

impl ModelSpec {
    fn wget(repo_name: &str, resources: Vec<String>, events: &[&str], macos: bool) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            install_method: InstallMethod::Wget,
            resources,
            events: events.iter().map(|e| e.to_string()).collect(),
            macos,
        }
    }

    fn huggingface(repo_name: &str, events: &[&str]) -> Self {
        Self {
            repo_name: repo_name.to_string(),
            install_method: InstallMethod::HuggingFaceCli,
            resources: vec![repo_name.to_string()],
            events: events.iter().map(|e| e.to_string()).collect(),
            macos: false,
        }
    }

    /// Last path segment of the repo name
    pub fn model_name(&self) -> &str {
        self.repo_name
            .rsplit('/')
            .next()
            .unwrap_or(self.repo_name.as_str())
    }

    pub fn runs_on_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }

    pub fn runs_on(&self, runner: &RunnerSpec) -> bool {
        !runner.is_macos() || self.macos
    }

    /// Resources handed to the acquisition step
    pub fn effective_resources(&self) -> Vec<String> {
        if self.resources.is_empty() && self.install_method == InstallMethod::HuggingFaceCli {
            vec![self.repo_name.clone()]
        } else {
            self.resources.clone()
        }
    }
}

/// A CI runner label and the platform it provides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSpec {
    pub label: String,
    pub platform: String,
}

impl RunnerSpec {
    fn new(label: &str, platform: &str) -> Self {
        Self {
            label: label.to_string(),
            platform: platform.to_string(),
        }
    }

    pub fn is_macos(&self) -> bool {
        self.label.starts_with("macos")
    }
}

/// Models and runners the generator draws from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub cpu_runners: Vec<RunnerSpec>,
    #[serde(default)]
    pub gpu_runners: Vec<RunnerSpec>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

const HF: &str = "https://huggingface.co";
const LLAMA2C_TOKENIZER: [&str; 2] = [
    "https://github.com/karpathy/llama2.c/raw/master/tokenizer.model",
    "https://github.com/karpathy/llama2.c/raw/master/tokenizer.bin",
];

fn hf_files(repo: &str, files: &[&str]) -> Vec<String> {
    files
        .iter()
        .map(|file| format!("{}/{}/resolve/main/{}", HF, repo, file))
        .collect()
}

fn tinyllamas(checkpoint: &str) -> Vec<String> {
    let mut resources = vec![format!(
        "{}/karpathy/tinyllamas/resolve/main/{}",
        HF, checkpoint
    )];
    resources.extend(LLAMA2C_TOKENIZER.iter().map(|s| s.to_string()));
    resources
}

fn mistral(repo: &str) -> Vec<String> {
    hf_files(
        repo,
        &[
            "config.json",
            "generation_config.json",
            "pytorch_model-00001-of-00002.bin",
            "pytorch_model-00002-of-00002.bin",
            "pytorch_model.bin.index.json",
            "special_tokens_map.json",
            "tokenizer.json",
            "tokenizer.model",
            "tokenizer_config.json",
        ],
    )
}

impl ModelCatalog {
    /// The catalog the CI workflows run against
    pub fn builtin() -> Self {
        let models = vec![
            ModelSpec::wget(
                "tinyllamas/stories15M",
                tinyllamas("stories15M.pt"),
                &["pull_request"],
                true,
            ),
            ModelSpec::wget(
                "tinyllamas/stories110M",
                tinyllamas("stories110M.pt"),
                &[],
                false,
            ),
            ModelSpec::wget(
                "openlm-research/open_llama_7b",
                hf_files(
                    "openlm-research/open_llama_7b",
                    &[
                        "config.json",
                        "generation_config.json",
                        "pytorch_model-00001-of-00002.bin",
                        "pytorch_model-00002-of-00002.bin",
                        "pytorch_model.bin.index.json",
                        "special_tokens_map.json",
                        "tokenizer.model",
                        "tokenizer_config.json",
                    ],
                ),
                &["periodic"],
                false,
            ),
            ModelSpec::wget(
                "mistralai/Mistral-7B-v0.1",
                mistral("mistralai/Mistral-7B-v0.1"),
                &["periodic"],
                false,
            ),
            ModelSpec::wget(
                "mistralai/Mistral-7B-Instruct-v0.1",
                mistral("mistralai/Mistral-7B-Instruct-v0.1"),
                &[],
                false,
            ),
            ModelSpec::wget(
                "mistralai/Mistral-7B-Instruct-v0.2",
                mistral("mistralai/Mistral-7B-Instruct-v0.2"),
                &[],
                false,
            ),
            ModelSpec::huggingface("meta-llama/Meta-Llama-3-8B", &["periodic"]),
        ];

        Self {
            models,
            cpu_runners: vec![
                RunnerSpec::new("8-core-ubuntu", "x86_64"),
                RunnerSpec::new("macos-14", "aarch64"),
            ],
            gpu_runners: vec![RunnerSpec::new("linux.g5.4xlarge.nvidia.gpu", "cuda")],
        }
    }

    /// Parse a catalog from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MatrixError> {
        let catalog: Self = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, MatrixError> {
        let content = fs::read_to_string(path).map_err(|source| MatrixError::CatalogIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn runners(&self, backend: Backend) -> &[RunnerSpec] {
        match backend {
            Backend::Cpu => &self.cpu_runners,
            Backend::Gpu => &self.gpu_runners,
        }
    }

    fn validate(&self) -> Result<(), MatrixError> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.repo_name.trim().is_empty() {
                return Err(MatrixError::InvalidCatalog(
                    "model with empty repo_name".to_string(),
                ));
            }
            if !seen.insert(model.repo_name.as_str()) {
                return Err(MatrixError::InvalidCatalog(format!(
                    "duplicate model '{}'",
                    model.repo_name
                )));
            }
            if model.install_method == InstallMethod::Wget && model.resources.is_empty() {
                return Err(MatrixError::InvalidCatalog(format!(
                    "model '{}' uses wget but lists no resources",
                    model.repo_name
                )));
            }
        }
        for runner in self.cpu_runners.iter().chain(&self.gpu_runners) {
            if runner.label.trim().is_empty() || runner.platform.trim().is_empty() {
                return Err(MatrixError::InvalidCatalog(
                    "runner with empty label or platform".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = ModelCatalog::builtin();
        catalog.validate().unwrap();

        assert_eq!(catalog.runners(Backend::Cpu).len(), 2);
        assert_eq!(catalog.runners(Backend::Gpu)[0].platform, "cuda");
    }

    #[test]
    fn test_model_name_is_last_segment() {
        let catalog = ModelCatalog::builtin();
        let names: Vec<_> = catalog.models.iter().map(|m| m.model_name()).collect();
        assert!(names.contains(&"stories15M"));
        assert!(names.contains(&"Meta-Llama-3-8B"));
    }

    #[test]
    fn test_macos_filter() {
        let catalog = ModelCatalog::builtin();
        let macos = RunnerSpec::new("macos-14", "aarch64");
        let linux = RunnerSpec::new("8-core-ubuntu", "x86_64");

        let stories = &catalog.models[0];
        let llama = catalog
            .models
            .iter()
            .find(|m| m.repo_name == "openlm-research/open_llama_7b")
            .unwrap();

        assert!(stories.runs_on(&macos));
        assert!(!llama.runs_on(&macos));
        assert!(llama.runs_on(&linux));
    }

    #[test]
    fn test_from_yaml() {
        let catalog = ModelCatalog::from_yaml_str(
            r#"
models:
  - repo_name: org/tiny
    resources: ["https://example.com/tiny.pt"]
    events: [nightly]
  - repo_name: org/gated
    install_method: huggingface-cli
    events: [nightly]
cpu_runners:
  - label: ubuntu-latest
    platform: x86_64
"#,
        )
        .unwrap();

        assert_eq!(catalog.models.len(), 2);
        assert_eq!(catalog.models[0].install_method, InstallMethod::Wget);
        assert_eq!(
            catalog.models[1].effective_resources(),
            vec!["org/gated".to_string()]
        );
        assert!(catalog.gpu_runners.is_empty());
    }

    #[test]
    fn test_from_yaml_rejects_wget_without_resources() {
        let err = ModelCatalog::from_yaml_str("models:\n  - repo_name: org/tiny\n").unwrap_err();
        assert!(matches!(err, MatrixError::InvalidCatalog(_)));
    }

    #[test]
    fn test_from_yaml_rejects_duplicates() {
        let yaml = r#"
models:
  - repo_name: org/gated
    install_method: huggingface-cli
  - repo_name: org/gated
    install_method: huggingface-cli
"#;
        let err = ModelCatalog::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
