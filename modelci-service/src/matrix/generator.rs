// Matrix Generation
// Expands (event, backend) into concrete fan-out entries

use super::catalog::{ModelCatalog, RunnerSpec};
use super::models::{Backend, Matrix, MatrixEntry, MatrixError, DEFAULT_TIMEOUT_MINUTES};
use crate::checkpoint::InstallMethod;

/// Generates test matrices from a model catalog
#[derive(Debug, Clone, Default)]
pub struct MatrixGenerator {
    catalog: ModelCatalog,
}

impl MatrixGenerator {
    /// Generator over the built-in catalog
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Generate the matrix for a trigger event and backend name.
    ///
    /// An unknown backend is an error; an unknown event selects nothing.
    pub fn generate(&self, event: &str, backend: &str) -> Result<Matrix, MatrixError> {
        let backend: Backend = backend.parse()?;
        Ok(self.generate_for(event, backend))
    }

    /// Generate for an already-parsed backend. Order is catalog order, then runner order.
    pub fn generate_for(&self, event: &str, backend: Backend) -> Matrix {
        let runners = self.catalog.runners(backend);

        let include = self
            .catalog
            .models
            .iter()
            .filter(|model| model.runs_on_event(event))
            .flat_map(|model| {
                runners
                    .iter()
                    .filter(move |runner| model.runs_on(runner))
                    .map(move |runner| MatrixEntry {
                        model_name: model.model_name().to_string(),
                        repo_name: model.repo_name.clone(),
                        runner_label: runner.label.clone(),
                        resources: model.effective_resources(),
                        install_method: model.install_method,
                        platform: runner.platform.clone(),
                        timeout: DEFAULT_TIMEOUT_MINUTES,
                    })
            })
            .collect();

        Matrix { include }
    }
}

/// Builder for creating matrices programmatically
pub struct MatrixBuilder {
    entries: Vec<MatrixEntry>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a wget entry for `repo_name` on `runner`
    pub fn add_wget(
        mut self,
        repo_name: impl Into<String>,
        runner: &RunnerSpec,
        resources: Vec<String>,
    ) -> Self {
        self.entries
            .push(entry(repo_name.into(), runner, resources, InstallMethod::Wget));
        self
    }

    /// Add a huggingface-cli entry for `repo_name` on `runner`
    pub fn add_huggingface(mut self, repo_name: impl Into<String>, runner: &RunnerSpec) -> Self {
        let repo_name = repo_name.into();
        let resources = vec![repo_name.clone()];
        self.entries.push(entry(
            repo_name,
            runner,
            resources,
            InstallMethod::HuggingFaceCli,
        ));
        self
    }

    pub fn build(self) -> Matrix {
        Matrix {
            include: self.entries,
        }
    }
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn entry(
    repo_name: String,
    runner: &RunnerSpec,
    resources: Vec<String>,
    install_method: InstallMethod,
) -> MatrixEntry {
    MatrixEntry {
        model_name: repo_name.rsplit('/').next().unwrap_or_default().to_string(),
        repo_name,
        runner_label: runner.label.clone(),
        resources,
        install_method,
        platform: runner.platform.clone(),
        timeout: DEFAULT_TIMEOUT_MINUTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_cpu() {
        let matrix = MatrixGenerator::new().generate("periodic", "cpu").unwrap();

        let repos: Vec<_> = matrix.include.iter().map(|e| e.repo_name.as_str()).collect();
        assert_eq!(
            repos,
            vec![
                "openlm-research/open_llama_7b",
                "mistralai/Mistral-7B-v0.1",
                "meta-llama/Meta-Llama-3-8B",
            ]
        );
        // macOS runners only take models flagged for macOS
        assert!(matrix.include.iter().all(|e| e.runner_label == "8-core-ubuntu"));
        assert_eq!(
            matrix.include[2].install_method,
            InstallMethod::HuggingFaceCli
        );
        assert_eq!(matrix.include[2].model_name, "Meta-Llama-3-8B");
    }

    #[test]
    fn test_pull_request_cpu_includes_macos() {
        let matrix = MatrixGenerator::new()
            .generate("pull_request", "cpu")
            .unwrap();

        let runners: Vec<_> = matrix
            .include
            .iter()
            .map(|e| (e.model_name.as_str(), e.runner_label.as_str(), e.platform.as_str()))
            .collect();
        assert_eq!(
            runners,
            vec![
                ("stories15M", "8-core-ubuntu", "x86_64"),
                ("stories15M", "macos-14", "aarch64"),
            ]
        );
    }

    #[test]
    fn test_periodic_gpu() {
        let matrix = MatrixGenerator::new().generate("periodic", "gpu").unwrap();

        assert_eq!(matrix.len(), 3);
        assert!(matrix.include.iter().all(|e| e.platform == "cuda"));
    }

    #[test]
    fn test_push_and_unknown_event_are_empty() {
        let generator = MatrixGenerator::new();
        assert!(generator.generate("push", "cpu").unwrap().is_empty());
        assert!(generator.generate("release", "gpu").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        let generator = MatrixGenerator::new();
        for backend in ["tpu", "", "CPU", "cuda"] {
            assert!(matches!(
                generator.generate("periodic", backend),
                Err(MatrixError::UnknownBackend(_))
            ));
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let generator = MatrixGenerator::new();
        let cases = [("periodic", "cpu"), ("periodic", "gpu"), ("pull_request", "cpu")];
        for (event, backend) in cases {
            let first = generator.generate(event, backend).unwrap();
            let second = generator.generate(event, backend).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
        }
    }

    #[test]
    fn test_install_methods_are_recognized() {
        let generator = MatrixGenerator::new();
        for event in ["pull_request", "push", "periodic"] {
            for backend in ["cpu", "gpu"] {
                let matrix = generator.generate(event, backend).unwrap();
                for entry in &matrix.include {
                    let json = serde_json::to_value(entry).unwrap();
                    let method = json["install_method"].as_str().unwrap();
                    assert!(method == "wget" || method == "huggingface-cli");
                }
            }
        }
    }

    #[test]
    fn test_json_shape() {
        let matrix = MatrixGenerator::new().generate("pull_request", "cpu").unwrap();
        let value: serde_json::Value = serde_json::from_str(&matrix.to_json().unwrap()).unwrap();

        let include = value["include"].as_array().unwrap();
        assert_eq!(include.len(), 2);
        assert_eq!(include[0]["repo_name"], "tinyllamas/stories15M");
        assert!(include[0]["resources"]
            .as_str()
            .unwrap()
            .contains("stories15M.pt"));
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = ModelCatalog::from_yaml_str(
            r#"
models:
  - repo_name: org/tiny
    resources: ["https://example.com/tiny.pt"]
    events: [nightly]
cpu_runners:
  - label: ubuntu-latest
    platform: x86_64
"#,
        )
        .unwrap();

        let generator = MatrixGenerator::with_catalog(catalog);
        let matrix = generator.generate("nightly", "cpu").unwrap();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.include[0].model_name, "tiny");

        // No GPU runners configured
        assert!(generator.generate("nightly", "gpu").unwrap().is_empty());
    }

    #[test]
    fn test_matrix_builder() {
        let runner = RunnerSpec {
            label: "local".to_string(),
            platform: "x86_64".to_string(),
        };
        let matrix = MatrixBuilder::new()
            .add_wget("org/a", &runner, vec!["https://example.com/a.pt".to_string()])
            .add_huggingface("org/b", &runner)
            .build();

        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.include[0].model_name, "a");
        assert_eq!(matrix.include[1].resources, vec!["org/b"]);
    }
}
