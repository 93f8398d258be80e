pub mod build;
pub mod job;
pub mod matrix;
pub mod progress;
pub mod run;

use std::path::Path;

use color_eyre::Result;
use modelci_service::{MatrixGenerator, ModelCatalog};

/// Generator over `catalog`, or the built-in model catalog
pub fn generator(catalog: Option<&Path>) -> Result<MatrixGenerator> {
    Ok(match catalog {
        Some(path) => MatrixGenerator::with_catalog(ModelCatalog::from_file(path)?),
        None => MatrixGenerator::new(),
    })
}
