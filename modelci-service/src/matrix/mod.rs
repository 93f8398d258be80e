// Matrix Module
// Test-matrix generation: catalog, entries and the (event, backend) expansion

pub mod catalog;
pub mod generator;
pub mod models;

pub use catalog::{ModelCatalog, ModelSpec, RunnerSpec};
pub use generator::{MatrixBuilder, MatrixGenerator};
pub use models::{Backend, EntryError, Matrix, MatrixEntry, MatrixError, DEFAULT_TIMEOUT_MINUTES};
