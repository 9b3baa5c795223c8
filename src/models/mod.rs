//! Model identifiers and the fixed catalog a session may switch between.

pub mod catalog;
pub mod selector;

pub use catalog::ModelCatalog;
pub use selector::{ModelId, ModelSelector};
