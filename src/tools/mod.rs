//! Tools callable by the model, and the registry that makes them callable.

pub mod registry;
pub mod tool;

pub use registry::{ToolDefinition, ToolRegistrar, ToolRegistry, ToolServerSpec};
pub use tool::{FnTool, Tool};
