//! Model Context Protocol tool servers.
//!
//! A [`McpRegistrar`] spawns a tool server over stdio, lists what it offers,
//! and registers the allow-listed tools into a connection's
//! [`ToolRegistry`](crate::tools::ToolRegistry).

pub mod client;
pub mod registrar;

pub use client::{McpClient, McpToolCallResult, McpToolSchema};
pub use registrar::{McpRegistrar, McpTool};
