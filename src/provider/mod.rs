//! Model connections: the streaming seam between a session and a hosted model.

pub mod http;
pub mod openrouter;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ChatError;
use crate::tools::ToolRegistry;
use crate::types::{StreamEvent, TurnRequest, Usage};

pub use openrouter::{OpenRouterConnection, OpenRouterFactory};

/// A live connection to one model, with tools already described to it.
#[async_trait]
pub trait ModelConnection: Send + Sync {
    /// Catalog identifier, e.g. `openai/gpt-4o`.
    fn model_id(&self) -> &str;

    /// Open the ordered event stream for one turn.
    async fn open_stream(
        &self,
        request: &TurnRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChatError>>, ChatError>;

    /// Cumulative usage so far, or `None` if this connection has no usage source.
    fn usage_snapshot(&self) -> Option<Usage>;

    /// Tools callable through this connection.
    fn tools(&self) -> &ToolRegistry;
}

/// Builds connections for catalog model identifiers.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self, model_id: &str) -> Result<Arc<dyn ModelConnection>, ChatError>;
}
