//! Model backend trait and the adapters the runtime layers on top of it.

pub mod capabilities;
pub mod handle;
pub mod retrying;

pub use capabilities::ModelCapabilities;
pub use handle::BackendHandle;
pub use retrying::RetryingBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RheoError;
use crate::types::{Message, StreamChunk};

/// A streamed chat response.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, RheoError>>;

/// Tool declaration sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A streaming chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub history: Vec<Message>,
    pub tools: Vec<ToolDeclaration>,
    pub system_instruction: Option<String>,
}

/// A request for a single JSON object matching `schema`.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub history: Vec<Message>,
    pub schema: serde_json::Value,
    pub system_instruction: Option<String>,
}

/// One streaming chat-completion provider behind a uniform interface.
///
/// Vendor adapters implement this; message-format translation and stream
/// parsing live on their side of the boundary.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Provider name (e.g., "openai", "google").
    fn provider_name(&self) -> &str;

    /// The model ID this backend instance serves.
    fn model_id(&self) -> &str;

    /// Capabilities of the model.
    fn capabilities(&self) -> &ModelCapabilities;

    /// Open a streaming chat exchange.
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, RheoError>;

    /// Ask for a structured JSON reply.
    async fn generate_structured(
        &self,
        request: &StructuredRequest,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, RheoError>;
}
