//! Retry-with-backoff wrapper at the model backend boundary.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ChatRequest, ChunkStream, ModelBackend, ModelCapabilities, StructuredRequest};
use crate::error::RheoError;
use crate::util::retry::RetryPolicy;

/// Wraps a backend so transient failures are retried before they surface.
///
/// Only opening the stream is retried; errors mid-stream end the turn.
pub struct RetryingBackend {
    inner: Arc<dyn ModelBackend>,
    policy: RetryPolicy,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ModelBackend for RetryingBackend {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn capabilities(&self) -> &ModelCapabilities {
        self.inner.capabilities()
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, RheoError> {
        self.policy
            .execute_with_cancel(&cancel, || self.inner.stream_chat(request, cancel.clone()))
            .await
    }

    async fn generate_structured(
        &self,
        request: &StructuredRequest,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, RheoError> {
        self.policy
            .execute_with_cancel(&cancel, || {
                self.inner.generate_structured(request, cancel.clone())
            })
            .await
    }
}
