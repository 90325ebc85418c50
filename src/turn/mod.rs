//! One request/stream-response exchange with the model backend.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCategory, RheoError};
use crate::history::HistoryManager;
use crate::provider::{ChatRequest, ModelBackend, ToolDeclaration};
use crate::types::{Message, Part, Role, ToolCallRequest, Usage};

/// Events produced while a turn streams.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Content(String),
    Thought(String),
    ToolCallRequest(ToolCallRequest),
    /// Ends the turn.
    Error(TurnError),
    /// Emitted once, after the stream ends.
    TokenUsage(Usage),
}

/// A failure that ended a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnError {
    pub message: String,
    pub category: ErrorCategory,
}

impl From<&RheoError> for TurnError {
    fn from(error: &RheoError) -> Self {
        Self {
            message: error.to_string(),
            category: error.category(),
        }
    }
}

/// Drives a single turn. Collects proposed tool calls but never runs them.
pub struct TurnExecutor {
    backend: Arc<dyn ModelBackend>,
    tools: Vec<ToolDeclaration>,
    system_instruction: Option<String>,
    debug: bool,
}

impl TurnExecutor {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            tools: Vec::new(),
            system_instruction: None,
            debug: crate::util::debug_enabled(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = self.debug || debug;
        self
    }

    /// Append `input` (if non-blank), stream the model's reply, then append
    /// the agent message. The agent message is written even when the
    /// stream fails or is aborted, holding whatever arrived.
    pub fn run<'a>(
        &'a self,
        history: &'a mut HistoryManager,
        input: String,
        prompt_id: String,
        cancel: CancellationToken,
    ) -> impl Stream<Item = TurnEvent> + Send + 'a {
        async_stream::stream! {
            if !input.trim().is_empty() {
                history.append(Message::user(input));
            }
            let request = ChatRequest {
                history: history.curated(),
                tools: if self.backend.capabilities().supports_tools {
                    self.tools.clone()
                } else {
                    Vec::new()
                },
                system_instruction: self.system_instruction.clone(),
            };

            let mut text = String::new();
            let mut calls = Vec::new();
            let mut usage: Option<Usage> = None;
            let mut chunk_count = 0usize;
            let mut aborted = false;

            let opened = tokio::select! {
                _ = cancel.cancelled() => Err(RheoError::Canceled),
                result = self.backend.stream_chat(&request, cancel.clone()) => result,
            };

            match opened {
                Err(RheoError::Canceled) => aborted = true,
                Err(error) => {
                    tracing::warn!(
                        model = self.backend.model_id(),
                        %error,
                        "Model stream failed to open"
                    );
                    yield TurnEvent::Error(TurnError::from(&error));
                }
                Ok(mut chunks) => loop {
                    let item = tokio::select! {
                        _ = cancel.cancelled() => {
                            aborted = true;
                            break;
                        }
                        item = chunks.next() => item,
                    };
                    let chunk = match item {
                        None => break,
                        Some(Ok(chunk)) => chunk,
                        Some(Err(error)) => {
                            tracing::warn!(
                                model = self.backend.model_id(),
                                %error,
                                "Model stream failed"
                            );
                            yield TurnEvent::Error(TurnError::from(&error));
                            break;
                        }
                    };
                    chunk_count += 1;
                    if self.debug {
                        tracing::debug!(chunk = chunk_count, ?chunk, "Stream chunk");
                    }

                    if let Some(thought) = chunk.thought.filter(|t| !t.is_empty()) {
                        yield TurnEvent::Thought(thought);
                    }
                    if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                        text.push_str(&content);
                        yield TurnEvent::Content(content);
                    }
                    for proposed in chunk.tool_calls {
                        let call_id = proposed
                            .id
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| ToolCallRequest::synthesize_id(&proposed.name));
                        let request = ToolCallRequest::new(
                            call_id,
                            proposed.name,
                            proposed.args,
                            prompt_id.clone(),
                        );
                        calls.push(request.to_tool_call());
                        yield TurnEvent::ToolCallRequest(request);
                    }
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                    if let Some(message) = chunk.error {
                        yield TurnEvent::Error(TurnError {
                            message,
                            category: ErrorCategory::Api,
                        });
                        break;
                    }
                },
            }

            tracing::debug!(
                model = self.backend.model_id(),
                prompt_id = %prompt_id,
                chunks = chunk_count,
                text_chars = text.len(),
                tool_calls = calls.len(),
                aborted,
                "Turn stream finished"
            );

            let mut parts = Vec::with_capacity(calls.len() + 1);
            if !text.is_empty() {
                parts.push(Part::text(text));
            }
            parts.extend(calls.into_iter().map(Part::ToolCall));
            if !parts.is_empty() {
                history.append(Message::new(Role::Agent, parts));
            }

            if let Some(usage) = usage {
                yield TurnEvent::TokenUsage(usage);
            }
        }
    }
}
