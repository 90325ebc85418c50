//! Shared test helpers: a scripted backend and reusable tools.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use rheo::error::RheoError;
use rheo::provider::{
    ChatRequest, ChunkStream, ModelBackend, ModelCapabilities, StructuredRequest,
};
use rheo::session::SessionEvent;
use rheo::tools::{
    ConfirmationDetails, FnTool, OutputCallback, SqlRiskEvaluator, Tool, ToolArguments,
    ToolExecutionContext, ToolOutput, ToolParameters, ToolRegistry,
};
use rheo::types::{StreamChunk, Usage};

/// One scripted reply to `stream_chat`.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Chunks(Vec<StreamChunk>),
    /// Opening the stream fails with a non-retryable API error.
    OpenFailure(String),
    /// The chunks arrive, then the stream fails.
    FailAfter(Vec<StreamChunk>, String),
    /// The chunks arrive, then the stream never ends.
    Hang(Vec<StreamChunk>),
}

/// A backend that replays queued turns and structured replies.
pub struct ScriptedBackend {
    model_id: String,
    capabilities: ModelCapabilities,
    turns: Mutex<VecDeque<ScriptedTurn>>,
    structured: Mutex<VecDeque<Result<serde_json::Value, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
    structured_requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedBackend {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            capabilities: ModelCapabilities::full(128_000),
            turns: Mutex::new(VecDeque::new()),
            structured: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            structured_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.capabilities = ModelCapabilities::full(context_length);
        self
    }

    pub fn queue(&self, turn: ScriptedTurn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    /// Queue a plain text reply with usage.
    pub fn queue_text(&self, text: &str) {
        self.queue(ScriptedTurn::Chunks(vec![
            StreamChunk::content(text),
            StreamChunk::usage(Usage::new(10, 20)),
        ]));
    }

    /// Queue a reply proposing tool calls, `(id, name, args)` each.
    pub fn queue_tool_calls(&self, calls: Vec<(&str, &str, serde_json::Value)>) {
        let mut chunks: Vec<StreamChunk> = calls
            .into_iter()
            .map(|(id, name, args)| StreamChunk::tool_call(Some(id), name, args))
            .collect();
        chunks.push(StreamChunk::usage(Usage::new(10, 5)));
        self.queue(ScriptedTurn::Chunks(chunks));
    }

    pub fn queue_verdict(&self, next_speaker: &str) {
        self.structured.lock().unwrap().push_back(Ok(json!({
            "next_speaker": next_speaker,
            "reasoning": "scripted",
        })));
    }

    pub fn queue_structured(&self, reply: Result<serde_json::Value, String>) {
        self.structured.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn structured_requests(&self) -> Vec<StructuredRequest> {
        self.structured_requests.lock().unwrap().clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<ChunkStream, RheoError> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::Chunks(vec![StreamChunk::content("Done.")]));

        match turn {
            ScriptedTurn::Chunks(chunks) => {
                Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
            }
            ScriptedTurn::OpenFailure(message) => Err(RheoError::api(400, message)),
            ScriptedTurn::FailAfter(chunks, message) => {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        yield Ok(chunk);
                    }
                    yield Err(RheoError::api(400, message));
                };
                Ok(stream.boxed())
            }
            ScriptedTurn::Hang(chunks) => {
                let stream = async_stream::stream! {
                    for chunk in chunks {
                        yield Ok(chunk);
                    }
                    futures::future::pending::<()>().await;
                };
                Ok(stream.boxed())
            }
        }
    }

    async fn generate_structured(
        &self,
        request: &StructuredRequest,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, RheoError> {
        self.structured_requests
            .lock()
            .unwrap()
            .push(request.clone());
        match self.structured.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(RheoError::api(400, message)),
            None => Ok(json!({"next_speaker": "user", "reasoning": "default"})),
        }
    }
}

/// Echoes its `text` argument.
pub fn echo_tool() -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "echo",
        "Echo the input text",
        ToolParameters::object()
            .string("text", "Text to echo", true)
            .build(),
        |args, _ctx, _cancel, _on_output| async move {
            let text = args.get_str("text")?;
            Ok(ToolOutput::text(text))
        },
    ))
}

/// Sleeps `ms`, then records `label` in `finished` and returns it.
pub fn sleep_tool(finished: Arc<Mutex<Vec<String>>>) -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "sleep",
        "Sleep then answer",
        ToolParameters::object()
            .string("label", "Answer", true)
            .integer("ms", "Delay in milliseconds", true)
            .build(),
        move |args, _ctx, cancel, on_output| {
            let finished = finished.clone();
            async move {
                let label = args.get_str("label")?.to_string();
                let ms = args.get_i64("ms")?.max(0) as u64;
                if let Some(on_output) = &on_output {
                    on_output(format!("{label} started"));
                }
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                }
                finished.lock().unwrap().push(label.clone());
                Ok(ToolOutput::text(label))
            }
        },
    ))
}

/// Runs SQL after a risk check; counts executions.
pub fn sql_tool(executions: Arc<AtomicUsize>) -> Arc<FnTool> {
    let evaluator = SqlRiskEvaluator::new();
    Arc::new(
        FnTool::new(
            "sql",
            "Execute a SQL statement",
            ToolParameters::object()
                .string("sql", "Statement to run", true)
                .build(),
            move |args, _ctx, _cancel, _on_output| {
                let executions = executions.clone();
                async move {
                    let sql = args.get_str("sql")?.to_string();
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(ToolOutput::json(json!({"statement": sql, "rows_affected": 3})))
                }
            },
        )
        .with_confirmation(move |args| {
            let sql = args.get_str_opt("sql")?;
            let risk = evaluator.evaluate(sql);
            risk.requires_confirmation.then(|| {
                ConfirmationDetails::builder()
                    .title("Execute SQL")
                    .description(sql)
                    .risk(risk)
                    .build()
            })
        }),
    )
}

/// Always fails while executing.
pub fn failing_tool() -> Arc<FnTool> {
    Arc::new(FnTool::new(
        "explode",
        "Fails every time",
        ToolParameters::empty(),
        |_args, _ctx, _cancel, _on_output| async move {
            Err(RheoError::ToolExecution {
                tool_name: "explode".into(),
                message: "boom".into(),
            })
        },
    ))
}

/// A tool whose confirmation check takes `delay` before clearing the call.
pub struct SlowConfirmTool {
    parameters: ToolParameters,
    delay: Duration,
}

impl SlowConfirmTool {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            parameters: ToolParameters::empty(),
            delay,
        })
    }
}

#[async_trait]
impl Tool for SlowConfirmTool {
    fn name(&self) -> &str {
        "slow_check"
    }

    fn description(&self) -> &str {
        "Takes a while to decide whether it needs confirmation"
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn should_confirm(
        &self,
        _args: &ToolArguments,
        _cancel: CancellationToken,
    ) -> Result<Option<ConfirmationDetails>, RheoError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn execute(
        &self,
        _args: &ToolArguments,
        _ctx: &ToolExecutionContext,
        _cancel: CancellationToken,
        _on_output: Option<OutputCallback>,
    ) -> Result<ToolOutput, RheoError> {
        Ok(ToolOutput::text("checked"))
    }
}

pub fn registry_with(tools: Vec<Arc<FnTool>>) -> ToolRegistry {
    let registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    registry
}

/// Drain a session stream.
pub async fn collect<S>(stream: S) -> Vec<SessionEvent>
where
    S: futures::Stream<Item = SessionEvent>,
{
    stream.collect().await
}
