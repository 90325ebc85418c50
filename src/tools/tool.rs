//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{ConfirmationDetails, ToolOutput, ToolParameters};
use crate::error::RheoError;
use crate::provider::ToolDeclaration;

/// Receives incremental output from long-running tools.
pub type OutputCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    pub call_id: String,
    pub prompt_id: String,
}

/// Contract every tool satisfies: validate, describe, confirm, execute.
///
/// The scheduler is the only caller. `validate` and `should_confirm` run
/// before `execute`, and `execute` never runs for a call that failed
/// validation or was declined.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Semantic checks beyond the JSON Schema, which the scheduler applies first.
    fn validate(&self, _args: &ToolArguments) -> Result<(), String> {
        Ok(())
    }

    /// One-line description of what this invocation will do.
    fn describe(&self, args: &ToolArguments) -> String {
        format!("{} {}", self.name(), args.raw())
    }

    /// `Some` when the call must wait for a human decision.
    async fn should_confirm(
        &self,
        _args: &ToolArguments,
        _cancel: CancellationToken,
    ) -> Result<Option<ConfirmationDetails>, RheoError> {
        Ok(None)
    }

    /// Run the tool. Errors are recorded as data by the scheduler.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
        cancel: CancellationToken,
        on_output: Option<OutputCallback>,
    ) -> Result<ToolOutput, RheoError>;

    /// Declaration sent to the model backend.
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }
}

type ExecuteFn = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
        CancellationToken,
        Option<OutputCallback>,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, RheoError>> + Send>>
    + Send
    + Sync;

type ConfirmFn = dyn Fn(&ToolArguments) -> Option<ConfirmationDetails> + Send + Sync;

type ValidateFn = dyn Fn(&ToolArguments) -> Result<(), String> + Send + Sync;

/// Closure-based tool for quick tool creation.
pub struct FnTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    execute: Arc<ExecuteFn>,
    confirm: Option<Arc<ConfirmFn>>,
    validate: Option<Arc<ValidateFn>>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext, CancellationToken, Option<OutputCallback>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<ToolOutput, RheoError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            execute: Arc::new(move |args, ctx, cancel, on_output| {
                Box::pin(handler(args, ctx, cancel, on_output))
            }),
            confirm: None,
            validate: None,
        }
    }

    /// Gate calls through `confirm`; returning `Some` parks the call.
    pub fn with_confirmation<F>(mut self, confirm: F) -> Self
    where
        F: Fn(&ToolArguments) -> Option<ConfirmationDetails> + Send + Sync + 'static,
    {
        self.confirm = Some(Arc::new(confirm));
        self
    }

    pub fn with_validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&ToolArguments) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn validate(&self, args: &ToolArguments) -> Result<(), String> {
        match &self.validate {
            Some(validate) => validate(args),
            None => Ok(()),
        }
    }

    async fn should_confirm(
        &self,
        args: &ToolArguments,
        _cancel: CancellationToken,
    ) -> Result<Option<ConfirmationDetails>, RheoError> {
        Ok(self.confirm.as_ref().and_then(|confirm| confirm(args)))
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
        cancel: CancellationToken,
        on_output: Option<OutputCallback>,
    ) -> Result<ToolOutput, RheoError> {
        (self.execute)(args.clone(), ctx.clone(), cancel, on_output).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("gated", &self.confirm.is_some())
            .finish()
    }
}
