//! Tool call lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::approvals::ConfirmationOutcome;
use crate::error::{ErrorCategory, RheoError};
use crate::tools::{ConfirmationDetails, RiskAssessment, ToolOutput};
use crate::types::{ToolCallRequest, ToolResult};

/// Payload folded into history for a call the user declined.
pub const CANCELLED_BY_USER: &str = "cancelled by user";
/// Payload folded into history for a call stopped by a session abort.
pub const CANCELLED_BY_ABORT: &str = "cancelled: session aborted";

/// Where a tool call is in its lifecycle.
///
/// `proposed -> validating -> [awaiting_approval ->] scheduled -> executing
/// -> success | error`, with `error` reachable from validation and
/// `cancelled` from every state before `executing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallStatus {
    Proposed,
    Validating,
    AwaitingApproval,
    /// Cleared to run, waiting for a concurrency slot.
    Scheduled,
    Executing,
    Success,
    Error,
    Cancelled,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use ToolCallStatus::*;
        matches!(
            (self, next),
            (Proposed, Validating | Cancelled)
                | (Validating, AwaitingApproval | Scheduled | Error | Cancelled)
                | (AwaitingApproval, Scheduled | Cancelled)
                | (Scheduled, Executing | Cancelled)
                | (Executing, Success | Error)
        )
    }
}

/// Why a call ended in `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    User,
    Aborted,
}

/// Everything the scheduler knows about one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallState {
    pub request: ToolCallRequest,
    pub status: ToolCallStatus,
    pub description: Option<String>,
    pub risk: Option<RiskAssessment>,
    pub confirmation: Option<ConfirmationDetails>,
    pub outcome: Option<ConfirmationOutcome>,
    pub result: Option<ToolOutput>,
    pub error: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub cancel_reason: Option<CancelReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ToolCallState {
    pub fn new(request: ToolCallRequest) -> Self {
        Self {
            request,
            status: ToolCallStatus::Proposed,
            description: None,
            risk: None,
            confirmation: None,
            outcome: None,
            result: None,
            error: None,
            error_category: None,
            cancel_reason: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.request.call_id
    }

    pub fn name(&self) -> &str {
        &self.request.name
    }

    /// Move to `next`, refusing any transition the lifecycle forbids.
    pub fn transition(&mut self, next: ToolCallStatus) -> Result<(), RheoError> {
        if !self.status.can_transition_to(next) {
            return Err(RheoError::InvalidState(format!(
                "tool call {} cannot move from {} to {}",
                self.request.call_id, self.status, next
            )));
        }
        self.status = next;
        match next {
            ToolCallStatus::Executing => self.started_at = Some(Utc::now()),
            status if status.is_terminal() => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// The result part folded into history. Only meaningful once terminal.
    pub fn to_tool_result(&self) -> ToolResult {
        let (payload, is_error) = match self.status {
            ToolCallStatus::Success => (
                self.result
                    .as_ref()
                    .map(|output| output.llm_content.clone())
                    .unwrap_or(serde_json::Value::Null),
                false,
            ),
            ToolCallStatus::Cancelled => match self.cancel_reason {
                Some(CancelReason::User) => (serde_json::json!(CANCELLED_BY_USER), false),
                _ => (serde_json::json!(CANCELLED_BY_ABORT), true),
            },
            _ => {
                let category = self.error_category.unwrap_or(ErrorCategory::ToolExecution);
                let message = self
                    .error
                    .clone()
                    .unwrap_or_else(|| "tool call did not complete".to_string());
                let mut payload = serde_json::json!({
                    "error": message,
                    "category": category,
                });
                if let Some(output) = &self.result {
                    payload["output"] = output.llm_content.clone();
                }
                (payload, true)
            }
        };
        ToolResult {
            id: self.request.call_id.clone(),
            name: self.request.name.clone(),
            payload,
            is_error,
        }
    }

    /// Text for a user-facing display of the outcome.
    pub fn display(&self) -> String {
        match self.status {
            ToolCallStatus::Success => self
                .result
                .as_ref()
                .map(|output| output.display_content.clone())
                .unwrap_or_default(),
            ToolCallStatus::Error => self.error.clone().unwrap_or_default(),
            ToolCallStatus::Cancelled => match self.cancel_reason {
                Some(CancelReason::User) => CANCELLED_BY_USER.to_string(),
                _ => CANCELLED_BY_ABORT.to_string(),
            },
            status => status.to_string(),
        }
    }
}

/// A batch whose calls are all terminal, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedBatch {
    pub batch_id: u64,
    pub calls: Vec<ToolCallState>,
}

impl CompletedBatch {
    pub fn tool_results(&self) -> Vec<ToolResult> {
        self.calls.iter().map(ToolCallState::to_tool_result).collect()
    }
}
