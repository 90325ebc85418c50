//! Events the session streams to front-ends.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCategory;
use crate::history::CompressionInfo;
use crate::scheduler::{ToolCallState, ToolCallStatus};
use crate::tools::ConfirmationDetails;
use crate::types::{ToolCallRequest, Usage};

/// A parked call shown to the user for a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub call_id: String,
    pub name: String,
    pub description: Option<String>,
    pub details: ConfirmationDetails,
}

impl PendingConfirmation {
    pub(crate) fn from_state(state: &ToolCallState) -> Option<Self> {
        let details = state.confirmation.clone()?;
        Some(Self {
            call_id: state.request.call_id.clone(),
            name: state.request.name.clone(),
            description: state.description.clone(),
            details,
        })
    }
}

/// Everything a front-end renders while a message is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Content {
        text: String,
    },
    Thought {
        text: String,
    },
    ToolCallRequest {
        request: ToolCallRequest,
    },
    /// The current turn ended early. The session stays usable.
    Error {
        message: String,
        category: ErrorCategory,
    },
    /// Control returns to the caller until every listed call is resolved.
    AwaitingConfirmation {
        calls: Vec<PendingConfirmation>,
    },
    TokenUsage {
        model: String,
        usage: Usage,
    },
    /// Fatal for the session.
    SessionTurnLimitReached {
        max_turns: usize,
    },
    HistoryCompressed {
        info: CompressionInfo,
    },
    ToolCallCompleted {
        call_id: String,
        name: String,
        status: ToolCallStatus,
        display: String,
    },
    ModelSwitched {
        from: String,
        to: String,
    },
}

impl SessionEvent {
    pub fn error(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self::Error {
            message: message.into(),
            category,
        }
    }

    /// True for events after which the stream yields nothing more.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AwaitingConfirmation { .. }
                | Self::SessionTurnLimitReached { .. }
                | Self::ModelSwitched { .. }
        )
    }
}
