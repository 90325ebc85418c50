//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category for routing recovery logic.
///
/// Serialized alongside `Error` events so consumers (and the model's next
/// turn) get a machine-readable reason next to the human message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    Validation,
    ConfirmationDenied,
    ToolExecution,
    SessionLimit,
    Canceled,
    InvalidState,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckConfiguration,
    IncreaseTimeout,
    ReduceInputSize,
    CorrectArguments,
    CheckToolImplementation,
    StartNewSession,
    None,
    ContactSupport,
}
