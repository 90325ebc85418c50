//! Error types for rheo.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all rheo operations.
#[derive(Error, Debug)]
pub enum RheoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid arguments for {tool_name}: {message}")]
    Validation { tool_name: String, message: String },

    #[error("Tool call {call_id} was cancelled by the user")]
    ConfirmationDenied { call_id: String },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unknown tool call: {0}")]
    CallNotFound(String),

    #[error("Session turn limit of {max_turns} reached; start a new session")]
    SessionLimitExceeded { max_turns: usize },

    #[error("Operation canceled")]
    Canceled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RheoError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Stream(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                429 => ErrorCategory::RateLimit,
                408 => ErrorCategory::Timeout,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Provider { .. } => ErrorCategory::Api,
            Self::Validation { .. } | Self::InvalidArgument(_) => ErrorCategory::Validation,
            Self::ConfirmationDenied { .. } => ErrorCategory::ConfirmationDenied,
            Self::ToolExecution { .. } | Self::ToolNotFound(_) => ErrorCategory::ToolExecution,
            Self::SessionLimitExceeded { .. } => ErrorCategory::SessionLimit,
            Self::Canceled => ErrorCategory::Canceled,
            Self::CallNotFound(_) | Self::InvalidState(_) => ErrorCategory::InvalidState,
            Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable at the model boundary.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Validation => RecoverySuggestion::CorrectArguments,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::SessionLimit => RecoverySuggestion::StartNewSession,
            ErrorCategory::Canceled | ErrorCategory::ConfirmationDenied => RecoverySuggestion::None,
            ErrorCategory::Api => match self {
                Self::Api { status: 413, .. } => RecoverySuggestion::ReduceInputSize,
                _ => RecoverySuggestion::ContactSupport,
            },
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RheoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_rate_limit_errors_are_retryable() {
        assert!(RheoError::api(503, "unavailable").is_retryable());
        assert!(RheoError::api(429, "slow down").is_retryable());
        assert!(RheoError::RateLimited { retry_after_ms: Some(10) }.is_retryable());
        assert!(RheoError::Timeout(1000).is_retryable());
    }

    #[test]
    fn client_side_errors_are_not_retryable() {
        assert!(!RheoError::api(400, "bad request").is_retryable());
        assert!(!RheoError::Validation {
            tool_name: "sql".into(),
            message: "missing field".into(),
        }
        .is_retryable());
        assert!(!RheoError::SessionLimitExceeded { max_turns: 3 }.is_retryable());
        assert!(!RheoError::Canceled.is_retryable());
    }

    #[test]
    fn session_limit_suggests_fresh_session() {
        let err = RheoError::SessionLimitExceeded { max_turns: 50 };
        assert_eq!(err.category(), ErrorCategory::SessionLimit);
        assert_eq!(err.recovery_suggestion(), RecoverySuggestion::StartNewSession);
        assert_eq!(
            err.to_string(),
            "Session turn limit of 50 reached; start a new session"
        );
    }

    #[test]
    fn category_renders_as_snake_case() {
        assert_eq!(ErrorCategory::ToolExecution.to_string(), "tool_execution");
        assert_eq!(
            "rate_limit".parse::<ErrorCategory>().ok(),
            Some(ErrorCategory::RateLimit)
        );
    }
}
