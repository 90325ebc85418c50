//! Convenience re-exports for common use.

pub use crate::config::RheoConfig;
pub use crate::error::{ErrorCategory, Result, RheoError};
pub use crate::history::{CompressionInfo, HistoryManager};
pub use crate::next_speaker::{NextSpeakerOracle, NextSpeakerVerdict, Speaker};
pub use crate::provider::{
    BackendHandle, ChatRequest, ModelBackend, StructuredRequest, ToolDeclaration,
};
pub use crate::scheduler::{ConfirmationOutcome, ToolCallScheduler, ToolCallStatus};
pub use crate::session::{PendingConfirmation, Session, SessionEvent};
pub use crate::tools::{
    ConfirmationDetails, FnTool, RiskAssessment, RiskLevel, SqlRiskEvaluator, Tool, ToolArguments,
    ToolOutput, ToolParameters, ToolRegistry,
};
pub use crate::types::{Message, Part, Role, StreamChunk, ToolCallRequest, Usage};
