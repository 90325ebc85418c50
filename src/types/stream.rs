//! Streaming types.

use serde::{Deserialize, Serialize};

use super::usage::Usage;

/// One chunk of a streamed model response.
///
/// Any combination of fields may be set. A chunk with `error` ends the turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning trace, never written to the transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ProposedToolCall>,
    /// Cumulative usage so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            thought: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(id: Option<&str>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool_calls: vec![ProposedToolCall {
                id: id.map(str::to_string),
                name: name.into(),
                args,
            }],
            ..Default::default()
        }
    }

    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// A tool call as reported by the backend; the id may be missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}
