//! Transcript message types.

use serde::{Deserialize, Serialize};

/// A message in the conversation transcript.
///
/// Messages are plain values: the history takes ownership on append, so a
/// caller keeps no handle into transcript state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    /// Create a message from parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Create a plain user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create an agent text message.
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, vec![Part::text(text)])
    }

    /// Create the user-role message carrying one tool result.
    pub fn tool_result(result: ToolResult) -> Self {
        Self::new(Role::User, vec![Part::ToolResult(result)])
    }

    /// Concatenate all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool calls proposed in this message.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Tool results carried by this message.
    pub fn tool_results(&self) -> Vec<&ToolResult> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// True when every part is a tool result.
    pub fn is_tool_result(&self) -> bool {
        !self.parts.is_empty() && self.parts.iter().all(|p| matches!(p, Part::ToolResult(_)))
    }

    /// A user message typed by a person (or the synthetic continue prompt),
    /// as opposed to a folded tool result.
    pub fn is_plain_user(&self) -> bool {
        self.role == Role::User && !self.is_tool_result()
    }

    /// Whether the message carries any non-whitespace text.
    pub fn has_visible_text(&self) -> bool {
        self.parts.iter().any(|part| match part {
            Part::Text { text } => !text.trim().is_empty(),
            _ => false,
        })
    }

    /// Whether an agent message is safe to replay to a model.
    ///
    /// Parts must be non-empty, no text part may be empty, and a message
    /// without tool parts needs some non-whitespace text.
    pub fn is_valid(&self) -> bool {
        if self.parts.is_empty() {
            return false;
        }
        let has_empty_text = self
            .parts
            .iter()
            .any(|part| matches!(part, Part::Text { text } if text.is_empty()));
        if has_empty_text {
            return false;
        }
        let has_tool_part = self
            .parts
            .iter()
            .any(|part| matches!(part, Part::ToolCall(_) | Part::ToolResult(_)));
        has_tool_part || self.has_visible_text()
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A tool call proposed by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// The recorded outcome of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_only_agent_message_is_invalid() {
        assert!(!Message::agent("   \n").is_valid());
        assert!(!Message::agent("").is_valid());
        assert!(!Message::new(Role::Agent, vec![]).is_valid());
        assert!(Message::agent("hello").is_valid());
    }

    #[test]
    fn tool_call_only_message_is_valid() {
        let message = Message::new(
            Role::Agent,
            vec![Part::ToolCall(ToolCall {
                id: "c1".into(),
                name: "query".into(),
                args: json!({}),
            })],
        );
        assert!(message.is_valid());
        assert!(!message.has_visible_text());
    }

    #[test]
    fn tool_result_message_is_not_plain_user() {
        let message = Message::tool_result(ToolResult {
            id: "c1".into(),
            name: "query".into(),
            payload: json!("ok"),
            is_error: false,
        });
        assert!(message.is_tool_result());
        assert!(!message.is_plain_user());
        assert!(Message::user("hi").is_plain_user());
    }

    #[test]
    fn parts_serialize_with_type_tag() {
        let value = serde_json::to_value(Part::text("hi")).unwrap();
        assert_eq!(value, json!({ "type": "text", "text": "hi" }));
    }
}
