//! Conversation transcript: append-only storage, the curated replay view,
//! and compression.

pub mod compression;

pub use compression::{
    estimate_message_tokens, estimate_text_tokens, CharEstimator, CompressionInfo,
    CompressionOptions, HistorySummarizer, ModelSummarizer, TokenCounter, TranscriptDigest,
};

use crate::types::{Message, Role};

/// Owns the transcript. The session is its only writer.
#[derive(Debug, Clone, Default)]
pub struct HistoryManager {
    messages: Vec<Message>,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing transcript.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Take ownership of `message` and append it.
    pub fn append(&mut self, message: Message) {
        if !message.is_valid() && message.role == Role::Agent {
            tracing::debug!(
                parts = message.parts.len(),
                "Appending agent message invalid for replay"
            );
        }
        self.messages.push(message);
    }

    /// Every message ever added, including ones unsafe to replay.
    pub fn full(&self) -> &[Message] {
        &self.messages
    }

    /// The replay-safe view. See [`curate`].
    pub fn curated(&self) -> Vec<Message> {
        curate(&self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub(crate) fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }
}

/// Filter a transcript down to what can be replayed to a model.
///
/// User messages are always kept. A maximal run of agent messages is kept
/// only when every message in it is valid; otherwise the run is dropped
/// together with the plain user message right before it. Tool-result
/// messages are never dropped, so no tool call loses its result.
pub fn curate(messages: &[Message]) -> Vec<Message> {
    let mut curated: Vec<Message> = Vec::with_capacity(messages.len());
    let mut index = 0;

    while index < messages.len() {
        if messages[index].role == Role::User {
            curated.push(messages[index].clone());
            index += 1;
            continue;
        }

        let start = index;
        while index < messages.len() && messages[index].role == Role::Agent {
            index += 1;
        }
        let run = &messages[start..index];
        if run.iter().all(Message::is_valid) {
            curated.extend_from_slice(run);
        } else if curated.last().is_some_and(Message::is_plain_user) {
            curated.pop();
        }
    }

    curated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Part, ToolCall, ToolResult};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(id: &str) -> Message {
        Message::new(
            Role::Agent,
            vec![Part::ToolCall(ToolCall {
                id: id.into(),
                name: "sql".into(),
                args: json!({}),
            })],
        )
    }

    fn result(id: &str) -> Message {
        Message::tool_result(ToolResult {
            id: id.into(),
            name: "sql".into(),
            payload: json!("ok"),
            is_error: false,
        })
    }

    #[test]
    fn append_keeps_everything_in_full_view() {
        let mut history = HistoryManager::new();
        history.append(Message::user("hi"));
        history.append(Message::agent(" "));
        assert_eq!(history.full().len(), 2);
        assert!(history.curated().is_empty());
    }

    #[test]
    fn appended_message_is_independent_of_caller_copy() {
        let mut history = HistoryManager::new();
        let mut message = Message::user("original");
        history.append(message.clone());
        message.parts.push(Part::text("mutated"));
        assert_eq!(history.full()[0], Message::user("original"));
    }

    #[test]
    fn invalid_run_drops_preceding_user_message() {
        let transcript = vec![
            Message::user("first"),
            Message::agent("answer"),
            Message::user("second"),
            Message::agent(""),
            Message::agent("trailing"),
            Message::user("third"),
        ];
        assert_eq!(
            curate(&transcript),
            vec![
                Message::user("first"),
                Message::agent("answer"),
                Message::user("third"),
            ]
        );
    }

    #[test]
    fn tool_result_is_never_orphaned() {
        let transcript = vec![
            Message::user("delete rows"),
            call("c1"),
            result("c1"),
            Message::agent("   "),
        ];
        assert_eq!(curate(&transcript), transcript[..3].to_vec());
    }

    #[test]
    fn curation_is_idempotent() {
        let transcripts = vec![
            vec![],
            vec![Message::agent("")],
            vec![Message::user("a"), Message::user("b"), Message::agent("")],
            vec![
                Message::user("a"),
                call("c1"),
                result("c1"),
                Message::user("Please continue."),
                Message::agent(" "),
                Message::user("b"),
                Message::agent("ok"),
                Message::agent(""),
            ],
            vec![Message::agent("x"), Message::user("y"), Message::agent("z")],
        ];
        for transcript in transcripts {
            let once = curate(&transcript);
            assert_eq!(curate(&once), once);
        }
    }
}
