//! Token estimation and transcript compression.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{curate, HistoryManager};
use crate::error::RheoError;
use crate::provider::{BackendHandle, StructuredRequest};
use crate::types::{Message, Part, Role};

const SUMMARY_HEADER: &str = "[Earlier conversation, summarized]";

/// Outcome of a compression that changed the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionInfo {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    /// `compressed_tokens / original_tokens`.
    pub ratio: f64,
}

/// When and how much to compress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionOptions {
    pub threshold_fraction: f64,
    pub preserve_fraction: f64,
    pub context_window: usize,
    /// Compress even below the threshold.
    pub force: bool,
}

impl CompressionOptions {
    pub fn threshold_tokens(&self) -> usize {
        (self.context_window as f64 * self.threshold_fraction) as usize
    }
}

/// Counts the tokens a transcript will cost.
pub trait TokenCounter: Send + Sync {
    fn count(&self, messages: &[Message]) -> Result<usize, RheoError>;
}

/// Four characters per token, plus a small per-message overhead.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenCounter for CharEstimator {
    fn count(&self, messages: &[Message]) -> Result<usize, RheoError> {
        Ok(messages.iter().map(estimate_message_tokens).sum())
    }
}

pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = 4usize;
    for part in &message.parts {
        tokens += match part {
            Part::Text { text } => estimate_text_tokens(text),
            Part::ToolCall(call) => {
                estimate_text_tokens(&call.name)
                    + estimate_text_tokens(&call.args.to_string())
                    + 8
            }
            Part::ToolResult(result) => {
                estimate_text_tokens(&result.id)
                    + estimate_text_tokens(&result.payload.to_string())
                    + 8
            }
        };
    }
    tokens
}

/// Produces the text standing in for the compressed prefix.
#[async_trait]
pub trait HistorySummarizer: Send + Sync {
    async fn summarize(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> Result<String, RheoError>;
}

/// Deterministic digest of the most recent lines of the prefix.
#[derive(Debug, Clone, Copy)]
pub struct TranscriptDigest {
    pub max_lines: usize,
    pub max_line_chars: usize,
}

impl Default for TranscriptDigest {
    fn default() -> Self {
        Self {
            max_lines: 10,
            max_line_chars: 100,
        }
    }
}

#[async_trait]
impl HistorySummarizer for TranscriptDigest {
    async fn summarize(
        &self,
        messages: &[Message],
        _cancel: CancellationToken,
    ) -> Result<String, RheoError> {
        let lines = serialize_messages_for_summary(messages);
        let skipped = lines.len().saturating_sub(self.max_lines);
        let mut digest: Vec<String> = lines
            .into_iter()
            .skip(skipped)
            .map(|line| truncate_chars(&line, self.max_line_chars))
            .collect();
        if skipped > 0 {
            digest.insert(0, format!("({skipped} earlier lines omitted)"));
        }
        Ok(digest.join("\n"))
    }
}

/// Asks the active model for a summary.
#[derive(Debug, Clone)]
pub struct ModelSummarizer {
    backend: BackendHandle,
}

impl ModelSummarizer {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl HistorySummarizer for ModelSummarizer {
    async fn summarize(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> Result<String, RheoError> {
        let transcript = serialize_messages_for_summary(messages).join("\n");
        let request = StructuredRequest {
            history: vec![Message::user(format!(
                "Summarize this conversation so it can replace the original. Keep the \
                 user's goals, decisions made, tool results that matter, and open tasks.\n\n\
                 {transcript}"
            ))],
            schema: serde_json::json!({
                "type": "object",
                "properties": { "summary": { "type": "string" } },
                "required": ["summary"],
            }),
            system_instruction: None,
        };
        let reply = self
            .backend
            .current()
            .generate_structured(&request, cancel)
            .await?;
        reply
            .get("summary")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| RheoError::Stream("summary reply had no 'summary' field".to_string()))
    }
}

/// One line per part, tagged with role.
pub fn serialize_messages_for_summary(messages: &[Message]) -> Vec<String> {
    let mut lines = Vec::new();
    for message in messages {
        for part in &message.parts {
            match (message.role, part) {
                (Role::User, Part::Text { text }) => lines.push(format!("[user] {text}")),
                (Role::Agent, Part::Text { text }) => lines.push(format!("[agent] {text}")),
                (_, Part::ToolCall(call)) => {
                    lines.push(format!("[agent.tool_call] {} {}", call.name, call.args));
                }
                (_, Part::ToolResult(result)) => lines.push(format!(
                    "[tool] {} is_error={} result={}",
                    result.name, result.is_error, result.payload
                )),
            }
        }
    }
    lines
}

fn truncate_chars(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let mut out: String = line.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Cut index for compressing `messages`, keeping roughly the last
/// `preserve_fraction` of them.
///
/// Starts at `(1 - preserve_fraction)` of the message count and moves
/// forward to the next plain user message, so a tool call is never
/// separated from its result. Returns `messages.len()` when there is no
/// such boundary.
pub fn find_cut_index(messages: &[Message], preserve_fraction: f64) -> usize {
    if messages.is_empty() {
        return 0;
    }
    let target = ((messages.len() as f64) * (1.0 - preserve_fraction)) as usize;
    let mut index = target.min(messages.len() - 1);
    while index < messages.len() && !messages[index].is_plain_user() {
        index += 1;
    }
    index
}

impl HistoryManager {
    /// Compress the transcript when the curated view is over the threshold.
    ///
    /// The prefix before the cut point is replaced by one summary user
    /// message; the full transcript becomes `summary + curated suffix`.
    /// Returns `None` when nothing changed, including when tokens cannot be
    /// counted or the summarizer fails.
    pub async fn compress(
        &mut self,
        options: CompressionOptions,
        counter: &dyn TokenCounter,
        summarizer: &dyn HistorySummarizer,
        cancel: CancellationToken,
    ) -> Option<CompressionInfo> {
        let curated = curate(self.full());
        if curated.is_empty() {
            return None;
        }

        let original_tokens = match counter.count(&curated) {
            Ok(tokens) => tokens,
            Err(error) => {
                tracing::warn!(%error, "Token estimation failed; skipping compression");
                return None;
            }
        };
        let threshold = options.threshold_tokens();
        if !options.force && original_tokens <= threshold {
            return None;
        }

        let cut = find_cut_index(&curated, options.preserve_fraction);
        if cut == 0 || cut >= curated.len() {
            tracing::debug!(
                messages = curated.len(),
                "No user boundary to compress at"
            );
            return None;
        }

        let summary = match summarizer.summarize(&curated[..cut], cancel).await {
            Ok(summary) => summary,
            Err(error) => {
                tracing::warn!(%error, "Summarizer failed; skipping compression");
                return None;
            }
        };

        let mut compressed = Vec::with_capacity(curated.len() - cut + 1);
        compressed.push(Message::user(format!("{SUMMARY_HEADER}\n{summary}")));
        compressed.extend_from_slice(&curated[cut..]);

        let compressed_tokens = match counter.count(&compressed) {
            Ok(tokens) => tokens,
            Err(error) => {
                tracing::warn!(%error, "Token estimation failed; skipping compression");
                return None;
            }
        };
        if compressed_tokens >= original_tokens {
            tracing::debug!(
                original_tokens,
                compressed_tokens,
                "Compression would not shrink the transcript"
            );
            return None;
        }

        self.replace(compressed);
        let info = CompressionInfo {
            original_tokens,
            compressed_tokens,
            ratio: compressed_tokens as f64 / original_tokens as f64,
        };
        tracing::info!(
            original_tokens,
            compressed_tokens,
            threshold,
            summarized_messages = cut,
            "Compressed history"
        );
        Some(info)
    }
}
