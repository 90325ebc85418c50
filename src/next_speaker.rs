//! Who speaks next: a side-channel classification of the model's last reply.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::error::RheoError;
use crate::provider::{ModelBackend, StructuredRequest};
use crate::types::{Message, Role};

const CHECK_PROMPT: &str = "Analyze your previous reply and decide who should speak next.\n\
1. model: you stated a next action you are about to take (\"Next, I will...\", \"Now I'll...\").\n\
2. user: you asked the user a question that needs an answer.\n\
3. user: you finished the task and are waiting for new instructions.\n\
Reply only with JSON: {\"next_speaker\": \"user\" or \"model\", \"reasoning\": \"why\"}";

/// The party expected to produce the next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextSpeakerVerdict {
    pub next_speaker: Speaker,
    pub reasoning: String,
}

impl NextSpeakerVerdict {
    fn new(next_speaker: Speaker, reasoning: impl Into<String>) -> Self {
        Self {
            next_speaker,
            reasoning: reasoning.into(),
        }
    }
}

/// Stateless oracle. Nothing it asks or hears is written to the transcript.
#[derive(Debug, Clone, Default)]
pub struct NextSpeakerOracle;

impl NextSpeakerOracle {
    pub fn new() -> Self {
        Self
    }

    /// JSON schema of the verdict.
    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "next_speaker": {
                    "type": "string",
                    "enum": ["user", "model"],
                    "description": "Who should speak next",
                },
                "reasoning": {
                    "type": "string",
                    "description": "Explanation for the decision",
                },
            },
            "required": ["next_speaker", "reasoning"],
        })
    }

    /// Classify the curated transcript. Never fails: any problem with the
    /// structured call yields a `user` verdict.
    pub async fn check(
        &self,
        backend: &dyn ModelBackend,
        curated: &[Message],
        cancel: CancellationToken,
    ) -> NextSpeakerVerdict {
        if let Some(verdict) = Self::fast_path(curated) {
            tracing::debug!(
                next_speaker = %verdict.next_speaker,
                reasoning = %verdict.reasoning,
                "Next speaker decided without a model call"
            );
            return verdict;
        }

        if !backend.capabilities().supports_json_schema {
            return NextSpeakerVerdict::new(
                Speaker::User,
                "Backend cannot produce structured replies",
            );
        }

        let mut history = curated.to_vec();
        history.push(Message::user(CHECK_PROMPT));
        let request = StructuredRequest {
            history,
            schema: Self::schema(),
            system_instruction: Some(String::new()),
        };

        let reply = tokio::select! {
            _ = cancel.cancelled() => Err(RheoError::Canceled),
            reply = backend.generate_structured(&request, cancel.clone()) => reply,
        };
        let verdict = reply.and_then(|value| {
            serde_json::from_value::<NextSpeakerVerdict>(value).map_err(RheoError::from)
        });
        match verdict {
            Ok(verdict) => {
                tracing::debug!(
                    model = backend.model_id(),
                    next_speaker = %verdict.next_speaker,
                    "Next speaker classified"
                );
                verdict
            }
            Err(error) => {
                tracing::warn!(
                    model = backend.model_id(),
                    %error,
                    "Next speaker check failed; yielding to user"
                );
                NextSpeakerVerdict::new(
                    Speaker::User,
                    format!("Failed to determine next speaker: {error}"),
                )
            }
        }
    }

    fn fast_path(curated: &[Message]) -> Option<NextSpeakerVerdict> {
        let Some(last) = curated.last() else {
            return Some(NextSpeakerVerdict::new(Speaker::User, "Empty history"));
        };
        if last.is_tool_result() {
            return Some(NextSpeakerVerdict::new(
                Speaker::Model,
                "Tool result received, the model should process it",
            ));
        }
        if last.role == Role::Agent && !last.has_visible_text() {
            return Some(NextSpeakerVerdict::new(
                Speaker::Model,
                "Empty model response, it should continue",
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResult;
    use serde_json::json;

    #[test]
    fn tool_result_always_hands_back_to_model() {
        let history = vec![
            Message::user("count rows"),
            Message::tool_result(ToolResult {
                id: "c1".into(),
                name: "sql".into(),
                payload: json!(3),
                is_error: false,
            }),
        ];
        let verdict = NextSpeakerOracle::fast_path(&history).unwrap();
        assert_eq!(verdict.next_speaker, Speaker::Model);
    }

    #[test]
    fn empty_history_yields_to_user() {
        let verdict = NextSpeakerOracle::fast_path(&[]).unwrap();
        assert_eq!(verdict.next_speaker, Speaker::User);
    }

    #[test]
    fn visible_agent_text_needs_the_model() {
        let history = vec![Message::user("hi"), Message::agent("Hello!")];
        assert!(NextSpeakerOracle::fast_path(&history).is_none());
    }

    #[test]
    fn verdict_parses_from_wire_shape() {
        let verdict: NextSpeakerVerdict =
            serde_json::from_value(json!({"next_speaker": "model", "reasoning": "next step"}))
                .unwrap();
        assert_eq!(verdict.next_speaker, Speaker::Model);
    }
}
