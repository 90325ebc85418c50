//! Tool call requests as handed from a turn to the scheduler.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use super::message::ToolCall;

/// Last timestamp handed out by [`ToolCallRequest::synthesize_id`].
static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// A model-proposed tool invocation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub args: serde_json::Value,
    /// Set when the call was issued by the client rather than the model.
    #[serde(default)]
    pub originated_by_client: bool,
    pub prompt_id: String,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
        prompt_id: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
            originated_by_client: false,
            prompt_id: prompt_id.into(),
        }
    }

    /// Build an id of the form `name-millis-suffix`.
    ///
    /// Milliseconds are strictly increasing within the process and the
    /// suffix is random, so ids stay unique across stream reconnects.
    pub fn synthesize_id(name: &str) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = LAST_ID_MILLIS.load(Ordering::Relaxed);
        let millis = loop {
            let next = now.max(last + 1);
            match LAST_ID_MILLIS.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break next,
                Err(observed) => last = observed,
            }
        };
        let suffix = 1000 + (uuid::Uuid::new_v4().as_u128() % 9000) as u32;
        format!("{name}-{millis}-{suffix}")
    }

    /// The transcript part recording this call.
    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.call_id.clone(),
            name: self.name.clone(),
            args: self.args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn synthesized_ids_are_unique_and_prefixed() {
        let ids: HashSet<String> = (0..200)
            .map(|_| ToolCallRequest::synthesize_id("run_sql"))
            .collect();
        assert_eq!(ids.len(), 200);
        assert!(ids.iter().all(|id| id.starts_with("run_sql-")));
    }
}
