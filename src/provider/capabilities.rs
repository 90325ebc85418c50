//! Model capabilities descriptor.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_CONTEXT_WINDOW;

/// Describes what a model can do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCapabilities {
    pub supports_tools: bool,
    pub supports_json_schema: bool,
    pub supports_reasoning: bool,
    pub context_length: usize,
    pub max_output_tokens: Option<usize>,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: true,
            supports_json_schema: true,
            supports_reasoning: false,
            context_length: DEFAULT_CONTEXT_WINDOW,
            max_output_tokens: None,
        }
    }
}

impl ModelCapabilities {
    /// Tool- and schema-capable model with the given window.
    pub fn full(context_length: usize) -> Self {
        Self {
            context_length,
            ..Self::default()
        }
    }
}
