//! Tool-related types: parameter schemas, outputs, confirmation details.

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::risk::RiskAssessment;

/// JSON Schema describing a tool's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    pub schema: serde_json::Value,
}

impl ToolParameters {
    pub fn from_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    /// A tool that takes no arguments.
    pub fn empty() -> Self {
        Self::object().build()
    }

    pub fn object() -> ParameterBuilder {
        ParameterBuilder::default()
    }
}

/// Builder for object-shaped parameter schemas.
#[derive(Default)]
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    pub fn string(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.property(name, "string", description, required)
    }

    pub fn integer(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.property(name, "integer", description, required)
    }

    pub fn boolean(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.property(name, "boolean", description, required)
    }

    /// A string restricted to `values`.
    pub fn string_enum(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({
                "type": "string",
                "description": description.into(),
                "enum": values,
            }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    fn property(
        mut self,
        name: impl Into<String>,
        kind: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({ "type": kind, "description": description.into() }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    pub fn build(self) -> ToolParameters {
        ToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// What a tool produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Sent back to the model.
    pub llm_content: serde_json::Value,
    /// Shown to the user.
    pub display_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Set when the tool ran but failed; the call then ends in `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    /// Output whose display text mirrors the model content.
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            llm_content: serde_json::Value::String(content.clone()),
            display_content: content,
            summary: None,
            error: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            display_content: value.to_string(),
            llm_content: value,
            summary: None,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            llm_content: serde_json::json!({ "error": message }),
            display_content: message.clone(),
            summary: None,
            error: Some(message),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// What the user is asked before a gated call runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ConfirmationDetails {
    #[builder(into)]
    pub title: String,
    #[builder(into)]
    pub description: String,
    pub risk: RiskAssessment,
    /// Key remembered by a "proceed always" answer. Defaults to
    /// `tool:operation_type:level`.
    #[builder(into)]
    pub risk_class: Option<String>,
}

impl ConfirmationDetails {
    /// The auto-approval key for this confirmation.
    pub fn class_key(&self, tool_name: &str) -> String {
        if let Some(class) = &self.risk_class {
            return class.clone();
        }
        let operation = self
            .risk
            .operation_type
            .map(|op| op.to_string())
            .unwrap_or_else(|| "any".to_string());
        format!("{tool_name}:{operation}:{}", self.risk.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::risk::{OperationType, RiskLevel};

    #[test]
    fn builder_produces_object_schema() {
        let params = ToolParameters::object()
            .string("sql", "Statement to run", true)
            .integer("limit", "Row limit", false)
            .string_enum("mode", "Access mode", &["read", "write"], false)
            .build();

        assert_eq!(params.schema["type"], "object");
        assert_eq!(params.schema["required"], serde_json::json!(["sql"]));
        assert_eq!(params.schema["properties"]["limit"]["type"], "integer");
        assert_eq!(params.schema["properties"]["mode"]["enum"][1], "write");
    }

    #[test]
    fn risk_class_defaults_to_tool_operation_and_level() {
        let mut risk = RiskAssessment::gated(RiskLevel::High, ["deletes rows"]);
        risk.operation_type = Some(OperationType::Modify);
        let details = ConfirmationDetails::builder()
            .title("Run SQL")
            .description("DELETE FROM users")
            .risk(risk)
            .build();

        assert_eq!(details.class_key("sql"), "sql:modify:high");
    }

    #[test]
    fn failed_output_carries_error() {
        let output = ToolOutput::failed("connection refused");
        assert_eq!(output.error.as_deref(), Some("connection refused"));
        assert_eq!(output.llm_content["error"], "connection refused");
    }
}
