//! Typed access to tool call arguments.

use serde::de::DeserializeOwned;

use crate::error::RheoError;

/// Tool call arguments as proposed by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    /// Wrap raw arguments. Models sometimes send the object JSON-encoded as a
    /// string; such payloads are decoded here once.
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::json!({}),
            serde_json::Value::String(raw) => match serde_json::from_str(&raw) {
                Ok(parsed @ serde_json::Value::Object(_)) => parsed,
                _ => serde_json::Value::String(raw),
            },
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        Self { value }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn into_raw(self) -> serde_json::Value {
        self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, RheoError> {
        self.get_str_opt(key)
            .ok_or_else(|| RheoError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, RheoError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| RheoError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Deserialize a single field.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, RheoError> {
        let field = self
            .value
            .get(key)
            .cloned()
            .ok_or_else(|| RheoError::InvalidArgument(format!("Missing argument: {key}")))?;
        Ok(serde_json::from_value(field)?)
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, RheoError> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

impl From<serde_json::Value> for ToolArguments {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_encoded_object_is_decoded() {
        let args = ToolArguments::new(json!("{\"sql\": \"select 1\"}"));
        assert_eq!(args.get_str("sql").unwrap(), "select 1");
    }

    #[test]
    fn null_and_blank_become_empty_object() {
        assert_eq!(ToolArguments::new(json!(null)).raw(), &json!({}));
        assert_eq!(ToolArguments::new(json!("  ")).raw(), &json!({}));
    }

    #[test]
    fn typed_field_access() {
        #[derive(serde::Deserialize)]
        struct Limit {
            rows: u32,
        }
        let args = ToolArguments::new(json!({ "limit": { "rows": 5 }, "dry_run": true }));
        assert_eq!(args.get::<Limit>("limit").unwrap().rows, 5);
        assert!(args.get_bool_or("dry_run", false));
        assert!(args.get_i64("missing").is_err());
    }
}
