//! Check tool call arguments against the tool's JSON Schema before anything
//! else sees them. Failures stay local: the scheduler turns them into an
//! error tool result without calling the tool.

use serde_json::Value;

/// Validate `args` against `schema`.
///
/// Covers the subset of JSON Schema tool declarations use in practice:
/// `type`, `required`, `properties` (recursively), `enum`, `items` and
/// `additionalProperties: false`. Returns the first violation found, with a
/// dotted path to the offending field.
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    check(args, schema, "")
}

fn check(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !value_matches_type(value, expected) {
            return Err(if path.is_empty() {
                format!("expected {expected} arguments, got {}", json_type_name(value))
            } else {
                format!(
                    "field '{path}' expected type '{expected}', got {}",
                    json_type_name(value)
                )
            });
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let allowed = allowed
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(format!("field '{path}' must be one of [{allowed}]"));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(name) {
                    return Err(format!("missing required field '{}'", join(path, name)));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, field) in obj {
            match properties.and_then(|props| props.get(key)) {
                Some(field_schema) => check(field, field_schema, &join(path, key))?,
                None if closed => {
                    return Err(format!("unexpected field '{}'", join(path, key)));
                }
                None => {}
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (value.as_array(), schema.get("items")) {
        for (index, item) in items.iter().enumerate() {
            check(item, item_schema, &format!("{path}[{index}]"))?;
        }
    }

    Ok(())
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" },
                "limit": { "type": "integer" },
                "mode": { "type": "string", "enum": ["read", "write"] },
                "tables": { "type": "array", "items": { "type": "string" } },
                "options": {
                    "type": "object",
                    "properties": { "timeout_ms": { "type": "integer" } },
                    "required": ["timeout_ms"],
                },
            },
            "required": ["sql"],
        })
    }

    #[test]
    fn rejects_non_object_args_when_schema_expects_object() {
        let err = validate_arguments(&json!("select 1"), &sql_schema()).unwrap_err();
        assert!(err.contains("expected object arguments"));
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = validate_arguments(&json!({ "limit": 3 }), &sql_schema()).unwrap_err();
        assert_eq!(err, "missing required field 'sql'");
    }

    #[test]
    fn rejects_wrong_field_type() {
        let err = validate_arguments(&json!({ "sql": 42 }), &sql_schema()).unwrap_err();
        assert!(err.contains("field 'sql' expected type 'string', got number"));
    }

    #[test]
    fn rejects_value_outside_enum() {
        let err =
            validate_arguments(&json!({ "sql": "x", "mode": "drop" }), &sql_schema()).unwrap_err();
        assert!(err.contains("field 'mode' must be one of"));
    }

    #[test]
    fn reports_nested_paths() {
        let err = validate_arguments(&json!({ "sql": "x", "options": {} }), &sql_schema())
            .unwrap_err();
        assert_eq!(err, "missing required field 'options.timeout_ms'");

        let err = validate_arguments(&json!({ "sql": "x", "tables": ["a", 1] }), &sql_schema())
            .unwrap_err();
        assert!(err.contains("field 'tables[1]'"));
    }

    #[test]
    fn closed_schema_rejects_unknown_fields() {
        let schema = json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "additionalProperties": false,
        });
        let err = validate_arguments(&json!({ "path": "a", "extra": 1 }), &schema).unwrap_err();
        assert_eq!(err, "unexpected field 'extra'");
    }

    #[test]
    fn accepts_valid_args_and_open_extras() {
        let args = json!({
            "sql": "select 1",
            "limit": 10,
            "mode": "read",
            "tables": ["users"],
            "options": { "timeout_ms": 100 },
            "note": "ignored",
        });
        assert!(validate_arguments(&args, &sql_schema()).is_ok());
        assert!(validate_arguments(&json!({ "anything": 1 }), &json!({})).is_ok());
    }
}
