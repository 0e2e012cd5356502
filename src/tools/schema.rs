//! Argument validation against a tool's JSON schema.
//!
//! Covers the subset of JSON Schema that tool definitions use in practice:
//! `type` (single or list), `enum`, `required`, `properties`,
//! `additionalProperties: false`, `items`, `minItems`/`maxItems`,
//! `minLength`/`maxLength`, `pattern`, and `minimum`/`maximum`. Unknown
//! keywords are ignored.

use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Validate `args` against `schema`.
///
/// Returns every violation found, each prefixed with the JSON path of the
/// offending value (`$` is the argument object itself).
///
/// ```
/// use femtoclaw::tools::validate_arguments;
/// use serde_json::json;
///
/// let schema = json!({
///     "type": "object",
///     "properties": { "count": { "type": "integer", "minimum": 1 } },
///     "required": ["count"]
/// });
/// assert!(validate_arguments(&schema, &json!({"count": 3})).is_ok());
///
/// let errors = validate_arguments(&schema, &json!({"count": "3"})).unwrap_err();
/// assert_eq!(errors, vec!["$.count: expected integer, got string"]);
/// ```
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    check(schema, args, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            errors.push(format!(
                "{}: expected {}, got {}",
                path,
                allowed.join(" or "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            let listed: Vec<String> = options.iter().map(Value::to_string).collect();
            errors.push(format!("{}: must be one of [{}]", path, listed.join(", ")));
        }
    }

    match value {
        Value::Object(map) => {
            if let Some(Value::Array(required)) = schema.get("required") {
                for name in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(name) {
                        errors.push(format!("{}: missing required property '{}'", path, name));
                    }
                }
            }
            let properties = schema.get("properties").and_then(Value::as_object);
            let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
            for (name, child) in map {
                let child_path = format!("{}.{}", path, name);
                match properties.and_then(|p| p.get(name)) {
                    Some(child_schema) => check(child_schema, child, &child_path, errors),
                    None if closed => {
                        errors.push(format!("{}: unexpected property", child_path))
                    }
                    None => {}
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                if (items.len() as u64) < min {
                    errors.push(format!("{}: expected at least {} items", path, min));
                }
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
                if (items.len() as u64) > max {
                    errors.push(format!("{}: expected at most {} items", path, max));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{}[{}]", path, i), errors);
                }
            }
        }
        Value::String(s) => {
            let len = s.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    errors.push(format!("{}: shorter than {} characters", path, min));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    errors.push(format!("{}: longer than {} characters", path, max));
                }
            }
            if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => {
                        errors.push(format!("{}: does not match pattern '{}'", path, pattern))
                    }
                    Ok(_) => {}
                    Err(e) => warn!(pattern, error = %e, "Ignoring invalid schema pattern"),
                }
            }
        }
        Value::Number(n) => {
            if let (Some(min), Some(v)) = (schema.get("minimum").and_then(Value::as_f64), n.as_f64())
            {
                if v < min {
                    errors.push(format!("{}: must be >= {}", path, min));
                }
            }
            if let (Some(max), Some(v)) = (schema.get("maximum").and_then(Value::as_f64), n.as_f64())
            {
                if v > max {
                    errors.push(format!("{}: must be <= {}", path, max));
                }
            }
        }
        _ => {}
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
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

    fn cron_like_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["add", "list", "remove"] },
                "every_seconds": { "type": "integer", "minimum": 1 },
                "tags": { "type": "array", "items": { "type": "string" }, "maxItems": 2 },
                "job_id": { "type": "string", "pattern": "^[a-f0-9]+$" }
            },
            "required": ["action"]
        })
    }

    #[test]
    fn test_valid_arguments_pass() {
        let args = json!({"action": "add", "every_seconds": 60, "tags": ["a"]});
        assert!(validate_arguments(&cron_like_schema(), &args).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let errors = validate_arguments(&cron_like_schema(), &json!({})).unwrap_err();
        assert_eq!(errors, vec!["$: missing required property 'action'"]);
    }

    #[test]
    fn test_collects_multiple_violations() {
        let args = json!({
            "action": "explode",
            "every_seconds": 0,
            "tags": ["a", 2, "c"],
            "job_id": "XYZ"
        });
        let errors = validate_arguments(&cron_like_schema(), &args).unwrap_err();
        assert!(errors.iter().any(|e| e.starts_with("$.action: must be one of")));
        assert!(errors.iter().any(|e| e == "$.every_seconds: must be >= 1"));
        assert!(errors.iter().any(|e| e == "$.tags: expected at most 2 items"));
        assert!(errors.iter().any(|e| e == "$.tags[1]: expected string, got integer"));
        assert!(errors.iter().any(|e| e.starts_with("$.job_id: does not match")));
    }

    #[test]
    fn test_non_object_arguments() {
        let errors = validate_arguments(&cron_like_schema(), &json!("add")).unwrap_err();
        assert_eq!(errors, vec!["$: expected object, got string"]);
    }

    #[test]
    fn test_additional_properties_false() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "additionalProperties": false
        });
        let errors = validate_arguments(&schema, &json!({"a": "x", "b": 1})).unwrap_err();
        assert_eq!(errors, vec!["$.b: unexpected property"]);
    }

    #[test]
    fn test_type_union_and_integer_float() {
        let schema = json!({ "type": ["integer", "null"] });
        assert!(validate_arguments(&schema, &json!(null)).is_ok());
        assert!(validate_arguments(&schema, &json!(5.0)).is_ok());
        assert!(validate_arguments(&schema, &json!(5.5)).is_err());
    }

    #[test]
    fn test_schema_without_constraints_accepts_anything() {
        assert!(validate_arguments(&json!({}), &json!({"x": [1, 2]})).is_ok());
    }
}
