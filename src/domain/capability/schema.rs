//! Parameter schema checks for capability invocations.
//!
//! Supports the JSON Schema subset capability authors actually use:
//! `type`, `required`, `properties`, `additionalProperties: false`, `enum`,
//! `minimum`/`maximum`, `minLength`/`maxLength` and `items`.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised when parameters do not match a schema.
///
/// Every variant names the offending field path (`location.city`, `tags[2]`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaValidationError {
    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid type for field {field}: expected {expected}, got {actual}")]
    InvalidType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Field {field} must be one of {allowed}")]
    NotInEnum { field: String, allowed: String },

    #[error("Value out of range for field {field}: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Unexpected field: {field}")]
    UnexpectedField { field: String },

    #[error("Invalid schema at {field}: {message}")]
    InvalidSchema { field: String, message: String },
}

impl SchemaValidationError {
    /// The field path this error refers to.
    pub fn field(&self) -> &str {
        match self {
            SchemaValidationError::MissingRequired { field }
            | SchemaValidationError::InvalidType { field, .. }
            | SchemaValidationError::NotInEnum { field, .. }
            | SchemaValidationError::OutOfRange { field, .. }
            | SchemaValidationError::UnexpectedField { field }
            | SchemaValidationError::InvalidSchema { field, .. } => field,
        }
    }
}

const KNOWN_TYPES: [&str; 7] = [
    "object", "string", "number", "integer", "boolean", "array", "null",
];

/// Checks that `schema` is a usable parameter schema: an object schema whose
/// nested `type` keywords are all recognised.
pub fn check_parameter_schema(schema: &Value) -> Result<(), SchemaValidationError> {
    let obj = schema
        .as_object()
        .ok_or_else(|| invalid_schema("root", "schema must be a JSON object"))?;
    match obj.get("type").and_then(Value::as_str) {
        Some("object") => {}
        _ => return Err(invalid_schema("root", "parameter schema must have type \"object\"")),
    }
    check_schema_node(schema, "root")
}

/// Checks a return schema; any well-formed schema node is accepted.
pub fn check_return_schema(schema: &Value) -> Result<(), SchemaValidationError> {
    if !schema.is_object() {
        return Err(invalid_schema("root", "schema must be a JSON object"));
    }
    check_schema_node(schema, "root")
}

fn check_schema_node(schema: &Value, path: &str) -> Result<(), SchemaValidationError> {
    let Some(obj) = schema.as_object() else {
        return Err(invalid_schema(path, "schema node must be a JSON object"));
    };
    if let Some(ty) = obj.get("type") {
        match ty.as_str() {
            Some(name) if KNOWN_TYPES.contains(&name) => {}
            _ => return Err(invalid_schema(path, format!("unsupported type {}", ty))),
        }
    }
    if let Some(required) = obj.get("required") {
        let ok = required
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !ok {
            return Err(invalid_schema(path, "required must be an array of strings"));
        }
    }
    if let Some(props) = obj.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| invalid_schema(path, "properties must be an object"))?;
        for (name, node) in props {
            check_schema_node(node, &join(path, name))?;
        }
    }
    if let Some(items) = obj.get("items") {
        check_schema_node(items, &format!("{}[]", path))?;
    }
    Ok(())
}

/// Validates `value` against `schema`, returning the first violation.
pub fn validate_parameters(schema: &Value, value: &Value) -> Result<(), SchemaValidationError> {
    validate_node(schema, value, "root")
}

fn validate_node(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaValidationError> {
    let Some(rules) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = rules.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(SchemaValidationError::InvalidType {
                field: path.to_string(),
                expected: expected.to_string(),
                actual: type_name(value).to_string(),
            });
        }
    }

    if let Some(allowed) = rules.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(SchemaValidationError::NotInEnum {
                field: path.to_string(),
                allowed: Value::Array(allowed.clone()).to_string(),
            });
        }
    }

    match value {
        Value::Object(obj) => validate_object(rules, obj, path)?,
        Value::Array(items) => {
            if let Some(item_schema) = rules.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_node(item_schema, item, &format!("{}[{}]", path, i))?;
                }
            }
        }
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                check_bounds(rules, v, "minimum", "maximum", path)?;
            }
        }
        Value::String(s) => {
            check_bounds(rules, s.chars().count() as f64, "minLength", "maxLength", path)?;
        }
        _ => {}
    }
    Ok(())
}

fn validate_object(
    rules: &Map<String, Value>,
    obj: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaValidationError> {
    if let Some(required) = rules.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(field) {
                return Err(SchemaValidationError::MissingRequired {
                    field: join(path, field),
                });
            }
        }
    }

    let props = rules.get("properties").and_then(Value::as_object);
    if let Some(props) = props {
        for (name, prop_schema) in props {
            if let Some(v) = obj.get(name) {
                validate_node(prop_schema, v, &join(path, name))?;
            }
        }
    }

    if rules.get("additionalProperties") == Some(&Value::Bool(false)) {
        if let Some(extra) = obj
            .keys()
            .find(|k| !props.is_some_and(|p| p.contains_key(k.as_str())))
        {
            return Err(SchemaValidationError::UnexpectedField {
                field: join(path, extra),
            });
        }
    }
    Ok(())
}

fn check_bounds(
    rules: &Map<String, Value>,
    actual: f64,
    min_key: &str,
    max_key: &str,
    path: &str,
) -> Result<(), SchemaValidationError> {
    let min = rules.get(min_key).and_then(Value::as_f64);
    let max = rules.get(max_key).and_then(Value::as_f64);
    let below = min.is_some_and(|m| actual < m);
    let above = max.is_some_and(|m| actual > m);
    if below || above {
        let show = |b: Option<f64>| b.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        return Err(SchemaValidationError::OutOfRange {
            field: path.to_string(),
            value: actual.to_string(),
            min: show(min),
            max: show(max),
        });
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(parent: &str, field: &str) -> String {
    if parent == "root" {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

fn invalid_schema(path: &str, message: impl Into<String>) -> SchemaValidationError {
    SchemaValidationError::InvalidSchema {
        field: path.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "required": ["city"],
            "additionalProperties": false,
            "properties": {
                "city": {"type": "string", "minLength": 1},
                "units": {"type": "string", "enum": ["metric", "imperial"]},
                "days": {"type": "integer", "minimum": 1, "maximum": 14},
                "location": {
                    "type": "object",
                    "required": ["lat"],
                    "properties": {"lat": {"type": "number"}}
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    #[test]
    fn valid_parameters_pass() {
        let params = json!({"city": "Oslo", "units": "metric", "days": 3, "tags": ["a"]});
        assert!(validate_parameters(&weather_schema(), &params).is_ok());
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = validate_parameters(&weather_schema(), &json!({"units": "metric"})).unwrap_err();
        assert_eq!(err, SchemaValidationError::MissingRequired { field: "city".into() });
    }

    #[test]
    fn wrong_type_is_named() {
        let err = validate_parameters(&weather_schema(), &json!({"city": 42})).unwrap_err();
        assert_eq!(err.field(), "city");
        assert!(matches!(err, SchemaValidationError::InvalidType { .. }));
    }

    #[test]
    fn enum_violation_is_named() {
        let err =
            validate_parameters(&weather_schema(), &json!({"city": "Oslo", "units": "kelvin"}))
                .unwrap_err();
        assert_eq!(err.field(), "units");
    }

    #[test]
    fn nested_paths_are_reported() {
        let err = validate_parameters(
            &weather_schema(),
            &json!({"city": "Oslo", "location": {"lon": 1.0}}),
        )
        .unwrap_err();
        assert_eq!(err.field(), "location.lat");

        let err = validate_parameters(&weather_schema(), &json!({"city": "Oslo", "tags": ["a", 1]}))
            .unwrap_err();
        assert_eq!(err.field(), "tags[1]");
    }

    #[test]
    fn bounds_are_enforced() {
        let err = validate_parameters(&weather_schema(), &json!({"city": "Oslo", "days": 30}))
            .unwrap_err();
        assert!(matches!(err, SchemaValidationError::OutOfRange { .. }));
        let err = validate_parameters(&weather_schema(), &json!({"city": ""})).unwrap_err();
        assert_eq!(err.field(), "city");
    }

    #[test]
    fn additional_properties_rejected_when_closed() {
        let err = validate_parameters(&weather_schema(), &json!({"city": "Oslo", "extra": 1}))
            .unwrap_err();
        assert_eq!(err, SchemaValidationError::UnexpectedField { field: "extra".into() });
    }

    #[test]
    fn parameter_schema_must_be_object_type() {
        assert!(check_parameter_schema(&weather_schema()).is_ok());
        assert!(check_parameter_schema(&json!({"type": "string"})).is_err());
        assert!(check_parameter_schema(&json!("nope")).is_err());
    }

    #[test]
    fn unknown_types_are_invalid_schema() {
        let schema = json!({"type": "object", "properties": {"x": {"type": "decimal"}}});
        let err = check_parameter_schema(&schema).unwrap_err();
        assert_eq!(err.field(), "x");
    }
}
