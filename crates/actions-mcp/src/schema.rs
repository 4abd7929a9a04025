//! JSON Schema to argument validator translation
//!
//! Action input schemas come from the backend and are frequently incomplete:
//! missing `type`, arrays without `items`, unknown type names. Translation is
//! therefore total. Anything not understood becomes [`FieldType::Any`], and
//! an array without `items` is treated as an array of strings.
//!
//! The resulting [`ObjectShape`] is used two ways: it is rendered back into a
//! normalized JSON Schema for `tools/list`, and it parses call arguments
//! before a tool runs (unknown keys are dropped, typed fields are checked).

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Argument validation failure.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{path}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field (`(root)` for the arguments object)
    pub path: String,

    /// What was wrong
    pub message: String,
}

impl ValidationError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() {
                "(root)".to_string()
            } else {
                path.to_string()
            },
            message: message.into(),
        }
    }
}

/// Typed field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<FieldType>),
    Object(ObjectShape),
    Any,
}

/// A named field of an object shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field type
    pub ty: FieldType,

    /// Whether the field may be absent
    pub optional: bool,

    /// Description carried over from the source schema
    pub description: Option<String>,
}

/// Mapping from field name to descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    fields: BTreeMap<String, Field>,
}

/// Translate an action input schema into an object shape.
///
/// Properties are read when the schema is an object, or when it has no `type`
/// but does carry `properties`. Any other schema yields an empty shape.
pub fn translate_schema(schema: &Value) -> ObjectShape {
    let ty = schema.get("type").and_then(Value::as_str);
    match ty {
        Some("object") => shape_from_properties(schema),
        None if schema.get("properties").is_some() => shape_from_properties(schema),
        _ => ObjectShape::default(),
    }
}

fn shape_from_properties(schema: &Value) -> ObjectShape {
    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let fields = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| {
                    let field = Field {
                        ty: translate_type(prop),
                        optional: !required.contains(name.as_str()),
                        description: prop
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    };
                    (name.clone(), field)
                })
                .collect()
        })
        .unwrap_or_default();

    ObjectShape { fields }
}

fn translate_type(schema: &Value) -> FieldType {
    match schema.get("type").and_then(Value::as_str) {
        Some("string") => FieldType::String,
        Some("number") => FieldType::Number,
        Some("integer") => FieldType::Integer,
        Some("boolean") => FieldType::Boolean,
        Some("array") => {
            let items = schema
                .get("items")
                .filter(|items| items.is_object())
                .map(translate_type)
                .unwrap_or(FieldType::String);
            FieldType::Array(Box::new(items))
        }
        Some("object") => FieldType::Object(shape_from_properties(schema)),
        _ => FieldType::Any,
    }
}

impl ObjectShape {
    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the shape has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Iterate fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    /// Add a field. Used when shapes are built by hand.
    pub fn with_field(mut self, name: impl Into<String>, ty: FieldType, optional: bool) -> Self {
        self.fields.insert(
            name.into(),
            Field {
                ty,
                optional,
                description: None,
            },
        );
        self
    }

    /// Render as a normalized JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, field) in &self.fields {
            let mut schema = field.ty.to_json_schema();
            if let (Some(description), Value::Object(obj)) = (&field.description, &mut schema) {
                obj.insert("description".to_string(), Value::String(description.clone()));
            }
            properties.insert(name.clone(), schema);
            if !field.optional {
                required.push(Value::String(name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        Value::Object(schema)
    }

    /// Parse call arguments against the shape.
    ///
    /// Missing arguments are treated as an empty object. Keys not in the shape
    /// are dropped from the returned value.
    pub fn parse(&self, args: &Value) -> Result<Value, ValidationError> {
        match args {
            Value::Null => self.parse_object(&Map::new(), ""),
            Value::Object(map) => self.parse_object(map, ""),
            other => Err(ValidationError::new(
                "",
                format!("expected object, received {}", kind_of(other)),
            )),
        }
    }

    fn parse_object(&self, map: &Map<String, Value>, path: &str) -> Result<Value, ValidationError> {
        let mut parsed = Map::new();

        for (name, field) in &self.fields {
            let field_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", path, name)
            };

            match map.get(name) {
                None => {
                    if !field.optional {
                        return Err(ValidationError::new(&field_path, "required"));
                    }
                }
                Some(value) => {
                    parsed.insert(name.clone(), field.ty.parse(value, &field_path)?);
                }
            }
        }

        Ok(Value::Object(parsed))
    }
}

impl FieldType {
    fn to_json_schema(&self) -> Value {
        match self {
            FieldType::String => serde_json::json!({ "type": "string" }),
            FieldType::Number => serde_json::json!({ "type": "number" }),
            FieldType::Integer => serde_json::json!({ "type": "integer" }),
            FieldType::Boolean => serde_json::json!({ "type": "boolean" }),
            FieldType::Array(items) => {
                serde_json::json!({ "type": "array", "items": items.to_json_schema() })
            }
            FieldType::Object(shape) => shape.to_json_schema(),
            FieldType::Any => Value::Object(Map::new()),
        }
    }

    fn parse(&self, value: &Value, path: &str) -> Result<Value, ValidationError> {
        let mismatch = |expected: &str| {
            ValidationError::new(
                path,
                format!("expected {}, received {}", expected, kind_of(value)),
            )
        };

        match self {
            FieldType::Any => Ok(value.clone()),
            FieldType::String if value.is_string() => Ok(value.clone()),
            FieldType::String => Err(mismatch("string")),
            FieldType::Number if value.is_number() => Ok(value.clone()),
            FieldType::Number => Err(mismatch("number")),
            FieldType::Integer if is_integer(value) => Ok(value.clone()),
            FieldType::Integer => Err(mismatch("integer")),
            FieldType::Boolean if value.is_boolean() => Ok(value.clone()),
            FieldType::Boolean => Err(mismatch("boolean")),
            FieldType::Array(items) => {
                let elements = value.as_array().ok_or_else(|| mismatch("array"))?;
                elements
                    .iter()
                    .enumerate()
                    .map(|(i, element)| items.parse(element, &format!("{}[{}]", path, i)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            FieldType::Object(shape) => {
                let map = value.as_object().ok_or_else(|| mismatch("object"))?;
                shape.parse_object(map, path)
            }
        }
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64()
        || value.is_u64()
        || value.as_f64().map(|n| n.fract() == 0.0).unwrap_or(false)
}

fn kind_of(value: &Value) -> &'static str {
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

    #[test]
    fn test_degenerate_schemas_translate_to_empty_shape() {
        for schema in [
            json!({}),
            json!(null),
            json!("string"),
            json!({"type": "string"}),
            json!({"type": "object"}),
            json!({"type": "object", "properties": null}),
            json!({"type": "mystery", "properties": {"a": {"type": "string"}}}),
        ] {
            assert!(translate_schema(&schema).is_empty(), "schema {}", schema);
        }
    }

    #[test]
    fn test_scalar_types_and_optionality() {
        let shape = translate_schema(&json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Event title"},
                "count": {"type": "integer"},
                "ratio": {"type": "number"},
                "allDay": {"type": "boolean"},
                "extra": {"type": "unknown-type"},
                "untyped": {}
            },
            "required": ["title"]
        }));

        assert_eq!(shape.len(), 6);
        let title = shape.field("title").unwrap();
        assert_eq!(title.ty, FieldType::String);
        assert!(!title.optional);
        assert_eq!(title.description.as_deref(), Some("Event title"));
        assert_eq!(shape.field("count").unwrap().ty, FieldType::Integer);
        assert_eq!(shape.field("ratio").unwrap().ty, FieldType::Number);
        assert_eq!(shape.field("allDay").unwrap().ty, FieldType::Boolean);
        assert_eq!(shape.field("extra").unwrap().ty, FieldType::Any);
        assert_eq!(shape.field("untyped").unwrap().ty, FieldType::Any);
        assert!(shape.field("count").unwrap().optional);
    }

    #[test]
    fn test_missing_type_with_properties_is_an_object() {
        let shape = translate_schema(&json!({"properties": {"message": {"type": "string"}}}));
        assert_eq!(shape.field("message").unwrap().ty, FieldType::String);
    }

    #[test]
    fn test_array_without_items_defaults_to_strings() {
        let shape = translate_schema(&json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array"},
                "ids": {"type": "array", "items": {"type": "integer"}}
            }
        }));
        assert_eq!(
            shape.field("tags").unwrap().ty,
            FieldType::Array(Box::new(FieldType::String))
        );
        assert_eq!(
            shape.field("ids").unwrap().ty,
            FieldType::Array(Box::new(FieldType::Integer))
        );
    }

    #[test]
    fn test_nested_objects() {
        let shape = translate_schema(&json!({
            "type": "object",
            "properties": {
                "attendee": {
                    "type": "object",
                    "properties": {"email": {"type": "string"}},
                    "required": ["email"]
                }
            },
            "required": ["attendee"]
        }));

        match &shape.field("attendee").unwrap().ty {
            FieldType::Object(inner) => assert!(!inner.field("email").unwrap().optional),
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_json_schema_rendering() {
        let shape = translate_schema(&json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Test message"},
                "labels": {"type": "array"}
            },
            "required": ["message"]
        }));

        assert_eq!(
            shape.to_json_schema(),
            json!({
                "type": "object",
                "properties": {
                    "labels": {"type": "array", "items": {"type": "string"}},
                    "message": {"type": "string", "description": "Test message"}
                },
                "required": ["message"]
            })
        );
        assert_eq!(
            ObjectShape::default().to_json_schema(),
            json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn test_parse_accepts_and_strips_unknown_keys() {
        let shape = translate_schema(&json!({
            "type": "object",
            "properties": {"message": {"type": "string"}}
        }));

        let parsed = shape.parse(&json!({"message": "Hello", "junk": 1})).unwrap();
        assert_eq!(parsed, json!({"message": "Hello"}));
        assert_eq!(shape.parse(&Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn test_parse_rejects_type_mismatch_with_path() {
        let shape = translate_schema(&json!({
            "type": "object",
            "properties": {
                "event": {
                    "type": "object",
                    "properties": {"attendees": {"type": "array", "items": {"type": "string"}}}
                }
            }
        }));

        let err = shape
            .parse(&json!({"event": {"attendees": ["a@example.com", 7]}}))
            .unwrap_err();
        assert_eq!(err.path, "event.attendees[1]");
        assert_eq!(err.message, "expected string, received number");
    }

    #[test]
    fn test_parse_required_and_integer_rules() {
        let shape = translate_schema(&json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}},
            "required": ["count"]
        }));

        assert_eq!(shape.parse(&json!({})).unwrap_err().message, "required");
        assert!(shape.parse(&json!({"count": 3})).is_ok());
        assert!(shape.parse(&json!({"count": 3.0})).is_ok());
        assert!(shape.parse(&json!({"count": 3.5})).is_err());
        assert!(shape.parse(&json!({"count": null})).is_err());
        assert!(shape.parse(&json!([1])).is_err());
    }
}
