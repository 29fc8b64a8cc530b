//! Schema tests

use super::*;
use crate::error::Error;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

fn users_schema() -> serde_json::Value {
    json!({
        "type": ["null", "object"],
        "properties": {
            "id": {"type": "integer"},
            "name": {"type": ["null", "string"]},
            "active": {"type": ["null", "boolean"]},
            "address": {
                "type": ["null", "object"],
                "properties": {
                    "city": {"type": ["null", "string"]},
                    "zip": {"type": ["null", "string"]}
                }
            },
            "tags": {"type": ["null", "array"], "items": {"type": "string"}}
        }
    })
}

// ============================================================================
// JSON Schema Flattening Tests
// ============================================================================

#[test]
fn test_columns_sorted_by_name() {
    let schema = Schema::from_json_value(&users_schema(), 0).unwrap();
    let names: Vec<&str> = schema.names().collect();
    assert_eq!(names, vec!["active", "address", "id", "name", "tags"]);
}

#[test]
fn test_nested_object_kept_whole_at_level_zero() {
    let schema = Schema::from_json_value(&users_schema(), 0).unwrap();
    let address = schema.column("address").unwrap();
    assert_eq!(address.column_type, ColumnType::Variant);
    assert_eq!(address.transform.as_deref(), Some("parse_json"));
}

#[test]
fn test_nested_object_flattened_within_max_level() {
    let schema = Schema::from_json_value(&users_schema(), 1).unwrap();
    let names: Vec<&str> = schema.names().collect();
    assert_eq!(
        names,
        vec!["active", "address__city", "address__zip", "id", "name", "tags"]
    );
    assert!(!schema.contains("address"));
    assert_eq!(
        schema.column("address__city").unwrap().column_type,
        ColumnType::Text
    );
}

#[test]
fn test_duplicate_flattened_name_is_schema_error() {
    let doc = json!({
        "type": "object",
        "properties": {
            "a__b": {"type": "string"},
            "a": {"type": "object", "properties": {"b": {"type": "string"}}}
        }
    });

    let err = Schema::from_json_value(&doc, 1).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }));
    assert!(err.to_string().contains("Duplicate column name"));

    // Without flattening there is no clash
    assert!(Schema::from_json_value(&doc, 0).is_ok());
}

#[test]
fn test_non_object_schema_rejected() {
    let doc = json!({"type": "array", "properties": {}});
    assert!(matches!(
        Schema::from_json_value(&doc, 0),
        Err(Error::Schema { .. })
    ));
}

#[test]
fn test_malformed_schema_document_rejected() {
    let doc = json!({"type": "object", "properties": {"id": {"type": "uuid"}}});
    assert!(matches!(
        Schema::from_json_value(&doc, 0),
        Err(Error::Schema { .. })
    ));
}

#[test]
fn test_property_without_type_skipped() {
    let doc = json!({
        "type": "object",
        "properties": {"id": {"type": "integer"}, "anything": {}}
    });
    let schema = Schema::from_json_value(&doc, 0).unwrap();
    assert_eq!(schema.len(), 1);
    assert!(schema.contains("id"));
}

#[test]
fn test_any_of_resolves_types_and_format() {
    let doc = json!({
        "type": "object",
        "properties": {
            "updated_at": {
                "anyOf": [
                    {"type": "string", "format": "date-time"},
                    {"type": "null"}
                ]
            }
        }
    });
    let schema = Schema::from_json_value(&doc, 0).unwrap();
    assert_eq!(
        schema.column("updated_at").unwrap().column_type,
        ColumnType::TimestampNtz
    );
}

#[test]
fn test_json_text_column_detection() {
    let doc = json!({
        "type": "object",
        "properties": {
            "payload": {"type": ["null", "object", "array"]},
            "meta": {"type": ["null", "object"]}
        }
    });
    let schema = Schema::from_json_value(&doc, 0).unwrap();
    assert!(schema.column("payload").unwrap().json_text);
    assert!(!schema.column("meta").unwrap().json_text);
}

// ============================================================================
// Column Type Tests
// ============================================================================

#[test_case(SchemaProperty::new(JsonType::Integer), ColumnType::Number ; "integer")]
#[test_case(SchemaProperty::nullable(JsonType::Number), ColumnType::Float ; "number")]
#[test_case(SchemaProperty::nullable(JsonType::Boolean), ColumnType::Boolean ; "boolean")]
#[test_case(SchemaProperty::nullable(JsonType::String), ColumnType::Text ; "string")]
#[test_case(SchemaProperty::nullable(JsonType::String).with_format("time"), ColumnType::Time ; "time")]
#[test_case(SchemaProperty::nullable(JsonType::String).with_format("binary"), ColumnType::Binary ; "binary")]
#[test_case(SchemaProperty::array(SchemaProperty::new(JsonType::String)), ColumnType::Variant ; "array")]
fn test_column_type_mapping(property: SchemaProperty, expected: ColumnType) {
    assert_eq!(ColumnType::from_property(&property), expected);
}

#[test]
fn test_integer_or_string_is_text() {
    let property = SchemaProperty {
        json_type: Some(JsonTypeOrArray::Multiple(vec![
            JsonType::Integer,
            JsonType::String,
        ])),
        ..SchemaProperty::default()
    };
    assert_eq!(ColumnType::from_property(&property), ColumnType::Text);
}

// ============================================================================
// Column Name Tests
// ============================================================================

#[test]
fn test_safe_column_name() {
    assert_eq!(safe_column_name("user__id"), "\"USER__ID\"");
    assert_eq!(Column::new("name").sql_name(), "\"NAME\"");
}

#[test]
fn test_flatten_key_short_names_joined() {
    assert_eq!(flatten_key(&["address", "city"]), "address__city");
    assert_eq!(flatten_key(&["id"]), "id");
}

#[test]
fn test_flatten_key_shortens_to_initials() {
    let long = format!("{}_details", "customer".repeat(32));
    assert_eq!(flatten_key(&[long.as_str(), "city"]), "cd__city");
}

#[test]
fn test_flatten_key_falls_back_to_prefix() {
    let long = "a".repeat(260);
    let key = flatten_key(&[long.as_str(), "city"]);
    assert_eq!(key, "aaa__city");
}

// ============================================================================
// Schema Construction Tests
// ============================================================================

#[test]
fn test_schema_rejects_duplicates() {
    let err = Schema::from_names(&["id", "name", "id"]).unwrap_err();
    assert!(err.to_string().contains("Duplicate column name"));
}

#[test]
fn test_schema_rejects_empty_name() {
    assert!(matches!(
        Schema::from_names(&["id", ""]),
        Err(Error::Schema { .. })
    ));
}

#[test]
fn test_schema_keeps_given_order() {
    let schema = Schema::from_names(&["id", "name", "active"]).unwrap();
    let names: Vec<&str> = schema.names().collect();
    assert_eq!(names, vec!["id", "name", "active"]);
    assert_eq!(schema.len(), 3);
    assert!(!schema.is_empty());
}

#[test]
fn test_schema_deserialize_validates() {
    let ok: Schema = serde_json::from_value(json!([
        {"name": "id", "column_type": "number"},
        {"name": "payload", "column_type": "variant", "transform": "parse_json"}
    ]))
    .unwrap();
    assert_eq!(ok.len(), 2);
    assert_eq!(ok.column("id").unwrap().column_type, ColumnType::Number);
    assert_eq!(
        ok.column("payload").unwrap().transform.as_deref(),
        Some("parse_json")
    );

    let dup: std::result::Result<Schema, _> =
        serde_json::from_value(json!([{"name": "id"}, {"name": "id"}]));
    assert!(dup.is_err());
}

#[test]
fn test_schema_serialize_roundtrip_preserves_order() {
    let schema = Schema::new(vec![
        Column::new("b"),
        Column::new("a").with_type(ColumnType::Number),
    ])
    .unwrap();
    let value = serde_json::to_value(&schema).unwrap();
    let back: Schema = serde_json::from_value(value).unwrap();
    assert_eq!(back, schema);
}
