//! JSON Schema document types
//!
//! Only the subset of JSON Schema that stream schemas actually use is modelled:
//! `type` (single or list), `format`, nested `properties`, array `items` and
//! `anyOf` alternatives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON Schema type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

impl std::fmt::Display for JsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonType::String => write!(f, "string"),
            JsonType::Number => write!(f, "number"),
            JsonType::Integer => write!(f, "integer"),
            JsonType::Boolean => write!(f, "boolean"),
            JsonType::Object => write!(f, "object"),
            JsonType::Array => write!(f, "array"),
            JsonType::Null => write!(f, "null"),
        }
    }
}

/// JSON type can be a single type or array of types (for nullable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonTypeOrArray {
    Single(JsonType),
    Multiple(Vec<JsonType>),
}

impl JsonTypeOrArray {
    /// Create a single type
    pub fn single(t: JsonType) -> Self {
        JsonTypeOrArray::Single(t)
    }

    /// Create a nullable type
    pub fn nullable(t: JsonType) -> Self {
        if t == JsonType::Null {
            JsonTypeOrArray::Single(JsonType::Null)
        } else {
            JsonTypeOrArray::Multiple(vec![JsonType::Null, t])
        }
    }

    /// All declared types
    pub fn types(&self) -> Vec<JsonType> {
        match self {
            JsonTypeOrArray::Single(t) => vec![*t],
            JsonTypeOrArray::Multiple(types) => types.clone(),
        }
    }

    /// Check if a type is declared
    pub fn contains(&self, t: JsonType) -> bool {
        match self {
            JsonTypeOrArray::Single(single) => *single == t,
            JsonTypeOrArray::Multiple(types) => types.contains(&t),
        }
    }

    /// Check if this type is nullable
    pub fn is_nullable(&self) -> bool {
        self.contains(JsonType::Null)
    }
}

/// JSON Schema property definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaProperty {
    /// Property type(s); absent when the property is described by `anyOf`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub json_type: Option<JsonTypeOrArray>,

    /// Description (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Format hint (e.g., "date-time", "time", "binary")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Nested properties (for objects)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaProperty>>,

    /// Array items schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaProperty>>,

    /// Alternative schemas
    #[serde(rename = "anyOf", skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<SchemaProperty>>,
}

impl SchemaProperty {
    /// Create a new property with the given type
    pub fn new(json_type: JsonType) -> Self {
        Self {
            json_type: Some(JsonTypeOrArray::single(json_type)),
            ..Self::default()
        }
    }

    /// Create a nullable property
    pub fn nullable(json_type: JsonType) -> Self {
        Self {
            json_type: Some(JsonTypeOrArray::nullable(json_type)),
            ..Self::default()
        }
    }

    /// Create an object property with nested properties
    pub fn object(properties: BTreeMap<String, SchemaProperty>) -> Self {
        Self {
            json_type: Some(JsonTypeOrArray::nullable(JsonType::Object)),
            properties: Some(properties),
            ..Self::default()
        }
    }

    /// Create an array property with item schema
    pub fn array(items: SchemaProperty) -> Self {
        Self {
            json_type: Some(JsonTypeOrArray::nullable(JsonType::Array)),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// Create a property from `anyOf` alternatives
    pub fn any_of(alternatives: Vec<SchemaProperty>) -> Self {
        Self {
            any_of: Some(alternatives),
            ..Self::default()
        }
    }

    /// Set format hint
    #[must_use]
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    /// Declared types, resolving `anyOf` alternatives into their union.
    ///
    /// A property with neither `type` nor `anyOf` declares nothing.
    pub fn resolved_types(&self) -> Vec<JsonType> {
        let mut types = match (&self.json_type, &self.any_of) {
            (Some(t), _) => t.types(),
            (None, Some(alternatives)) => {
                let mut union: Vec<JsonType> = alternatives
                    .iter()
                    .flat_map(SchemaProperty::resolved_types)
                    .collect();
                union.push(JsonType::Null);
                union
            }
            (None, None) => Vec::new(),
        };
        types.sort();
        types.dedup();
        types
    }

    /// Format hint, falling back to the first `anyOf` alternative that has one
    pub fn resolved_format(&self) -> Option<&str> {
        self.format.as_deref().or_else(|| {
            self.any_of
                .as_ref()
                .and_then(|alts| alts.iter().find_map(SchemaProperty::resolved_format))
        })
    }

    /// Whether the property is an object with nested properties to descend into
    pub fn has_nested_properties(&self) -> bool {
        self.properties.is_some() && self.resolved_types().contains(&JsonType::Object)
    }
}

/// Full JSON Schema document describing one stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Schema version
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Schema type (normally "object", possibly nullable)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub json_type: Option<JsonTypeOrArray>,

    /// Object properties
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaProperty>,
}

impl JsonSchema {
    /// Create a new empty object schema
    pub fn new() -> Self {
        Self {
            schema: None,
            json_type: Some(JsonTypeOrArray::single(JsonType::Object)),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property
    #[must_use]
    pub fn with_property(mut self, name: &str, property: SchemaProperty) -> Self {
        self.properties.insert(name.to_string(), property);
        self
    }

    /// Get a property
    pub fn get_property(&self, name: &str) -> Option<&SchemaProperty> {
        self.properties.get(name)
    }
}
