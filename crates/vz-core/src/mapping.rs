//! Data-driven visual property mappings
//!
//! Mappings translate a data item into the value of a visual property. They
//! are pure functions of their inputs; an unmapped property resolves to the
//! caller's default.

use ahash::AHashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, VizError};

/// Function mapping a data item and its index to a property value
pub type MapFn = Arc<dyn Fn(&Value, usize) -> Value + Send + Sync>;

/// How a visual property is derived from data
#[derive(Clone)]
pub enum Mapping {
    /// The same value for every item
    Constant(Value),
    /// The value of a field of the item
    Field(String),
    /// A custom function
    Func(MapFn),
    /// A field value looked up in a table of named values
    Lookup {
        field: String,
        table: AHashMap<String, Value>,
    },
    /// The item itself
    Passthrough,
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mapping::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Mapping::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Mapping::Func(_) => write!(f, "Func"),
            Mapping::Lookup { field, table } => f
                .debug_struct("Lookup")
                .field("field", field)
                .field("entries", &table.len())
                .finish(),
            Mapping::Passthrough => write!(f, "Passthrough"),
        }
    }
}

impl Mapping {
    pub fn constant(value: impl Into<Value>) -> Self {
        Mapping::Constant(value.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Mapping::Field(name.into())
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Value, usize) -> Value + Send + Sync + 'static,
    {
        Mapping::Func(Arc::new(f))
    }

    /// Parse a declarative mapping
    ///
    /// A string names a field; an object may carry `constant`, `field` or
    /// `lookup` + `field`. Any other JSON type is a caller error. An object
    /// with none of the recognized keys maps items to themselves and logs a
    /// warning.
    pub fn from_declaration(property: &str, declaration: &Value) -> Result<Self> {
        match declaration {
            Value::String(field) => Ok(Mapping::Field(field.clone())),
            Value::Object(spec) => {
                if let Some(constant) = spec.get("constant") {
                    return Ok(Mapping::Constant(constant.clone()));
                }
                let field = spec.get("field").map(|f| match f {
                    Value::String(name) => Ok(name.clone()),
                    _ => Err(VizError::InvalidMapping {
                        property: property.to_string(),
                        reason: "field must be a string".to_string(),
                    }),
                });
                match (field.transpose()?, spec.get("lookup")) {
                    (Some(field), Some(Value::Object(table))) => Ok(Mapping::Lookup {
                        field,
                        table: table.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    }),
                    (Some(field), None) => Ok(Mapping::Field(field)),
                    _ => {
                        tracing::warn!(
                            "Unrecognized mapping for '{}': {}, mapping items to themselves",
                            property,
                            declaration
                        );
                        Ok(Mapping::Passthrough)
                    }
                }
            }
            other => Err(VizError::InvalidMapping {
                property: property.to_string(),
                reason: format!("expected a field name or mapping object, got {}", other),
            }),
        }
    }

    /// Map one item; `None` means unmapped
    pub fn value(&self, item: &Value, index: usize) -> Option<Value> {
        match self {
            Mapping::Constant(v) => Some(v.clone()),
            Mapping::Field(name) => item.get(name.as_str()).cloned(),
            Mapping::Func(f) => Some(f(item, index)),
            Mapping::Lookup { field, table } => {
                let key = match item.get(field.as_str())? {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let found = table.get(&key).cloned();
                if found.is_none() {
                    tracing::warn!("No entry named '{}' in lookup on field '{}'", key, field);
                }
                found
            }
            Mapping::Passthrough => Some(item.clone()),
        }
    }

    /// Map one item, falling back to `default`
    pub fn value_for(&self, item: &Value, default: Value, index: usize) -> Value {
        self.value(item, index).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_and_constant() {
        let item = json!({"size": 4});
        assert_eq!(Mapping::field("size").value(&item, 0), Some(json!(4)));
        assert_eq!(Mapping::field("missing").value(&item, 0), None);
        assert_eq!(Mapping::field("missing").value_for(&item, json!(1), 0), json!(1));
        assert_eq!(Mapping::constant("red").value(&item, 0), Some(json!("red")));
    }

    #[test]
    fn test_func_gets_index() {
        let mapping = Mapping::func(|_, i| json!(i * 10));
        assert_eq!(mapping.value(&json!(null), 3), Some(json!(30)));
    }

    #[test]
    fn test_declarations() {
        assert!(matches!(
            Mapping::from_declaration("x", &json!("left")).unwrap(),
            Mapping::Field(f) if f == "left"
        ));
        assert!(matches!(
            Mapping::from_declaration("fill", &json!({"constant": "blue"})).unwrap(),
            Mapping::Constant(_)
        ));
        assert!(matches!(
            Mapping::from_declaration("fill", &json!({"unknown": 1})).unwrap(),
            Mapping::Passthrough
        ));
    }

    #[test]
    fn test_invalid_declarations() {
        assert!(Mapping::from_declaration("x", &json!(5)).is_err());
        assert!(Mapping::from_declaration("x", &json!({"field": 5})).is_err());
    }

    #[test]
    fn test_lookup_miss_uses_default() {
        let mapping = Mapping::from_declaration(
            "fill",
            &json!({"field": "kind", "lookup": {"a": "red", "b": "blue"}}),
        )
        .unwrap();
        assert_eq!(mapping.value(&json!({"kind": "b"}), 0), Some(json!("blue")));
        assert_eq!(mapping.value_for(&json!({"kind": "z"}), json!("gray"), 0), json!("gray"));
    }
}
