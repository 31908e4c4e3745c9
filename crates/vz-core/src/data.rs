//! Data sources and identity
//!
//! Application data items are JSON values shared through `Arc`, so a layer that
//! inherits its parent's data holds literally the same item and reference
//! identity is a pointer comparison.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One application data item
pub type Datum = Arc<Value>;

/// Function deriving a layer's items from a parent data item
pub type DeriveFn = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Function extracting an identity key from a data item
pub type KeyFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Where a layer's data items come from
///
/// Resolved once when data is declared, never re-inspected per access.
#[derive(Clone, Default)]
pub enum DataSource {
    /// One item per parent node: the parent's own data item
    #[default]
    Inherit,
    /// The same fixed items under every parent node
    Fixed(Vec<Datum>),
    /// Items computed from each parent node's data item
    Derived(DeriveFn),
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Inherit => write!(f, "Inherit"),
            DataSource::Fixed(items) => f.debug_tuple("Fixed").field(&items.len()).finish(),
            DataSource::Derived(_) => write!(f, "Derived(Fn)"),
        }
    }
}

impl DataSource {
    /// Derive items from a closure over the parent item
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        DataSource::Derived(Arc::new(f))
    }

    /// Fixed items from plain values
    pub fn fixed(items: impl IntoIterator<Item = Value>) -> Self {
        DataSource::Fixed(items.into_iter().map(Arc::new).collect())
    }

    /// Whether the layer owns its data rather than inheriting it
    pub fn is_local(&self) -> bool {
        !matches!(self, DataSource::Inherit)
    }

    /// Evaluate the items this source yields under one parent item
    pub fn items(&self, parent: &Datum) -> Vec<Datum> {
        match self {
            DataSource::Inherit => vec![Arc::clone(parent)],
            DataSource::Fixed(items) => items.clone(),
            DataSource::Derived(derive) => derive(parent).into_iter().map(Arc::new).collect(),
        }
    }
}

impl From<Value> for DataSource {
    /// `null` inherits, an array is used as is, anything else is one item
    fn from(value: Value) -> Self {
        match value {
            Value::Null => DataSource::Inherit,
            Value::Array(items) => DataSource::fixed(items),
            other => DataSource::Fixed(vec![Arc::new(other)]),
        }
    }
}

impl From<Vec<Datum>> for DataSource {
    fn from(items: Vec<Datum>) -> Self {
        DataSource::Fixed(items)
    }
}

/// Identity function attached to data
#[derive(Clone)]
pub enum IdFn {
    /// The `id` field
    Id,
    /// A named field
    Field(String),
    /// The whole item, compared structurally
    Whole,
    /// A custom key function
    Func(KeyFn),
}

impl fmt::Debug for IdFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdFn::Id => write!(f, "Id"),
            IdFn::Field(name) => f.debug_tuple("Field").field(name).finish(),
            IdFn::Whole => write!(f, "Whole"),
            IdFn::Func(_) => write!(f, "Func"),
        }
    }
}

impl IdFn {
    /// Identity by field name, using the fast path for `id`
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == "id" {
            IdFn::Id
        } else {
            IdFn::Field(name)
        }
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        IdFn::Func(Arc::new(f))
    }

    fn key(&self, item: &Value) -> Value {
        match self {
            IdFn::Id => item.get("id").cloned().unwrap_or(Value::Null),
            IdFn::Field(name) => item.get(name.as_str()).cloned().unwrap_or(Value::Null),
            IdFn::Whole => item.clone(),
            IdFn::Func(f) => f(item),
        }
    }
}

/// How a data declaration treats the layer's identity function
#[derive(Clone, Debug, Default)]
pub enum IdSpec {
    /// Keep whatever was set before, or guess if nothing ever was
    #[default]
    Keep,
    /// Drop the identity function and match by reference
    Clear,
    /// Use the given identity function
    Use(IdFn),
}

impl IdSpec {
    pub fn field(name: impl Into<String>) -> Self {
        IdSpec::Use(IdFn::field(name))
    }
}

impl From<&str> for IdSpec {
    fn from(name: &str) -> Self {
        IdSpec::field(name)
    }
}

impl From<IdFn> for IdSpec {
    fn from(id_fn: IdFn) -> Self {
        IdSpec::Use(id_fn)
    }
}

/// Identity state of a layer
#[derive(Clone, Debug, Default)]
pub(crate) enum IdState {
    #[default]
    Unset,
    Cleared,
    Set(IdFn),
}

impl IdState {
    pub(crate) fn id_fn(&self) -> Option<&IdFn> {
        match self {
            IdState::Set(id_fn) => Some(id_fn),
            _ => None,
        }
    }
}

/// Comparable identity of a data item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Identity {
    /// Canonical JSON text of the extracted key
    Key(String),
    /// Address of the shared item
    Ref(usize),
}

impl Identity {
    pub(crate) fn of(item: &Datum, id_fn: Option<&IdFn>) -> Self {
        match id_fn {
            Some(id_fn) => Identity::Key(id_fn.key(item).to_string()),
            None => Identity::Ref(Arc::as_ptr(item) as usize),
        }
    }
}

/// Pending-change hints recorded by data declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hints {
    /// Node membership may have changed
    pub delta: bool,
    /// Data of existing items may have changed
    pub changed: bool,
}

/// JavaScript-like truthiness of a mapped value
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        assert!(matches!(DataSource::from(Value::Null), DataSource::Inherit));
        match DataSource::from(json!([1, 2, 3])) {
            DataSource::Fixed(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        match DataSource::from(json!({"id": 1})) {
            DataSource::Fixed(items) => assert_eq!(*items[0], json!({"id": 1})),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_inherit_shares_parent_item() {
        let parent: Datum = Arc::new(json!({"id": 1}));
        let items = DataSource::Inherit.items(&parent);
        assert!(Arc::ptr_eq(&items[0], &parent));
    }

    #[test]
    fn test_identity() {
        let a: Datum = Arc::new(json!({"id": 1, "v": "x"}));
        let b: Datum = Arc::new(json!({"id": 1, "v": "y"}));

        assert_eq!(Identity::of(&a, Some(&IdFn::Id)), Identity::of(&b, Some(&IdFn::Id)));
        assert_ne!(Identity::of(&a, None), Identity::of(&b, None));
        assert_eq!(Identity::of(&a, None), Identity::of(&Arc::clone(&a), None));
        assert_ne!(Identity::of(&a, Some(&IdFn::Whole)), Identity::of(&b, Some(&IdFn::Whole)));

        let by_v = IdFn::func(|v| v["v"].clone());
        assert_eq!(Identity::of(&a, Some(&by_v)), Identity::Key("\"x\"".to_string()));
    }

    #[test]
    fn test_id_field_fast_path() {
        assert!(matches!(IdFn::field("id"), IdFn::Id));
        assert!(matches!(IdFn::field("name"), IdFn::Field(_)));
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("a")));
        assert!(truthy(&json!({})));
    }
}
