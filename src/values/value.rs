//! Owned host value model.

use serde::{Deserialize, Serialize};

/// A self-contained copy of a host value as it existed at capture time.
///
/// Nothing in a `Value` points back into host memory; once built it can be
/// stored and handed out without the host being able to change it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Ordered key/value pairs. Keys are arbitrary values.
    Map(Vec<(Value, Value)>),
    /// Instance of a host type with named attributes.
    Object {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
    /// Placeholder for a container that was bound while full state tracking
    /// was off.
    Untracked { type_name: String },
}

/// Floats compare by bit pattern, so NaN equals itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (
                Value::Object {
                    type_name: a,
                    fields: fa,
                },
                Value::Object {
                    type_name: b,
                    fields: fb,
                },
            ) => a == b && fa == fb,
            (Value::Untracked { type_name: a }, Value::Untracked { type_name: b }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Capture-cost class of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// Fixed, small size. Always captured by value.
    Scalar,
    /// Collection or object. Copied only when state tracking is on.
    Container,
}

/// Hashable identity of an interned scalar.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ScalarKey {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Untracked(String),
}

impl Value {
    pub fn shape(&self) -> Shape {
        match self {
            Value::List(_) | Value::Tuple(_) | Value::Map(_) | Value::Object { .. } => {
                Shape::Container
            }
            _ => Shape::Scalar,
        }
    }

    pub fn untracked(type_name: impl Into<String>) -> Self {
        Value::Untracked {
            type_name: type_name.into(),
        }
    }

    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_untracked(&self) -> bool {
        matches!(self, Value::Untracked { .. })
    }

    /// Rough heap + inline footprint, used for the memory budget.
    pub fn estimated_size(&self) -> usize {
        let inline = std::mem::size_of::<Value>();
        match self {
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) => inline,
            Value::Str(s) => inline + s.len(),
            Value::Bytes(b) => inline + b.len(),
            Value::Untracked { type_name } => inline + type_name.len(),
            Value::List(items) | Value::Tuple(items) => {
                inline + items.iter().map(Value::estimated_size).sum::<usize>()
            }
            Value::Map(pairs) => {
                inline
                    + pairs
                        .iter()
                        .map(|(k, v)| k.estimated_size() + v.estimated_size())
                        .sum::<usize>()
            }
            Value::Object { type_name, fields } => {
                inline
                    + type_name.len()
                    + fields
                        .iter()
                        .map(|(name, v)| name.len() + v.estimated_size())
                        .sum::<usize>()
            }
        }
    }

    /// Key for interning, if this value is an internable scalar.
    pub(crate) fn scalar_key(&self) -> Option<ScalarKey> {
        match self {
            Value::None => Some(ScalarKey::None),
            Value::Bool(b) => Some(ScalarKey::Bool(*b)),
            Value::Int(i) => Some(ScalarKey::Int(*i)),
            Value::Float(f) => Some(ScalarKey::Float(f.to_bits())),
            Value::Str(s) => Some(ScalarKey::Str(s.clone())),
            Value::Untracked { type_name } => Some(ScalarKey::Untracked(type_name.clone())),
            _ => None,
        }
    }

    /// Convert to JSON for display. Map keys are rendered with `Display`-like
    /// text because JSON only allows string keys.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
            Value::List(items) | Value::Tuple(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(pairs) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in pairs {
                    let key = match k {
                        Value::Str(s) => s.clone(),
                        other => other.to_json().to_string(),
                    };
                    obj.insert(key, v.to_json());
                }
                Json::Object(obj)
            }
            Value::Object { type_name, fields } => {
                let mut obj = serde_json::Map::new();
                obj.insert("__type__".to_string(), Json::String(type_name.clone()));
                for (name, v) in fields {
                    obj.insert(name.clone(), v.to_json());
                }
                Json::Object(obj)
            }
            Value::Untracked { type_name } => {
                serde_json::json!({ "__untracked__": type_name })
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(obj) => Value::Map(
                obj.into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// A value as reported by the host at a mutation point.
///
/// The split between `Owned` and `Live` encodes the capture rule: anything
/// the host may still mutate after the event must be copied at capture time.
pub enum Observed<'a> {
    /// No value (e.g. the previous value of a first bind).
    Absent,

    /// A value the host hands over and will not mutate. Stored as is;
    /// scalars are interned.
    Owned(Value),

    /// A view of live host memory. `snapshot` produces a deep copy and is
    /// only called when the capture policy needs the copy.
    Live {
        shape: Shape,
        /// Host type name, kept for untracked placeholders.
        type_name: &'a str,
        snapshot: &'a dyn Fn() -> Value,
    },
}

impl<'a> Observed<'a> {
    /// Live mutable container (list, dict, object).
    pub fn container(type_name: &'a str, snapshot: &'a dyn Fn() -> Value) -> Self {
        Observed::Live {
            shape: Shape::Container,
            type_name,
            snapshot,
        }
    }

    /// Live scalar cell.
    pub fn scalar(snapshot: &'a dyn Fn() -> Value) -> Self {
        Observed::Live {
            shape: Shape::Scalar,
            type_name: "scalar",
            snapshot,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Observed::Absent)
    }
}

impl std::fmt::Debug for Observed<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observed::Absent => write!(f, "Absent"),
            Observed::Owned(v) => write!(f, "Owned({:?})", v),
            Observed::Live {
                shape, type_name, ..
            } => write!(f, "Live({:?}, {})", shape, type_name),
        }
    }
}

impl From<Value> for Observed<'_> {
    fn from(value: Value) -> Self {
        Observed::Owned(value)
    }
}

impl From<Option<Value>> for Observed<'_> {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => Observed::Owned(v),
            None => Observed::Absent,
        }
    }
}

impl From<i64> for Observed<'_> {
    fn from(i: i64) -> Self {
        Observed::Owned(Value::Int(i))
    }
}

impl From<bool> for Observed<'_> {
    fn from(b: bool) -> Self {
        Observed::Owned(Value::Bool(b))
    }
}

impl From<&str> for Observed<'_> {
    fn from(s: &str) -> Self {
        Observed::Owned(Value::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shape() {
        assert_eq!(Value::Int(1).shape(), Shape::Scalar);
        assert_eq!(Value::from("x").shape(), Shape::Scalar);
        assert_eq!(Value::list([1, 2]).shape(), Shape::Container);
        assert_eq!(Value::untracked("list").shape(), Shape::Scalar);
    }

    #[test]
    fn test_json_conversion() {
        let value = Value::from(json!({"xs": [1, 2.5, null], "ok": true}));
        let back = value.to_json();
        assert_eq!(back["xs"], json!([1, 2.5, null]));
        assert_eq!(back["ok"], json!(true));
    }

    #[test]
    fn test_estimated_size_grows_with_content() {
        let small = Value::list([1]);
        let big = Value::list(0..100);
        assert!(big.estimated_size() > small.estimated_size());
    }

    #[test]
    fn test_nan_equals_itself() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_eq!(Value::list([nan.clone()]), Value::list([nan]));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::List(vec![]), Value::Tuple(vec![]));
    }

    #[test]
    fn test_float_keys_compare_by_bits() {
        assert_eq!(Value::Float(1.5).scalar_key(), Value::Float(1.5).scalar_key());
        assert_ne!(Value::Float(0.0).scalar_key(), Value::Float(-0.0).scalar_key());
        assert!(Value::list([1]).scalar_key().is_none());
    }
}
