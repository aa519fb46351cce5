//! Property Values
//!
//! Every reactive property holds a [`Value`]. The store never inspects values
//! beyond one question: did this assignment change anything? That question
//! is answered with strict equality:
//!
//! - Primitives (booleans, numbers, strings) compare by value. `NaN` is never
//!   equal to itself.
//! - Lists and nested models compare by identity. A freshly built list is
//!   always a change, even if it holds the same items.
//!
//! No deep comparison happens anywhere in the store.

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::reactive::Model;

/// A dynamically typed property value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value has been assigned.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    /// A shared list, compared by identity.
    List(Arc<[Value]>),
    /// A nested reactive subject, compared by identity.
    Model(Model),
}

impl Value {
    /// Strict equality: primitives by value, lists and models by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Model(a), Value::Model(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Value::Model(model) => Some(model),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Model(model) => write!(f, "{model:?}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Model(model) => model
                .export()
                .map_err(<S::Error as serde::ser::Error>::custom)?
                .serialize(serializer),
        }
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::from(items))
    }
}

impl From<Model> for Value {
    fn from(model: Model) -> Self {
        Value::Model(model)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Undefined)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Undefined),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::from(items.into_iter().map(Value::from).collect::<Vec<_>>())
            }
            // Plain objects have no reactive counterpart.
            serde_json::Value::Object(_) => Value::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_by_value() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::from("foo"), Value::from(String::from("foo")));
        assert_ne!(Value::from(1), Value::from("1"));
        assert_ne!(Value::Null, Value::Undefined);
    }

    #[test]
    fn nan_is_never_equal() {
        let nan = Value::from(f64::NAN);
        assert!(!nan.strict_eq(&nan.clone()));
    }

    #[test]
    fn lists_compare_by_identity() {
        let list = Value::from(vec![Value::from(1), Value::from(2)]);
        let same = list.clone();
        let rebuilt = Value::from(vec![Value::from(1), Value::from(2)]);

        assert!(list.strict_eq(&same));
        assert!(!list.strict_eq(&rebuilt));
    }

    #[test]
    fn converts_from_json() {
        let value = Value::from(serde_json::json!([1, "two", null, true]));
        let items = value.as_list().unwrap();

        assert_eq!(items[0].as_i64(), Some(1));
        assert_eq!(items[1].as_str(), Some("two"));
        assert_eq!(items[2], Value::Null);
        assert_eq!(items[3].as_bool(), Some(true));

        assert!(Value::from(serde_json::json!({ "a": 1 })).is_undefined());
    }

    #[test]
    fn serializes_to_json() {
        let value = Value::from(vec![Value::from(1.5), Value::Undefined, Value::from("x")]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!([1.5, null, "x"]));
    }
}
