use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A dynamically typed value flowing between nodes.
///
/// This is the runtime counterpart to [`crate::typing::Type`]: every value a
/// node sees as input or produces as output, and every `Param` default, is one
/// of these variants. `Tuple` has no YAML surface syntax (YAML only knows
/// sequences) so it is never produced by [`Deserialize`]; it exists so that
/// [`crate::typing::Type::Tuple`] has something to match against at runtime,
/// the same way the tuple case does in `gada.typing`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    #[cfg_attr(test, proptest(strategy = "value_list_strategy()"))]
    List(Vec<Value>),
    #[cfg_attr(test, proptest(strategy = "value_list_strategy()"))]
    Tuple(Vec<Value>),
    /// Absence of a value: a missing binding, or the output of a pure/`print`
    /// node. Mirrors Python's `None`.
    Unit,
}

#[cfg(test)]
fn value_list_strategy() -> impl proptest::strategy::Strategy<Value = Vec<Value>> {
    use proptest::prelude::*;
    proptest::collection::vec(any::<i64>().prop_map(Value::Int), 0..3)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            },
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            },
            Value::Unit => write!(f, "null"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::List(items) | Value::Tuple(items) => items.serialize(serializer),
            Value::Unit => serializer.serialize_none(),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a gada value (int, float, string, bool, list, or null)")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Value::Int(v as i64))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(Value::Unit)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(Value::Unit)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl Value {
    /// Best-effort numeric ordering used by the `min`/`max` builtin nodes.
    ///
    /// Only `Int` and `Float` are comparable; anything else is a comparison
    /// failure, which `gada::runners::builtin` treats as fatal per spec
    /// ("comparison failures are fatal").
    pub fn partial_cmp_numeric(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_scalars_from_yaml() {
        assert_eq!(
            serde_yaml::from_str::<Value>("1").unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            serde_yaml::from_str::<Value>("1.5").unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            serde_yaml::from_str::<Value>("true").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            serde_yaml::from_str::<Value>("hello").unwrap(),
            Value::String("hello".to_string())
        );
        assert_eq!(serde_yaml::from_str::<Value>("null").unwrap(), Value::Unit);
    }

    #[test]
    fn deserializes_nested_lists() {
        let v: Value = serde_yaml::from_str("[[1, 2], [3]]").unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::List(vec![Value::Int(1), Value::Int(2)]),
                Value::List(vec![Value::Int(3)]),
            ])
        );
    }

    #[test]
    fn numeric_comparison_rejects_mixed_non_numeric() {
        assert_eq!(
            Value::String("a".into()).partial_cmp_numeric(&Value::Int(1)),
            None
        );
        assert_eq!(
            Value::Int(1).partial_cmp_numeric(&Value::Float(1.0)),
            Some(std::cmp::Ordering::Equal)
        );
    }
}
