//! Ordered index keys derived from JSON values.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A totally ordered key built from a JSON value.
///
/// Ordering across types is `Bool < Number < Text < Tuple`. Numbers
/// compare numerically, so `2` sorts before `10`. Tuples compare
/// element-wise, which is what composite indexes need.
///
/// `null`, objects and arrays holding either cannot be keys: a record
/// whose indexed field is one of those is simply left out of the index.
#[derive(Debug, Clone)]
pub enum IndexKey {
    /// `true` / `false`.
    Bool(bool),
    /// Any JSON number.
    Number(f64),
    /// A string.
    Text(String),
    /// A composite key or an array value.
    Tuple(Vec<IndexKey>),
}

impl IndexKey {
    /// Builds a key from a JSON value, or `None` if the value is not indexable.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::Tuple),
            Value::Null | Value::Object(_) => None,
        }
    }

    /// Creates a numeric key. `-0.0` is folded into `0.0`.
    #[must_use]
    pub fn number(n: f64) -> Self {
        Self::Number(if n == 0.0 { 0.0 } else { n })
    }

    /// Converts the key back into JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Tuple(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(_) => 1,
            Self::Text(_) => 2,
            Self::Tuple(_) => 3,
        }
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Tuple(a), Self::Tuple(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn key(value: Value) -> IndexKey {
        IndexKey::from_json(&value).unwrap()
    }

    #[test]
    fn numbers_sort_numerically() {
        assert!(key(json!(2)) < key(json!(10)));
        assert!(key(json!(-1.5)) < key(json!(0)));
        assert_eq!(key(json!(3)), key(json!(3.0)));
        assert_eq!(IndexKey::number(-0.0), IndexKey::number(0.0));
    }

    #[test]
    fn types_have_a_fixed_order() {
        assert!(key(json!(true)) < key(json!(0)));
        assert!(key(json!(1e9)) < key(json!("")));
        assert!(key(json!("zzz")) < key(json!([])));
    }

    #[test]
    fn tuples_compare_element_wise() {
        assert!(key(json!(["u1", "l1"])) < key(json!(["u1", "l2"])));
        assert!(key(json!(["u1", "l9"])) < key(json!(["u2", "l0"])));
        assert!(key(json!(["u1"])) < key(json!(["u1", "l0"])));
    }

    #[test]
    fn null_and_objects_are_not_keys() {
        assert!(IndexKey::from_json(&json!(null)).is_none());
        assert!(IndexKey::from_json(&json!({"a": 1})).is_none());
        assert!(IndexKey::from_json(&json!(["u1", null])).is_none());
    }

    proptest! {
        #[test]
        fn integer_order_is_preserved(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            prop_assert_eq!(key(json!(a)).cmp(&key(json!(b))), a.cmp(&b));
        }

        #[test]
        fn text_round_trips_through_json(s in ".*") {
            let k = key(json!(s.clone()));
            prop_assert_eq!(k.to_json(), json!(s));
        }
    }
}
