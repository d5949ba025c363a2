//! Dynamic record value type.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A dynamic value held by a record field.
///
/// `Value` is the unit of everything NormDB stores: record fields,
/// index keys, and filter operands are all `Value`s. Maps preserve
/// field insertion order; key-sorting happens only where a canonical
/// form is needed (see [`crate::fingerprint`]).
///
/// All variants are comparable under a single total order:
///
/// `Undefined < Null < Bool < Number < Text < Array < Map`
///
/// with natural ordering within each variant and lexicographic
/// ordering for arrays and maps. This order is what index key tuples
/// sort under.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent field. Sorts before everything else.
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value. NaN and negative zero are canonicalized so that
    /// `Eq`/`Ord`/`Hash` stay consistent.
    Number(f64),
    /// UTF-8 text.
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of field name to value, insertion order preserved.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Creates a map value from field pairs, preserving their order.
    pub fn map(pairs: Vec<(String, Value)>) -> Self {
        Value::Map(pairs)
    }

    /// Rank of the variant in the cross-type total order.
    fn type_rank(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Null => 1,
            Value::Bool(_) => 2,
            Value::Number(_) => 3,
            Value::Text(_) => 4,
            Value::Array(_) => 5,
            Value::Map(_) => 6,
        }
    }

    /// Canonical form of a float for ordering and hashing.
    ///
    /// Negative zero collapses to positive zero and every NaN bit
    /// pattern collapses to the standard quiet NaN.
    fn canonical_f64(n: f64) -> f64 {
        if n == 0.0 {
            0.0
        } else if n.is_nan() {
            f64::NAN
        } else {
            n
        }
    }

    /// Compares two values under the cross-type total order.
    pub fn cmp_ordered(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                Self::canonical_f64(*a).total_cmp(&Self::canonical_f64(*b))
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (av, bv) in a.iter().zip(b.iter()) {
                    let ord = av.cmp_ordered(bv);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
                    let key_ord = ak.cmp(bk);
                    if key_ord != Ordering::Equal {
                        return key_ord;
                    }
                    let val_ord = av.cmp_ordered(bv);
                    if val_ord != Ordering::Equal {
                        return val_ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            // Unreachable: ranks matched above.
            _ => Ordering::Equal,
        }
    }

    /// Loose equality in the style of the `==` filter operator.
    ///
    /// `Null` and `Undefined` compare equal to each other, and numbers
    /// compare equal to numeric text after coercion. Everything else
    /// falls back to strict equality.
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
            (Value::Number(n), Value::Text(t)) | (Value::Text(t), Value::Number(n)) => {
                t.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
            }
            _ => self == other,
        }
    }

    /// Returns true if the value is `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if the value is `Undefined` or `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// This value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// This value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// This value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// This value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// This value as map entries, if it is a map.
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a field in a map value.
    ///
    /// Returns `None` for non-maps and missing fields.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == field).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Looks up a dotted path like `"address.city"`.
    ///
    /// Each segment indexes into a map; the walk stops with `None` at
    /// the first non-map or missing segment.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Sets a field on a map value.
    ///
    /// An existing field keeps its position; a new field is appended.
    /// No-op on non-map values.
    pub fn set(&mut self, field: &str, value: Value) {
        if let Value::Map(pairs) = self {
            match pairs.iter_mut().find(|(k, _)| k == field) {
                Some((_, slot)) => *slot = value,
                None => pairs.push((field.to_string(), value)),
            }
        }
    }

    /// Removes a field from a map value, returning it if present.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        if let Value::Map(pairs) = self {
            let pos = pairs.iter().position(|(k, _)| k == field)?;
            return Some(pairs.remove(pos).1);
        }
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_ordered(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_ordered(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.type_rank());
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => Self::canonical_f64(*n).to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Array(a) => {
                for v in a {
                    v.hash(state);
                }
            }
            Value::Map(m) => {
                for (k, v) in m {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

// Largest f64 magnitude below which every integral value is exact.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn as_exact_integer(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Some(n as i64)
    } else {
        None
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            // Undefined has no wire form; both nullish variants
            // serialize as null.
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => match as_exact_integer(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(items) => items.serialize(serializer),
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> serde::de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a record value")
            }

            fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
                Ok(Value::Bool(b))
            }

            fn visit_i64<E>(self, n: i64) -> Result<Value, E> {
                Ok(Value::Number(n as f64))
            }

            fn visit_u64<E>(self, n: u64) -> Result<Value, E> {
                Ok(Value::Number(n as f64))
            }

            fn visit_f64<E>(self, n: f64) -> Result<Value, E> {
                Ok(Value::Number(n))
            }

            fn visit_str<E: serde::de::Error>(self, s: &str) -> Result<Value, E> {
                Ok(Value::Text(s.to_string()))
            }

            fn visit_string<E>(self, s: String) -> Result<Value, E> {
                Ok(Value::Text(s))
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: serde::Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
                <Value as serde::Deserialize>::deserialize(d)
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::Array(items))
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut map: A,
            ) -> Result<Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    entries.push((key, value));
                }
                Ok(Value::Map(entries))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            // JSON has no undefined; both nullish variants collapse to null.
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => match as_exact_integer(n) {
                Some(i) => serde_json::Value::Number(serde_json::Number::from(i)),
                None => serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            },
            Value::Text(s) => serde_json::Value::String(s),
            Value::Array(a) => {
                serde_json::Value::Array(a.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(m) => serde_json::Value::Object(
                m.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}
