//! Stable fingerprinting of query values.
//!
//! A fingerprint is a deterministic hash of a `Value` that ignores map
//! key insertion order: structurally equal queries produce the same
//! string. The store uses fingerprints as keys for its pending and
//! completed query caches.

use crate::Value;
use sha2::{Digest, Sha256};

/// Returns the hex fingerprint of a value.
///
/// Map entries are visited in sorted key order, so two queries built
/// with the same fields in different order fingerprint identically.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    feed(value, &mut hasher);
    let digest = hasher.finalize();

    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Tag byte per variant, so e.g. `Text("1")` and `Number(1.0)` cannot
/// collide.
fn tag(value: &Value) -> u8 {
    match value {
        Value::Undefined => 0,
        Value::Null => 1,
        Value::Bool(_) => 2,
        Value::Number(_) => 3,
        Value::Text(_) => 4,
        Value::Array(_) => 5,
        Value::Map(_) => 6,
    }
}

fn feed(value: &Value, hasher: &mut Sha256) {
    hasher.update([tag(value)]);

    match value {
        Value::Undefined | Value::Null => {}
        Value::Bool(b) => hasher.update([u8::from(*b)]),
        Value::Number(n) => {
            // Canonicalize the same way Value's Eq does.
            let canonical = if *n == 0.0 {
                0.0
            } else if n.is_nan() {
                f64::NAN
            } else {
                *n
            };
            hasher.update(canonical.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            hasher.update((s.len() as u64).to_be_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                feed(item, hasher);
            }
        }
        Value::Map(entries) => {
            let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));

            hasher.update((sorted.len() as u64).to_be_bytes());
            for (key, val) in sorted {
                hasher.update((key.len() as u64).to_be_bytes());
                hasher.update(key.as_bytes());
                feed(val, hasher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_matter() {
        let a = Value::map(vec![
            ("where".into(), Value::Text("x".into())),
            ("limit".into(), Value::Number(5.0)),
        ]);
        let b = Value::map(vec![
            ("limit".into(), Value::Number(5.0)),
            ("where".into(), Value::Text("x".into())),
        ]);

        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn nested_key_order_does_not_matter() {
        let a = Value::map(vec![(
            "where".into(),
            Value::map(vec![
                ("age".into(), Value::Number(19.0)),
                ("role".into(), Value::Text("admin".into())),
            ]),
        )]);
        let b = Value::map(vec![(
            "where".into(),
            Value::map(vec![
                ("role".into(), Value::Text("admin".into())),
                ("age".into(), Value::Number(19.0)),
            ]),
        )]);

        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_values_differ() {
        let a = Value::map(vec![("limit".into(), Value::Number(5.0))]);
        let b = Value::map(vec![("limit".into(), Value::Number(6.0))]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn text_and_number_do_not_collide() {
        assert_ne!(
            fingerprint(&Value::Text("1".into())),
            fingerprint(&Value::Number(1.0))
        );
    }

    #[test]
    fn array_order_matters() {
        let a = Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = Value::Array(vec![Value::Number(2.0), Value::Number(1.0)]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
