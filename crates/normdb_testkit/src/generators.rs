//! Property-based test generators using proptest.
//!
//! Strategies for generating record values that exercise the
//! cross-type total order, fingerprinting, and merge machinery.

use normdb_value::Value;
use proptest::prelude::*;

/// Strategy for scalar values of every variant.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        // Finite numbers only; NaN is canonicalized away on input.
        (-1.0e9f64..1.0e9).prop_map(Value::Number),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Text),
    ]
}

/// Strategy for arbitrarily nested values, bounded in depth and size.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,8}", inner), 0..6)
                .prop_map(|pairs| Value::map(pairs)),
        ]
    })
}

/// Strategy for flat record payloads with a numeric id.
pub fn record_payload_strategy() -> impl Strategy<Value = Value> {
    (
        1i64..10_000,
        "[a-zA-Z]{1,10}",
        0i64..120,
    )
        .prop_map(|(id, name, age)| {
            Value::from(serde_json::json!({
                "id": id,
                "name": name,
                "age": age,
            }))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use normdb_value::{fingerprint, merge_into};
    use std::cmp::Ordering;

    proptest! {
        #[test]
        fn total_order_is_antisymmetric(a in value_strategy(), b in value_strategy()) {
            let forward = a.cmp_ordered(&b);
            let backward = b.cmp_ordered(&a);
            prop_assert_eq!(forward, backward.reverse());
        }

        #[test]
        fn total_order_is_transitive(
            a in value_strategy(),
            b in value_strategy(),
            c in value_strategy(),
        ) {
            let mut values = vec![a, b, c];
            values.sort_by(|x, y| x.cmp_ordered(y));
            // A sorted triple must be pairwise ordered.
            prop_assert_ne!(values[0].cmp_ordered(&values[1]), Ordering::Greater);
            prop_assert_ne!(values[1].cmp_ordered(&values[2]), Ordering::Greater);
            prop_assert_ne!(values[0].cmp_ordered(&values[2]), Ordering::Greater);
        }

        #[test]
        fn equal_values_fingerprint_identically(value in value_strategy()) {
            prop_assert_eq!(fingerprint(&value), fingerprint(&value.clone()));
        }

        #[test]
        fn fingerprint_ignores_map_key_order(
            pairs in prop::collection::hash_map("[a-z]{1,6}", 0i64..100, 1..5)
        ) {
            let mut forward: Vec<(String, Value)> = pairs
                .iter()
                .map(|(k, v)| (k.clone(), Value::Number(*v as f64)))
                .collect();
            let mut reversed = forward.clone();
            forward.sort_by(|a, b| a.0.cmp(&b.0));
            reversed.sort_by(|a, b| b.0.cmp(&a.0));

            prop_assert_eq!(
                fingerprint(&Value::Map(forward)),
                fingerprint(&Value::Map(reversed))
            );
        }

        #[test]
        fn merge_is_idempotent(base in record_payload_strategy(), patch in record_payload_strategy()) {
            let mut once = base.clone();
            merge_into(&mut once, &patch);
            let mut twice = once.clone();
            let written = merge_into(&mut twice, &patch);

            prop_assert!(written.is_empty());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn merged_fields_match_patch(base in record_payload_strategy(), patch in record_payload_strategy()) {
            let mut merged = base;
            merge_into(&mut merged, &patch);
            if let Value::Map(pairs) = &patch {
                for (field, value) in pairs {
                    prop_assert_eq!(merged.get(field), Some(value));
                }
            }
        }
    }
}
