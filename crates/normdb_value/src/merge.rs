//! Structural merge and diff for map values.
//!
//! The collection merge policy uses these to fold a re-added payload
//! into an existing record: only added or changed fields are written,
//! so unchanged fields keep their position and listeners see a minimal
//! set of field changes.

use crate::Value;

/// The difference between two map values, field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Fields present in `incoming` but not in `base`.
    pub added: Vec<(String, Value)>,
    /// Fields present in both but with different values (incoming value).
    pub changed: Vec<(String, Value)>,
    /// Fields present in `base` but not in `incoming`.
    pub removed: Vec<String>,
}

impl Diff {
    /// Returns true if the diff carries no changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Computes the field-level difference between two map values.
///
/// Non-map inputs produce an empty diff.
pub fn diff(base: &Value, incoming: &Value) -> Diff {
    let (Some(base_entries), Some(incoming_entries)) = (base.as_map(), incoming.as_map()) else {
        return Diff::default();
    };

    let mut result = Diff::default();

    for (field, value) in incoming_entries {
        match base.get(field) {
            None => result.added.push((field.clone(), value.clone())),
            Some(existing) if existing != value => {
                result.changed.push((field.clone(), value.clone()));
            }
            Some(_) => {}
        }
    }

    for (field, _) in base_entries {
        if incoming.get(field).is_none() {
            result.removed.push(field.clone());
        }
    }

    result
}

/// Merges `incoming` map fields into `base`, diff-style.
///
/// Added and changed fields are written onto `base`; fields missing
/// from `incoming` are left alone (a merge never deletes). Returns the
/// fields that were actually written, in `incoming` order.
pub fn merge_into(base: &mut Value, incoming: &Value) -> Vec<(String, Value)> {
    let delta = diff(base, incoming);
    let mut written = Vec::with_capacity(delta.added.len() + delta.changed.len());

    if let Some(entries) = incoming.as_map() {
        for (field, value) in entries {
            let is_written = delta.added.iter().any(|(f, _)| f == field)
                || delta.changed.iter().any(|(f, _)| f == field);
            if is_written {
                base.set(field, value.clone());
                written.push((field.clone(), value.clone()));
            }
        }
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Value {
        Value::map(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn diff_classifies_fields() {
        let base = record(&[("a", Value::Number(1.0)), ("b", Value::Number(2.0))]);
        let incoming = record(&[("b", Value::Number(3.0)), ("c", Value::Number(4.0))]);

        let delta = diff(&base, &incoming);
        assert_eq!(delta.added, vec![("c".to_string(), Value::Number(4.0))]);
        assert_eq!(delta.changed, vec![("b".to_string(), Value::Number(3.0))]);
        assert_eq!(delta.removed, vec!["a".to_string()]);
    }

    #[test]
    fn diff_of_equal_maps_is_empty() {
        let base = record(&[("a", Value::Number(1.0))]);
        assert!(diff(&base, &base.clone()).is_empty());
    }

    #[test]
    fn merge_writes_only_added_and_changed() {
        let mut base = record(&[("a", Value::Number(1.0)), ("b", Value::Number(2.0))]);
        let incoming = record(&[("b", Value::Number(3.0)), ("c", Value::Number(4.0))]);

        let written = merge_into(&mut base, &incoming);
        assert_eq!(written.len(), 2);

        // Merge never deletes
        assert_eq!(base.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(base.get("b"), Some(&Value::Number(3.0)));
        assert_eq!(base.get("c"), Some(&Value::Number(4.0)));
    }

    #[test]
    fn merge_preserves_field_positions() {
        let mut base = record(&[("a", Value::Number(1.0)), ("b", Value::Number(2.0))]);
        let incoming = record(&[("a", Value::Number(9.0))]);
        merge_into(&mut base, &incoming);

        let entries = base.as_map().unwrap();
        assert_eq!(entries[0].0, "a");
        assert_eq!(entries[1].0, "b");
    }
}
