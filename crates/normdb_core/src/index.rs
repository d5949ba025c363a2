//! Multi-field sorted record index.
//!
//! An [`Index`] maps a tuple of field values to a bucket of records
//! sharing that tuple. Keys are kept sorted under the cross-type total
//! order of [`Value`], applied lexicographically across the tuple, so
//! exact lookups, ordered scans, and range queries all come from the
//! same structure.

use crate::record::{Record, RecordKey};
use normdb_value::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A key tuple: one [`Value`] per index field.
///
/// Tuples order lexicographically. A tuple that is a strict prefix of
/// another sorts first, which is what makes prefix-range queries on
/// composite indexes work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyTuple(pub Vec<Value>);

impl KeyTuple {
    /// A single-field key.
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the tuple has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compares this (full-length) key against a possibly-partial
    /// bound, looking only at the bound's components.
    ///
    /// A bound shorter than the key acts as a prefix: every key sharing
    /// the prefix compares `Equal`.
    #[must_use]
    pub fn prefix_cmp(&self, bound: &KeyTuple) -> Ordering {
        for (component, bound_component) in self.0.iter().zip(bound.0.iter()) {
            let ord = component.cmp_ordered(bound_component);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        if self.0.len() < bound.0.len() {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }
}

impl From<Value> for KeyTuple {
    fn from(value: Value) -> Self {
        match value {
            // An array argument is already a composite key tuple.
            Value::Array(components) => Self(components),
            scalar => Self(vec![scalar]),
        }
    }
}

impl From<Vec<Value>> for KeyTuple {
    fn from(components: Vec<Value>) -> Self {
        Self(components)
    }
}

/// Inclusivity flags for range queries.
///
/// Defaults match the usual paging idiom: closed on the left, open on
/// the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetweenOpts {
    /// Include keys equal to the left bound.
    pub left_inclusive: bool,
    /// Include keys equal to the right bound.
    pub right_inclusive: bool,
}

impl Default for BetweenOpts {
    fn default() -> Self {
        Self {
            left_inclusive: true,
            right_inclusive: false,
        }
    }
}

/// A sorted index over one or more record fields.
///
/// Buckets preserve insertion order and hold each record at most once;
/// record identity within a bucket is the record's collection key
/// (id-field value, or internal handle for unidentified records).
/// Removing a bucket's last record removes the key, so the key list
/// stays dense.
#[derive(Debug)]
pub struct Index {
    /// Fields the index keys on, in priority order.
    fields: Vec<String>,
    /// Identifying field used for bucket dedup.
    id_field: String,
    /// Sorted key to bucket mapping.
    entries: BTreeMap<KeyTuple, Vec<Record>>,
    /// Total record count across buckets.
    count: usize,
}

impl Index {
    /// Creates an empty index over the given fields.
    pub fn new(fields: Vec<String>, id_field: impl Into<String>) -> Self {
        Self {
            fields,
            id_field: id_field.into(),
            entries: BTreeMap::new(),
            count: 0,
        }
    }

    /// The fields this index keys on.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Computes a record's key tuple from its current field values.
    ///
    /// Missing fields key as `Undefined`.
    #[must_use]
    pub fn key_for(&self, record: &Record) -> KeyTuple {
        KeyTuple(
            self.fields
                .iter()
                .map(|field| record.get_path(field))
                .collect(),
        )
    }

    /// Inserts a record under its current key tuple.
    ///
    /// Re-inserting a record already present under the same key is a
    /// no-op: the bucket neither duplicates nor reorders.
    pub fn insert_record(&mut self, record: &Record) {
        let key = self.key_for(record);
        let record_key = record.key(&self.id_field);
        let bucket = self.entries.entry(key).or_default();

        let already_present = bucket
            .iter()
            .any(|existing| existing.key(&self.id_field) == record_key);
        if !already_present {
            bucket.push(record.clone());
            self.count += 1;
        }
    }

    /// Removes a record, locating it by its current field values.
    ///
    /// Falls back to a full scan when the record's indexed fields were
    /// mutated without re-keying. Returns true if the record was found.
    pub fn remove_record(&mut self, record: &Record) -> bool {
        let key = self.key_for(record);
        if self.remove_from_bucket(&key, record) {
            return true;
        }

        // Stale key: the record moved out from under us.
        let stale_key = self
            .entries
            .iter()
            .find(|(_, bucket)| bucket.iter().any(|existing| existing == record))
            .map(|(key, _)| key.clone());
        match stale_key {
            Some(key) => self.remove_from_bucket(&key, record),
            None => false,
        }
    }

    fn remove_from_bucket(&mut self, key: &KeyTuple, record: &Record) -> bool {
        let Some(bucket) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|existing| existing == record) else {
            return false;
        };
        bucket.remove(pos);
        self.count -= 1;
        if bucket.is_empty() {
            self.entries.remove(key);
        }
        true
    }

    /// Re-keys a record after its indexed fields changed.
    ///
    /// When the caller tracked the previous key, supply it; otherwise
    /// the record is located by scan. Equivalent to remove + insert.
    pub fn update_record(&mut self, record: &Record, old_key: Option<&KeyTuple>) {
        match old_key {
            Some(key) => {
                self.remove_from_bucket(key, record);
            }
            None => {
                self.remove_record(record);
            }
        }
        self.insert_record(record);
    }

    /// Returns the bucket for an exact key tuple, in insertion order.
    #[must_use]
    pub fn get(&self, key: &KeyTuple) -> Vec<Record> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Returns the bucket of records whose indexed fields are all
    /// absent (the "undefined" partition).
    #[must_use]
    pub fn get_undefined(&self) -> Vec<Record> {
        self.get(&KeyTuple(vec![Value::Undefined; self.fields.len()]))
    }

    /// Concatenates exact lookups for several key tuples.
    #[must_use]
    pub fn get_all(&self, keys: &[KeyTuple]) -> Vec<Record> {
        let mut result = Vec::new();
        for key in keys {
            result.extend(self.get(key));
        }
        result
    }

    /// Returns records whose key tuple lies between the bounds.
    ///
    /// Bounds may be shorter than the field list; they then match as a
    /// prefix, and an exclusive prefix bound excludes every key sharing
    /// that prefix.
    #[must_use]
    pub fn between(&self, left: &KeyTuple, right: &KeyTuple, opts: BetweenOpts) -> Vec<Record> {
        let mut result = Vec::new();

        // Keys with prefix `left` all sort >= the bound tuple itself,
        // so the range can start there.
        for (key, bucket) in self.entries.range(left.clone()..) {
            match key.prefix_cmp(right) {
                Ordering::Greater => break,
                Ordering::Equal if !opts.right_inclusive => continue,
                _ => {}
            }
            if key.prefix_cmp(left) == Ordering::Equal && !opts.left_inclusive {
                continue;
            }
            result.extend(bucket.iter().cloned());
        }
        result
    }

    /// All records in key order, insertion order within buckets.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        let mut result = Vec::with_capacity(self.count);
        for bucket in self.entries.values() {
            result.extend(bucket.iter().cloned());
        }
        result
    }

    /// The sorted key list.
    #[must_use]
    pub fn keys(&self) -> Vec<KeyTuple> {
        self.entries.keys().cloned().collect()
    }

    /// Total number of records in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: serde_json::Value) -> Record {
        Record::new(Value::from(json))
    }

    fn age_index() -> Index {
        Index::new(vec!["age".into()], "id")
    }

    #[test]
    fn keys_stay_sorted() {
        let mut index = age_index();
        for age in [30, 18, 25, 19] {
            index.insert_record(&record(serde_json::json!({"id": age, "age": age})));
        }

        let keys = index.keys();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn bucket_preserves_insertion_order() {
        let mut index = age_index();
        let first = record(serde_json::json!({"id": 3, "age": 19}));
        let second = record(serde_json::json!({"id": 9, "age": 19}));
        index.insert_record(&first);
        index.insert_record(&second);

        let bucket = index.get(&KeyTuple::single(19));
        assert_eq!(bucket, vec![first, second]);
    }

    #[test]
    fn reinsert_same_key_is_noop() {
        let mut index = age_index();
        let rec = record(serde_json::json!({"id": 1, "age": 20}));
        index.insert_record(&rec);
        index.insert_record(&rec);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&KeyTuple::single(20)).len(), 1);
    }

    #[test]
    fn missing_field_keys_as_undefined() {
        let mut index = age_index();
        let rec = record(serde_json::json!({"id": 1}));
        index.insert_record(&rec);

        assert_eq!(index.get_undefined(), vec![rec]);
    }

    #[test]
    fn remove_last_record_drops_key() {
        let mut index = age_index();
        let rec = record(serde_json::json!({"id": 1, "age": 20}));
        index.insert_record(&rec);

        assert!(index.remove_record(&rec));
        assert!(index.keys().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn remove_restores_unrelated_buckets() {
        let mut index = age_index();
        let keeper = record(serde_json::json!({"id": 1, "age": 18}));
        let goner = record(serde_json::json!({"id": 2, "age": 19}));
        index.insert_record(&keeper);

        let before_keys = index.keys();
        index.insert_record(&goner);
        index.remove_record(&goner);

        assert_eq!(index.keys(), before_keys);
        assert_eq!(index.get(&KeyTuple::single(18)), vec![keeper]);
    }

    #[test]
    fn remove_finds_stale_record_by_scan() {
        let mut index = age_index();
        let rec = record(serde_json::json!({"id": 1, "age": 20}));
        index.insert_record(&rec);

        // Mutate the indexed field without re-keying.
        rec.set("age", Value::Number(99.0));
        assert!(index.remove_record(&rec));
        assert!(index.is_empty());
    }

    #[test]
    fn update_record_rekeys() {
        let mut index = age_index();
        let rec = record(serde_json::json!({"id": 1, "age": 20}));
        index.insert_record(&rec);

        let old_key = KeyTuple::single(20);
        rec.set("age", Value::Number(21.0));
        index.update_record(&rec, Some(&old_key));

        assert!(index.get(&KeyTuple::single(20)).is_empty());
        assert_eq!(index.get(&KeyTuple::single(21)), vec![rec]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn between_inclusive_bounds() {
        let mut index = age_index();
        for age in [17, 18, 19, 20, 21] {
            index.insert_record(&record(serde_json::json!({"id": age, "age": age})));
        }

        let records = index.between(
            &KeyTuple::single(18),
            &KeyTuple::single(20),
            BetweenOpts {
                left_inclusive: true,
                right_inclusive: true,
            },
        );
        let ages: Vec<Value> = records.iter().map(|r| r.get("age")).collect();
        assert_eq!(
            ages,
            vec![Value::Number(18.0), Value::Number(19.0), Value::Number(20.0)]
        );
    }

    #[test]
    fn between_exclusive_bounds() {
        let mut index = age_index();
        for age in [17, 18, 19, 20, 21] {
            index.insert_record(&record(serde_json::json!({"id": age, "age": age})));
        }

        let records = index.between(
            &KeyTuple::single(18),
            &KeyTuple::single(20),
            BetweenOpts {
                left_inclusive: false,
                right_inclusive: false,
            },
        );
        let ages: Vec<Value> = records.iter().map(|r| r.get("age")).collect();
        assert_eq!(ages, vec![Value::Number(19.0)]);
    }

    #[test]
    fn between_prefix_on_composite_index() {
        let mut index = Index::new(vec!["role".into(), "age".into()], "id");
        index.insert_record(&record(serde_json::json!({"id": 1, "role": "admin", "age": 30})));
        index.insert_record(&record(serde_json::json!({"id": 2, "role": "admin", "age": 40})));
        index.insert_record(&record(serde_json::json!({"id": 3, "role": "dev", "age": 30})));

        // Partial bounds: everything with role == "admin".
        let admins = index.between(
            &KeyTuple::single("admin"),
            &KeyTuple::single("admin"),
            BetweenOpts {
                left_inclusive: true,
                right_inclusive: true,
            },
        );
        assert_eq!(admins.len(), 2);

        // Exclusive prefix bound excludes the whole prefix.
        let none = index.between(
            &KeyTuple::single("admin"),
            &KeyTuple::single("admin"),
            BetweenOpts {
                left_inclusive: false,
                right_inclusive: true,
            },
        );
        assert!(none.is_empty());
    }

    #[test]
    fn cross_type_key_order() {
        let mut index = age_index();
        index.insert_record(&record(serde_json::json!({"id": 1, "age": "x"})));
        index.insert_record(&record(serde_json::json!({"id": 2, "age": 5})));
        index.insert_record(&record(serde_json::json!({"id": 3, "age": null})));
        index.insert_record(&record(serde_json::json!({"id": 4, "age": true})));
        index.insert_record(&record(serde_json::json!({"id": 5})));

        let order: Vec<Value> = index.records().iter().map(|r| r.get("age")).collect();
        assert_eq!(
            order,
            vec![
                Value::Undefined,
                Value::Null,
                Value::Bool(true),
                Value::Number(5.0),
                Value::Text("x".into()),
            ]
        );
    }

    #[test]
    fn get_all_concatenates_buckets() {
        let mut index = age_index();
        let a = record(serde_json::json!({"id": 1, "age": 18}));
        let b = record(serde_json::json!({"id": 2, "age": 20}));
        index.insert_record(&a);
        index.insert_record(&b);
        index.insert_record(&record(serde_json::json!({"id": 3, "age": 19})));

        let result = index.get_all(&[KeyTuple::single(18), KeyTuple::single(20)]);
        assert_eq!(result, vec![a, b]);
    }
}
