//! In-memory record collections.
//!
//! A [`Collection`] holds records in an unordered primary store keyed
//! by identity, alongside a default index over the id field and any
//! number of named secondary indexes. All reads hand out record
//! handles, never copies, so a mutation seen through one handle is
//! seen everywhere.

use crate::error::{CoreError, CoreResult};
use crate::events::{ChangeKind, EventBus, Subscription};
use crate::index::{BetweenOpts, Index, KeyTuple};
use crate::query::Query;
use crate::record::{Record, RecordKey};
use normdb_value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// What to do when an added payload collides with a resident record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Diff-merge the payload into the resident record (the default).
    #[default]
    Merge,
    /// Replace the resident record's fields wholesale.
    Replace,
}

/// Collection configuration.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Field that identifies records. Defaults to `"id"`.
    pub id_field: String,
    /// Conflict policy for re-added identities.
    pub on_conflict: ConflictPolicy,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            id_field: "id".into(),
            on_conflict: ConflictPolicy::Merge,
        }
    }
}

impl CollectionConfig {
    /// Sets the identifying field.
    #[must_use]
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Sets the conflict policy.
    #[must_use]
    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }
}

struct State {
    records: HashMap<RecordKey, Record>,
    default_index: Index,
    indexes: HashMap<String, Index>,
}

/// A collection of records of one entity type.
pub struct Collection {
    name: String,
    config: CollectionConfig,
    state: RwLock<State>,
    bus: EventBus,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>, config: CollectionConfig) -> Self {
        let default_index = Index::new(vec![config.id_field.clone()], config.id_field.clone());
        Self {
            name: name.into(),
            config,
            state: RwLock::new(State {
                records: HashMap::new(),
                default_index,
                indexes: HashMap::new(),
            }),
            bus: EventBus::new(),
        }
    }

    /// The collection's entity type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identifying field.
    #[must_use]
    pub fn id_field(&self) -> &str {
        &self.config.id_field
    }

    /// Number of resident records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// True when the collection holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Subscribes to this collection's change events.
    ///
    /// Events from records currently or formerly in the collection
    /// bubble through the same bus.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Adds a property map, returning the resident record.
    ///
    /// If a record with the same identity is already resident, the
    /// payload is merged (or replaces it, per the conflict policy) and
    /// the *existing* handle is returned, so references held elsewhere
    /// stay valid.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalArgument`] when the payload is not a
    /// map.
    pub fn add(&self, payload: Value) -> CoreResult<Record> {
        if !matches!(payload, Value::Map(_)) {
            return Err(CoreError::illegal_argument(format!(
                "can only add a record object, got {payload:?}"
            )));
        }

        let id = payload.get(&self.config.id_field).cloned().unwrap_or(Value::Undefined);
        let mut state = self.state.write();

        if !id.is_nullish() {
            let key = RecordKey::Id(id);
            if let Some(existing) = state.records.get(&key).cloned() {
                self.absorb(&mut state, &existing, payload);
                return Ok(existing);
            }
        }

        let record = Record::new(payload);
        self.insert_new(&mut state, &record);
        Ok(record)
    }

    /// Adds several property maps.
    pub fn add_many(&self, payloads: Vec<Value>) -> CoreResult<Vec<Record>> {
        payloads.into_iter().map(|payload| self.add(payload)).collect()
    }

    /// Adds an already-built record instance.
    ///
    /// A resident record with the same identity absorbs the instance's
    /// fields and is returned instead; otherwise the instance itself
    /// joins the collection.
    pub fn add_record(&self, record: Record) -> CoreResult<Record> {
        let key = record.key(&self.config.id_field);
        let mut state = self.state.write();

        if let RecordKey::Id(_) = &key {
            if let Some(existing) = state.records.get(&key).cloned() {
                if existing != record {
                    self.absorb(&mut state, &existing, record.snapshot());
                }
                return Ok(existing);
            }
        }
        if state.records.get(&key).is_some() {
            // Same unsaved record re-added.
            return Ok(record);
        }

        self.insert_new(&mut state, &record);
        Ok(record)
    }

    /// Merges or replaces an existing record's fields and re-keys it.
    fn absorb(&self, state: &mut State, existing: &Record, payload: Value) {
        let old_keys = self.current_keys(state, existing);
        match self.config.on_conflict {
            ConflictPolicy::Merge => {
                existing.merge(&payload);
            }
            ConflictPolicy::Replace => existing.replace(payload),
        }
        self.rekey(state, existing, old_keys);
        self.bus.emit(ChangeKind::Change, existing.clone(), None, None);
    }

    fn insert_new(&self, state: &mut State, record: &Record) {
        record.attach_bus(self.bus.clone());
        state
            .records
            .insert(record.key(&self.config.id_field), record.clone());
        state.default_index.insert_record(record);
        for index in state.indexes.values_mut() {
            index.insert_record(record);
        }
        self.bus.emit(ChangeKind::Add, record.clone(), None, None);
    }

    /// Key tuples the record currently occupies, default index first.
    fn current_keys(&self, state: &State, record: &Record) -> Vec<(Option<String>, KeyTuple)> {
        let mut keys = vec![(None, state.default_index.key_for(record))];
        for (name, index) in &state.indexes {
            keys.push((Some(name.clone()), index.key_for(record)));
        }
        keys
    }

    fn rekey(&self, state: &mut State, record: &Record, old_keys: Vec<(Option<String>, KeyTuple)>) {
        for (name, old_key) in &old_keys {
            match name {
                None => state.default_index.update_record(record, Some(old_key)),
                Some(name) => {
                    if let Some(index) = state.indexes.get_mut(name) {
                        index.update_record(record, Some(old_key));
                    }
                }
            }
        }
        // The primary-store key may have moved too (id assigned or
        // changed through a handle).
        let current = record.key(&self.config.id_field);
        if state.records.get(&current).map(|r| r == record) != Some(true) {
            state
                .records
                .retain(|_, resident| resident != record);
            state.records.insert(current, record.clone());
        }
    }

    /// Looks up a record by identity.
    #[must_use]
    pub fn get(&self, id: &Value) -> Option<Record> {
        self.state
            .read()
            .records
            .get(&RecordKey::Id(id.clone()))
            .cloned()
    }

    /// Exact key lookups on the default or a named index.
    pub fn get_all(&self, keys: &[KeyTuple], index: Option<&str>) -> CoreResult<Vec<Record>> {
        self.index_get_all(index, keys)
    }

    /// Range lookup on the default or a named index.
    pub fn between(
        &self,
        left: impl Into<KeyTuple>,
        right: impl Into<KeyTuple>,
        opts: BetweenOpts,
        index: Option<&str>,
    ) -> CoreResult<Vec<Record>> {
        self.index_between(index, &left.into(), &right.into(), opts)
    }

    /// Starts a lazy query against this collection.
    #[must_use]
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Runs a declarative filter in one call.
    pub fn filter(&self, query: &Value) -> CoreResult<Vec<Record>> {
        self.query().filter(query).run()
    }

    /// Records that have no identity yet, in insertion order.
    #[must_use]
    pub fn unsaved(&self) -> Vec<Record> {
        self.state.read().default_index.get_undefined()
    }

    /// Defines (or redefines) a named secondary index and backfills it
    /// with the resident records.
    pub fn create_index(&self, name: impl Into<String>, fields: Vec<String>) {
        let name = name.into();
        let mut state = self.state.write();
        let mut index = Index::new(fields, self.config.id_field.clone());
        for record in state.default_index.records() {
            index.insert_record(&record);
        }
        debug!(collection = %self.name, index = %name, "created secondary index");
        state.indexes.insert(name, index);
    }

    /// Names of the secondary indexes.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.state.read().indexes.keys().cloned().collect()
    }

    /// Re-keys a record in the default and every secondary index after
    /// its fields were written through a handle.
    pub fn update_indexes(&self, record: &Record) {
        let mut state = self.state.write();
        state.default_index.update_record(record, None);
        for index in state.indexes.values_mut() {
            index.update_record(record, None);
        }
        let current = record.key(&self.config.id_field);
        if state.records.get(&current).map(|r| r == record) != Some(true) {
            state.records.retain(|_, resident| resident != record);
            state.records.insert(current, record.clone());
        }
    }

    /// Re-keys a record in one named index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFound`] for an unknown name.
    pub fn update_index(&self, record: &Record, name: &str) -> CoreResult<()> {
        let mut state = self.state.write();
        let index = state
            .indexes
            .get_mut(name)
            .ok_or_else(|| CoreError::index_not_found(name))?;
        index.update_record(record, None);
        Ok(())
    }

    /// Removes a record by identity, returning it.
    ///
    /// The returned handle stays usable and keeps emitting field
    /// changes through this collection's bus.
    pub fn remove(&self, id: &Value) -> Option<Record> {
        let record = {
            let mut state = self.state.write();
            let record = state.records.remove(&RecordKey::Id(id.clone()))?;
            state.default_index.remove_record(&record);
            for index in state.indexes.values_mut() {
                index.remove_record(&record);
            }
            record
        };
        self.bus.emit(ChangeKind::Remove, record.clone(), None, None);
        Some(record)
    }

    /// Removes a specific record instance, wherever it is keyed.
    pub fn remove_record(&self, record: &Record) -> bool {
        let removed = {
            let mut state = self.state.write();
            let before = state.records.len();
            state.records.retain(|_, resident| resident != record);
            let removed = state.records.len() != before;
            if removed {
                state.default_index.remove_record(record);
                for index in state.indexes.values_mut() {
                    index.remove_record(record);
                }
            }
            removed
        };
        if removed {
            self.bus.emit(ChangeKind::Remove, record.clone(), None, None);
        }
        removed
    }

    /// Removes every record matching a declarative filter, or all
    /// records when the filter is empty.
    pub fn remove_all(&self, query: &Value) -> CoreResult<Vec<Record>> {
        let matched = self.filter(query)?;
        for record in &matched {
            self.remove_record(record);
        }
        Ok(matched)
    }

    /// Every record in default-index (id) order, or in a named index's
    /// key order.
    pub fn records_in_order(&self, index: Option<&str>) -> CoreResult<Vec<Record>> {
        let state = self.state.read();
        match index {
            None => Ok(state.default_index.records()),
            Some(name) => state
                .indexes
                .get(name)
                .map(Index::records)
                .ok_or_else(|| CoreError::index_not_found(name)),
        }
    }

    pub(crate) fn index_get_all(
        &self,
        index: Option<&str>,
        keys: &[KeyTuple],
    ) -> CoreResult<Vec<Record>> {
        let state = self.state.read();
        match index {
            None => Ok(state.default_index.get_all(keys)),
            Some(name) => state
                .indexes
                .get(name)
                .map(|index| index.get_all(keys))
                .ok_or_else(|| CoreError::index_not_found(name)),
        }
    }

    pub(crate) fn index_between(
        &self,
        index: Option<&str>,
        left: &KeyTuple,
        right: &KeyTuple,
        opts: BetweenOpts,
    ) -> CoreResult<Vec<Record>> {
        let state = self.state.read();
        match index {
            None => Ok(state.default_index.between(left, right, opts)),
            Some(name) => state
                .indexes
                .get(name)
                .map(|index| index.between(left, right, opts))
                .ok_or_else(|| CoreError::index_not_found(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn users() -> Collection {
        Collection::new("user", CollectionConfig::default())
    }

    fn json(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    #[test]
    fn add_and_get() {
        let users = users();
        let record = users.add(json(serde_json::json!({"id": 1, "name": "Ada"}))).unwrap();
        assert_eq!(users.get(&Value::Number(1.0)), Some(record));
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn add_record_reuses_the_resident_instance() {
        let users = users();
        let resident = users
            .add(json(serde_json::json!({"id": 1, "name": "Ada"})))
            .unwrap();

        let detached = Record::new(json(serde_json::json!({"id": 1, "age": 36})));
        let returned = users.add_record(detached).unwrap();

        assert_eq!(returned, resident);
        assert_eq!(resident.get("age"), Value::Number(36.0));
        assert_eq!(resident.get("name"), Value::Text("Ada".into()));

        let draft = Record::new(json(serde_json::json!({"name": "draft"})));
        let kept = users.add_record(draft.clone()).unwrap();
        assert_eq!(kept, draft);
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn add_non_object_is_an_error() {
        let users = users();
        assert!(matches!(
            users.add(Value::Number(1.0)),
            Err(CoreError::IllegalArgument { .. })
        ));
    }

    #[test]
    fn readd_merges_and_keeps_identity() {
        let users = users();
        let original = users
            .add(json(serde_json::json!({"id": 1, "name": "Ada", "age": 36})))
            .unwrap();
        let merged = users
            .add(json(serde_json::json!({"id": 1, "age": 37})))
            .unwrap();

        assert_eq!(original, merged);
        assert_eq!(merged.get("name"), Value::Text("Ada".into()));
        assert_eq!(merged.get("age"), Value::Number(37.0));
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn readd_replaces_under_replace_policy() {
        let users = Collection::new(
            "user",
            CollectionConfig::default().on_conflict(ConflictPolicy::Replace),
        );
        users
            .add(json(serde_json::json!({"id": 1, "name": "Ada", "age": 36})))
            .unwrap();
        let replaced = users.add(json(serde_json::json!({"id": 1, "age": 37}))).unwrap();

        assert_eq!(replaced.get("name"), Value::Undefined);
        assert_eq!(replaced.get("age"), Value::Number(37.0));
    }

    #[test]
    fn unsaved_records_coexist_without_colliding() {
        let users = users();
        let first = users.add(json(serde_json::json!({"name": "Ada"}))).unwrap();
        let second = users.add(json(serde_json::json!({"name": "Grace"}))).unwrap();

        assert_ne!(first, second);
        assert_eq!(users.len(), 2);
        assert_eq!(users.unsaved(), vec![first, second]);
    }

    #[test]
    fn assigning_an_id_moves_record_out_of_unsaved() {
        let users = users();
        let record = users.add(json(serde_json::json!({"name": "Ada"}))).unwrap();

        record.set("id", Value::Number(7.0));
        users.update_indexes(&record);

        assert!(users.unsaved().is_empty());
        assert_eq!(users.get(&Value::Number(7.0)), Some(record));
    }

    #[test]
    fn secondary_index_backfills_and_tracks() {
        let users = users();
        users.add(json(serde_json::json!({"id": 1, "age": 30}))).unwrap();
        users.create_index("byAge", vec!["age".into()]);
        users.add(json(serde_json::json!({"id": 2, "age": 20}))).unwrap();

        let in_age_order = users.records_in_order(Some("byAge")).unwrap();
        let ages: Vec<Value> = in_age_order.iter().map(|r| r.get("age")).collect();
        assert_eq!(ages, vec![Value::Number(20.0), Value::Number(30.0)]);
    }

    #[test]
    fn unknown_index_is_an_error() {
        let users = users();
        assert!(matches!(
            users.records_in_order(Some("nope")),
            Err(CoreError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn merge_rekeys_secondary_indexes() {
        let users = users();
        users.create_index("byAge", vec!["age".into()]);
        users.add(json(serde_json::json!({"id": 1, "age": 30}))).unwrap();
        users.add(json(serde_json::json!({"id": 2, "age": 20}))).unwrap();
        users.add(json(serde_json::json!({"id": 1, "age": 10}))).unwrap();

        let ages: Vec<Value> = users
            .records_in_order(Some("byAge"))
            .unwrap()
            .iter()
            .map(|r| r.get("age"))
            .collect();
        assert_eq!(ages, vec![Value::Number(10.0), Value::Number(20.0)]);
    }

    #[test]
    fn remove_returns_live_record() {
        let users = users();
        let sub = users.subscribe();
        let record = users.add(json(serde_json::json!({"id": 1, "name": "Ada"}))).unwrap();

        let removed = users.remove(&Value::Number(1.0)).unwrap();
        assert_eq!(removed, record);
        assert!(users.is_empty());

        // Former members keep emitting through the collection bus.
        removed.set("name", Value::Text("Grace".into()));
        let kinds: Vec<ChangeKind> = sub.drain().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Add, ChangeKind::Remove, ChangeKind::FieldChange]
        );
    }

    #[test]
    fn remove_all_with_filter() {
        let users = users();
        users.add(json(serde_json::json!({"id": 1, "role": "admin"}))).unwrap();
        users.add(json(serde_json::json!({"id": 2, "role": "dev"}))).unwrap();
        users.add(json(serde_json::json!({"id": 3, "role": "dev"}))).unwrap();

        let removed = users
            .remove_all(&json(serde_json::json!({"role": "dev"})))
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn add_emits_add_then_merge_emits_change() {
        let users = users();
        let sub = users.subscribe();
        users.add(json(serde_json::json!({"id": 1, "age": 1}))).unwrap();
        users.add(json(serde_json::json!({"id": 1, "age": 2}))).unwrap();

        let kinds: Vec<ChangeKind> = sub.drain().iter().map(|e| e.kind).collect();
        // Merge writes emit per-field changes before the record-level one.
        assert_eq!(
            kinds,
            vec![ChangeKind::Add, ChangeKind::FieldChange, ChangeKind::Change]
        );
    }

    #[test]
    fn between_on_secondary_index() {
        let users = users();
        users.create_index("byAge", vec!["age".into()]);
        for (id, age) in [(1, 17), (2, 18), (3, 25), (4, 40)] {
            users.add(json(serde_json::json!({"id": id, "age": age}))).unwrap();
        }

        let adults = users
            .between(
                Value::Number(18.0),
                Value::Number(40.0),
                BetweenOpts::default(),
                Some("byAge"),
            )
            .unwrap();
        let ages: Vec<Value> = adults.iter().map(|r| r.get("age")).collect();
        assert_eq!(ages, vec![Value::Number(18.0), Value::Number(25.0)]);
    }

    #[test]
    fn mutation_through_handle_is_visible_in_collection() {
        let users = users();
        let record = users.add(json(serde_json::json!({"id": 1, "age": 20}))).unwrap();

        record.set("age", Value::Number(21.0));
        let fetched = users.get(&Value::Number(1.0)).unwrap();
        assert_eq!(
            fetched.get("age").cmp_ordered(&Value::Number(21.0)),
            Ordering::Equal
        );
    }
}
