//! Records: shared, mutable property bags.

use crate::events::{ChangeKind, EventBus};
use normdb_value::{merge_into, Value};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// How a record is addressed inside a collection.
///
/// Identified records key by their id-field value; records that have
/// not been assigned an identity yet key by an internal handle, so any
/// number of unsaved records can coexist without colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// The record's identifying value.
    Id(Value),
    /// Internal handle for a record with no identity yet.
    Handle(Uuid),
}

struct RecordInner {
    /// Stable internal handle, assigned at construction.
    handle: Uuid,
    /// The record's fields, insertion order preserved.
    fields: RwLock<Value>,
    /// Bus of the owning collection, set on add.
    bus: RwLock<Option<EventBus>>,
}

/// A record tracked by a collection.
///
/// `Record` is a cheap-clone handle: all clones share the same
/// underlying fields, so a mutation through any handle is visible to
/// the collection and to every other holder. Collections store records
/// by handle and never copy them - merging a re-added payload mutates
/// the record in place and preserves handle identity for listeners.
///
/// Two records are equal when they are the *same* record, not when
/// their fields happen to match.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl Record {
    /// Creates a record from a property map.
    ///
    /// A non-map value becomes an empty record.
    pub fn new(props: Value) -> Self {
        let fields = match props {
            map @ Value::Map(_) => map,
            _ => Value::map(Vec::new()),
        };
        Self {
            inner: Arc::new(RecordInner {
                handle: Uuid::new_v4(),
                fields: RwLock::new(fields),
                bus: RwLock::new(None),
            }),
        }
    }

    /// The record's internal handle.
    #[must_use]
    pub fn handle(&self) -> Uuid {
        self.inner.handle
    }

    /// Reads a field value, `Undefined` if absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Value {
        self.inner
            .fields
            .read()
            .get(field)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    /// Reads a dotted-path value, `Undefined` if any segment is absent.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Value {
        self.inner
            .fields
            .read()
            .get_path(path)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    /// Writes a field value.
    ///
    /// Emits a `FieldChange` event through the owning collection's bus
    /// if the value actually changed. Indexes are *not* re-keyed here;
    /// callers that write an indexed field must follow up with
    /// `Collection::update_indexes`.
    pub fn set(&self, field: &str, value: Value) {
        let changed = {
            let mut fields = self.inner.fields.write();
            let changed = fields.get(field) != Some(&value);
            if changed {
                fields.set(field, value.clone());
            }
            changed
        };

        if changed {
            if let Some(bus) = self.inner.bus.read().as_ref() {
                bus.emit(
                    ChangeKind::FieldChange,
                    self.clone(),
                    Some(field.to_string()),
                    Some(value),
                );
            }
        }
    }

    /// Removes a field, returning its previous value.
    pub fn unset(&self, field: &str) -> Option<Value> {
        let previous = self.inner.fields.write().remove(field);
        if previous.is_some() {
            if let Some(bus) = self.inner.bus.read().as_ref() {
                bus.emit(
                    ChangeKind::FieldChange,
                    self.clone(),
                    Some(field.to_string()),
                    Some(Value::Undefined),
                );
            }
        }
        previous
    }

    /// Merges a property map into this record, diff-style.
    ///
    /// Only added/changed fields are written; each written field emits
    /// a `FieldChange` event. Returns the written fields.
    pub fn merge(&self, incoming: &Value) -> Vec<(String, Value)> {
        let written = merge_into(&mut self.inner.fields.write(), incoming);
        if !written.is_empty() {
            if let Some(bus) = self.inner.bus.read().as_ref() {
                for (field, value) in &written {
                    bus.emit(
                        ChangeKind::FieldChange,
                        self.clone(),
                        Some(field.clone()),
                        Some(value.clone()),
                    );
                }
            }
        }
        written
    }

    /// Replaces all fields with the incoming map.
    pub fn replace(&self, incoming: Value) {
        let fields = match incoming {
            map @ Value::Map(_) => map,
            _ => Value::map(Vec::new()),
        };
        *self.inner.fields.write() = fields;
    }

    /// Materializes a plain copy of the record's fields.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.inner.fields.read().clone()
    }

    /// The record's identity under the given id field.
    #[must_use]
    pub fn id(&self, id_field: &str) -> Value {
        self.get(id_field)
    }

    /// The record's collection key under the given id field.
    #[must_use]
    pub fn key(&self, id_field: &str) -> RecordKey {
        let id = self.get(id_field);
        if id.is_nullish() {
            RecordKey::Handle(self.inner.handle)
        } else {
            RecordKey::Id(id)
        }
    }

    /// Attaches the owning collection's bus.
    ///
    /// The bus stays attached after removal so listeners keep receiving
    /// events from former members.
    pub(crate) fn attach_bus(&self, bus: EventBus) {
        *self.inner.bus.write() = Some(bus);
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Record {}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("handle", &self.inner.handle)
            .field("fields", &*self.inner.fields.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Record {
        Record::new(Value::from(serde_json::json!({"id": 1, "name": "Ada"})))
    }

    #[test]
    fn unset_removes_the_field_and_returns_it() {
        let record = user();
        assert_eq!(record.unset("name"), Some(Value::Text("Ada".into())));
        assert_eq!(record.get("name"), Value::Undefined);
        assert_eq!(record.unset("name"), None);
    }

    #[test]
    fn clones_share_fields() {
        let record = user();
        let alias = record.clone();

        alias.set("name", Value::Text("Grace".into()));
        assert_eq!(record.get("name"), Value::Text("Grace".into()));
    }

    #[test]
    fn equality_is_identity() {
        let record = user();
        let alias = record.clone();
        let twin = Record::new(record.snapshot());

        assert_eq!(record, alias);
        assert_ne!(record, twin);
    }

    #[test]
    fn key_falls_back_to_handle() {
        let unsaved = Record::new(Value::from(serde_json::json!({"name": "Ada"})));
        assert!(matches!(unsaved.key("id"), RecordKey::Handle(_)));

        let saved = user();
        assert_eq!(saved.key("id"), RecordKey::Id(Value::Number(1.0)));
    }

    #[test]
    fn set_emits_field_change_through_bus() {
        let record = user();
        let bus = EventBus::new();
        let sub = bus.subscribe();
        record.attach_bus(bus);

        record.set("name", Value::Text("Grace".into()));
        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::FieldChange);
        assert_eq!(event.field.as_deref(), Some("name"));
        assert_eq!(event.record, record);
    }

    #[test]
    fn set_same_value_is_silent() {
        let record = user();
        let bus = EventBus::new();
        let sub = bus.subscribe();
        record.attach_bus(bus);

        record.set("name", Value::Text("Ada".into()));
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn merge_emits_per_written_field() {
        let record = user();
        let bus = EventBus::new();
        let sub = bus.subscribe();
        record.attach_bus(bus);

        let written = record.merge(&Value::from(
            serde_json::json!({"name": "Ada", "age": 36}),
        ));
        assert_eq!(written.len(), 1); // only "age" changed

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field.as_deref(), Some("age"));
    }

    #[test]
    fn non_map_props_become_empty_record() {
        let record = Record::new(Value::Number(5.0));
        assert_eq!(record.snapshot(), Value::map(vec![]));
    }
}
