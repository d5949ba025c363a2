//! Relation-aware collections.
//!
//! A [`LinkedCollection`] wraps a [`Collection`] with the relation
//! descriptors of its entity type. Adding a payload splits nested
//! related data out into the proper sibling collections and writes the
//! foreign keys that connect them; link views are resolved on demand
//! from those keys. Sibling collections are reached through a shared
//! [`CollectionRegistry`].

use crate::collection::Collection;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::relation::{ManyKeying, Relation, RelationKind};
use normdb_value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// Options for relation-aware removal.
#[derive(Debug, Clone, Default)]
pub struct RemoveOpts {
    /// Relations (by related type name or local field) to detach into
    /// the removed record and, for belongs-to parents, cascade-remove.
    pub with: Vec<String>,
}

impl RemoveOpts {
    /// Removal with detached relation snapshots.
    pub fn with(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            with: names.into_iter().map(Into::into).collect(),
        }
    }

    fn names(&self, relation: &Relation) -> bool {
        self.with
            .iter()
            .any(|name| name == &relation.related || name == &relation.local_field)
    }
}

/// The linked collections of a store, by entity type name.
#[derive(Default)]
pub struct CollectionRegistry {
    entries: RwLock<HashMap<String, Arc<LinkedCollection>>>,
}

impl CollectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a linked collection under its entity type name.
    pub fn register(&self, linked: LinkedCollection) -> Arc<LinkedCollection> {
        let linked = Arc::new(linked);
        self.entries
            .write()
            .insert(linked.name().to_string(), Arc::clone(&linked));
        linked
    }

    /// Looks up a linked collection.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<LinkedCollection>> {
        self.entries.read().get(name).cloned()
    }

    /// Registered entity type names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

/// A collection plus the relations of its entity type.
///
/// Derefs to the wrapped [`Collection`] for plain operations (`get`,
/// `query`, `subscribe`, index management). The relation-aware
/// operations take the registry so they can reach sibling collections.
pub struct LinkedCollection {
    collection: Collection,
    relations: Vec<Relation>,
}

impl Deref for LinkedCollection {
    type Target = Collection;

    fn deref(&self) -> &Collection {
        &self.collection
    }
}

impl LinkedCollection {
    /// Wraps a collection with relation descriptors.
    pub fn new(collection: Collection, relations: Vec<Relation>) -> Self {
        Self {
            collection,
            relations,
        }
    }

    /// The wrapped collection.
    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The relation descriptors.
    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Adds a payload, splitting nested related data into sibling
    /// collections and writing foreign keys both ways.
    ///
    /// Nested payloads recurse: a user payload carrying comments which
    /// carry approvals lands records in three collections.
    pub fn add(&self, registry: &CollectionRegistry, payload: Value) -> CoreResult<Record> {
        let mut props = payload;
        let mut nested: Vec<(Relation, Value)> = Vec::new();
        if let Value::Map(_) = props {
            for relation in &self.relations {
                if !relation.auto_add {
                    continue;
                }
                let Some(value) = props.get(&relation.local_field) else {
                    continue;
                };
                // Only structured payloads detach; scalar foreign key
                // values in the link field are left to the record.
                if matches!(value, Value::Map(_) | Value::Array(_)) {
                    nested.push((relation.clone(), value.clone()));
                }
            }
            for (relation, _) in &nested {
                props.remove(&relation.local_field);
            }
        }

        let record = self.collection.add(props)?;
        for (relation, value) in nested {
            self.link_nested(registry, &record, &relation, value)?;
        }
        Ok(record)
    }

    /// Adds several payloads.
    pub fn add_many(
        &self,
        registry: &CollectionRegistry,
        payloads: Vec<Value>,
    ) -> CoreResult<Vec<Record>> {
        payloads
            .into_iter()
            .map(|payload| self.add(registry, payload))
            .collect()
    }

    fn related(&self, registry: &CollectionRegistry, relation: &Relation) -> CoreResult<Arc<LinkedCollection>> {
        registry
            .get(&relation.related)
            .ok_or_else(|| CoreError::collection_not_found(&relation.related))
    }

    fn link_nested(
        &self,
        registry: &CollectionRegistry,
        record: &Record,
        relation: &Relation,
        value: Value,
    ) -> CoreResult<()> {
        if let Some(hook) = &relation.on_add {
            return hook(registry, record, value);
        }
        let related = self.related(registry, relation)?;
        let own_id = record.get(self.collection.id_field());
        debug!(
            collection = %self.name(),
            related = %relation.related,
            field = %relation.local_field,
            "linking nested payload"
        );

        match relation.kind {
            RelationKind::BelongsTo => {
                let parent = related.add(registry, value)?;
                if let Some(fk) = &relation.foreign_key {
                    record.set(fk, parent.get(related.id_field()));
                    self.collection.update_indexes(record);
                }
            }
            RelationKind::HasOne => {
                let child = related.add(registry, value)?;
                if let Some(fk) = &relation.foreign_key {
                    child.set(fk, own_id);
                    related.collection.update_indexes(&child);
                }
            }
            RelationKind::HasMany => {
                let items = match value {
                    Value::Array(items) => items,
                    single => vec![single],
                };
                let children = related.add_many(registry, items)?;
                match &relation.many {
                    Some(ManyKeying::ForeignKey(fk)) => {
                        for child in &children {
                            child.set(fk, own_id.clone());
                            related.collection.update_indexes(child);
                        }
                    }
                    Some(ManyKeying::LocalKeys(local_keys)) => {
                        let ids = children
                            .iter()
                            .map(|child| child.get(related.id_field()))
                            .collect();
                        record.set(local_keys, Value::Array(ids));
                        self.collection.update_indexes(record);
                    }
                    Some(ManyKeying::ForeignKeys(foreign_keys)) => {
                        for child in &children {
                            let mut parents =
                                child.get(foreign_keys).as_array().unwrap_or(&[]).to_vec();
                            if !parents.contains(&own_id) {
                                parents.push(own_id.clone());
                                child.set(foreign_keys, Value::Array(parents));
                                related.collection.update_indexes(child);
                            }
                        }
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    /// Resolves the link view for one relation, from current foreign
    /// key values.
    pub fn related_to(
        &self,
        registry: &CollectionRegistry,
        record: &Record,
        local_field: &str,
    ) -> CoreResult<Vec<Record>> {
        let relation = self
            .relations
            .iter()
            .find(|relation| relation.local_field == local_field)
            .ok_or_else(|| {
                CoreError::illegal_argument(format!("no relation on field {local_field}"))
            })?;
        self.resolve(registry, record, relation)
    }

    fn resolve(
        &self,
        registry: &CollectionRegistry,
        record: &Record,
        relation: &Relation,
    ) -> CoreResult<Vec<Record>> {
        let related = self.related(registry, relation)?;
        let own_id = record.get(self.collection.id_field());

        let records = match relation.kind {
            RelationKind::BelongsTo => {
                let fk = relation.foreign_key.as_deref().unwrap_or_default();
                let parent_id = record.get(fk);
                if parent_id.is_nullish() {
                    Vec::new()
                } else {
                    related.get(&parent_id).into_iter().collect()
                }
            }
            RelationKind::HasOne => {
                let fk = relation.foreign_key.as_deref().unwrap_or_default();
                let mut matches = self.scan_related(&related, fk, &own_id)?;
                matches.truncate(1);
                matches
            }
            RelationKind::HasMany => match &relation.many {
                Some(ManyKeying::ForeignKey(fk)) => self.scan_related(&related, fk, &own_id)?,
                Some(ManyKeying::LocalKeys(local_keys)) => {
                    let ids = record.get(local_keys);
                    let ids = ids.as_array().unwrap_or(&[]);
                    ids.iter().filter_map(|id| related.get(id)).collect()
                }
                Some(ManyKeying::ForeignKeys(foreign_keys)) => related
                    .records_in_order(None)?
                    .into_iter()
                    .filter(|child| {
                        child
                            .get(foreign_keys)
                            .as_array()
                            .is_some_and(|parents| parents.contains(&own_id))
                    })
                    .collect(),
                None => Vec::new(),
            },
        };
        Ok(records)
    }

    fn scan_related(
        &self,
        related: &LinkedCollection,
        foreign_key: &str,
        own_id: &Value,
    ) -> CoreResult<Vec<Record>> {
        if own_id.is_nullish() {
            return Ok(Vec::new());
        }
        Ok(related
            .records_in_order(None)?
            .into_iter()
            .filter(|child| child.get(foreign_key).loose_eq(own_id))
            .collect())
    }

    /// Removes a record by identity, unlinking its relations.
    ///
    /// Foreign keys on still-present children are nulled out so nothing
    /// keeps pointing at the removed record. For relations named in
    /// `opts.with`, the removed record is additionally populated with a
    /// snapshot of the related data, and belongs-to parents are
    /// cascade-removed from their own collection.
    pub fn remove(
        &self,
        registry: &CollectionRegistry,
        id: &Value,
        opts: &RemoveOpts,
    ) -> CoreResult<Option<Record>> {
        let Some(record) = self.collection.get(id) else {
            return Ok(None);
        };

        let mut resolved = Vec::with_capacity(self.relations.len());
        for relation in &self.relations {
            let related_records = self.resolve(registry, &record, relation)?;
            resolved.push((relation.clone(), related_records));
        }

        self.collection.remove(id);

        for (relation, related_records) in resolved {
            if related_records.is_empty() {
                continue;
            }
            let related = self.related(registry, &relation)?;
            let wanted = opts.names(&relation);

            if wanted {
                let snapshot = match relation.kind {
                    RelationKind::HasMany => Value::Array(
                        related_records.iter().map(Record::snapshot).collect(),
                    ),
                    _ => related_records[0].snapshot(),
                };
                record.set(&relation.local_field, snapshot);
            }

            match relation.kind {
                RelationKind::BelongsTo => {
                    if wanted {
                        for parent in &related_records {
                            let parent_id = parent.get(related.id_field());
                            related.remove(registry, &parent_id, &RemoveOpts::default())?;
                        }
                    }
                }
                RelationKind::HasOne => {
                    if let Some(fk) = &relation.foreign_key {
                        for child in &related_records {
                            child.set(fk, Value::Null);
                            related.collection.update_indexes(child);
                        }
                    }
                }
                RelationKind::HasMany => match &relation.many {
                    Some(ManyKeying::ForeignKey(fk)) => {
                        for child in &related_records {
                            child.set(fk, Value::Null);
                            related.collection.update_indexes(child);
                        }
                    }
                    Some(ManyKeying::ForeignKeys(foreign_keys)) => {
                        let own_id = record.get(self.collection.id_field());
                        for child in &related_records {
                            let parents: Vec<Value> = child
                                .get(foreign_keys)
                                .as_array()
                                .unwrap_or(&[])
                                .iter()
                                .filter(|parent| !(*parent).loose_eq(&own_id))
                                .cloned()
                                .collect();
                            child.set(foreign_keys, Value::Array(parents));
                            related.collection.update_indexes(child);
                        }
                    }
                    // The id array lived on the removed record itself.
                    Some(ManyKeying::LocalKeys(_)) | None => {}
                },
            }
        }
        Ok(Some(record))
    }

    /// Removes every record matching a filter, unlinking each.
    pub fn remove_all(
        &self,
        registry: &CollectionRegistry,
        query: &Value,
        opts: &RemoveOpts,
    ) -> CoreResult<Vec<Record>> {
        let matched = self.collection.filter(query)?;
        let mut removed = Vec::with_capacity(matched.len());
        for record in matched {
            let id = record.get(self.collection.id_field());
            if id.is_nullish() {
                self.collection.remove_record(&record);
                removed.push(record);
            } else if let Some(record) = self.remove(registry, &id, opts)? {
                removed.push(record);
            }
        }
        Ok(removed)
    }
}
