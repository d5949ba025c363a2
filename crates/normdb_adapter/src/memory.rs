//! In-memory adapter for testing.

use crate::adapter::{Adapter, AdapterOpts, EntityDef};
use crate::error::{AdapterError, AdapterResult};
use crate::response::AdapterResponse;
use async_trait::async_trait;
use normdb_value::{merge_into, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tracing::trace;

/// A HashMap-backed adapter.
///
/// This adapter keeps one table of record maps per entity type and is
/// suitable for:
/// - Unit tests
/// - Integration tests
/// - Prototyping without a real backend
///
/// Records created without an id are assigned sequential integer ids.
/// `find_all` supports equality filtering on top-level fields (a plain
/// `{field: value}` query or a `where` sub-object of the same shape);
/// anything fancier belongs in the core query engine, not here.
///
/// # Thread Safety
///
/// The adapter is thread-safe and can be shared across tasks.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    next_id: AtomicI64,
    find_all_calls: AtomicUsize,
}

impl MemoryAdapter {
    /// Creates a new empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            find_all_calls: AtomicUsize::new(0),
        }
    }

    /// Pre-seeds a table with record maps.
    ///
    /// Useful for testing find paths without going through create.
    pub fn seed(&self, entity: &str, records: Vec<Value>) {
        self.tables
            .write()
            .entry(entity.to_string())
            .or_default()
            .extend(records);
    }

    /// Returns a copy of an entity's table.
    #[must_use]
    pub fn table(&self, entity: &str) -> Vec<Value> {
        self.tables.read().get(entity).cloned().unwrap_or_default()
    }

    /// Number of `find_all` invocations so far.
    ///
    /// Lets tests assert that request de-duplication collapsed calls.
    #[must_use]
    pub fn find_all_calls(&self) -> usize {
        self.find_all_calls.load(Ordering::SeqCst)
    }

    fn assign_id(&self, entity: &EntityDef, props: &mut Value) {
        let missing = props
            .get(&entity.id_field)
            .map_or(true, Value::is_nullish);
        if missing {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            props.set(&entity.id_field, Value::Number(id as f64));
        }
    }

    fn matches(query: &Value, record: &Value) -> bool {
        // Unwrap a `where` sub-object if present.
        let criteria = query.get("where").unwrap_or(query);
        let Some(entries) = criteria.as_map() else {
            return true;
        };

        entries.iter().all(|(field, expected)| {
            // Only plain scalar equality is understood here.
            if expected.as_map().is_some() {
                return true;
            }
            record
                .get(field)
                .unwrap_or(&Value::Undefined)
                .loose_eq(expected)
        })
    }

    fn position_of(table: &[Value], entity: &EntityDef, id: &Value) -> Option<usize> {
        table.iter().position(|record| {
            record
                .get(&entity.id_field)
                .is_some_and(|stored| stored.loose_eq(id))
        })
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create(
        &self,
        entity: &EntityDef,
        mut props: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        self.assign_id(entity, &mut props);
        trace!(entity = %entity.name, "memory create");
        let mut tables = self.tables.write();
        tables
            .entry(entity.name.clone())
            .or_default()
            .push(props.clone());
        Ok(AdapterResponse::new(props))
    }

    async fn create_many(
        &self,
        entity: &EntityDef,
        records: Vec<Value>,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let mut stored = Vec::with_capacity(records.len());
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name.clone()).or_default();
        for mut props in records {
            self.assign_id(entity, &mut props);
            table.push(props.clone());
            stored.push(props);
        }
        Ok(AdapterResponse::new(Value::Array(stored)))
    }

    async fn find(
        &self,
        entity: &EntityDef,
        id: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let tables = self.tables.read();
        let table = tables.get(&entity.name).map_or(&[][..], Vec::as_slice);
        match Self::position_of(table, entity, &id) {
            Some(pos) => Ok(AdapterResponse::new(table[pos].clone())),
            None => Err(AdapterError::not_found(&entity.name, format!("{id:?}"))),
        }
    }

    async fn find_all(
        &self,
        entity: &EntityDef,
        query: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        self.find_all_calls.fetch_add(1, Ordering::SeqCst);
        trace!(entity = %entity.name, "memory findAll");
        let tables = self.tables.read();
        let table = tables.get(&entity.name).map_or(&[][..], Vec::as_slice);
        let matched: Vec<Value> = table
            .iter()
            .filter(|record| Self::matches(&query, record))
            .cloned()
            .collect();
        Ok(AdapterResponse::new(Value::Array(matched)))
    }

    async fn update(
        &self,
        entity: &EntityDef,
        id: Value,
        props: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name.clone()).or_default();
        match Self::position_of(table, entity, &id) {
            Some(pos) => {
                merge_into(&mut table[pos], &props);
                Ok(AdapterResponse::new(table[pos].clone()))
            }
            None => Err(AdapterError::not_found(&entity.name, format!("{id:?}"))),
        }
    }

    async fn update_many(
        &self,
        entity: &EntityDef,
        records: Vec<Value>,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let mut updated = Vec::with_capacity(records.len());
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name.clone()).or_default();
        for props in records {
            let Some(id) = props.get(&entity.id_field).cloned() else {
                return Err(AdapterError::backend("update_many record missing id"));
            };
            match Self::position_of(table, entity, &id) {
                Some(pos) => {
                    merge_into(&mut table[pos], &props);
                    updated.push(table[pos].clone());
                }
                None => return Err(AdapterError::not_found(&entity.name, format!("{id:?}"))),
            }
        }
        Ok(AdapterResponse::new(Value::Array(updated)))
    }

    async fn update_all(
        &self,
        entity: &EntityDef,
        props: Value,
        query: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name.clone()).or_default();
        let mut updated = Vec::new();
        for record in table.iter_mut() {
            if Self::matches(&query, record) {
                merge_into(record, &props);
                updated.push(record.clone());
            }
        }
        Ok(AdapterResponse::new(Value::Array(updated)))
    }

    async fn destroy(
        &self,
        entity: &EntityDef,
        id: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name.clone()).or_default();
        match Self::position_of(table, entity, &id) {
            Some(pos) => {
                let removed = table.remove(pos);
                Ok(AdapterResponse::new(removed))
            }
            None => Err(AdapterError::not_found(&entity.name, format!("{id:?}"))),
        }
    }

    async fn destroy_all(
        &self,
        entity: &EntityDef,
        query: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let mut tables = self.tables.write();
        let table = tables.entry(entity.name.clone()).or_default();
        let mut removed = Vec::new();
        table.retain(|record| {
            if Self::matches(&query, record) {
                removed.push(record.clone());
                false
            } else {
                true
            }
        });
        Ok(AdapterResponse::new(Value::Array(removed)))
    }

    async fn count(
        &self,
        entity: &EntityDef,
        query: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let tables = self.tables.read();
        let table = tables.get(&entity.name).map_or(&[][..], Vec::as_slice);
        let count = table
            .iter()
            .filter(|record| Self::matches(&query, record))
            .count();
        Ok(AdapterResponse::new(Value::Number(count as f64)))
    }

    async fn sum(
        &self,
        entity: &EntityDef,
        field: &str,
        query: Value,
        _opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let tables = self.tables.read();
        let table = tables.get(&entity.name).map_or(&[][..], Vec::as_slice);
        let total: f64 = table
            .iter()
            .filter(|record| Self::matches(&query, record))
            .filter_map(|record| record.get(field).and_then(Value::as_number))
            .sum();
        Ok(AdapterResponse::new(Value::Number(total)))
    }
}
