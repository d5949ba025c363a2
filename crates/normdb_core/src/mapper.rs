//! Entity type definitions and adapter-facing CRUD.
//!
//! A [`Mapper`] describes one entity type: its name, id field,
//! relations, and optional schema. Its async methods drive a backend
//! [`Adapter`] and hand back the response envelope; they never touch
//! the in-memory collections. The store composes the two.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::relation::Relation;
use crate::schema::Schema;
use normdb_adapter::{Adapter, AdapterOpts, AdapterResponse, EntityDef};
use normdb_value::Value;
use tracing::debug;

/// Definition of one entity type.
#[derive(Clone)]
pub struct Mapper {
    name: String,
    id_field: String,
    relations: Vec<Relation>,
    schema: Option<Schema>,
    default_adapter: Option<String>,
}

impl Mapper {
    /// Creates a mapper with the default `"id"` id field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: "id".into(),
            relations: Vec::new(),
            schema: None,
            default_adapter: None,
        }
    }

    /// Sets the identifying field.
    #[must_use]
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Adds a relation to another entity type.
    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Attaches a schema enforced on create.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Pins this entity type to a named adapter instead of the store
    /// default.
    #[must_use]
    pub fn default_adapter(mut self, name: impl Into<String>) -> Self {
        self.default_adapter = Some(name.into());
        self
    }

    /// The entity type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identifying field name.
    #[must_use]
    pub fn id_field_name(&self) -> &str {
        &self.id_field
    }

    /// The relation descriptors.
    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// The pinned adapter name, if any.
    #[must_use]
    pub fn adapter_name(&self) -> Option<&str> {
        self.default_adapter.as_deref()
    }

    /// The slice of this definition adapters act on.
    #[must_use]
    pub fn entity_def(&self) -> EntityDef {
        EntityDef::new(self.name.clone(), self.id_field.clone())
    }

    /// Checks a property map against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] carrying every violation.
    pub fn validate(&self, props: &Value) -> CoreResult<()> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };
        let violations = schema.check(props);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CoreError::validation(violations))
        }
    }

    /// Builds a detached record: defaults applied, schema checked.
    ///
    /// The record belongs to no collection until added to one.
    pub fn create_record(&self, props: Value) -> CoreResult<Record> {
        let mut props = props;
        if let Some(schema) = &self.schema {
            schema.apply_defaults(&mut props);
        }
        self.validate(&props)?;
        Ok(Record::new(props))
    }

    fn finish(
        &self,
        response: AdapterResponse,
        adapter_name: &str,
        opts: AdapterOpts,
    ) -> AdapterResponse {
        if opts.raw {
            response.from_adapter(adapter_name)
        } else {
            response
        }
    }

    /// Creates one record through the adapter.
    ///
    /// Validation failures surface before the adapter is called.
    pub async fn create(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        props: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let mut props = props;
        if let Some(schema) = &self.schema {
            schema.apply_defaults(&mut props);
        }
        self.validate(&props)?;
        debug!(entity = %self.name, adapter = adapter_name, "create");
        let response = adapter.create(&self.entity_def(), props, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Creates several records through the adapter.
    pub async fn create_many(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        records: Vec<Value>,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let mut prepared = Vec::with_capacity(records.len());
        for mut props in records {
            if let Some(schema) = &self.schema {
                schema.apply_defaults(&mut props);
            }
            self.validate(&props)?;
            prepared.push(props);
        }
        let response = adapter
            .create_many(&self.entity_def(), prepared, opts)
            .await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Finds one record by id through the adapter.
    pub async fn find(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        id: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        debug!(entity = %self.name, adapter = adapter_name, "find");
        let response = adapter.find(&self.entity_def(), id, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Finds all records matching a query through the adapter.
    pub async fn find_all(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        query: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        debug!(entity = %self.name, adapter = adapter_name, "findAll");
        let response = adapter.find_all(&self.entity_def(), query, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Updates one record by id through the adapter.
    ///
    /// Partial updates are not schema-checked; the authoritative record
    /// lives behind the adapter.
    pub async fn update(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        id: Value,
        props: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let response = adapter.update(&self.entity_def(), id, props, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Updates several records through the adapter.
    pub async fn update_many(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        records: Vec<Value>,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let response = adapter
            .update_many(&self.entity_def(), records, opts)
            .await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Updates every matching record through the adapter.
    pub async fn update_all(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        props: Value,
        query: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let response = adapter
            .update_all(&self.entity_def(), props, query, opts)
            .await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Destroys one record by id through the adapter.
    pub async fn destroy(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        id: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        debug!(entity = %self.name, adapter = adapter_name, "destroy");
        let response = adapter.destroy(&self.entity_def(), id, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Destroys every matching record through the adapter.
    pub async fn destroy_all(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        query: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let response = adapter.destroy_all(&self.entity_def(), query, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Counts matching records through the adapter.
    pub async fn count(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        query: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let response = adapter.count(&self.entity_def(), query, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }

    /// Sums a numeric field over matching records through the adapter.
    pub async fn sum(
        &self,
        adapter: &dyn Adapter,
        adapter_name: &str,
        field: &str,
        query: Value,
        opts: AdapterOpts,
    ) -> CoreResult<AdapterResponse> {
        let response = adapter.sum(&self.entity_def(), field, query, opts).await?;
        Ok(self.finish(response, adapter_name, opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldKind, Schema};
    use normdb_adapter::MemoryAdapter;

    fn user_mapper() -> Mapper {
        Mapper::new("user").schema(
            Schema::new()
                .field(FieldDef::new("name", FieldKind::Text).required())
                .field(FieldDef::new("role", FieldKind::Text).default_value("member")),
        )
    }

    #[test]
    fn create_record_applies_defaults_and_validates() {
        let mapper = user_mapper();
        let record = mapper
            .create_record(Value::from(serde_json::json!({"name": "Ada"})))
            .unwrap();
        assert_eq!(record.get("role"), Value::Text("member".into()));

        let result = mapper.create_record(Value::from(serde_json::json!({"role": "admin"})));
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn create_validates_before_calling_adapter() {
        let mapper = user_mapper();
        let adapter = MemoryAdapter::new();

        let result = mapper
            .create(
                &adapter,
                "memory",
                Value::from(serde_json::json!({"age": 3})),
                AdapterOpts::default(),
            )
            .await;
        assert!(matches!(result, Err(CoreError::Validation { .. })));
        assert!(adapter.table("user").is_empty());
    }

    #[tokio::test]
    async fn raw_responses_are_stamped_with_adapter_name() {
        let mapper = user_mapper();
        let adapter = MemoryAdapter::new();

        let response = mapper
            .create(
                &adapter,
                "memory",
                Value::from(serde_json::json!({"name": "Ada"})),
                AdapterOpts::raw(),
            )
            .await
            .unwrap();
        assert_eq!(response.adapter.as_deref(), Some("memory"));

        let response = mapper
            .find(
                &adapter,
                "memory",
                response.data.get("id").cloned().unwrap(),
                AdapterOpts::default(),
            )
            .await
            .unwrap();
        assert_eq!(response.adapter, None);
    }
}
