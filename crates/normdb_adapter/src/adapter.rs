//! Adapter trait definition.

use crate::error::{AdapterError, AdapterResult};
use crate::response::AdapterResponse;
use async_trait::async_trait;
use normdb_value::Value;

/// The slice of mapper configuration an adapter needs to act on an
/// entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    /// Entity type name (e.g. `"user"`).
    pub name: String,
    /// Name of the identifying field (e.g. `"id"`).
    pub id_field: String,
}

impl EntityDef {
    /// Creates an entity definition.
    pub fn new(name: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: id_field.into(),
        }
    }
}

/// Per-call adapter options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterOpts {
    /// When set, the caller receives the full response envelope instead
    /// of the unwrapped payload.
    pub raw: bool,
}

impl AdapterOpts {
    /// Options requesting the raw envelope.
    #[must_use]
    pub fn raw() -> Self {
        Self { raw: true }
    }
}

/// A backend adapter for NormDB.
///
/// Adapters perform the actual persistence I/O; the core never touches
/// a backend directly. An adapter may implement any subset of the
/// capability set - every method defaults to an
/// [`AdapterError::Unsupported`] response, and the store simply
/// propagates that to the caller.
///
/// # Invariants
///
/// - `create`/`update` resolve to the stored record map, including any
///   backend-assigned fields
/// - `find` resolves to a single record map; a missing id is a
///   `NotFound` error, not an empty payload
/// - `find_all`/`update_all`/`destroy_all` take a query value whose
///   interpretation is adapter-defined
/// - Adapters must be `Send + Sync`; the store shares them across
///   concurrent calls
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Creates one record from a property map.
    async fn create(
        &self,
        entity: &EntityDef,
        props: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, props, opts);
        Err(AdapterError::unsupported("create"))
    }

    /// Creates several records in one call.
    async fn create_many(
        &self,
        entity: &EntityDef,
        records: Vec<Value>,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, records, opts);
        Err(AdapterError::unsupported("create_many"))
    }

    /// Finds one record by id.
    async fn find(
        &self,
        entity: &EntityDef,
        id: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, id, opts);
        Err(AdapterError::unsupported("find"))
    }

    /// Finds all records matching a query.
    async fn find_all(
        &self,
        entity: &EntityDef,
        query: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, query, opts);
        Err(AdapterError::unsupported("find_all"))
    }

    /// Applies a property map to one record by id.
    async fn update(
        &self,
        entity: &EntityDef,
        id: Value,
        props: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, id, props, opts);
        Err(AdapterError::unsupported("update"))
    }

    /// Updates several records, each carrying its own id.
    async fn update_many(
        &self,
        entity: &EntityDef,
        records: Vec<Value>,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, records, opts);
        Err(AdapterError::unsupported("update_many"))
    }

    /// Applies a property map to every record matching a query.
    async fn update_all(
        &self,
        entity: &EntityDef,
        props: Value,
        query: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, props, query, opts);
        Err(AdapterError::unsupported("update_all"))
    }

    /// Removes one record by id.
    async fn destroy(
        &self,
        entity: &EntityDef,
        id: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, id, opts);
        Err(AdapterError::unsupported("destroy"))
    }

    /// Removes every record matching a query.
    async fn destroy_all(
        &self,
        entity: &EntityDef,
        query: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, query, opts);
        Err(AdapterError::unsupported("destroy_all"))
    }

    /// Counts records matching a query.
    async fn count(
        &self,
        entity: &EntityDef,
        query: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, query, opts);
        Err(AdapterError::unsupported("count"))
    }

    /// Sums a numeric field over records matching a query.
    async fn sum(
        &self,
        entity: &EntityDef,
        field: &str,
        query: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        let _ = (entity, field, query, opts);
        Err(AdapterError::unsupported("sum"))
    }
}
