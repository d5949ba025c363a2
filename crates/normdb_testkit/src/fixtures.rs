//! Test fixtures and store helpers.
//!
//! Provides a pre-wired store with the user / organization / comment /
//! profile entity graph used across the integration tests, plus
//! payload builders for those entity types.

use normdb_adapter::{Adapter, MemoryAdapter};
use normdb_core::{
    FieldDef, FieldKind, Mapper, Relation, Schema, Store, StoreConfig,
};
use normdb_value::Value;
use std::sync::Arc;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A test store backed by a [`MemoryAdapter`].
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The backing adapter, kept for seeding and call counting.
    pub adapter: Arc<MemoryAdapter>,
}

impl TestStore {
    /// Creates a store with the standard entity graph registered:
    ///
    /// - `user` belongs to an `organization`, has many `comment`s, and
    ///   has one `profile`
    /// - `organization` has many `user`s
    /// - `comment` and `profile` each belong to a `user`
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Same graph, custom store configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        init_tracing();
        let adapter = Arc::new(MemoryAdapter::new());
        let store = Store::new(config);
        store.register_adapter("memory", Arc::clone(&adapter) as Arc<dyn Adapter>, true);

        store.register_mapper(
            Mapper::new("user")
                .relation(Relation::belongs_to(
                    "organization",
                    "organization",
                    "organizationId",
                ))
                .relation(Relation::has_many("comment", "comments", "userId"))
                .relation(Relation::has_one("profile", "profile", "userId"))
                .schema(
                    Schema::new()
                        .field(FieldDef::new("name", FieldKind::Text).required())
                        .field(FieldDef::new("age", FieldKind::Number))
                        .field(FieldDef::new("role", FieldKind::Text).default_value("member")),
                ),
        );
        store.register_mapper(
            Mapper::new("organization")
                .relation(Relation::has_many("user", "users", "organizationId")),
        );
        store.register_mapper(
            Mapper::new("comment").relation(Relation::belongs_to("user", "user", "userId")),
        );
        store.register_mapper(
            Mapper::new("profile").relation(Relation::belongs_to("user", "user", "userId")),
        );

        Self { store, adapter }
    }

    /// Seeds the backing adapter with a standard set of users.
    pub fn seed_users(&self) {
        self.adapter.seed(
            "user",
            vec![
                user(1, "Ada", 36, "admin"),
                user(2, "Adam", 28, "dev"),
                user(3, "Grace", 45, "admin"),
                user(4, "Linus", 19, "dev"),
                user(5, "Barbara", 52, "dev"),
            ],
        );
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Builds a user payload.
pub fn user(id: i64, name: &str, age: i64, role: &str) -> Value {
    Value::from(serde_json::json!({
        "id": id,
        "name": name,
        "age": age,
        "role": role,
    }))
}

/// Builds a comment payload.
pub fn comment(id: i64, user_id: i64, text: &str) -> Value {
    Value::from(serde_json::json!({
        "id": id,
        "userId": user_id,
        "text": text,
    }))
}

/// Builds an organization payload.
pub fn organization(id: i64, name: &str) -> Value {
    Value::from(serde_json::json!({
        "id": id,
        "name": name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use normdb_core::FetchOpts;

    #[tokio::test]
    async fn entity_graph_is_wired() {
        let test = TestStore::new();
        test.seed_users();

        let users = test
            .find_all(
                "user",
                &Value::from(serde_json::json!({})),
                &FetchOpts::default(),
            )
            .await
            .unwrap();
        assert_eq!(users.len(), 5);

        // Relations registered on the linked collection.
        let linked = test.collection("user").unwrap();
        assert_eq!(linked.relations().len(), 3);
    }

    #[test]
    fn cache_only_add_applies_relations() {
        let test = TestStore::new();
        let record = test
            .add(
                "user",
                Value::from(serde_json::json!({
                    "id": 1,
                    "name": "Ada",
                    "comments": [{"id": 100, "text": "hello"}]
                })),
            )
            .unwrap();

        assert_eq!(record.get("comments"), Value::Undefined);
        assert_eq!(test.collection("comment").unwrap().len(), 1);
    }
}
