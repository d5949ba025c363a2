//! Cross-crate integration helpers and end-to-end scenarios.

use async_trait::async_trait;
use normdb_adapter::{
    Adapter, AdapterOpts, AdapterResponse, AdapterResult, EntityDef, MemoryAdapter,
};
use normdb_value::Value;
use std::sync::Arc;
use std::time::Duration;

/// An adapter that delays reads before delegating to a
/// [`MemoryAdapter`], for exercising in-flight read de-duplication.
pub struct SlowAdapter {
    inner: Arc<MemoryAdapter>,
    delay: Duration,
}

impl SlowAdapter {
    /// Wraps a memory adapter with a fixed read delay.
    pub fn new(inner: Arc<MemoryAdapter>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Adapter for SlowAdapter {
    async fn find(
        &self,
        entity: &EntityDef,
        id: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        tokio::time::sleep(self.delay).await;
        self.inner.find(entity, id, opts).await
    }

    async fn find_all(
        &self,
        entity: &EntityDef,
        query: Value,
        opts: AdapterOpts,
    ) -> AdapterResult<AdapterResponse> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_all(entity, query, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{comment, organization, user, TestStore};
    use normdb_core::{
        BetweenOpts, FetchOpts, KeyTuple, Mapper, RemoveOpts, Store, StoreConfig,
    };
    use normdb_value::Value;

    fn json(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    fn names(records: &[normdb_core::Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.get("name").as_text().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn age_index_serves_exact_and_range_lookups() {
        let test = TestStore::new();
        test.seed_users();
        test.find_all("user", &json(serde_json::json!({})), &FetchOpts::default())
            .await
            .unwrap();

        let users = test.collection("user").unwrap();
        users.create_index("byAge", vec!["age".into()]);

        let exact = users
            .get_all(&[KeyTuple::single(28)], Some("byAge"))
            .unwrap();
        assert_eq!(names(&exact), vec!["Adam"]);

        let range = users
            .between(
                Value::Number(19.0),
                Value::Number(45.0),
                BetweenOpts {
                    left_inclusive: true,
                    right_inclusive: true,
                },
                Some("byAge"),
            )
            .unwrap();
        assert_eq!(names(&range), vec!["Linus", "Adam", "Ada", "Grace"]);
    }

    #[tokio::test]
    async fn paging_with_order_skip_and_limit() {
        let test = TestStore::new();
        test.seed_users();
        test.find_all("user", &json(serde_json::json!({})), &FetchOpts::default())
            .await
            .unwrap();

        let page = test
            .filter(
                "user",
                &json(serde_json::json!({
                    "orderBy": "age",
                    "skip": 1,
                    "limit": 2
                })),
            )
            .unwrap();
        assert_eq!(names(&page), vec!["Adam", "Ada"]);
    }

    #[tokio::test]
    async fn like_pattern_matches_prefix() {
        let test = TestStore::new();
        test.seed_users();
        test.find_all("user", &json(serde_json::json!({})), &FetchOpts::default())
            .await
            .unwrap();

        let matched = test
            .filter(
                "user",
                &json(serde_json::json!({"where": {"name": {"like": "Ada%"}}})),
            )
            .unwrap();
        assert_eq!(names(&matched), vec!["Ada", "Adam"]);

        let negated = test
            .filter(
                "user",
                &json(serde_json::json!({"where": {"name": {"notLike": "Ada%"}}})),
            )
            .unwrap();
        assert_eq!(negated.len(), 3);
    }

    #[tokio::test]
    async fn remove_with_detaches_and_cascades() {
        let test = TestStore::new();
        test.add("organization", organization(10, "Initech")).unwrap();
        let added = test
            .add(
                "user",
                json(serde_json::json!({
                    "id": 1,
                    "name": "Ada",
                    "organizationId": 10,
                    "comments": [
                        {"id": 100, "text": "a"},
                        {"id": 101, "text": "b"},
                        {"id": 102, "text": "c"}
                    ]
                })),
            )
            .unwrap();

        let users = test.collection("user").unwrap();
        let removed = users
            .remove(
                test.registry(),
                &Value::Number(1.0),
                &RemoveOpts::with(["organization", "comments"]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(removed, added);

        // Comments stay, with their link field nulled out.
        let comments = test.collection("comment").unwrap();
        assert_eq!(comments.len(), 3);
        for record in comments.records_in_order(None).unwrap() {
            assert_eq!(record.get("userId"), Value::Null);
        }

        // The organization cascaded out, and the removed user carries
        // detached snapshots of both relations.
        assert!(test.collection("organization").unwrap().is_empty());
        assert_eq!(
            removed.get("organization").get("name"),
            Some(&Value::Text("Initech".into()))
        );
        assert_eq!(
            removed.get("comments").as_array().map(<[Value]>::len),
            Some(3)
        );
    }

    #[tokio::test]
    async fn concurrent_identical_find_all_hits_adapter_once() {
        let memory = Arc::new(MemoryAdapter::new());
        memory.seed(
            "user",
            vec![user(1, "Ada", 36, "admin"), user(2, "Grace", 45, "admin")],
        );
        let slow = Arc::new(SlowAdapter::new(
            Arc::clone(&memory),
            Duration::from_millis(20),
        ));

        let store = Store::new(StoreConfig::default());
        store.register_adapter("slow", slow as Arc<dyn Adapter>, true);
        store.register_mapper(Mapper::new("user"));

        let query = json(serde_json::json!({"role": "admin"}));
        let opts = FetchOpts::default();
        let (first, second) = tokio::join!(
            store.find_all("user", &query, &opts),
            store.find_all("user", &query, &opts),
        );

        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(memory.find_all_calls(), 1);
    }

    #[tokio::test]
    async fn dedup_can_be_disabled() {
        let memory = Arc::new(MemoryAdapter::new());
        memory.seed("user", vec![user(1, "Ada", 36, "admin")]);
        let slow = Arc::new(SlowAdapter::new(
            Arc::clone(&memory),
            Duration::from_millis(5),
        ));

        let store = Store::new(StoreConfig::default().dedup_finds(false));
        store.register_adapter("slow", slow as Arc<dyn Adapter>, true);
        store.register_mapper(Mapper::new("user"));

        let query = json(serde_json::json!({}));
        let opts = FetchOpts::default();
        let (first, second) = tokio::join!(
            store.find_all("user", &query, &opts),
            store.find_all("user", &query, &opts),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(memory.find_all_calls(), 2);
    }

    #[tokio::test]
    async fn link_views_stay_consistent_through_backend_round_trips() {
        let test = TestStore::new();
        test.adapter.seed("user", vec![user(1, "Ada", 36, "admin")]);
        test.adapter.seed(
            "comment",
            vec![comment(100, 1, "first"), comment(101, 1, "second")],
        );

        let ada = test
            .find("user", &Value::Number(1.0), &FetchOpts::default())
            .await
            .unwrap();
        test.find_all("comment", &json(serde_json::json!({})), &FetchOpts::default())
            .await
            .unwrap();

        let users = test.collection("user").unwrap();
        let linked = users.related_to(test.registry(), &ada, "comments").unwrap();
        assert_eq!(linked.len(), 2);

        // Repointing a comment through its handle moves it between
        // link views with no re-fetch.
        linked[0].set("userId", Value::Number(2.0));
        let remaining = users.related_to(test.registry(), &ada, "comments").unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn identical_queries_are_idempotent_on_the_cache() {
        let test = TestStore::new();
        test.seed_users();

        let query = json(serde_json::json!({"role": "dev"}));
        let first = test
            .find_all("user", &query, &FetchOpts::default())
            .await
            .unwrap();
        let second = test
            .find_all("user", &query, &FetchOpts::default())
            .await
            .unwrap();

        // Same records by identity, and no duplicates entered the cache.
        assert_eq!(first, second);
        assert_eq!(test.collection("user").unwrap().len(), 3);
        assert_eq!(test.adapter.find_all_calls(), 1);
    }
}
