//! The store: mappers, adapters, and linked collections in one place.
//!
//! A [`Store`] owns a registry of [`Mapper`]s, their backing
//! [`LinkedCollection`]s, and the named [`Adapter`]s that persist
//! them. Async CRUD goes mapper to adapter and folds the result into
//! the matching collection on success, so the cache converges on what
//! the backend confirmed.
//!
//! Identical reads are de-duplicated: concurrent equal `find`/
//! `find_all` calls share one in-flight adapter call, and repeats of a
//! completed read are served straight from the collection until forced.

use crate::collection::{Collection, CollectionConfig};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::Subscription;
use crate::index::KeyTuple;
use crate::linked::{CollectionRegistry, LinkedCollection, RemoveOpts};
use crate::mapper::Mapper;
use crate::record::Record;
use normdb_adapter::{Adapter, AdapterError, AdapterOpts};
use normdb_value::{fingerprint, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Options for `find`/`find_all`.
#[derive(Debug, Clone, Default)]
pub struct FetchOpts {
    /// Bypass the completed-read cache and any in-flight call.
    pub force: bool,
}

impl FetchOpts {
    /// Options that force a fresh adapter call.
    #[must_use]
    pub fn force() -> Self {
        Self { force: true }
    }
}

/// Entity name plus query fingerprint.
type CacheKey = (String, String);
type FetchResult = CoreResult<Vec<Record>>;

/// The top-level component tying mappers, adapters, and collections
/// together.
pub struct Store {
    config: StoreConfig,
    adapters: RwLock<HashMap<String, Arc<dyn Adapter>>>,
    default_adapter: RwLock<Option<String>>,
    mappers: RwLock<HashMap<String, Arc<Mapper>>>,
    collections: CollectionRegistry,
    pending: Mutex<HashMap<CacheKey, broadcast::Sender<FetchResult>>>,
    completed: Mutex<HashMap<CacheKey, u64>>,
    clock: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Store {
    /// Creates a store with the given configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            adapters: RwLock::new(HashMap::new()),
            default_adapter: RwLock::new(None),
            mappers: RwLock::new(HashMap::new()),
            collections: CollectionRegistry::new(),
            pending: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    /// Registers a named adapter, optionally as the store default.
    ///
    /// The first registered adapter becomes the default regardless.
    pub fn register_adapter(
        &self,
        name: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        default: bool,
    ) {
        let name = name.into();
        let mut default_slot = self.default_adapter.write();
        if default || default_slot.is_none() {
            *default_slot = Some(name.clone());
        }
        self.adapters.write().insert(name, adapter);
    }

    /// Registers a mapper and creates its linked collection.
    pub fn register_mapper(&self, mapper: Mapper) -> Arc<Mapper> {
        let collection = Collection::new(
            mapper.name(),
            CollectionConfig::default()
                .id_field(mapper.id_field_name())
                .on_conflict(self.config.on_conflict),
        );
        self.collections.register(LinkedCollection::new(
            collection,
            mapper.relations().to_vec(),
        ));
        let mapper = Arc::new(mapper);
        self.mappers
            .write()
            .insert(mapper.name().to_string(), Arc::clone(&mapper));
        mapper
    }

    /// Looks up a registered mapper.
    pub fn mapper(&self, name: &str) -> CoreResult<Arc<Mapper>> {
        self.mappers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::mapper_not_found(name))
    }

    /// Looks up a registered linked collection.
    pub fn collection(&self, name: &str) -> CoreResult<Arc<LinkedCollection>> {
        self.collections
            .get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// The collection registry, for relation-aware calls made directly
    /// on a [`LinkedCollection`].
    #[must_use]
    pub fn registry(&self) -> &CollectionRegistry {
        &self.collections
    }

    fn adapter_for(&self, mapper: &Mapper) -> CoreResult<(String, Arc<dyn Adapter>)> {
        let name = match mapper.adapter_name() {
            Some(name) => name.to_string(),
            None => self
                .default_adapter
                .read()
                .clone()
                .ok_or_else(|| CoreError::adapter_not_found("(default)"))?,
        };
        let adapter = self
            .adapters
            .read()
            .get(&name)
            .cloned()
            .ok_or_else(|| CoreError::adapter_not_found(&name))?;
        Ok((name, adapter))
    }

    // ---- cache-only operations ------------------------------------

    /// Inserts a payload into the entity's collection without touching
    /// any adapter.
    pub fn add(&self, name: &str, payload: Value) -> CoreResult<Record> {
        self.collection(name)?.add(&self.collections, payload)
    }

    /// Inserts several payloads, cache-only.
    pub fn add_many(&self, name: &str, payloads: Vec<Value>) -> CoreResult<Vec<Record>> {
        self.collection(name)?.add_many(&self.collections, payloads)
    }

    /// Looks up a cached record by id.
    pub fn get(&self, name: &str, id: &Value) -> CoreResult<Option<Record>> {
        Ok(self.collection(name)?.get(id))
    }

    /// Looks up cached records under several index keys.
    pub fn get_all(
        &self,
        name: &str,
        keys: &[KeyTuple],
        index: Option<&str>,
    ) -> CoreResult<Vec<Record>> {
        self.collection(name)?.get_all(keys, index)
    }

    /// Runs a declarative filter against the cached records.
    pub fn filter(&self, name: &str, query: &Value) -> CoreResult<Vec<Record>> {
        self.collection(name)?.filter(query)
    }

    /// Cached records that have no identity yet.
    pub fn unsaved(&self, name: &str) -> CoreResult<Vec<Record>> {
        Ok(self.collection(name)?.unsaved())
    }

    /// Removes a cached record and unlinks its relations, without
    /// touching any adapter.
    pub fn remove_cached(
        &self,
        name: &str,
        id: &Value,
        opts: &RemoveOpts,
    ) -> CoreResult<Option<Record>> {
        self.collection(name)?.remove(&self.collections, id, opts)
    }

    /// Subscribes to an entity collection's change events.
    pub fn subscribe(&self, name: &str) -> CoreResult<Subscription> {
        Ok(self.collection(name)?.subscribe())
    }

    // ---- adapter-backed operations --------------------------------

    /// Creates a record through the backend and caches the result.
    pub async fn create(&self, name: &str, props: Value) -> CoreResult<Record> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        let response = mapper
            .create(adapter.as_ref(), &adapter_name, props, AdapterOpts::default())
            .await?;
        self.collection(name)?.add(&self.collections, response.data)
    }

    /// Creates several records through the backend and caches them.
    pub async fn create_many(&self, name: &str, records: Vec<Value>) -> CoreResult<Vec<Record>> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        let response = mapper
            .create_many(adapter.as_ref(), &adapter_name, records, AdapterOpts::default())
            .await?;
        self.insert_array(name, response.data)
    }

    /// Finds one record by id, preferring cached and in-flight results.
    pub async fn find(&self, name: &str, id: &Value, opts: &FetchOpts) -> CoreResult<Record> {
        let mapper = self.mapper(name)?;
        let collection = self.collection(name)?;
        let key = self.cache_key(name, "find", &Value::map(vec![("id".into(), id.clone())]));

        if !opts.force {
            if self.completed.lock().contains_key(&key) {
                if let Some(record) = collection.get(id) {
                    debug!(entity = name, "find served from cache");
                    return Ok(record);
                }
            }
            if let Some(result) = self.join_pending(&key).await {
                return result.and_then(|records| {
                    records.into_iter().next().ok_or_else(|| {
                        AdapterError::not_found(name, format!("{id:?}")).into()
                    })
                });
            }
        }

        let tx = self.begin_pending(&key, opts.force);
        let result = async {
            let (adapter_name, adapter) = self.adapter_for(&mapper)?;
            let response = mapper
                .find(adapter.as_ref(), &adapter_name, id.clone(), AdapterOpts::default())
                .await?;
            let record = collection.add(&self.collections, response.data)?;
            Ok(vec![record])
        }
        .await;
        self.settle(&key, tx, &result);
        result.map(|mut records| records.remove(0))
    }

    /// Finds all records matching a query, preferring cached and
    /// in-flight results.
    pub async fn find_all(
        &self,
        name: &str,
        query: &Value,
        opts: &FetchOpts,
    ) -> CoreResult<Vec<Record>> {
        let mapper = self.mapper(name)?;
        let collection = self.collection(name)?;
        let key = self.cache_key(name, "findAll", query);

        if !opts.force {
            if self.completed.lock().contains_key(&key) {
                debug!(entity = name, "findAll served from cache");
                return collection.filter(query);
            }
            if let Some(result) = self.join_pending(&key).await {
                return result;
            }
        }

        let tx = self.begin_pending(&key, opts.force);
        let result = async {
            let (adapter_name, adapter) = self.adapter_for(&mapper)?;
            let response = mapper
                .find_all(adapter.as_ref(), &adapter_name, query.clone(), AdapterOpts::default())
                .await?;
            self.insert_array(name, response.data)
        }
        .await;
        self.settle(&key, tx, &result);
        result
    }

    /// Updates one record through the backend and merges the result
    /// into the cache.
    pub async fn update(&self, name: &str, id: &Value, props: Value) -> CoreResult<Record> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        let response = mapper
            .update(adapter.as_ref(), &adapter_name, id.clone(), props, AdapterOpts::default())
            .await?;
        self.collection(name)?.add(&self.collections, response.data)
    }

    /// Updates several records through the backend and merges them.
    pub async fn update_many(&self, name: &str, records: Vec<Value>) -> CoreResult<Vec<Record>> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        let response = mapper
            .update_many(adapter.as_ref(), &adapter_name, records, AdapterOpts::default())
            .await?;
        self.insert_array(name, response.data)
    }

    /// Updates every matching record through the backend and merges
    /// them.
    pub async fn update_all(
        &self,
        name: &str,
        props: Value,
        query: &Value,
    ) -> CoreResult<Vec<Record>> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        let response = mapper
            .update_all(
                adapter.as_ref(),
                &adapter_name,
                props,
                query.clone(),
                AdapterOpts::default(),
            )
            .await?;
        self.insert_array(name, response.data)
    }

    /// Destroys one record through the backend, then evicts and
    /// unlinks it from the cache.
    pub async fn destroy(
        &self,
        name: &str,
        id: &Value,
        opts: &RemoveOpts,
    ) -> CoreResult<Option<Record>> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        mapper
            .destroy(adapter.as_ref(), &adapter_name, id.clone(), AdapterOpts::default())
            .await?;
        self.collection(name)?.remove(&self.collections, id, opts)
    }

    /// Destroys every matching record through the backend, then evicts
    /// the matches from the cache.
    pub async fn destroy_all(
        &self,
        name: &str,
        query: &Value,
        opts: &RemoveOpts,
    ) -> CoreResult<Vec<Record>> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        mapper
            .destroy_all(adapter.as_ref(), &adapter_name, query.clone(), AdapterOpts::default())
            .await?;
        self.collection(name)?
            .remove_all(&self.collections, query, opts)
    }

    /// Counts matching records in the backend.
    pub async fn count(&self, name: &str, query: &Value) -> CoreResult<Value> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        let response = mapper
            .count(adapter.as_ref(), &adapter_name, query.clone(), AdapterOpts::default())
            .await?;
        Ok(response.data)
    }

    /// Sums a numeric field over matching records in the backend.
    pub async fn sum(&self, name: &str, field: &str, query: &Value) -> CoreResult<Value> {
        let mapper = self.mapper(name)?;
        let (adapter_name, adapter) = self.adapter_for(&mapper)?;
        let response = mapper
            .sum(adapter.as_ref(), &adapter_name, field, query.clone(), AdapterOpts::default())
            .await?;
        Ok(response.data)
    }

    // ---- read de-duplication --------------------------------------

    fn cache_key(&self, name: &str, op: &str, query: &Value) -> CacheKey {
        let descriptor = Value::map(vec![
            ("op".into(), Value::Text(op.into())),
            ("query".into(), query.clone()),
        ]);
        (name.to_string(), fingerprint(&descriptor))
    }

    /// True when this exact read has completed at least once.
    #[must_use]
    pub fn has_completed(&self, name: &str, query: &Value) -> bool {
        let key = self.cache_key(name, "findAll", query);
        self.completed.lock().contains_key(&key)
    }

    /// Forgets completed-read markers for one entity type, so the next
    /// find hits the adapter again.
    pub fn clear_completed(&self, name: &str) {
        self.completed.lock().retain(|(entity, _), _| entity != name);
    }

    async fn join_pending(&self, key: &CacheKey) -> Option<FetchResult> {
        if !self.config.dedup_finds {
            return None;
        }
        let mut rx = {
            let pending = self.pending.lock();
            pending.get(key).map(broadcast::Sender::subscribe)
        }?;
        debug!("joining in-flight read");
        match rx.recv().await {
            Ok(result) => Some(result),
            // Leader vanished without settling; fetch ourselves.
            Err(_) => None,
        }
    }

    fn begin_pending(&self, key: &CacheKey, force: bool) -> Option<broadcast::Sender<FetchResult>> {
        if !self.config.dedup_finds || force {
            return None;
        }
        let (tx, _rx) = broadcast::channel(1);
        self.pending.lock().insert(key.clone(), tx.clone());
        Some(tx)
    }

    fn settle(
        &self,
        key: &CacheKey,
        tx: Option<broadcast::Sender<FetchResult>>,
        result: &FetchResult,
    ) {
        if tx.is_some() {
            self.pending.lock().remove(key);
        }
        if result.is_ok() {
            let marker = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
            self.completed.lock().insert(key.clone(), marker);
        }
        if let Some(tx) = tx {
            // No receivers is fine; nobody joined this read.
            let _ = tx.send(result.clone());
        }
    }

    fn insert_array(&self, name: &str, data: Value) -> CoreResult<Vec<Record>> {
        let Value::Array(items) = data else {
            return Err(CoreError::illegal_argument(format!(
                "adapter resolved a non-array payload for {name}"
            )));
        };
        self.collection(name)?.add_many(&self.collections, items)
    }
}
