//! # NormDB Core
//!
//! In-memory entity store: collections of shared record handles with
//! sorted indexes, a lazy query pipeline, foreign-key relations, and a
//! store that drives backend adapters and folds their results into the
//! cache.
//!
//! The layers, bottom up:
//! - [`record::Record`]: a cheap-clone, identity-equal property bag
//! - [`index::Index`]: multi-field sorted index over record handles
//! - [`collection::Collection`]: primary store plus default and named
//!   indexes, with change events
//! - [`query::Query`]: lazy filter/order/page pipeline
//! - [`linked::LinkedCollection`]: relation-aware add/remove and link
//!   views derived from foreign keys
//! - [`mapper::Mapper`] and [`store::Store`]: entity definitions,
//!   schema validation, and adapter-backed CRUD with read
//!   de-duplication

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod linked;
pub mod mapper;
pub mod query;
pub mod record;
pub mod relation;
pub mod schema;
pub mod store;

pub use collection::{Collection, CollectionConfig, ConflictPolicy};
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use events::{ChangeEvent, ChangeKind, EventBus, Subscription};
pub use index::{BetweenOpts, Index, KeyTuple};
pub use linked::{CollectionRegistry, LinkedCollection, RemoveOpts};
pub use mapper::Mapper;
pub use query::{criteria::WhereNode, OrderSpec, Query};
pub use record::{Record, RecordKey};
pub use relation::{LinkHook, ManyKeying, Relation, RelationKind};
pub use schema::{FieldDef, FieldKind, Schema, Violation};
pub use store::{FetchOpts, Store};
