//! Relation descriptors between entity types.
//!
//! Relations are plain data: a kind tag plus the field names involved.
//! One interpreter in the linked-collection layer walks these
//! descriptors to split nested payloads, write foreign keys, and
//! resolve link views. Links are always derived from current foreign
//! key values, never stored as object references, so related views can
//! never go stale or form cycles.

use crate::error::CoreResult;
use crate::linked::CollectionRegistry;
use crate::record::Record;
use normdb_value::Value;
use std::fmt;
use std::sync::Arc;

/// A custom linker installed on a relation. Receives the registry, the
/// owning record, and the detached nested payload; replaces the default
/// split-and-link handling for that relation entirely.
pub type LinkHook =
    Arc<dyn Fn(&CollectionRegistry, &Record, Value) -> CoreResult<()> + Send + Sync>;

/// The shape of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This record holds a foreign key to one parent record.
    BelongsTo,
    /// One related record holds a foreign key back to this record.
    HasOne,
    /// Many related records link to this record.
    HasMany,
}

/// How a `HasMany` relation is keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManyKeying {
    /// Children carry a scalar foreign key to the parent.
    ForeignKey(String),
    /// The parent carries an array of child ids.
    LocalKeys(String),
    /// Children carry an array of parent ids.
    ForeignKeys(String),
}

/// One relation from an owning entity type to a related type.
#[derive(Clone)]
pub struct Relation {
    /// Kind tag.
    pub kind: RelationKind,
    /// Entity type name of the related records.
    pub related: String,
    /// Field on the owning record where nested payloads arrive and
    /// link views are materialized.
    pub local_field: String,
    /// Foreign key field for `BelongsTo` (on the owning record) and
    /// `HasOne` (on the related record).
    pub foreign_key: Option<String>,
    /// Keying scheme for `HasMany`.
    pub many: Option<ManyKeying>,
    /// Whether nested payloads under `local_field` are split out into
    /// the related collection on add. On by default.
    pub auto_add: bool,
    /// Custom linker replacing the default handling of nested payloads.
    pub on_add: Option<LinkHook>,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("kind", &self.kind)
            .field("related", &self.related)
            .field("local_field", &self.local_field)
            .field("foreign_key", &self.foreign_key)
            .field("many", &self.many)
            .field("auto_add", &self.auto_add)
            .field("on_add", &self.on_add.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl Relation {
    /// A belongs-to relation: the owning record stores `foreign_key`.
    pub fn belongs_to(
        related: impl Into<String>,
        local_field: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::BelongsTo,
            related: related.into(),
            local_field: local_field.into(),
            foreign_key: Some(foreign_key.into()),
            many: None,
            auto_add: true,
            on_add: None,
        }
    }

    /// A has-one relation: the related record stores `foreign_key`.
    pub fn has_one(
        related: impl Into<String>,
        local_field: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasOne,
            related: related.into(),
            local_field: local_field.into(),
            foreign_key: Some(foreign_key.into()),
            many: None,
            auto_add: true,
            on_add: None,
        }
    }

    /// A has-many relation keyed by a foreign key on the children.
    pub fn has_many(
        related: impl Into<String>,
        local_field: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasMany,
            related: related.into(),
            local_field: local_field.into(),
            foreign_key: None,
            many: Some(ManyKeying::ForeignKey(foreign_key.into())),
            auto_add: true,
            on_add: None,
        }
    }

    /// A has-many relation keyed by an id array on the owning record.
    pub fn has_many_local_keys(
        related: impl Into<String>,
        local_field: impl Into<String>,
        local_keys: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasMany,
            related: related.into(),
            local_field: local_field.into(),
            foreign_key: None,
            many: Some(ManyKeying::LocalKeys(local_keys.into())),
            auto_add: true,
            on_add: None,
        }
    }

    /// A has-many relation keyed by an id array on the children.
    pub fn has_many_foreign_keys(
        related: impl Into<String>,
        local_field: impl Into<String>,
        foreign_keys: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasMany,
            related: related.into(),
            local_field: local_field.into(),
            foreign_key: None,
            many: Some(ManyKeying::ForeignKeys(foreign_keys.into())),
            auto_add: true,
            on_add: None,
        }
    }

    /// Leaves nested payloads under `local_field` on the record instead
    /// of splitting them into the related collection.
    #[must_use]
    pub fn no_auto_add(mut self) -> Self {
        self.auto_add = false;
        self
    }

    /// Installs a custom linker for this relation. The hook receives
    /// nested payloads in place of the default split-and-link handling.
    #[must_use]
    pub fn on_add(
        mut self,
        hook: impl Fn(&CollectionRegistry, &Record, Value) -> CoreResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_add = Some(Arc::new(hook));
        self
    }
}
