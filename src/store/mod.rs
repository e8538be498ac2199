//! Domain stores
//!
//! A store owns the in-memory snapshot of one remote table. It loads an
//! initial snapshot (falling back to the mirror cache or hardcoded defaults),
//! reconciles the table's change feed for as long as it lives, and performs
//! writes through its gateway, applying their results locally once the remote
//! store has confirmed them.
//!
//! Two shapes exist: [`DomainStore`] for multi-row tables and
//! [`SingletonStore`] for tables holding exactly one record.

mod collection;
mod domain_store;
mod lifecycle;
mod singleton;

pub use collection::{Collection, Entity, FeedChange, FeedOutcome, PendingWrite, Placement};
pub use domain_store::DomainStore;
pub use lifecycle::{SnapshotSource, StoreStatus};
pub use singleton::SingletonStore;

use crate::core::Result;
use crate::gateway::OrderSpec;
use crate::mapping::FieldMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Column stamped with the current time on every update.
pub const UPDATED_AT: &str = "updated_at";

/// Definition of a multi-row domain.
pub trait Domain: Send + Sync + 'static {
    type Entity: Entity;
    /// Entity without identifier, as sent on create.
    type Draft: Serialize + Send + Sync;
    /// Partial entity; unset fields must not serialize.
    type Patch: Serialize + Send + Sync;

    const TABLE: &'static str;
    const TOUCH_COLUMN: Option<&'static str> = Some(UPDATED_AT);

    fn fields() -> FieldMap;

    fn defaults() -> Vec<Self::Entity>;

    fn fetch_order() -> Option<OrderSpec> {
        None
    }

    fn placement() -> Placement<Self::Entity> {
        Placement::Append
    }

    fn validate_draft(_draft: &Self::Draft) -> Result<()> {
        Ok(())
    }

    fn validate_patch(_patch: &Self::Patch) -> Result<()> {
        Ok(())
    }
}

/// Definition of a single-record domain.
pub trait SingletonDomain: Send + Sync + 'static {
    type Record: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    const TABLE: &'static str;
    const TOUCH_COLUMN: Option<&'static str> = Some(UPDATED_AT);

    fn fields() -> FieldMap;

    fn defaults() -> Self::Record;

    /// Normalizes a record before it is stored or written.
    fn prepare(record: Self::Record) -> Self::Record {
        record
    }

    fn validate(_record: &Self::Record) -> Result<()> {
        Ok(())
    }

    /// A stored record that carries no content; loading one yields the defaults.
    fn is_blank(_record: &Self::Record) -> bool {
        false
    }

    /// Which row counts as "the" record when the table holds several.
    fn row_order() -> Option<OrderSpec> {
        None
    }
}

/// Consistent read-only view of a collection store.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<E: Clone> {
    pub entities: im::Vector<E>,
    pub source: SnapshotSource,
    /// Advisory message of the last failed load, if any.
    pub error: Option<String>,
}

impl<E: Entity> Snapshot<E> {
    pub fn is_fallback(&self) -> bool {
        self.source.is_fallback()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entities.iter().map(Entity::id).collect()
    }

    /// Lazily filters the snapshot without copying it.
    pub fn filtered<'a, P>(&'a self, mut predicate: P) -> impl Iterator<Item = &'a E> + 'a
    where
        P: FnMut(&E) -> bool + 'a,
    {
        self.entities.iter().filter(move |e| predicate(e))
    }
}

/// Consistent read-only view of a singleton store.
#[derive(Debug, Clone, Serialize)]
pub struct SingletonSnapshot<R> {
    pub record: R,
    /// Identifier of the backing row, once one exists remotely.
    pub row_id: Option<String>,
    pub source: SnapshotSource,
    pub error: Option<String>,
}

impl<R> SingletonSnapshot<R> {
    pub fn is_fallback(&self) -> bool {
        self.source.is_fallback()
    }
}
