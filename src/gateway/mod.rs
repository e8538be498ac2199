//! Remote table boundary
//!
//! A [`TableGateway`] speaks to exactly one remote table: snapshot reads,
//! writes, and a change feed of row-level events. Gateways keep no local
//! state beyond what their transport needs.

pub mod memory;
pub mod rest;

use crate::core::{RawRow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

pub use memory::MemoryTable;
pub use rest::{RestClient, RestGateway};

// ============================================================================
// Queries
// ============================================================================

/// Sort order requested from the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub column: String,
    pub ascending: bool,
}

impl OrderSpec {
    pub fn ascending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn descending(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }
}

/// Single-row query: equality filters, optional projection and order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    pub filters: Vec<(String, Value)>,
    pub columns: Option<Vec<String>>,
    pub order: Option<OrderSpec>,
}

impl RowQuery {
    /// Matches the first row of the table.
    pub fn first() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    /// Restricts the returned columns, e.g. for a cheap existence probe.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn order(mut self, order: OrderSpec) -> Self {
        self.order = Some(order);
        self
    }
}

// ============================================================================
// Change feed
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One row-level change. Delete events carry the old row (at least its id).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: RawRow,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, row: RawRow) -> Self {
        Self { kind, row }
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle of a live change feed subscription.
///
/// Tearing down is idempotent; dropping the handle tears down as well.
pub struct SubscriptionHandle {
    teardown: Mutex<Option<Teardown>>,
}

impl SubscriptionHandle {
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// Stops delivery. Safe to call on an already torn-down handle.
    pub fn unsubscribe(&self) {
        let teardown = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_active(&self) -> bool {
        self.teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Ordered event receiver plus the handle that ends it.
#[derive(Debug)]
pub struct ChangeStream {
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
    pub handle: SubscriptionHandle,
}

// ============================================================================
// Gateway trait
// ============================================================================

/// CRUD and change feed access to one remote table.
///
/// Identifiers cross this boundary as strings; implementations convert to
/// the table's key type themselves.
#[async_trait]
pub trait TableGateway: Send + Sync {
    /// Name of the remote table
    fn table(&self) -> &str;

    /// Fetches every row, optionally ordered by the remote store.
    async fn fetch_all(&self, order: Option<&OrderSpec>) -> Result<Vec<RawRow>>;

    /// Fetches the first row matching `query`; `NotFound` when none does.
    async fn fetch_one(&self, query: &RowQuery) -> Result<RawRow>;

    /// Inserts a record without identifier and returns the stored row.
    async fn insert(&self, record: RawRow) -> Result<RawRow>;

    async fn update(&self, id: &str, patch: RawRow) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Opens a change feed. Events arrive in the table's commit order.
    async fn subscribe(&self) -> Result<ChangeStream>;
}
