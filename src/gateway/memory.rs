//! In-process table gateway
//!
//! Keeps rows in memory with auto-increment integer keys and fans change
//! events out to every subscriber in commit order. Used for offline runs and
//! as the fake remote store in tests; failure injection lets callers exercise
//! the unavailable and rejected paths.

use super::{ChangeEvent, ChangeKind, ChangeStream, OrderSpec, RowQuery, SubscriptionHandle, TableGateway};
use crate::core::{ID_COLUMN, RawRow, Result, SyncError, id_string, row_id};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug)]
struct TableState {
    rows: Vec<RawRow>,
    next_id: i64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<ChangeEvent>)>,
    next_subscriber: u64,
    offline: bool,
    write_rejection: Option<String>,
}

impl TableState {
    fn position(&self, id: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row_id(row).as_deref() == Some(id))
    }

    fn publish(&mut self, event: ChangeEvent) {
        self.subscribers
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(SyncError::Transport("table is offline".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_online()?;
        if let Some(reason) = &self.write_rejection {
            return Err(SyncError::WriteRejected(reason.clone()));
        }
        Ok(())
    }
}

/// Shared in-memory table. Clones address the same rows.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    state: Arc<Mutex<TableState>>,
}

impl MemoryTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(TableState {
                rows: Vec::new(),
                next_id: 1,
                subscribers: Vec::new(),
                next_subscriber: 0,
                offline: false,
                write_rejection: None,
            })),
        }
    }

    /// Creates a table pre-filled with `rows`; rows without id get one.
    pub fn with_rows(name: &str, rows: Vec<RawRow>) -> Self {
        let table = Self::new(name);
        {
            let mut state = table.lock();
            for mut row in rows {
                match row_id(&row).and_then(|id| id.parse::<i64>().ok()) {
                    Some(n) => state.next_id = state.next_id.max(n + 1),
                    None if row_id(&row).is_none() => {
                        row.insert(ID_COLUMN.to_string(), Value::from(state.next_id));
                        state.next_id += 1;
                    }
                    None => {}
                }
                state.rows.push(row);
            }
        }
        table
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every operation fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Makes every write fail with `WriteRejected(reason)`; `None` restores writes.
    pub fn reject_writes(&self, reason: Option<&str>) {
        self.lock().write_rejection = reason.map(str::to_string);
    }

    /// Pushes an arbitrary event to subscribers without touching the rows.
    pub fn emit(&self, event: ChangeEvent) {
        self.lock().publish(event);
    }

    pub fn rows(&self) -> Vec<RawRow> {
        self.lock().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|(_, sender)| !sender.is_closed());
        state.subscribers.len()
    }
}

fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return expected.is_null();
    };
    if actual == expected {
        return true;
    }
    // 42 and "42" address the same key
    matches!((id_string(actual), id_string(expected)), (Some(a), Some(b)) if a == b)
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        // nulls sort last ascending, like the remote store
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

fn sort_rows(rows: &mut [RawRow], order: &OrderSpec) {
    rows.sort_by(|a, b| {
        let ordering = compare_values(a.get(&order.column), b.get(&order.column));
        if order.ascending { ordering } else { ordering.reverse() }
    });
}

fn project(row: &RawRow, columns: Option<&Vec<String>>) -> RawRow {
    match columns {
        None => row.clone(),
        Some(columns) => row
            .iter()
            .filter(|(column, _)| columns.contains(column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect(),
    }
}

#[async_trait]
impl TableGateway for MemoryTable {
    fn table(&self) -> &str {
        &self.name
    }

    async fn fetch_all(&self, order: Option<&OrderSpec>) -> Result<Vec<RawRow>> {
        let state = self.lock();
        state.check_online()?;
        let mut rows = state.rows.clone();
        if let Some(order) = order {
            sort_rows(&mut rows, order);
        }
        Ok(rows)
    }

    async fn fetch_one(&self, query: &RowQuery) -> Result<RawRow> {
        let state = self.lock();
        state.check_online()?;
        let mut rows: Vec<RawRow> = state
            .rows
            .iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|(column, expected)| value_matches(row.get(column), expected))
            })
            .cloned()
            .collect();
        if let Some(order) = &query.order {
            sort_rows(&mut rows, order);
        }
        rows.first()
            .map(|row| project(row, query.columns.as_ref()))
            .ok_or_else(|| SyncError::not_found(format!("no matching row in '{}'", self.name)))
    }

    async fn insert(&self, mut record: RawRow) -> Result<RawRow> {
        let mut state = self.lock();
        state.check_writable()?;
        if row_id(&record).is_none() {
            record.insert(ID_COLUMN.to_string(), Value::from(state.next_id));
            state.next_id += 1;
        } else if let Some(id) = row_id(&record)
            && state.position(&id).is_some()
        {
            return Err(SyncError::WriteRejected(format!(
                "duplicate key '{}' in '{}'",
                id, self.name
            )));
        }
        state.rows.push(record.clone());
        state.publish(ChangeEvent::new(ChangeKind::Insert, record.clone()));
        Ok(record)
    }

    async fn update(&self, id: &str, patch: RawRow) -> Result<()> {
        let mut state = self.lock();
        state.check_writable()?;
        let index = state
            .position(id)
            .ok_or_else(|| SyncError::not_found(format!("row '{}' in '{}'", id, self.name)))?;
        let row = &mut state.rows[index];
        for (column, value) in patch {
            if column != ID_COLUMN {
                row.insert(column, value);
            }
        }
        let updated = row.clone();
        state.publish(ChangeEvent::new(ChangeKind::Update, updated));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.check_writable()?;
        let index = state
            .position(id)
            .ok_or_else(|| SyncError::not_found(format!("row '{}' in '{}'", id, self.name)))?;
        let old = state.rows.remove(index);
        state.publish(ChangeEvent::new(ChangeKind::Delete, old));
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeStream> {
        let (sender, events) = mpsc::unbounded_channel();
        let subscriber = {
            let mut state = self.lock();
            state.check_online()?;
            let subscriber = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.push((subscriber, sender));
            subscriber
        };

        let weak = Arc::downgrade(&self.state);
        let handle = SubscriptionHandle::new(move || {
            if let Some(state) = weak.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|(id, _)| *id != subscriber);
            }
        });

        Ok(ChangeStream { events, handle })
    }
}
