#![allow(dead_code)]

use async_trait::async_trait;
use digimagang::core::RawRow;
use digimagang::gateway::{ChangeStream, MemoryTable, OrderSpec, RowQuery, TableGateway};
use digimagang::Result;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Polls `condition` until it holds; feed events are applied by a
/// background task, so assertions on them have to wait.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub fn row(value: Value) -> RawRow {
    value.as_object().cloned().expect("row literal must be an object")
}

pub fn program_row(id: i64, name: &str, status: &str) -> RawRow {
    row(serde_json::json!({
        "id": id,
        "name": name,
        "description": format!("{name} description"),
        "category": "Digital Marketing",
        "status": status,
        "participants": 10,
        "start_date": "2025-01-01",
        "end_date": "2025-04-01",
        "price": "Gratis",
        "duration": "3 Bulan",
        "icon": "📚"
    }))
}

/// Memory table that records the name of every gateway call.
#[derive(Clone)]
pub struct RecordingTable {
    pub inner: MemoryTable,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingTable {
    pub fn new(inner: MemoryTable) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl TableGateway for RecordingTable {
    fn table(&self) -> &str {
        self.inner.table()
    }

    async fn fetch_all(&self, order: Option<&OrderSpec>) -> Result<Vec<RawRow>> {
        self.record("fetch_all");
        self.inner.fetch_all(order).await
    }

    async fn fetch_one(&self, query: &RowQuery) -> Result<RawRow> {
        self.record("fetch_one");
        self.inner.fetch_one(query).await
    }

    async fn insert(&self, record: RawRow) -> Result<RawRow> {
        self.record("insert");
        self.inner.insert(record).await
    }

    async fn update(&self, id: &str, patch: RawRow) -> Result<()> {
        self.record("update");
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.record("delete");
        self.inner.delete(id).await
    }

    async fn subscribe(&self) -> Result<ChangeStream> {
        self.record("subscribe");
        self.inner.subscribe().await
    }
}
