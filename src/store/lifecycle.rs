use crate::core::RawRow;
use crate::gateway::SubscriptionHandle;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Lifecycle of one store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Uninitialized,
    Loading,
    Ready,
    Disposed,
}

/// Where the current snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Nothing loaded yet.
    Empty,
    Remote,
    /// Last known remote snapshot from the local mirror cache.
    Mirror,
    /// Hardcoded fallback data.
    Defaults,
    /// No remote store configured; local writes are authoritative.
    Local,
}

impl SnapshotSource {
    pub fn is_fallback(self) -> bool {
        matches!(self, Self::Mirror | Self::Defaults)
    }
}

/// Orders overlapping loads: a result is applied only if no newer load has
/// completed before it.
#[derive(Debug, Default)]
pub(crate) struct LoadSequence {
    issued: u64,
    completed: u64,
}

impl LoadSequence {
    pub(crate) fn begin(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Returns false for a stale result that must be discarded.
    pub(crate) fn complete(&mut self, seq: u64) -> bool {
        if seq <= self.completed {
            return false;
        }
        self.completed = seq;
        true
    }

    /// True once the newest issued load has completed.
    pub(crate) fn settled(&self) -> bool {
        self.completed == self.issued
    }
}

/// Running change feed: the subscription plus the task draining it.
#[derive(Debug)]
pub(crate) struct FeedWorker {
    pub(crate) handle: SubscriptionHandle,
    pub(crate) task: JoinHandle<()>,
}

impl FeedWorker {
    pub(crate) fn stop(self) {
        self.handle.unsubscribe();
        self.task.abort();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stamps the modification column on an outgoing write.
pub(crate) fn touch(record: &mut RawRow, column: Option<&'static str>) {
    if let Some(column) = column {
        record.insert(
            column.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_load_is_rejected() {
        let mut loads = LoadSequence::default();
        let first = loads.begin();
        let second = loads.begin();

        assert!(loads.complete(second));
        assert!(!loads.complete(first));
        assert!(loads.settled());
    }

    #[test]
    fn test_older_load_may_land_before_newer() {
        let mut loads = LoadSequence::default();
        let first = loads.begin();
        let second = loads.begin();

        assert!(loads.complete(first));
        assert!(!loads.settled());
        assert!(loads.complete(second));
        assert!(loads.settled());
    }

    #[test]
    fn test_touch_stamps_rfc3339() {
        let mut record = RawRow::new();
        touch(&mut record, Some("updated_at"));
        let stamp = record["updated_at"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());

        let mut untouched = RawRow::new();
        touch(&mut untouched, None);
        assert!(untouched.is_empty());
    }
}
