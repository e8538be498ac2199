use super::collection::PendingWrite;
use super::lifecycle::{FeedWorker, LoadSequence, SnapshotSource, StoreStatus, lock, touch};
use super::{SingletonDomain, SingletonSnapshot};
use crate::core::{ID_COLUMN, Result, SyncError, row_id};
use crate::gateway::{ChangeEvent, ChangeKind, RowQuery, TableGateway};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Level, debug, event, info, warn};

struct SingletonState<D: SingletonDomain> {
    status: StoreStatus,
    record: D::Record,
    row_id: Option<String>,
    source: SnapshotSource,
    error: Option<String>,
    loads: LoadSequence,
    feed: Option<FeedWorker>,
    feed_requested: bool,
    pending: Option<PendingWrite>,
    next_token: u64,
}

impl<D: SingletonDomain> SingletonState<D> {
    fn new() -> Self {
        Self {
            status: StoreStatus::Uninitialized,
            record: D::defaults(),
            row_id: None,
            source: SnapshotSource::Empty,
            error: None,
            loads: LoadSequence::default(),
            feed: None,
            feed_requested: false,
            pending: None,
            next_token: 0,
        }
    }

    fn disposed(&self) -> bool {
        self.status == StoreStatus::Disposed
    }

    fn reset_to_defaults(&mut self) {
        self.record = D::defaults();
        self.row_id = None;
        self.source = SnapshotSource::Defaults;
    }
}

/// Store of a table holding exactly one record.
///
/// There is no create: [`SingletonStore::update`] updates the existing row
/// or inserts the first one.
pub struct SingletonStore<D: SingletonDomain> {
    gateway: Option<Arc<dyn TableGateway>>,
    state: Arc<Mutex<SingletonState<D>>>,
}

impl<D: SingletonDomain> SingletonStore<D> {
    pub fn new(gateway: Option<Arc<dyn TableGateway>>) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(SingletonState::new())),
        }
    }

    pub fn detached() -> Self {
        Self::new(None)
    }

    fn state(&self) -> MutexGuard<'_, SingletonState<D>> {
        lock(&self.state)
    }

    pub fn table(&self) -> &'static str {
        D::TABLE
    }

    pub fn status(&self) -> StoreStatus {
        self.state().status
    }

    pub fn record(&self) -> D::Record {
        self.state().record.clone()
    }

    pub fn snapshot(&self) -> SingletonSnapshot<D::Record> {
        let state = self.state();
        SingletonSnapshot {
            record: state.record.clone(),
            row_id: state.row_id.clone(),
            source: state.source,
            error: state.error.clone(),
        }
    }

    fn base_query() -> RowQuery {
        match D::row_order() {
            Some(order) => RowQuery::first().order(order),
            None => RowQuery::first(),
        }
    }

    /// Loads the record; a missing row or failed fetch yields the defaults.
    pub async fn load(&self) {
        let seq = {
            let mut state = self.state();
            if state.disposed() {
                return;
            }
            state.status = StoreStatus::Loading;
            state.loads.begin()
        };

        self.ensure_feed().await;

        let (record, row_id, source, error) = match &self.gateway {
            None => {
                let state = self.state();
                if state.source == SnapshotSource::Local {
                    (state.record.clone(), state.row_id.clone(), SnapshotSource::Local, None)
                } else {
                    (D::defaults(), None, SnapshotSource::Defaults, None)
                }
            }
            Some(gateway) => match gateway.fetch_one(&Self::base_query()).await {
                Ok(row) => match D::fields().decode::<D::Record>(&row) {
                    Ok(record) if D::is_blank(&record) => {
                        debug!(table = D::TABLE, "stored record is blank, using defaults");
                        (D::defaults(), row_id(&row), SnapshotSource::Defaults, None)
                    }
                    Ok(record) => (D::prepare(record), row_id(&row), SnapshotSource::Remote, None),
                    Err(err) => {
                        warn!(table = D::TABLE, error = %err, "undecodable row, using defaults");
                        (D::defaults(), None, SnapshotSource::Defaults, Some(err.to_string()))
                    }
                },
                Err(SyncError::NotFound(_)) => {
                    debug!(table = D::TABLE, "no row yet, using defaults");
                    (D::defaults(), None, SnapshotSource::Defaults, None)
                }
                Err(err) => {
                    warn!(table = D::TABLE, kind = err.kind(), error = %err, "remote fetch failed");
                    (D::defaults(), None, SnapshotSource::Defaults, Some(err.to_string()))
                }
            },
        };

        let mut state = self.state();
        if state.disposed() {
            return;
        }
        if !state.loads.complete(seq) {
            event!(Level::DEBUG, table = D::TABLE, seq, "discarding stale load result");
            return;
        }
        info!(table = D::TABLE, seq, source = ?source, "record loaded");
        if state.pending == Some(PendingWrite::AwaitingEcho) {
            state.pending = None;
        }
        state.record = record;
        state.row_id = row_id;
        state.source = source;
        state.error = error;
        if state.loads.settled() {
            state.status = StoreStatus::Ready;
        }
    }

    pub async fn refetch(&self) {
        self.load().await;
    }

    async fn ensure_feed(&self) {
        let Some(gateway) = &self.gateway else {
            return;
        };
        {
            let mut state = self.state();
            if state.feed_requested || state.disposed() {
                return;
            }
            state.feed_requested = true;
        }

        let stream = match gateway.subscribe().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(table = D::TABLE, error = %err, "change feed unavailable");
                self.state().feed_requested = false;
                return;
            }
        };

        let mut events = stream.events;
        let shared = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !apply_event::<D>(&shared, event) {
                    break;
                }
            }
            let mut state = lock(&shared);
            if state.pending == Some(PendingWrite::AwaitingEcho) {
                state.pending = None;
            }
        });

        let worker = FeedWorker {
            handle: stream.handle,
            task,
        };
        let mut state = self.state();
        if state.disposed() {
            worker.stop();
            return;
        }
        state.feed = Some(worker);
    }

    /// Replaces the record: updates the existing row, or inserts the first
    /// one when the table is still empty.
    ///
    /// ```no_run
    /// use digimagang::domains::{Contact, ContactStore};
    /// use digimagang::store::SingletonDomain;
    ///
    /// # tokio_test::block_on(async {
    /// let store = ContactStore::detached();
    /// let mut info = Contact::defaults();
    /// info.phone_display = "+62 811-2222-3333".to_string();
    /// let saved = store.update(info).await.unwrap();
    /// assert_eq!(saved.whatsapp_url, "https://wa.me/6281122223333");
    /// # });
    /// ```
    pub async fn update(&self, record: D::Record) -> Result<D::Record> {
        let record = D::prepare(record);
        D::validate(&record)?;

        let Some(gateway) = &self.gateway else {
            let mut state = self.state();
            if state.disposed() {
                return Ok(record);
            }
            state.record = record.clone();
            state.source = SnapshotSource::Local;
            return Ok(record);
        };

        let mut row = D::fields().encode(&record)?;
        touch(&mut row, D::TOUCH_COLUMN);

        let token = {
            let mut state = self.state();
            state.next_token += 1;
            let token = state.next_token;
            state.pending = Some(PendingWrite::InFlight {
                token,
                superseded: false,
            });
            token
        };

        let result = self.write(gateway.as_ref(), row).await;
        let mut state = self.state();
        let row_id = match result {
            Ok(row_id) => row_id,
            Err(err) => {
                warn!(table = D::TABLE, kind = err.kind(), error = %err, "update rejected");
                if matches!(state.pending, Some(PendingWrite::InFlight { token: t, .. }) if t == token) {
                    state.pending = None;
                }
                return Err(err);
            }
        };
        if state.disposed() {
            return Ok(record);
        }

        match state.pending {
            Some(PendingWrite::InFlight { token: t, superseded: true }) if t == token => {
                debug!(table = D::TABLE, "feed superseded local update");
                state.pending = None;
                return Ok(state.record.clone());
            }
            Some(PendingWrite::InFlight { token: t, .. }) if t == token => {
                state.pending = state.feed.as_ref().map(|_| PendingWrite::AwaitingEcho);
            }
            _ => {}
        }
        state.record = record.clone();
        state.row_id = Some(row_id);
        state.source = SnapshotSource::Remote;
        state.error = None;
        Ok(record)
    }

    /// Probes for the existing row, then updates or inserts. Returns the row id.
    async fn write(&self, gateway: &dyn TableGateway, row: crate::core::RawRow) -> Result<String> {
        let probe = Self::base_query().select(&[ID_COLUMN]);
        let existing = match gateway.fetch_one(&probe).await {
            Ok(found) => row_id(&found),
            Err(SyncError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };

        match existing {
            Some(id) => {
                gateway.update(&id, row).await?;
                debug!(table = D::TABLE, id = %id, "record updated");
                Ok(id)
            }
            None => {
                let inserted = gateway.insert(row).await?;
                let id = row_id(&inserted).ok_or_else(|| {
                    SyncError::Transport(format!("insert into '{}' returned no id", D::TABLE))
                })?;
                debug!(table = D::TABLE, id = %id, "first record inserted");
                Ok(id)
            }
        }
    }

    /// True while a local write awaits its feed echo.
    pub fn has_pending_write(&self) -> bool {
        self.state().pending.is_some()
    }

    pub fn dispose(&self) {
        let worker = {
            let mut state = self.state();
            state.status = StoreStatus::Disposed;
            state.feed.take()
        };
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

impl<D: SingletonDomain> Drop for SingletonStore<D> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn apply_event<D: SingletonDomain>(shared: &Mutex<SingletonState<D>>, event: ChangeEvent) -> bool {
    let mut state = lock(shared);
    if state.disposed() {
        return false;
    }

    match state.pending {
        Some(PendingWrite::InFlight { token, .. }) => {
            state.pending = Some(PendingWrite::InFlight {
                token,
                superseded: true,
            })
        }
        Some(PendingWrite::AwaitingEcho) => state.pending = None,
        None => {}
    }

    match event.kind {
        ChangeKind::Insert | ChangeKind::Update => match D::fields().decode::<D::Record>(&event.row) {
            Ok(record) => {
                state.record = D::prepare(record);
                state.row_id = row_id(&event.row);
                state.source = SnapshotSource::Remote;
                debug!(table = D::TABLE, kind = %event.kind, "feed event applied");
            }
            Err(err) => warn!(table = D::TABLE, kind = %event.kind, error = %err, "skipping feed event"),
        },
        ChangeKind::Delete => {
            let deleted = row_id(&event.row);
            if state.row_id.is_none() || deleted == state.row_id {
                state.reset_to_defaults();
                debug!(table = D::TABLE, "record deleted remotely, using defaults");
            }
        }
    }
    true
}
