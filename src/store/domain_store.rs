use super::collection::{Collection, Entity, FeedChange, FeedOutcome};
use super::lifecycle::{FeedWorker, LoadSequence, SnapshotSource, StoreStatus, lock, touch};
use super::{Domain, Snapshot};
use crate::core::{Result, SyncError, row_id};
use crate::gateway::{ChangeEvent, ChangeKind, TableGateway};
use crate::mapping;
use crate::mirror::MirrorCache;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Level, debug, event, info, warn};

struct StoreState<D: Domain> {
    status: StoreStatus,
    collection: Collection<D::Entity>,
    source: SnapshotSource,
    error: Option<String>,
    loads: LoadSequence,
    feed: Option<FeedWorker>,
    feed_requested: bool,
}

impl<D: Domain> StoreState<D> {
    fn new() -> Self {
        Self {
            status: StoreStatus::Uninitialized,
            collection: Collection::new(D::placement()),
            source: SnapshotSource::Empty,
            error: None,
            loads: LoadSequence::default(),
            feed: None,
            feed_requested: false,
        }
    }

    fn disposed(&self) -> bool {
        self.status == StoreStatus::Disposed
    }

    /// Fallback content (defaults or mirror) is never mixed with remote rows.
    fn drop_fallback(&mut self) {
        if self.source.is_fallback() {
            self.collection.replace_all(Vec::new());
        }
        self.source = SnapshotSource::Remote;
    }
}

struct MirrorBinding {
    cache: Arc<dyn MirrorCache>,
    key: String,
}

struct Loaded<E> {
    entities: Vec<E>,
    source: SnapshotSource,
    error: Option<String>,
}

/// Store of one multi-row domain.
///
/// Without a gateway the store is the system of record: writes apply
/// locally and, if a mirror is bound, persist there.
pub struct DomainStore<D: Domain> {
    gateway: Option<Arc<dyn TableGateway>>,
    mirror: Option<MirrorBinding>,
    state: Arc<Mutex<StoreState<D>>>,
}

impl<D: Domain> DomainStore<D> {
    pub fn new(gateway: Option<Arc<dyn TableGateway>>) -> Self {
        Self {
            gateway,
            mirror: None,
            state: Arc::new(Mutex::new(StoreState::new())),
        }
    }

    /// Store without remote table.
    pub fn detached() -> Self {
        Self::new(None)
    }

    /// Binds a mirror cache entry used as fallback tier and write-through copy.
    pub fn with_mirror(mut self, cache: Arc<dyn MirrorCache>, key: &str) -> Self {
        self.mirror = Some(MirrorBinding {
            cache,
            key: key.to_string(),
        });
        self
    }

    fn state(&self) -> MutexGuard<'_, StoreState<D>> {
        lock(&self.state)
    }

    pub fn table(&self) -> &'static str {
        D::TABLE
    }

    pub fn is_remote(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn status(&self) -> StoreStatus {
        self.state().status
    }

    pub fn snapshot(&self) -> Snapshot<D::Entity> {
        let state = self.state();
        Snapshot {
            entities: state.collection.entities().clone(),
            source: state.source,
            error: state.error.clone(),
        }
    }

    pub fn entities(&self) -> im::Vector<D::Entity> {
        self.state().collection.entities().clone()
    }

    pub fn get(&self, id: &str) -> Option<D::Entity> {
        self.state().collection.get(id).cloned()
    }

    /// Lazily yields the entities matching `predicate`, read from the
    /// snapshot current at call time.
    pub fn get_filtered<P>(&self, predicate: P) -> impl Iterator<Item = D::Entity> + use<D, P>
    where
        P: FnMut(&D::Entity) -> bool,
    {
        self.entities().into_iter().filter(predicate)
    }

    /// Identifiers with a local write not yet echoed by the change feed.
    pub fn pending_writes(&self) -> Vec<String> {
        self.state().collection.pending_ids()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Loads the snapshot, falling back to mirror or defaults on failure.
    ///
    /// Never fails; the last failure is kept as advisory `error` in the
    /// snapshot. The first call also starts the change feed.
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
        let loaded = self.fetch().await;

        let applied = {
            let mut state = self.state();
            if state.disposed() {
                debug!(table = D::TABLE, seq, "load finished after dispose, ignored");
                return;
            }
            if !state.loads.complete(seq) {
                event!(Level::DEBUG, table = D::TABLE, seq, "discarding stale load result");
                return;
            }
            info!(
                table = D::TABLE,
                seq,
                count = loaded.entities.len(),
                source = ?loaded.source,
                "snapshot loaded"
            );
            state.collection.replace_all(loaded.entities);
            state.source = loaded.source;
            state.error = loaded.error;
            if state.loads.settled() {
                state.status = StoreStatus::Ready;
            }
            state.source
        };

        if applied == SnapshotSource::Remote {
            self.persist_mirror().await;
        }
    }

    /// Reloads the snapshot.
    pub async fn refetch(&self) {
        self.load().await;
    }

    async fn fetch(&self) -> Loaded<D::Entity> {
        let Some(gateway) = &self.gateway else {
            return self.fetch_detached().await;
        };

        let order = D::fetch_order();
        match gateway.fetch_all(order.as_ref()).await {
            Ok(rows) => {
                let entities: Vec<D::Entity> = rows
                    .iter()
                    .filter_map(|row| match D::fields().decode(row) {
                        Ok(entity) => Some(entity),
                        Err(err) => {
                            warn!(table = D::TABLE, id = ?row_id(row), error = %err, "skipping undecodable row");
                            None
                        }
                    })
                    .collect();
                if entities.is_empty() {
                    debug!(table = D::TABLE, "remote table empty, using defaults");
                    return Loaded {
                        entities: D::defaults(),
                        source: SnapshotSource::Defaults,
                        error: None,
                    };
                }
                Loaded {
                    entities,
                    source: SnapshotSource::Remote,
                    error: None,
                }
            }
            Err(err) => {
                warn!(table = D::TABLE, kind = err.kind(), error = %err, "remote fetch failed");
                let message = Some(err.to_string());
                match self.read_mirror().await {
                    Some(entities) if !entities.is_empty() => Loaded {
                        entities,
                        source: SnapshotSource::Mirror,
                        error: message,
                    },
                    _ => Loaded {
                        entities: D::defaults(),
                        source: SnapshotSource::Defaults,
                        error: message,
                    },
                }
            }
        }
    }

    async fn fetch_detached(&self) -> Loaded<D::Entity> {
        if let Some(entities) = self.read_mirror().await {
            return Loaded {
                entities,
                source: SnapshotSource::Local,
                error: None,
            };
        }
        {
            let state = self.state();
            if state.source == SnapshotSource::Local {
                return Loaded {
                    entities: state.collection.entities().iter().cloned().collect(),
                    source: SnapshotSource::Local,
                    error: None,
                };
            }
        }
        Loaded {
            entities: D::defaults(),
            source: SnapshotSource::Defaults,
            error: None,
        }
    }

    async fn read_mirror(&self) -> Option<Vec<D::Entity>> {
        let binding = self.mirror.as_ref()?;
        let raw = match binding.cache.read(&binding.key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(table = D::TABLE, key = %binding.key, error = %err, "mirror read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entities) => Some(entities),
            Err(err) => {
                warn!(table = D::TABLE, key = %binding.key, error = %err, "mirror content unreadable");
                None
            }
        }
    }

    async fn persist_mirror(&self) {
        let Some(binding) = &self.mirror else {
            return;
        };
        let entities: Vec<D::Entity> = self.entities().into_iter().collect();
        let payload = match serde_json::to_string(&entities) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(table = D::TABLE, error = %err, "mirror encode failed");
                return;
            }
        };
        if let Err(err) = binding.cache.write(&binding.key, &payload).await {
            warn!(table = D::TABLE, key = %binding.key, error = %err, "mirror write failed");
        }
    }

    // ========================================================================
    // Change feed
    // ========================================================================

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
            lock(&shared).collection.set_echo_tracking(false);
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
        debug!(table = D::TABLE, "change feed started");
        state.collection.set_echo_tracking(true);
        state.feed = Some(worker);
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Creates an entity. The remote store assigns the identifier.
    pub async fn create(&self, draft: D::Draft) -> Result<D::Entity> {
        D::validate_draft(&draft)?;

        let Some(gateway) = &self.gateway else {
            let id = uuid::Uuid::new_v4().to_string();
            let entity: D::Entity = mapping::with_id(&draft, &id)?;
            {
                let mut state = self.state();
                if state.disposed() {
                    return Ok(entity);
                }
                state.collection.upsert(entity.clone());
                state.source = SnapshotSource::Local;
            }
            self.persist_mirror().await;
            return Ok(entity);
        };

        let record = D::fields().encode(&draft)?;
        self.state().collection.begin_create();
        let created = gateway
            .insert(record)
            .await
            .and_then(|row| D::fields().decode::<D::Entity>(&row));
        let entity = match created {
            Ok(entity) => entity,
            Err(err) => {
                warn!(table = D::TABLE, kind = err.kind(), error = %err, "create rejected");
                self.state().collection.abort_create();
                return Err(err);
            }
        };

        let mut state = self.state();
        if state.disposed() {
            return Ok(entity);
        }
        if !state.collection.removed_during_create(entity.id()) {
            state.drop_fallback();
        }
        if !state.collection.settle_created(entity.clone()) {
            debug!(table = D::TABLE, id = %entity.id(), "create already settled by feed");
        }
        Ok(entity)
    }

    /// Updates the fields present in `patch` and returns the merged entity.
    pub async fn update(&self, id: &str, patch: D::Patch) -> Result<D::Entity> {
        D::validate_patch(&patch)?;

        let current = {
            let state = self.state();
            state.collection.get(id).cloned()
        }
        .ok_or_else(|| SyncError::not_found(format!("{} '{}'", D::TABLE, id)))?;
        let merged: D::Entity = mapping::overlay(&current, &patch)?;

        let Some(gateway) = &self.gateway else {
            {
                let mut state = self.state();
                if state.disposed() {
                    return Ok(merged);
                }
                state.collection.upsert(merged.clone());
                state.source = SnapshotSource::Local;
            }
            self.persist_mirror().await;
            return Ok(merged);
        };

        let mut record = D::fields().encode(&patch)?;
        touch(&mut record, D::TOUCH_COLUMN);

        let token = self.state().collection.begin_write(id);
        if let Err(err) = gateway.update(id, record).await {
            warn!(table = D::TABLE, id, kind = err.kind(), error = %err, "update rejected");
            self.state().collection.abort_write(id, token);
            return Err(err);
        }

        let mut state = self.state();
        if state.disposed() {
            return Ok(merged);
        }
        if !state.collection.finish_write(id, token) {
            debug!(table = D::TABLE, id, "feed superseded local update");
            return Ok(state.collection.get(id).cloned().unwrap_or(merged));
        }
        let base = state.collection.get(id).cloned().unwrap_or(current);
        let merged: D::Entity = mapping::overlay(&base, &patch)?;
        state.collection.upsert(merged.clone());
        Ok(merged)
    }

    /// Deletes an entity known to the snapshot.
    pub async fn remove(&self, id: &str) -> Result<()> {
        if !self.state().collection.contains(id) {
            return Err(SyncError::not_found(format!("{} '{}'", D::TABLE, id)));
        }

        let Some(gateway) = &self.gateway else {
            {
                let mut state = self.state();
                if state.disposed() {
                    return Ok(());
                }
                state.collection.settle_removed(id);
            }
            self.persist_mirror().await;
            return Ok(());
        };

        let token = self.state().collection.begin_write(id);
        if let Err(err) = gateway.delete(id).await {
            warn!(table = D::TABLE, id, kind = err.kind(), error = %err, "delete rejected");
            self.state().collection.abort_write(id, token);
            return Err(err);
        }

        let mut state = self.state();
        if !state.disposed() {
            state.collection.settle_removed(id);
        }
        Ok(())
    }

    /// Stops the change feed. Later feed events and in-flight results are ignored.
    pub fn dispose(&self) {
        let worker = {
            let mut state = self.state();
            state.status = StoreStatus::Disposed;
            state.feed.take()
        };
        if let Some(worker) = worker {
            worker.stop();
            debug!(table = D::TABLE, "change feed stopped");
        }
    }
}

impl<D: Domain> Drop for DomainStore<D> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn decode_change<D: Domain>(event: &ChangeEvent) -> Result<FeedChange<D::Entity>> {
    match event.kind {
        ChangeKind::Delete => row_id(&event.row)
            .map(FeedChange::Remove)
            .ok_or_else(|| SyncError::Transport("delete event without id".to_string())),
        ChangeKind::Insert | ChangeKind::Update => {
            Ok(FeedChange::Upsert(D::fields().decode(&event.row)?))
        }
    }
}

/// Applies one feed event. Returns false once the store is disposed.
fn apply_event<D: Domain>(shared: &Mutex<StoreState<D>>, event: ChangeEvent) -> bool {
    let change = match decode_change::<D>(&event) {
        Ok(change) => change,
        Err(err) => {
            warn!(table = D::TABLE, kind = %event.kind, error = %err, "skipping feed event");
            return true;
        }
    };

    let mut state = lock(shared);
    if state.disposed() {
        return false;
    }
    if matches!(change, FeedChange::Upsert(_)) {
        state.drop_fallback();
    }
    let outcome = state.collection.apply_feed(change);
    match outcome {
        FeedOutcome::Ignored => {
            debug!(table = D::TABLE, kind = %event.kind, "feed delete for unknown id ignored")
        }
        _ => debug!(table = D::TABLE, kind = %event.kind, ?outcome, "feed event applied"),
    }
    true
}
