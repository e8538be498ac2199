use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

/// A domain record addressed by a stable string identifier.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// Where entities the collection has not seen before are placed.
#[derive(Debug)]
pub enum Placement<E> {
    /// Insertion order.
    Append,
    /// Newest first.
    Prepend,
    /// Kept sorted; ties keep insertion order.
    SortedBy(fn(&E, &E) -> Ordering),
}

impl<E> Clone for Placement<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Placement<E> {}

/// Marker for a local write whose feed echo has not been seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingWrite {
    /// Remote call running. `superseded` is set when a feed event for the
    /// same identifier lands meanwhile; the local result is then dropped.
    InFlight { token: u64, superseded: bool },
    /// Applied locally, echo outstanding.
    AwaitingEcho,
}

/// A reconciled change for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedChange<E> {
    /// Insert or update: replaces an entity with the same id or adds it.
    Upsert(E),
    Remove(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Added,
    Replaced,
    Removed,
    /// Delete for an identifier not in the collection.
    Ignored,
}

/// Ordered set of entities keyed by identifier, plus pending write markers.
///
/// All mutation goes through this type so the identifier set never holds
/// duplicates, whatever the interleaving of feed events and local writes.
#[derive(Debug, Clone)]
pub struct Collection<E: Entity> {
    entities: im::Vector<E>,
    placement: Placement<E>,
    pending: HashMap<String, PendingWrite>,
    next_token: u64,
    /// Set while a change feed delivers echoes of local writes.
    track_echoes: bool,
    creates_in_flight: usize,
    /// Ids removed by the feed while a create was running.
    tombstones: HashSet<String>,
}

impl<E: Entity> Collection<E> {
    pub fn new(placement: Placement<E>) -> Self {
        Self {
            entities: im::Vector::new(),
            placement,
            pending: HashMap::new(),
            next_token: 0,
            track_echoes: false,
            creates_in_flight: 0,
            tombstones: HashSet::new(),
        }
    }

    pub fn entities(&self) -> &im::Vector<E> {
        &self.entities
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

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == id)
    }

    fn resort(&mut self) {
        if let Placement::SortedBy(compare) = self.placement {
            let mut sorted: Vec<E> = self.entities.iter().cloned().collect();
            sorted.sort_by(compare);
            self.entities = sorted.into_iter().collect();
        }
    }

    /// Turns echo markers on while a change feed runs. Turning them off
    /// drops the outstanding ones, as no echo will ever clear them.
    pub fn set_echo_tracking(&mut self, enabled: bool) {
        self.track_echoes = enabled;
        if !enabled {
            self.pending
                .retain(|_, marker| *marker != PendingWrite::AwaitingEcho);
        }
    }

    /// Replaces the whole content. Later duplicates of an identifier are
    /// dropped and echo markers are cleared: the new content covers them.
    pub fn replace_all(&mut self, entities: impl IntoIterator<Item = E>) {
        self.pending
            .retain(|_, marker| *marker != PendingWrite::AwaitingEcho);
        let mut unique: im::Vector<E> = im::Vector::new();
        for entity in entities {
            if !unique.iter().any(|e| e.id() == entity.id()) {
                unique.push_back(entity);
            }
        }
        self.entities = unique;
        self.resort();
    }

    /// Inserts or replaces by identifier. Returns true when it was new.
    pub fn upsert(&mut self, entity: E) -> bool {
        let added = match self.position(entity.id()) {
            Some(index) => {
                self.entities.set(index, entity);
                false
            }
            None => {
                match self.placement {
                    Placement::Prepend => self.entities.push_front(entity),
                    Placement::Append | Placement::SortedBy(_) => self.entities.push_back(entity),
                }
                true
            }
        };
        self.resort();
        added
    }

    pub fn remove(&mut self, id: &str) -> Option<E> {
        let index = self.position(id)?;
        Some(self.entities.remove(index))
    }

    /// Applies one change feed event.
    pub fn apply_feed(&mut self, change: FeedChange<E>) -> FeedOutcome {
        let id = match &change {
            FeedChange::Upsert(entity) => entity.id().to_string(),
            FeedChange::Remove(id) => id.clone(),
        };

        match self.pending.get_mut(&id) {
            Some(PendingWrite::InFlight { superseded, .. }) => *superseded = true,
            Some(PendingWrite::AwaitingEcho) => {
                self.pending.remove(&id);
            }
            None => {}
        }

        if self.creates_in_flight > 0 {
            match &change {
                FeedChange::Remove(_) => {
                    self.tombstones.insert(id);
                }
                FeedChange::Upsert(_) => {
                    self.tombstones.remove(&id);
                }
            }
        }

        match change {
            FeedChange::Upsert(entity) => {
                if self.upsert(entity) {
                    FeedOutcome::Added
                } else {
                    FeedOutcome::Replaced
                }
            }
            FeedChange::Remove(id) => match self.remove(&id) {
                Some(_) => FeedOutcome::Removed,
                None => FeedOutcome::Ignored,
            },
        }
    }

    /// Registers a local write on `id` that is about to hit the remote store.
    pub fn begin_write(&mut self, id: &str) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        self.pending.insert(
            id.to_string(),
            PendingWrite::InFlight {
                token,
                superseded: false,
            },
        );
        token
    }

    /// Closes a successful remote write and tells whether its local result
    /// may still be applied. A feed event for the same id applied in the
    /// meantime wins.
    pub fn finish_write(&mut self, id: &str, token: u64) -> bool {
        match self.pending.get(id).copied() {
            Some(PendingWrite::InFlight { token: current, superseded }) if current == token => {
                if superseded {
                    self.pending.remove(id);
                    false
                } else {
                    self.await_echo(id);
                    true
                }
            }
            _ => true,
        }
    }

    fn await_echo(&mut self, id: &str) {
        if self.track_echoes {
            self.pending.insert(id.to_string(), PendingWrite::AwaitingEcho);
        } else {
            self.pending.remove(id);
        }
    }

    /// Drops the marker of a failed remote write.
    pub fn abort_write(&mut self, id: &str, token: u64) {
        if let Some(PendingWrite::InFlight { token: current, .. }) = self.pending.get(id).copied()
            && current == token
        {
            self.pending.remove(id);
        }
    }

    /// Registers a create whose identifier is not known until the remote
    /// store answers. Feed deletes seen meanwhile are remembered.
    pub fn begin_create(&mut self) {
        self.creates_in_flight += 1;
    }

    /// Closes a failed create.
    pub fn abort_create(&mut self) {
        self.end_create();
    }

    /// True when the feed deleted `id` while a create was running.
    pub fn removed_during_create(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    fn end_create(&mut self) {
        self.creates_in_flight = self.creates_in_flight.saturating_sub(1);
        if self.creates_in_flight == 0 {
            self.tombstones.clear();
        }
    }

    /// Adds an entity the remote store just created and closes the create
    /// opened by [`Collection::begin_create`].
    ///
    /// If the feed delivered it first the feed version stays, and if the
    /// feed already deleted it it stays deleted. Returns true when the
    /// entity was added here.
    pub fn settle_created(&mut self, entity: E) -> bool {
        let deleted = self.tombstones.contains(entity.id());
        self.end_create();
        if deleted || self.contains(entity.id()) {
            return false;
        }
        self.await_echo(entity.id());
        self.upsert(entity);
        true
    }

    /// Removes an entity whose remote deletion was confirmed.
    pub fn settle_removed(&mut self, id: &str) -> Option<E> {
        self.pending.remove(id);
        self.remove(id)
    }

    pub fn pending(&self, id: &str) -> Option<PendingWrite> {
        self.pending.get(id).copied()
    }

    /// Identifiers carrying a pending write marker, sorted.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.keys().cloned().collect();
        ids.sort();
        ids
    }
}
