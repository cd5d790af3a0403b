//! The record store: accumulation map, bbox cache and loader phase in one
//! owned object.
//!
//! Every mutation is tagged with the [`Epoch`] the writer started under. A
//! reset (filter or refresh change) bumps the epoch, so writes from sessions
//! begun under an older filter are refused instead of leaking into the new
//! collection.

mod cache;
mod phase;

pub use cache::BboxCache;
pub use phase::{LoadPhase, TransitionError};

use std::sync::{Arc, Weak};

use ahash::RandomState;
use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::record::Record;
use crate::viewport::Bbox;

/// Generation counter bumped on every reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("write from epoch {writer} refused, store is at epoch {current}")]
    StaleEpoch { writer: u64, current: u64 },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("initial load already completed for epoch {0}")]
    SeedAlreadyComplete(u64),
}

/// Immutable view of the store handed to render subscribers
#[derive(Debug, Clone)]
pub struct RecordSnapshot {
    pub records: Vec<Record>,
    pub revision: u64,
    pub loading: bool,
    pub initial_load_complete: bool,
}

/// Render surface hook, called after every published change
pub trait RecordSubscriber: Send + Sync {
    fn on_records_changed(&self, snapshot: &RecordSnapshot);
}

struct StoreState {
    records: IndexMap<String, Record, RandomState>,
    cache: BboxCache,
    phase: LoadPhase,
    epoch: u64,
    revision: u64,
}

/// Shared store for the renderable record collection
pub struct RecordStore {
    state: RwLock<StoreState>,
    subscribers: RwLock<Vec<Weak<dyn RecordSubscriber>>>,
}

impl RecordStore {
    /// Create an empty store awaiting its seed
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                records: IndexMap::with_hasher(RandomState::new()),
                cache: BboxCache::new(),
                phase: LoadPhase::Seeding,
                epoch: 0,
                revision: 0,
            }),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.state.read().epoch)
    }

    /// Loading indicator exposed to the render surface
    pub fn is_loading(&self) -> bool {
        self.state.read().phase.is_loading()
    }

    pub fn initial_load_complete(&self) -> bool {
        self.state.read().phase.initial_load_complete()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.state.read().records.get(id).cloned()
    }

    /// Records in first-seen order
    pub fn records(&self) -> Vec<Record> {
        self.state.read().records.values().cloned().collect()
    }

    pub fn is_cached(&self, bbox: &Bbox) -> bool {
        self.state.read().cache.has(bbox)
    }

    pub fn cached_count(&self) -> usize {
        self.state.read().cache.len()
    }

    pub fn snapshot(&self) -> RecordSnapshot {
        let state = self.state.read();
        RecordSnapshot {
            records: state.records.values().cloned().collect(),
            revision: state.revision,
            loading: state.phase.is_loading(),
            initial_load_complete: state.phase.initial_load_complete(),
        }
    }

    /// Start a new epoch: clear records and cache, and wait for a new seed
    pub fn reset(&self) -> Epoch {
        let epoch = {
            let mut state = self.state.write();
            state.epoch += 1;
            state.records.clear();
            state.cache.clear();
            state.phase = LoadPhase::Seeding;
            state.revision += 1;
            state.epoch
        };
        debug!(epoch, "record store reset");
        self.publish();
        Epoch(epoch)
    }

    /// Clear records and cache ahead of a reset reload, keeping the phase
    pub fn clear_for_reload(&self, epoch: Epoch) -> Result<(), StoreError> {
        self.write(epoch, |state| {
            state.records.clear();
            state.cache.clear();
            Ok(())
        })
    }

    /// Merge records by id. Existing ids are overwritten in place.
    ///
    /// Returns the number of records written.
    pub fn merge<I>(&self, epoch: Epoch, records: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = Record>,
    {
        self.write(epoch, |state| {
            let mut written = 0;
            for record in records {
                state.records.insert(record.id.clone(), record);
                written += 1;
            }
            Ok(written)
        })
    }

    /// Record a bbox as fully loaded
    pub fn mark_loaded(&self, epoch: Epoch, bbox: &Bbox) -> Result<(), StoreError> {
        self.write(epoch, |state| {
            state.cache.record(bbox);
            Ok(())
        })
    }

    /// Install the seed snapshot and settle `Seeding -> Idle`, exactly once
    /// per epoch.
    ///
    /// A second seed for the same epoch is refused before any record is
    /// touched, so bboxes already cached keep their records.
    pub fn seed<I>(&self, epoch: Epoch, records: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = Record>,
    {
        self.write(epoch, |state| {
            if state.phase != LoadPhase::Seeding {
                return Err(StoreError::SeedAlreadyComplete(state.epoch));
            }
            let phase = state.phase.transition(LoadPhase::Idle)?;
            state.records.clear();
            for record in records {
                state.records.insert(record.id.clone(), record);
            }
            state.phase = phase;
            Ok(state.records.len())
        })
    }

    /// Raise the loading indicator for a viewport session
    pub fn begin_loading(&self, epoch: Epoch) -> Result<(), StoreError> {
        self.write(epoch, |state| {
            state.phase = state.phase.transition(LoadPhase::Loading)?;
            Ok(())
        })
    }

    /// Clear the loading indicator once a session's first page settles
    pub fn settle_loading(&self, epoch: Epoch) -> Result<(), StoreError> {
        self.write(epoch, |state| {
            if state.phase == LoadPhase::Seeding {
                return Err(TransitionError {
                    from: LoadPhase::Seeding,
                    to: LoadPhase::Idle,
                }
                .into());
            }
            state.phase = state.phase.transition(LoadPhase::Idle)?;
            Ok(())
        })
    }

    /// Register a render subscriber
    pub fn subscribe(&self, subscriber: Arc<dyn RecordSubscriber>) {
        self.subscribers.write().push(Arc::downgrade(&subscriber));
    }

    /// Apply an epoch-checked mutation and publish on success
    fn write<T>(
        &self,
        epoch: Epoch,
        f: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let result = {
            let mut state = self.state.write();
            if state.epoch != epoch.0 {
                return Err(StoreError::StaleEpoch {
                    writer: epoch.0,
                    current: state.epoch,
                });
            }
            let result = f(&mut *state)?;
            state.revision += 1;
            result
        };
        self.publish();
        Ok(result)
    }

    /// Notify live subscribers with a fresh snapshot
    fn publish(&self) {
        let live: Vec<Arc<dyn RecordSubscriber>> = {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        if live.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for subscriber in live {
            subscriber.on_records_changed(&snapshot);
        }
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn record(id: &str, recent: f64) -> Record {
        Record {
            id: id.to_string(),
            name: id.to_string(),
            region: "Shirur".to_string(),
            area: 1.0,
            recent_health: recent,
            previous_health: 0.0,
            ready: false,
            boundary: vec![[19.0, 73.0]],
        }
    }

    fn seeded() -> (RecordStore, Epoch) {
        let store = RecordStore::new();
        let epoch = store.epoch();
        store.seed(epoch, Vec::new()).unwrap();
        (store, epoch)
    }

    #[test]
    fn test_merge_is_idempotent_and_last_write_wins() {
        let (store, epoch) = seeded();

        store.merge(epoch, vec![record("a", 0.1), record("b", 0.2)]).unwrap();
        store.merge(epoch, vec![record("a", 0.9)]).unwrap();
        store.merge(epoch, vec![record("a", 0.9)]).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().recent_health, 0.9);
        // Overwrite keeps the original position
        assert_eq!(store.records()[0].id, "a");
    }

    #[test]
    fn test_reset_clears_and_refuses_stale_writers() {
        let (store, old) = seeded();
        let bbox = Bbox::new(0.0, 0.0, 1.0, 1.0);
        store.merge(old, vec![record("a", 0.5)]).unwrap();
        store.mark_loaded(old, &bbox).unwrap();

        let new = store.reset();
        assert!(store.is_empty());
        assert!(!store.is_cached(&bbox));
        assert!(!store.initial_load_complete());

        assert!(matches!(
            store.merge(old, vec![record("z", 0.5)]),
            Err(StoreError::StaleEpoch { .. })
        ));
        assert!(store.mark_loaded(old, &bbox).is_err());
        assert!(store.is_empty());

        store.seed(new, Vec::new()).unwrap();
        assert!(store.initial_load_complete());
    }

    #[test]
    fn test_second_seed_leaves_loaded_records_alone() {
        let store = RecordStore::new();
        let epoch = store.epoch();
        let bbox = Bbox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(store.seed(epoch, vec![record("seed", 0.4)]).unwrap(), 1);
        store.merge(epoch, vec![record("a", 0.5)]).unwrap();
        store.mark_loaded(epoch, &bbox).unwrap();
        let revision = store.snapshot().revision;

        assert_eq!(
            store.seed(epoch, vec![record("other", 0.1)]),
            Err(StoreError::SeedAlreadyComplete(0))
        );

        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_some());
        assert!(store.get("other").is_none());
        assert!(store.is_cached(&bbox));
        assert_eq!(store.snapshot().revision, revision);
    }

    #[test]
    fn test_loading_requires_seed() {
        let store = RecordStore::new();
        let epoch = store.epoch();
        assert!(store.is_loading());
        assert!(matches!(
            store.begin_loading(epoch),
            Err(StoreError::Transition(_))
        ));
        assert!(store.settle_loading(epoch).is_err());

        store.seed(epoch, Vec::new()).unwrap();
        store.begin_loading(epoch).unwrap();
        assert!(store.is_loading());
        store.settle_loading(epoch).unwrap();
        assert!(!store.is_loading());
    }

    #[derive(Default)]
    struct Counter {
        revisions: Mutex<Vec<(u64, usize)>>,
    }

    impl RecordSubscriber for Counter {
        fn on_records_changed(&self, snapshot: &RecordSnapshot) {
            self.revisions
                .lock()
                .push((snapshot.revision, snapshot.records.len()));
        }
    }

    #[test]
    fn test_subscribers_see_each_publish() {
        let (store, epoch) = seeded();
        let counter = Arc::new(Counter::default());
        store.subscribe(counter.clone());

        store.merge(epoch, vec![record("a", 0.1)]).unwrap();
        store.merge(epoch, vec![record("b", 0.1)]).unwrap();

        let seen = counter.revisions.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].1, 2);
        assert!(seen[0].0 < seen[1].0);
    }
}
