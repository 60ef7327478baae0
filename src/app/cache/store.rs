//! Cache store
//!
//! The store is the exclusive owner of cache entries. Its public surface is a
//! plain map contract (`has`, `get`, `set`, `delete`); the entry lifecycle
//! operations used by query bindings are crate-private and always return a
//! snapshot of the listeners so that notification happens after the store
//! borrow is released.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::app::query::QueryResult;
use crate::constants::cache;

use super::config::{CacheConfig, SettlementPolicy};
use super::entry::{CacheEntry, EntryState, Listener, Subscriber, SubscriberId};
use super::stats::StoreStats;

/// Requirements for a cache key
pub trait CacheKey: Eq + Hash + Clone + fmt::Debug + 'static {}

impl<K> CacheKey for K where K: Eq + Hash + Clone + fmt::Debug + 'static {}

thread_local! {
    /// Default stores, one per `CacheStore<K, T, E>` type
    static DEFAULT_STORES: RefCell<HashMap<TypeId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Entry state and listener snapshot captured right after a mutation
pub(crate) struct Notification<K, T, E> {
    pub state: EntryState<T, E>,
    pub listeners: Vec<Listener<K, T, E>>,
}

/// Outcome of applying a fetch settlement
pub(crate) enum Settlement<K, T, E> {
    /// The entry was updated
    Applied(Notification<K, T, E>),
    /// The entry no longer exists
    Orphaned,
    /// A newer fetch was issued for the entry
    Superseded,
}

struct StoreState<K, T, E> {
    entries: HashMap<K, CacheEntry<K, T, E>>,
    next_subscriber_id: u64,
    next_fetch_id: u64,
    stats: StoreStats,
}

/// One result queued for delivery to a listener snapshot
struct Pass<K, T, E> {
    result: QueryResult<K, T, E>,
    listeners: Vec<Listener<K, T, E>>,
}

struct StoreShared<K, T, E> {
    config: CacheConfig,
    state: RefCell<StoreState<K, T, E>>,
    passes: RefCell<VecDeque<Pass<K, T, E>>>,
    delivering: Cell<bool>,
}

/// Clears the delivering flag when the drain loop exits
struct DeliveryGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Mapping from key to shared cache entry
///
/// Cloning a store yields another handle to the same key space. Stores built
/// with [`CacheStore::new`] are fully independent of each other.
pub struct CacheStore<K, T, E> {
    shared: Rc<StoreShared<K, T, E>>,
}

impl<K, T, E> Clone for CacheStore<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<K: CacheKey, T: 'static, E: 'static> Default for CacheStore<K, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, E> fmt::Debug for CacheStore<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .shared
            .state
            .try_borrow()
            .map(|state| state.entries.len())
            .unwrap_or_default();
        f.debug_struct("CacheStore")
            .field("config", &self.shared.config)
            .field("entries", &entries)
            .finish()
    }
}

impl<K: CacheKey, T: 'static, E: 'static> CacheStore<K, T, E> {
    /// Create an empty store with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create an empty store with the given configuration
    pub fn with_config(config: CacheConfig) -> Self {
        debug!("Created cache store with {:?}", config);
        Self {
            shared: Rc::new(StoreShared {
                config,
                state: RefCell::new(StoreState {
                    entries: HashMap::new(),
                    next_subscriber_id: cache::FIRST_SUBSCRIBER_ID,
                    next_fetch_id: cache::FIRST_FETCH_ID,
                    stats: StoreStats::new(),
                }),
                passes: RefCell::new(VecDeque::new()),
                delivering: Cell::new(false),
            }),
        }
    }

    /// Default store for this key/data/error type on the current thread
    ///
    /// The first call creates it; later calls return handles to the same store
    /// until it is replaced with [`CacheStore::set_shared`].
    pub fn shared() -> Self {
        DEFAULT_STORES.with(|stores| {
            let mut stores = stores.borrow_mut();
            let slot = stores
                .entry(TypeId::of::<Self>())
                .or_insert_with(|| Box::new(Self::new()) as Box<dyn Any>);
            if let Some(store) = (**slot).downcast_ref::<Self>() {
                return store.clone();
            }
            let store = Self::new();
            *slot = Box::new(store.clone());
            store
        })
    }

    /// Replace the default store for this type on the current thread
    pub fn set_shared(store: Self) {
        DEFAULT_STORES.with(|stores| {
            stores
                .borrow_mut()
                .insert(TypeId::of::<Self>(), Box::new(store));
        });
        debug!("Replaced default cache store");
    }

    /// Store configuration
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Whether both handles refer to the same store
    pub fn same_store(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether an entry exists for `key`
    pub fn has(&self, key: &K) -> bool {
        self.shared.state.borrow().entries.contains_key(key)
    }

    /// Copy of the entry for `key`, if any
    pub fn get(&self, key: &K) -> Option<CacheEntry<K, T, E>> {
        self.shared.state.borrow().entries.get(key).cloned()
    }

    /// Insert or replace the entry for `key`
    pub fn set(&self, key: K, entry: CacheEntry<K, T, E>) -> &Self {
        let mut state = self.shared.state.borrow_mut();
        debug!("Set cache entry {:?}", key);
        if state.entries.insert(key, entry).is_none() {
            state.stats.entries_created += 1;
        }
        self
    }

    /// Remove the entry for `key`, returning whether one was present
    pub fn delete(&self, key: &K) -> bool {
        let mut state = self.shared.state.borrow_mut();
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.stats.entries_removed += 1;
            debug!("Removed cache entry {:?}", key);
        }
        removed
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.shared.state.borrow().entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all entries, in no particular order
    pub fn keys(&self) -> Vec<K> {
        self.shared.state.borrow().entries.keys().cloned().collect()
    }

    /// Number of subscribers observing `key`
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.shared
            .state
            .borrow()
            .entries
            .get(key)
            .map_or(0, CacheEntry::subscriber_count)
    }

    /// Current entry state for `key`
    pub fn state(&self, key: &K) -> Option<EntryState<T, E>> {
        self.shared
            .state
            .borrow()
            .entries
            .get(key)
            .map(|entry| entry.state.clone())
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> StoreStats {
        self.shared.state.borrow().stats
    }

    /// Reset the activity counters
    pub fn reset_stats(&self) {
        self.shared.state.borrow_mut().stats = StoreStats::new();
        debug!("Reset cache store statistics");
    }

    pub(crate) fn allocate_subscriber_id(&self) -> SubscriberId {
        let mut state = self.shared.state.borrow_mut();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        SubscriberId(id)
    }

    /// Register a listener, creating an idle entry if needed
    ///
    /// Returns the entry state at registration time.
    pub(crate) fn subscribe(
        &self,
        key: &K,
        id: SubscriberId,
        listener: Listener<K, T, E>,
    ) -> EntryState<T, E> {
        let mut state = self.shared.state.borrow_mut();
        let state = &mut *state;

        let entry = match state.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                state.stats.entries_created += 1;
                debug!("Created cache entry {:?}", key);
                let mut entry = CacheEntry::new();
                entry.first_fetch = state.next_fetch_id;
                vacant.insert(entry)
            }
        };
        entry.subscribers.push(Subscriber { id, listener });
        state.stats.subscribers_attached += 1;

        trace!(
            "Attached {} to {:?} ({} subscribers)",
            id,
            key,
            entry.subscriber_count()
        );
        entry.state.clone()
    }

    /// Remove a listener, deleting the entry once it has no subscribers left
    ///
    /// Returns whether the subscriber was registered. Unknown ids are ignored.
    pub(crate) fn unsubscribe(&self, key: &K, id: SubscriberId) -> bool {
        let mut state = self.shared.state.borrow_mut();
        let state = &mut *state;

        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        if !entry.remove_subscriber(id) {
            return false;
        }
        state.stats.subscribers_detached += 1;
        trace!("Detached {} from {:?}", id, key);

        if entry.subscribers.is_empty() {
            state.entries.remove(key);
            state.stats.entries_removed += 1;
            debug!("Removed cache entry {:?} after last subscriber left", key);
        }
        true
    }

    /// Mark the entry as loading and allocate a fetch id
    ///
    /// Returns `None` when there is no entry for `key`.
    pub(crate) fn begin_fetch(&self, key: &K) -> Option<(u64, Notification<K, T, E>)> {
        let mut state = self.shared.state.borrow_mut();
        let state = &mut *state;

        let entry = state.entries.get_mut(key)?;
        let fetch_id = state.next_fetch_id;
        state.next_fetch_id += 1;
        state.stats.fetches_started += 1;

        entry.latest_fetch = fetch_id;
        entry.state = entry.state.to_loading();
        debug!("Fetch {} started for {:?}", fetch_id, key);

        Some((
            fetch_id,
            Notification {
                state: entry.state.clone(),
                listeners: entry.listeners(),
            },
        ))
    }

    /// Apply the outcome of fetch `fetch_id` to the entry for `key`
    pub(crate) fn settle(
        &self,
        key: &K,
        fetch_id: u64,
        outcome: Result<T, E>,
    ) -> Settlement<K, T, E> {
        let mut state = self.shared.state.borrow_mut();
        let state = &mut *state;

        let latest_issued = self.shared.config.settlement == SettlementPolicy::LatestIssued;
        let entry = match state.entries.get_mut(key) {
            Some(entry) if !latest_issued || fetch_id >= entry.first_fetch => entry,
            _ => {
                state.stats.settlements_discarded += 1;
                debug!("Discarded fetch {} for {:?}: entry is gone", fetch_id, key);
                return Settlement::Orphaned;
            }
        };

        if latest_issued && entry.latest_fetch != fetch_id {
            state.stats.settlements_discarded += 1;
            debug!(
                "Discarded fetch {} for {:?}: superseded by fetch {}",
                fetch_id, key, entry.latest_fetch
            );
            return Settlement::Superseded;
        }

        entry.state = match outcome {
            Ok(data) => {
                state.stats.fetches_succeeded += 1;
                debug!("Fetch {} succeeded for {:?}", fetch_id, key);
                EntryState::Success {
                    data: Rc::new(data),
                }
            }
            Err(error) => {
                state.stats.fetches_failed += 1;
                debug!("Fetch {} failed for {:?}", fetch_id, key);
                entry.state.to_error(Rc::new(error))
            }
        };

        Settlement::Applied(Notification {
            state: entry.state.clone(),
            listeners: entry.listeners(),
        })
    }

    /// Overwrite the entry data, marking it successful
    ///
    /// Returns `None` when there is no entry for `key`.
    pub(crate) fn write_data(&self, key: &K, data: T) -> Option<Notification<K, T, E>> {
        let mut state = self.shared.state.borrow_mut();
        let state = &mut *state;

        let entry = state.entries.get_mut(key)?;
        entry.state = EntryState::Success {
            data: Rc::new(data),
        };
        state.stats.manual_updates += 1;
        trace!("Data set directly for {:?}", key);

        Some(Notification {
            state: entry.state.clone(),
            listeners: entry.listeners(),
        })
    }

    /// Deliver `result` to every listener of the snapshot, in order
    ///
    /// A pass requested while another one is running (a listener mutating an
    /// entry) is queued and delivered once the running pass has finished, so
    /// every subscriber observes passes in the order the mutations happened.
    pub(crate) fn publish(&self, result: QueryResult<K, T, E>, listeners: Vec<Listener<K, T, E>>) {
        self.shared
            .passes
            .borrow_mut()
            .push_back(Pass { result, listeners });
        if self.shared.delivering.replace(true) {
            trace!("Queued notification pass behind the running one");
            return;
        }
        let _guard = DeliveryGuard(&self.shared.delivering);

        loop {
            let next = self.shared.passes.borrow_mut().pop_front();
            let Some(pass) = next else {
                break;
            };
            for listener in &pass.listeners {
                listener(&pass.result);
            }
            self.shared.state.borrow_mut().stats.notifications_delivered +=
                pass.listeners.len() as u64;
        }
    }
}
