//! Per-consumer query bindings
//!
//! A binding attaches one consumer to the entry for a key. Attaching creates
//! the entry if needed, registers a subscriber and issues a fetch unless one
//! is already in flight, so concurrent consumers of a key share one request.
//! Detaching (explicitly or on drop) removes the subscriber and deletes the
//! entry once nobody observes it anymore.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::app::cache::{CacheKey, CacheStore, Listener, SubscriberId};

use super::fetcher::Fetcher;
use super::result::{QueryHandle, QueryResult};

struct BindingCore<K, T, E> {
    store: CacheStore<K, T, E>,
    fetcher: Rc<dyn Fetcher<T, E>>,
    listener: Box<dyn Fn(&QueryResult<K, T, E>)>,
    key: RefCell<Option<K>>,
    handle: RefCell<Option<QueryHandle<K, T, E>>>,
    subscription: Cell<Option<SubscriberId>>,
    current: RefCell<QueryResult<K, T, E>>,
}

impl<K: CacheKey, T: 'static, E: 'static> BindingCore<K, T, E> {
    /// Attach to `key`, or stay idle if the query is disabled
    fn connect(core: &Rc<Self>, key: Option<K>) {
        *core.key.borrow_mut() = key.clone();

        let Some(key) = key else {
            *core.current.borrow_mut() = QueryResult::disabled();
            debug!("Query disabled, not attaching");
            return;
        };

        let id = core.store.allocate_subscriber_id();
        let weak = Rc::downgrade(core);
        let listener: Listener<K, T, E> = Rc::new(move |result: &QueryResult<K, T, E>| {
            if let Some(core) = weak.upgrade() {
                core.receive(id, result);
            }
        });

        let handle = QueryHandle::new(core.store.clone(), key.clone(), Rc::clone(&core.fetcher));
        let state = core.store.subscribe(&key, id, listener);
        core.subscription.set(Some(id));
        *core.handle.borrow_mut() = Some(handle.clone());
        *core.current.borrow_mut() = QueryResult::new(state.clone(), Some(handle.clone()));

        let revalidate = core.store.config().revalidate_on_attach;
        if state.is_idle() || (revalidate && !state.is_loading()) {
            handle.refetch();
        } else {
            debug!(
                "Attached {} to {:?} without fetching ({:?})",
                id,
                key,
                state.status()
            );
        }
    }

    /// Detach from the current key; safe to call repeatedly
    fn disconnect(&self) {
        let id = self.subscription.take();
        self.key.borrow_mut().take();
        let handle = self.handle.borrow_mut().take();
        if let (Some(id), Some(handle)) = (id, handle) {
            self.store.unsubscribe(handle.key(), id);
        }
    }

    /// Record a result delivered to subscription `id` and forward it
    fn receive(&self, id: SubscriberId, result: &QueryResult<K, T, E>) {
        // Passes already in progress still hold detached listeners
        if self.subscription.get() != Some(id) {
            return;
        }
        *self.current.borrow_mut() = result.clone();
        (self.listener)(result);
    }
}

/// One consumer observing one key
///
/// The binding detaches itself when dropped. Bindings with a key issue their
/// fetches through [`tokio::task::spawn_local`] and therefore have to be used
/// from within a [`tokio::task::LocalSet`].
pub struct QueryBinding<K: CacheKey, T: 'static, E: 'static> {
    core: Rc<BindingCore<K, T, E>>,
}

impl<K: CacheKey, T: 'static, E: 'static> QueryBinding<K, T, E> {
    /// Attach a consumer to `key` in `store`
    ///
    /// `None` disables the query: nothing is stored, the fetcher is never
    /// called and the result stays idle. `listener` is called with every
    /// result published for the entry after the attach itself.
    pub fn attach<F, L>(store: &CacheStore<K, T, E>, key: Option<K>, fetcher: F, listener: L) -> Self
    where
        F: Fetcher<T, E> + 'static,
        L: Fn(&QueryResult<K, T, E>) + 'static,
    {
        let core = Rc::new(BindingCore {
            store: store.clone(),
            fetcher: Rc::new(fetcher),
            listener: Box::new(listener),
            key: RefCell::new(None),
            handle: RefCell::new(None),
            subscription: Cell::new(None),
            current: RefCell::new(QueryResult::disabled()),
        });
        BindingCore::connect(&core, key);
        Self { core }
    }

    /// Attach a consumer to `key` in the default store of this thread
    pub fn attach_shared<F, L>(key: Option<K>, fetcher: F, listener: L) -> Self
    where
        F: Fetcher<T, E> + 'static,
        L: Fn(&QueryResult<K, T, E>) + 'static,
    {
        Self::attach(&CacheStore::shared(), key, fetcher, listener)
    }

    /// Latest result observed by this binding
    pub fn current(&self) -> QueryResult<K, T, E> {
        self.core.current.borrow().clone()
    }

    /// Key currently observed, `None` if disabled or detached
    pub fn key(&self) -> Option<K> {
        self.core.key.borrow().clone()
    }

    /// Store this binding attaches to
    pub fn store(&self) -> &CacheStore<K, T, E> {
        &self.core.store
    }

    /// Whether the binding is registered as a subscriber
    pub fn is_attached(&self) -> bool {
        self.core.subscription.get().is_some()
    }

    /// Subscription id of the current attachment
    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.core.subscription.get()
    }

    /// Fetch again; no-op when disabled or detached
    pub fn refetch(&self) {
        let handle = self.core.handle.borrow().clone();
        if let Some(handle) = handle {
            handle.refetch();
        }
    }

    /// Overwrite the entry data without fetching; no-op when disabled or detached
    pub fn set_data(&self, data: T) {
        let handle = self.core.handle.borrow().clone();
        if let Some(handle) = handle {
            handle.set_data(data);
        }
    }

    /// Switch to another key: detach from the old one and attach to the new one
    pub fn rebind(&self, key: Option<K>) {
        if *self.core.key.borrow() == key {
            return;
        }
        debug!("Rebinding query to {:?}", key);
        self.core.disconnect();
        BindingCore::connect(&self.core, key);
    }

    /// Stop observing the entry; further calls have no effect
    pub fn detach(&self) {
        self.core.disconnect();
    }
}

impl<K: CacheKey, T: 'static, E: 'static> Drop for QueryBinding<K, T, E> {
    fn drop(&mut self) {
        self.core.disconnect();
    }
}

impl<K: CacheKey, T: 'static, E: 'static> fmt::Debug for QueryBinding<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBinding")
            .field("key", &self.core.key.borrow())
            .field("subscription", &self.core.subscription.get())
            .finish_non_exhaustive()
    }
}
