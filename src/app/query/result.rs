//! Query results and the actions they carry
//!
//! A [`QueryResult`] is an immutable projection of an entry at one point in
//! time. Every result carries the `set_data` and `refetch` actions, which act
//! on the shared entry through a [`QueryHandle`].

use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::app::cache::{CacheKey, CacheStore, EntryState, QueryStatus};
use crate::app::cache::store::{Notification, Settlement};

use super::fetcher::Fetcher;

/// Store, key and fetcher of one query
///
/// All entry mutations and notification passes go through a handle.
pub struct QueryHandle<K, T, E> {
    store: CacheStore<K, T, E>,
    key: K,
    fetcher: Rc<dyn Fetcher<T, E>>,
}

impl<K: Clone, T, E> Clone for QueryHandle<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
            fetcher: Rc::clone(&self.fetcher),
        }
    }
}

impl<K: fmt::Debug, T, E> fmt::Debug for QueryHandle<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<K: CacheKey, T: 'static, E: 'static> QueryHandle<K, T, E> {
    pub(crate) fn new(store: CacheStore<K, T, E>, key: K, fetcher: Rc<dyn Fetcher<T, E>>) -> Self {
        Self {
            store,
            key,
            fetcher,
        }
    }

    /// Key this handle acts on
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Store this handle acts on
    pub fn store(&self) -> &CacheStore<K, T, E> {
        &self.store
    }

    /// Mark the entry as loading, notify, and start a fetch
    ///
    /// Does nothing if the entry no longer exists. The fetch future is driven
    /// with [`tokio::task::spawn_local`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a [`tokio::task::LocalSet`].
    pub fn refetch(&self) {
        let Some((fetch_id, notification)) = self.store.begin_fetch(&self.key) else {
            debug!("Skipped refetch for {:?}: no entry", self.key);
            return;
        };
        self.notify(notification);

        let fetch = self.fetcher.fetch();
        let handle = self.clone();
        tokio::task::spawn_local(async move {
            let outcome = fetch.await;
            handle.settle(fetch_id, outcome);
        });
    }

    /// Mark the entry as successful with `data` and notify, without fetching
    pub fn set_data(&self, data: T) {
        match self.store.write_data(&self.key, data) {
            Some(notification) => self.notify(notification),
            None => debug!("Dropped data for {:?}: no entry", self.key),
        }
    }

    fn settle(&self, fetch_id: u64, outcome: Result<T, E>) {
        if let Settlement::Applied(notification) = self.store.settle(&self.key, fetch_id, outcome)
        {
            self.notify(notification);
        }
    }

    /// Publish one result for the snapshot's listeners
    fn notify(&self, notification: Notification<K, T, E>) {
        let Notification { state, listeners } = notification;
        let result = QueryResult::new(state, Some(self.clone()));
        trace!(
            "Notifying {} subscribers of {:?} ({:?})",
            listeners.len(),
            self.key,
            result.status()
        );
        self.store.publish(result, listeners);
    }
}

/// Read-only view of an entry plus its actions
pub struct QueryResult<K, T, E> {
    state: EntryState<T, E>,
    handle: Option<QueryHandle<K, T, E>>,
}

impl<K: Clone, T, E> Clone for QueryResult<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<K, T, E> QueryResult<K, T, E> {
    pub(crate) fn new(state: EntryState<T, E>, handle: Option<QueryHandle<K, T, E>>) -> Self {
        Self { state, handle }
    }

    /// Result of a disabled query: idle, with inert actions
    pub(crate) fn disabled() -> Self {
        Self::new(EntryState::default(), None)
    }

    /// Underlying entry state
    pub fn state(&self) -> &EntryState<T, E> {
        &self.state
    }

    /// Status, `None` while idle
    pub fn status(&self) -> Option<QueryStatus> {
        self.state.status()
    }

    /// Last known data
    pub fn data(&self) -> Option<&T> {
        self.state.data().map(|data| data.as_ref())
    }

    /// Last known data, shared with every other observer of the entry
    pub fn shared_data(&self) -> Option<Rc<T>> {
        self.state.data().cloned()
    }

    /// Error of a failed fetch
    pub fn error(&self) -> Option<&E> {
        self.state.error().map(|error| error.as_ref())
    }

    /// Error of a failed fetch, shared with every other observer of the entry
    pub fn shared_error(&self) -> Option<Rc<E>> {
        self.state.error().cloned()
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }

    pub fn is_error(&self) -> bool {
        self.state.is_error()
    }

    /// Key of the query, `None` for a disabled query
    pub fn key(&self) -> Option<&K> {
        self.handle.as_ref().map(|handle| &handle.key)
    }
}

impl<K: CacheKey, T: 'static, E: 'static> QueryResult<K, T, E> {
    /// Overwrite the entry data for every subscriber. No-op for a disabled query.
    pub fn set_data(&self, data: T) {
        if let Some(handle) = &self.handle {
            handle.set_data(data);
        }
    }

    /// Fetch again for every subscriber. No-op for a disabled query.
    pub fn refetch(&self) {
        if let Some(handle) = &self.handle {
            handle.refetch();
        }
    }
}

impl<K: fmt::Debug, T: fmt::Debug, E: fmt::Debug> fmt::Debug for QueryResult<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("key", &self.handle.as_ref().map(|handle| &handle.key))
            .field("status", &self.status())
            .field("data", &self.data())
            .field("error", &self.error())
            .field("is_loading", &self.is_loading())
            .field("is_success", &self.is_success())
            .field("is_error", &self.is_error())
            .finish()
    }
}
