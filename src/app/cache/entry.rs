//! Cache entry model
//!
//! An entry is the shared record for one key: its fetch state and the ordered
//! list of subscribers observing it. The state is a tagged union so that an
//! error can only exist on a failed entry and successful entries always carry
//! data.

use std::fmt;
use std::rc::Rc;

use crate::app::query::QueryResult;

/// Identifier of one subscription within a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    /// Raw numeric value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Notification callback registered by a binding
pub type Listener<K, T, E> = Rc<dyn Fn(&QueryResult<K, T, E>)>;

/// Externally visible fetch status. Idle entries have no status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Loading => "loading",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch state of an entry
///
/// `data` survives transitions into `Loading` and `Error`; it is only replaced
/// by a new success.
pub enum EntryState<T, E> {
    /// No fetch has been issued yet
    Idle { data: Option<Rc<T>> },
    /// A fetch is in flight
    Loading { data: Option<Rc<T>> },
    /// The last fetch (or an explicit set) produced data
    Success { data: Rc<T> },
    /// The last fetch failed
    Error { data: Option<Rc<T>>, error: Rc<E> },
}

impl<T, E> EntryState<T, E> {
    /// Status of this state, `None` while idle
    pub fn status(&self) -> Option<QueryStatus> {
        match self {
            EntryState::Idle { .. } => None,
            EntryState::Loading { .. } => Some(QueryStatus::Loading),
            EntryState::Success { .. } => Some(QueryStatus::Success),
            EntryState::Error { .. } => Some(QueryStatus::Error),
        }
    }

    /// Last known data, if any
    pub fn data(&self) -> Option<&Rc<T>> {
        match self {
            EntryState::Idle { data }
            | EntryState::Loading { data }
            | EntryState::Error { data, .. } => data.as_ref(),
            EntryState::Success { data } => Some(data),
        }
    }

    /// Error of a failed entry
    pub fn error(&self) -> Option<&Rc<E>> {
        match self {
            EntryState::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, EntryState::Idle { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, EntryState::Loading { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EntryState::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EntryState::Error { .. })
    }

    /// Loading state that keeps the current data and drops any error
    pub fn to_loading(&self) -> Self {
        EntryState::Loading {
            data: self.data().cloned(),
        }
    }

    /// Error state that keeps the current data
    pub fn to_error(&self, error: Rc<E>) -> Self {
        EntryState::Error {
            data: self.data().cloned(),
            error,
        }
    }
}

impl<T, E> Default for EntryState<T, E> {
    fn default() -> Self {
        EntryState::Idle { data: None }
    }
}

impl<T, E> Clone for EntryState<T, E> {
    fn clone(&self) -> Self {
        match self {
            EntryState::Idle { data } => EntryState::Idle { data: data.clone() },
            EntryState::Loading { data } => EntryState::Loading { data: data.clone() },
            EntryState::Success { data } => EntryState::Success {
                data: Rc::clone(data),
            },
            EntryState::Error { data, error } => EntryState::Error {
                data: data.clone(),
                error: Rc::clone(error),
            },
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for EntryState<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Idle { data } => f.debug_struct("Idle").field("data", data).finish(),
            EntryState::Loading { data } => f.debug_struct("Loading").field("data", data).finish(),
            EntryState::Success { data } => f.debug_struct("Success").field("data", data).finish(),
            EntryState::Error { data, error } => f
                .debug_struct("Error")
                .field("data", data)
                .field("error", error)
                .finish(),
        }
    }
}

/// One registered subscriber
pub struct Subscriber<K, T, E> {
    pub id: SubscriberId,
    pub listener: Listener<K, T, E>,
}

impl<K, T, E> Clone for Subscriber<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Rc::clone(&self.listener),
        }
    }
}

/// Shared cache record for one key
pub struct CacheEntry<K, T, E> {
    /// Current fetch state
    pub state: EntryState<T, E>,
    /// Subscribers in attach order
    pub subscribers: Vec<Subscriber<K, T, E>>,
    /// Id of the most recently issued fetch, 0 if none
    pub latest_fetch: u64,
    /// Lowest fetch id issued for this entry; older fetches belong to a removed entry
    pub first_fetch: u64,
}

impl<K, T, E> CacheEntry<K, T, E> {
    /// Create an idle entry without subscribers
    pub fn new() -> Self {
        Self {
            state: EntryState::default(),
            subscribers: Vec::new(),
            latest_fetch: 0,
            first_fetch: 0,
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether the given subscriber is registered
    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.iter().any(|s| s.id == id)
    }

    /// Remove a subscriber, returning whether it was present
    pub fn remove_subscriber(&mut self, id: SubscriberId) -> bool {
        match self.subscribers.iter().position(|s| s.id == id) {
            Some(index) => {
                self.subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the listeners, in attach order
    pub fn listeners(&self) -> Vec<Listener<K, T, E>> {
        self.subscribers
            .iter()
            .map(|s| Rc::clone(&s.listener))
            .collect()
    }
}

impl<K, T, E> Default for CacheEntry<K, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, E> Clone for CacheEntry<K, T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            subscribers: self.subscribers.clone(),
            latest_fetch: self.latest_fetch,
            first_fetch: self.first_fetch,
        }
    }
}

impl<K, T: fmt::Debug, E: fmt::Debug> fmt::Debug for CacheEntry<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("state", &self.state)
            .field(
                "subscribers",
                &self.subscribers.iter().map(|s| s.id).collect::<Vec<_>>(),
            )
            .field("latest_fetch", &self.latest_fetch)
            .field("first_fetch", &self.first_fetch)
            .finish()
    }
}
