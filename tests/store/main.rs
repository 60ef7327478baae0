//! Integration tests for cache stores
//!
//! Covers store isolation, the per-thread shared store, entry lifetime,
//! statistics and the two settlement policies for overlapping fetches.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use query_cache::app::query::Fetcher;
use query_cache::app::{
    CacheConfig, CacheEntry, CacheStore, EntryState, QueryBinding, SettlementPolicy, from_fn,
};
use tokio::sync::oneshot;
use tokio::task::LocalSet;

type Store = CacheStore<&'static str, u32, String>;

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Fetcher whose settlements the test releases explicitly
#[derive(Default)]
struct Gates {
    pending: RefCell<VecDeque<oneshot::Receiver<Result<u32, String>>>>,
    calls: Cell<u32>,
}

impl Gates {
    fn next(&self) -> oneshot::Sender<Result<u32, String>> {
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().push_back(rx);
        tx
    }

    fn fetcher(self: &Rc<Self>) -> impl Fetcher<u32, String> {
        let gates = Rc::clone(self);
        move || {
            gates.calls.set(gates.calls.get() + 1);
            let gate = gates.pending.borrow_mut().pop_front();
            async move {
                match gate {
                    Some(gate) => gate
                        .await
                        .unwrap_or_else(|_| Err("gate dropped".to_string())),
                    None => Err("no gate prepared".to_string()),
                }
            }
        }
    }
}

/// Issue a slow fetch followed by a fast one, settling the fast one first
async fn race(policy: SettlementPolicy) -> (Store, QueryBinding<&'static str, u32, String>) {
    let store = Store::with_config(CacheConfig::default().with_settlement(policy));
    let gates = Rc::new(Gates::default());
    let slow = gates.next();
    let fast = gates.next();

    let binding = QueryBinding::attach(&store, Some("race"), gates.fetcher(), |_| {});
    binding.refetch();
    assert_eq!(gates.calls.get(), 2);

    fast.send(Ok(2)).unwrap();
    settle().await;
    slow.send(Ok(1)).unwrap();
    settle().await;

    (store, binding)
}

#[tokio::test]
async fn test_independent_stores() {
    LocalSet::new()
        .run_until(async {
            let first_store = Store::new();
            let second_store = Store::new();
            let calls = Rc::new(Cell::new(0));

            let make_fetcher = || {
                let calls = Rc::clone(&calls);
                from_fn(move || {
                    calls.set(calls.get() + 1);
                    Ok::<u32, String>(calls.get())
                })
            };

            let first = QueryBinding::attach(&first_store, Some("k"), make_fetcher(), |_| {});
            let second = QueryBinding::attach(&second_store, Some("k"), make_fetcher(), |_| {});
            settle().await;

            assert_eq!(calls.get(), 2);
            assert!(!first_store.same_store(&second_store));
            assert_eq!(first_store.subscriber_count(&"k"), 1);
            assert_eq!(second_store.subscriber_count(&"k"), 1);

            first.set_data(100);
            assert_eq!(first.current().data(), Some(&100));
            assert_ne!(second.current().data(), Some(&100));
        })
        .await;
}

#[tokio::test]
async fn test_shared_store_per_thread() {
    LocalSet::new()
        .run_until(async {
            let store: CacheStore<String, u32, String> = CacheStore::shared();
            assert!(store.same_store(&CacheStore::shared()));

            let binding: QueryBinding<String, u32, String> =
                QueryBinding::attach_shared(Some("shared".to_string()), from_fn(|| Ok(1)), |_| {});
            assert!(binding.store().same_store(&store));
            assert!(store.has(&"shared".to_string()));

            // A different type parameterization is a different store
            let other: CacheStore<String, String, String> = CacheStore::shared();
            assert!(other.is_empty());

            let replacement: CacheStore<String, u32, String> = CacheStore::new();
            CacheStore::set_shared(replacement.clone());
            assert!(CacheStore::<String, u32, String>::shared().same_store(&replacement));
            assert!(!binding.store().same_store(&replacement));

            binding.detach();
            assert!(store.is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_entry_lifetime_follows_subscribers() {
    LocalSet::new()
        .run_until(async {
            let store = Store::new();
            let first = QueryBinding::attach(&store, Some("k"), from_fn(|| Ok(1)), |_| {});
            let second = QueryBinding::attach(&store, Some("k"), from_fn(|| Ok(1)), |_| {});
            assert_eq!(store.len(), 1);
            assert_eq!(store.subscriber_count(&"k"), 2);

            first.detach();
            first.detach();
            assert_eq!(store.subscriber_count(&"k"), 1);

            drop(second);
            assert!(store.is_empty());
            assert_eq!(store.subscriber_count(&"k"), 0);
            assert!(store.state(&"k").is_none());

            let stats = store.stats();
            assert_eq!(stats.entries_created, 1);
            assert_eq!(stats.entries_removed, 1);
            assert_eq!(stats.subscribers_attached, 2);
            assert_eq!(stats.subscribers_detached, 2);
            assert_eq!(stats.live_entries(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_orphaned_settlement_discarded() {
    LocalSet::new()
        .run_until(async {
            let store = Store::new();
            let gates = Rc::new(Gates::default());
            let release = gates.next();

            let binding = QueryBinding::attach(&store, Some("k"), gates.fetcher(), |_| {});
            let handle = binding.current();
            drop(binding);
            assert!(store.is_empty());

            release.send(Ok(5)).unwrap();
            settle().await;

            // Neither the settlement nor a late action recreates the entry
            handle.set_data(6);
            handle.refetch();
            assert!(store.is_empty());
            assert_eq!(gates.calls.get(), 1);
            assert_eq!(store.stats().settlements_discarded, 1);
        })
        .await;
}

/// Attach, detach and re-attach "k", then settle the new fetch before the old one
async fn reattach(policy: SettlementPolicy) -> (Store, QueryBinding<&'static str, u32, String>) {
    let store = Store::with_config(CacheConfig::default().with_settlement(policy));
    let gates = Rc::new(Gates::default());
    let first_release = gates.next();
    let second_release = gates.next();

    let binding = QueryBinding::attach(&store, Some("k"), gates.fetcher(), |_| {});
    binding.detach();
    let again = QueryBinding::attach(&store, Some("k"), gates.fetcher(), |_| {});
    assert_eq!(gates.calls.get(), 2);
    assert_eq!(store.stats().entries_created, 2);

    second_release.send(Ok(2)).unwrap();
    settle().await;
    assert_eq!(again.current().data(), Some(&2));

    first_release.send(Ok(1)).unwrap();
    settle().await;

    (store, again)
}

#[tokio::test]
async fn test_reattach_takes_last_settlement() {
    LocalSet::new()
        .run_until(async {
            let (store, again) = reattach(SettlementPolicy::LastSettled).await;

            assert_eq!(again.current().data(), Some(&1));
            assert_eq!(store.stats().settlements_discarded, 0);
            assert_eq!(store.len(), 1);
        })
        .await;
}

#[tokio::test]
async fn test_reattach_ignores_earlier_entry_fetch_when_latest_issued() {
    LocalSet::new()
        .run_until(async {
            let (store, again) = reattach(SettlementPolicy::LatestIssued).await;

            assert_eq!(again.current().data(), Some(&2));
            assert_eq!(store.stats().settlements_discarded, 1);
        })
        .await;
}

#[tokio::test]
async fn test_last_settled_wins_by_default() {
    LocalSet::new()
        .run_until(async {
            let (store, binding) = race(SettlementPolicy::LastSettled).await;

            assert_eq!(binding.current().data(), Some(&1));
            let stats = store.stats();
            assert_eq!(stats.fetches_started, 2);
            assert_eq!(stats.fetches_succeeded, 2);
            assert_eq!(stats.settlements_discarded, 0);
        })
        .await;
}

#[tokio::test]
async fn test_latest_issued_discards_superseded() {
    LocalSet::new()
        .run_until(async {
            let (store, binding) = race(SettlementPolicy::LatestIssued).await;

            assert_eq!(binding.current().data(), Some(&2));
            let stats = store.stats();
            assert_eq!(stats.fetches_started, 2);
            assert_eq!(stats.fetches_succeeded, 1);
            assert_eq!(stats.settlements_discarded, 1);
            assert_eq!(stats.fetches_in_flight(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_revalidation_can_be_disabled() {
    LocalSet::new()
        .run_until(async {
            let store = Store::with_config(CacheConfig::default().with_revalidate_on_attach(false));
            let calls = Rc::new(Cell::new(0));
            let counter = Rc::clone(&calls);
            let fetcher = Rc::new(from_fn(move || {
                counter.set(counter.get() + 1);
                Ok::<u32, String>(7)
            }));

            let first_fetcher = Rc::clone(&fetcher);
            let _first =
                QueryBinding::attach(&store, Some("k"), move || first_fetcher.fetch(), |_| {});
            settle().await;

            let second_fetcher = Rc::clone(&fetcher);
            let second =
                QueryBinding::attach(&store, Some("k"), move || second_fetcher.fetch(), |_| {});
            assert_eq!(calls.get(), 1);
            assert!(second.current().is_success());
            assert_eq!(second.current().data(), Some(&7));
        })
        .await;
}

#[test]
fn test_map_operations() {
    let store = Store::new();
    assert!(!store.has(&"k"));
    assert!(store.get(&"k").is_none());
    assert!(!store.delete(&"k"));

    store.set("k", CacheEntry::new()).set("j", CacheEntry::new());
    assert_eq!(store.len(), 2);
    assert!(store.has(&"k"));
    assert!(matches!(store.state(&"k"), Some(EntryState::Idle { data: None })));

    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, vec!["j", "k"]);

    assert!(store.delete(&"k"));
    assert!(!store.has(&"k"));
    assert_eq!(store.len(), 1);
}
