//! Fetcher abstraction
//!
//! A fetcher produces fresh data for a key. It is called synchronously when a
//! fetch is issued and hands back a future; the future's `Err` is the only
//! error channel and is stored on the entry verbatim.

use std::future::Future;

use futures::future::{self, FutureExt, LocalBoxFuture};

/// Future returned by a fetcher
pub type FetchFuture<T, E> = LocalBoxFuture<'static, Result<T, E>>;

/// Producer of fresh data for a key
pub trait Fetcher<T, E> {
    /// Start a fetch
    fn fetch(&self) -> FetchFuture<T, E>;
}

impl<T, E, F, Fut> Fetcher<T, E> for F
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    fn fetch(&self) -> FetchFuture<T, E> {
        (self)().boxed_local()
    }
}

/// Fetcher backed by a synchronous function, see [`from_fn`]
#[derive(Debug, Clone)]
pub struct FromFn<F>(F);

impl<T, E, F> Fetcher<T, E> for FromFn<F>
where
    T: 'static,
    E: 'static,
    F: Fn() -> Result<T, E>,
{
    fn fetch(&self) -> FetchFuture<T, E> {
        future::ready((self.0)()).boxed_local()
    }
}

/// Adapt a synchronous function into a fetcher
///
/// The function runs when the fetch is issued; its result is still applied
/// on a later turn, like any asynchronous settlement.
pub fn from_fn<T, E, F>(f: F) -> FromFn<F>
where
    F: Fn() -> Result<T, E>,
{
    FromFn(f)
}
