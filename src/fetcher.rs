//! The fetcher contract: the caller-supplied asynchronous retrieval function.

use std::future::Future;

use crate::types::{ErrorBounds, ValueBounds};

/// A zero-argument asynchronous operation producing a value or failing with an error
///
/// The engine treats the fetcher as opaque: it is invoked anew on every
/// reconcile that is neither deduped nor joined to a running fetch, and there is
/// no cancellation token. Transport, parsing and persistence are entirely its
/// business.
///
/// The returned future must own everything it needs (`'static`) because the
/// engine runs it on its own task, so that a fetch started before an activation
/// detaches still runs to completion.
///
/// ## Example
///
/// ```rust
/// use swr_engine::fetcher::Fetcher;
///
/// #[derive(Clone)]
/// struct UserFetcher {
///     id: u32,
/// }
///
/// impl Fetcher for UserFetcher {
///     type Output = String;
///     type Error = String;
///
///     fn fetch(&self) -> impl Future<Output = Result<String, String>> + Send + 'static {
///         let id = self.id;
///         async move { Ok(format!("User {id}")) }
///     }
/// }
/// ```
pub trait Fetcher: Clone + Send + Sync + 'static {
    /// The type of data returned on success
    type Output: ValueBounds;
    /// The type of error returned on failure
    type Error: ErrorBounds;

    /// Execute the retrieval
    fn fetch(&self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send + 'static;
}

/// Adapter turning a closure returning a future into a [`Fetcher`]
#[derive(Clone)]
pub struct FnFetcher<F> {
    f: F,
}

/// Wraps `f` as a [`Fetcher`].
///
/// ```rust
/// use swr_engine::fetcher::fetcher_fn;
///
/// let fetcher = fetcher_fn(|| async { Ok::<_, String>(42u32) });
/// # let _ = fetcher;
/// ```
pub fn fetcher_fn<F, Fut, T, E>(f: F) -> FnFetcher<F>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: ValueBounds,
    E: ErrorBounds,
{
    FnFetcher { f }
}

impl<F, Fut, T, E> Fetcher for FnFetcher<F>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: ValueBounds,
    E: ErrorBounds,
{
    type Output = T;
    type Error = E;

    fn fetch(&self) -> impl Future<Output = Result<T, E>> + Send + 'static {
        (self.f)()
    }
}
