//! Request orchestration: the reconcile step every trigger goes through.

use futures::FutureExt;
use tokio::time::Instant;

use crate::{
    cache::{CacheStore, FetchTicket, InFlightFetch},
    errors::FetchFailure,
    fetcher::Fetcher,
    key::CacheKey,
    policy::Policy,
    projection::StateProjection,
};

/// What a call to [`FetchCoordinator::reconcile`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reconciled {
    /// The key was empty; nothing happened
    Disabled,
    /// The activation was re-armed or detached before the reconcile started
    Detached,
    /// A cached value younger than the deduping interval was served
    Deduped,
    /// This reconcile ran the fetcher and it succeeded
    Fetched,
    /// This reconcile awaited a fetch already running for the key, which succeeded
    Joined,
    /// The fetch failed; the error was projected and reported
    Failed,
}

/// Decides per reconcile whether to serve the cache, join a running fetch, or
/// fetch anew, and applies the result to the cache store and the projection
#[derive(Clone, Default)]
pub struct FetchCoordinator {
    cache: CacheStore,
}

impl FetchCoordinator {
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Bring `projection` up to date for `key`.
    ///
    /// Serves the cached value when it is younger than the policy's deduping
    /// interval. Otherwise keeps any known value visible (marking the projection
    /// `validating`, or `loading` when nothing is known), runs or joins the
    /// fetch, and on success stores the result stamped with its completion time.
    /// A failure is projected and passed to `on_error`; it never escapes as an
    /// error and never touches the cache.
    ///
    /// Must be called from within a tokio runtime: the fetch itself runs on its
    /// own task so it completes even if this future is dropped.
    pub async fn reconcile<F>(
        &self,
        key: &CacheKey,
        fetcher: &F,
        policy: &Policy<F::Error>,
        projection: &StateProjection<F::Output, F::Error>,
    ) -> Reconciled
    where
        F: Fetcher,
    {
        if key.is_disabled() {
            return Reconciled::Disabled;
        }
        if !projection.is_current() {
            return Reconciled::Detached;
        }

        let cached = self.cache.get::<F::Output>(key.as_str());
        if let Some(entry) = cached {
            if entry.is_within(policy.deduping_interval()) {
                crate::log_cache_hit!(
                    "Serving {} (fetched {:?} ago, deduping interval {:?})",
                    key,
                    entry.age(),
                    policy.deduping_interval()
                );
                projection.serve_cached(entry.value);
                return Reconciled::Deduped;
            }
            // Stale while revalidate: the old value stays visible meanwhile.
            projection.serve_cached(entry.value);
        }

        projection.begin_fetch();
        let ticket = self.start_or_join(key, fetcher, policy);

        match ticket.fetch.await {
            Ok((value, fetched_at)) => {
                if projection.is_current() || policy.keeps_detached_results() {
                    self.cache.set(key.as_str(), value.clone(), fetched_at);
                }
                projection.finish_success(value);
                crate::log_fetch_success!("Fetch completed for key: {}", key);
                if ticket.started {
                    Reconciled::Fetched
                } else {
                    Reconciled::Joined
                }
            }
            Err(error) => {
                let failure = FetchFailure::new(key.clone(), error);
                crate::log_fetch_error!("Fetch failed for key: {}", key);
                if projection.finish_failure(ticket.id, failure.clone()) {
                    policy.report_error(&failure);
                }
                Reconciled::Failed
            }
        }
    }

    fn start_or_join<F>(
        &self,
        key: &CacheKey,
        fetcher: &F,
        policy: &Policy<F::Error>,
    ) -> FetchTicket<F::Output, F::Error>
    where
        F: Fetcher,
    {
        // Lazy: the fetcher runs on first poll, outside the in-flight lock.
        let start = || -> InFlightFetch<F::Output, F::Error> {
            let fetcher = fetcher.clone();
            async move {
                fetcher
                    .fetch()
                    .await
                    .map(|value| (value, Instant::now()))
            }
            .boxed()
            .shared()
        };

        let ticket = if policy.dedupes_in_flight() {
            self.cache.begin_fetch(key.as_str(), start)
        } else {
            FetchTicket {
                id: self.cache.next_fetch_id(),
                fetch: start(),
                started: true,
            }
        };

        if ticket.started {
            crate::log_fetch_start!("Starting new fetch for key: {}", key);
            self.drive_to_completion(key, &ticket, policy);
        } else {
            crate::log_dedupe!("Joining in-flight fetch for key: {}", key);
        }
        ticket
    }

    /// Polls the shared fetch on its own task so it finishes even when every
    /// reconcile awaiting it is dropped, then unregisters it.
    fn drive_to_completion<T, E>(
        &self,
        key: &CacheKey,
        ticket: &FetchTicket<T, E>,
        policy: &Policy<E>,
    ) where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let cache = self.cache.clone();
        let key = key.clone();
        let fetch = ticket.fetch.clone();
        let registered = policy.dedupes_in_flight().then_some(ticket.id);
        let keep_result = policy.keeps_detached_results();

        tokio::spawn(async move {
            let outcome = fetch.await;
            if keep_result {
                if let Ok((value, fetched_at)) = outcome {
                    cache.set(key.as_str(), value, fetched_at);
                }
            }
            if let Some(id) = registered {
                cache.finish_fetch(key.as_str(), id);
            }
        });
    }
}
