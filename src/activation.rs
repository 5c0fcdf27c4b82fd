//! # Activations
//!
//! An [`Activation`] is one consumer's live binding to a key: its projected
//! [`RequestState`], its armed triggers and the driver task that turns trigger
//! events into reconciles.
//!
//! ## Lifecycle
//!
//! 1. Start: the state is seeded from the cache store, triggers are armed and
//!    an initial reconcile runs.
//! 2. Every trigger event runs a reconcile. Reconciles may overlap; dedupe
//!    happens in the [`FetchCoordinator`].
//! 3. [`Activation::rearm`] (key or policy changed) or drop tears everything
//!    down synchronously: subscriptions are released, the interval stops and
//!    late fetch results can no longer reach the projection.
//!
//! An activation for an empty key stays idle: its state is all empty and
//! nothing is ever armed.

use tokio::{
    sync::watch,
    task::{JoinHandle, JoinSet},
};

use crate::{
    fetcher::Fetcher,
    key::{CacheKey, IntoCacheKey},
    policy::Policy,
    projection::{StateProjection, StateSubscriber, SubscriberId},
    runtime::{
        SwrRuntime,
        request::{FetchCoordinator, Reconciled},
        tasks::{Trigger, TriggerSet, TriggerStream},
    },
    state::RequestState,
    types::{ErrorBounds, ValueBounds},
};

/// One consumer's live binding to a key
///
/// Must be created and re-armed from within a tokio runtime.
pub struct Activation<T, E>
where
    T: ValueBounds,
    E: ErrorBounds,
{
    runtime: SwrRuntime,
    key: CacheKey,
    projection: StateProjection<T, E>,
    live: Option<Live>,
}

/// The torn-down-together parts of an armed activation
struct Live {
    triggers: TriggerSet,
    driver: JoinHandle<()>,
}

impl Drop for Live {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl<T, E> Activation<T, E>
where
    T: ValueBounds,
    E: ErrorBounds,
{
    /// An unarmed activation with its state seeded from the cache store
    pub(crate) fn idle(runtime: SwrRuntime, key: CacheKey) -> Self {
        let projection = StateProjection::new(seed(&runtime, &key));
        Self {
            runtime,
            key,
            projection,
            live: None,
        }
    }

    /// Arm triggers and start the driver. No-op for an empty key.
    pub(crate) fn arm<F>(&mut self, fetcher: F, policy: Policy<E>)
    where
        F: Fetcher<Output = T, Error = E>,
    {
        if self.key.is_disabled() {
            crate::log_activation!("Empty key, activation stays idle");
            return;
        }

        let (triggers, stream) =
            TriggerSet::arm(&self.key, &policy, self.runtime.event_bus().as_ref());
        let revalidator = Revalidator {
            coordinator: self.runtime.coordinator().clone(),
            key: self.key.clone(),
            fetcher,
            policy,
            projection: self.projection.clone(),
        };
        let driver = tokio::spawn(drive(revalidator, stream));

        crate::log_activation!("Activated key: {}", self.key);
        self.live = Some(Live { triggers, driver });
    }

    /// The key this activation is bound to
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Current state snapshot
    pub fn state(&self) -> RequestState<T, E> {
        self.projection.state()
    }

    /// Async view of the state
    ///
    /// The receiver keeps its last value after the activation is dropped.
    pub fn watch(&self) -> watch::Receiver<RequestState<T, E>> {
        self.projection.watch()
    }

    /// Register a synchronous observer of every state change.
    pub fn subscribe(&self, subscriber: impl StateSubscriber<T, E>) -> SubscriberId {
        self.projection.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.projection.unsubscribe(id)
    }

    /// Returns true while triggers are armed (false for an empty key).
    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }

    pub fn is_armed(&self, trigger: Trigger) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.triggers.is_armed(trigger))
    }

    /// Request a reconcile now. The deduping interval still applies.
    ///
    /// Returns false for an idle activation or when a request is already queued.
    pub fn revalidate(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.triggers.fire(Trigger::Manual))
    }

    /// Tear down and start over for a new key, fetcher or policy.
    ///
    /// Fetches started before the call may still complete and fill the cache
    /// (subject to [`Policy::keep_detached_results`]), but never reach this
    /// activation's state.
    pub fn rearm<K, F>(&mut self, key: K, fetcher: F, policy: Policy<E>)
    where
        K: IntoCacheKey,
        F: Fetcher<Output = T, Error = E>,
    {
        self.live = None;
        self.key = key.into_cache_key();
        self.projection = self.projection.renew(seed(&self.runtime, &self.key));
        crate::log_activation!("Re-arming for key: {}", self.key);
        self.arm(fetcher, policy);
    }

    /// Tear down now. Equivalent to dropping the activation.
    pub fn detach(self) {}
}

impl<T, E> Drop for Activation<T, E>
where
    T: ValueBounds,
    E: ErrorBounds,
{
    fn drop(&mut self) {
        if self.live.take().is_some() {
            crate::log_activation!("Detached key: {}", self.key);
        }
        self.projection.close();
    }
}

impl<T, E> std::fmt::Debug for Activation<T, E>
where
    T: ValueBounds + std::fmt::Debug,
    E: ErrorBounds + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activation")
            .field("key", &self.key)
            .field("state", &self.projection.state())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Initial state: the cached value if there is one, `loading` otherwise.
fn seed<T, E>(runtime: &SwrRuntime, key: &CacheKey) -> RequestState<T, E>
where
    T: ValueBounds,
{
    if key.is_disabled() {
        return RequestState::default();
    }
    let cached = runtime.cache().get::<T>(key.as_str()).map(|entry| entry.value);
    RequestState::seeded(cached, true)
}

/// Everything a reconcile needs, cloned into each reconcile task
#[derive(Clone)]
struct Revalidator<F: Fetcher> {
    coordinator: FetchCoordinator,
    key: CacheKey,
    fetcher: F,
    policy: Policy<F::Error>,
    projection: StateProjection<F::Output, F::Error>,
}

impl<F: Fetcher> Revalidator<F> {
    fn spawn(&self, reconciles: &mut JoinSet<Reconciled>, trigger: Trigger) {
        crate::log_trigger!("{} revalidation for key: {}", trigger, self.key);
        let this = self.clone();
        reconciles.spawn(async move {
            this.coordinator
                .reconcile(&this.key, &this.fetcher, &this.policy, &this.projection)
                .await
        });
    }
}

/// Driver loop of an armed activation. Runs reconciles concurrently so a slow
/// fetch never delays the next trigger.
async fn drive<F: Fetcher>(revalidator: Revalidator<F>, mut stream: TriggerStream) {
    let mut reconciles = JoinSet::new();
    revalidator.spawn(&mut reconciles, Trigger::Initial);

    loop {
        tokio::select! {
            trigger = stream.next() => match trigger {
                Some(trigger) => revalidator.spawn(&mut reconciles, trigger),
                None => break,
            },
            Some(done) = reconciles.join_next() => match done {
                Ok(outcome) => {
                    crate::debug_log!(
                        "🔄 [RECONCILE] {:?} for key: {}",
                        outcome,
                        revalidator.key
                    );
                }
                Err(err) if err.is_panic() => {
                    crate::log_fetch_error!("Reconcile task panicked for key: {}", revalidator.key);
                }
                Err(_) => {}
            },
        }
    }

    while reconciles.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::Signal, fetcher::fetcher_fn};
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_runs_on_start() {
        let runtime = SwrRuntime::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let activation = runtime.activate(
            "user:1",
            fetcher_fn(move || {
                let counter = counter.clone();
                async move { Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst) + 1) }
            }),
            Policy::new(),
        );

        assert!(activation.state().loading);
        let mut rx = activation.watch();
        let state = rx.wait_for(|s| s.value.is_some()).await.unwrap().clone();
        assert_eq!(state.value, Some(1));
        assert!(state.is_settled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_key_never_arms() {
        let runtime = SwrRuntime::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let activation = runtime.activate(
            "",
            fetcher_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(0u32) }
            }),
            Policy::new(),
        );

        sleep(Duration::from_secs(10)).await;
        assert!(!activation.is_active());
        assert!(!activation.revalidate());
        assert_eq!(activation.state(), RequestState::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.signals().unwrap().subscriber_count(Signal::FocusRegained), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_subscriptions() {
        let runtime = SwrRuntime::new();
        let activation = runtime.activate(
            "k",
            fetcher_fn(|| async { Ok::<_, String>(1u32) }),
            Policy::new(),
        );
        let signals = runtime.signals().unwrap().clone();
        assert_eq!(signals.subscriber_count(Signal::FocusRegained), 1);
        assert_eq!(signals.subscriber_count(Signal::NetworkRestored), 1);

        activation.detach();
        assert_eq!(signals.subscriber_count(Signal::FocusRegained), 0);
        assert_eq!(signals.subscriber_count(Signal::NetworkRestored), 0);
    }
}
