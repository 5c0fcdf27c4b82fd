//! # State projection
//!
//! The seam toward the UI-binding collaborator. Every state change of an
//! activation is an explicit transition applied here and published two ways:
//! - synchronously to registered [`StateSubscriber`]s, in transition order;
//! - on a `tokio::sync::watch` channel for async consumers.
//!
//! A transition that leaves all four fields unchanged publishes nothing.
//!
//! Handles carry an epoch. Re-arming or detaching an activation advances the
//! epoch, after which transitions from older handles (fetches that outlived
//! their activation) are dropped.

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::watch;

use crate::{errors::FetchFailure, state::RequestState};

/// Observer notified synchronously on every change of a projected state
///
/// Implementations must not call back into the activation they observe from
/// inside `on_state_change`.
pub trait StateSubscriber<T, E>: Send + Sync + 'static {
    fn on_state_change(&self, state: &RequestState<T, E>);
}

impl<T, E, F> StateSubscriber<T, E> for F
where
    F: Fn(&RequestState<T, E>) + Send + Sync + 'static,
{
    fn on_state_change(&self, state: &RequestState<T, E>) {
        self(state)
    }
}

/// Identifies a registered subscriber for [`StateProjection::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Epoch value meaning "closed": no handle ever matches it.
const CLOSED: u64 = u64::MAX;

/// Per-epoch bookkeeping updated together with the state
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// Fetches of the current epoch that have begun and not yet finished
    pending: usize,
    /// Last fetch whose failure was handed to `on_error`
    reported_fetch: Option<u64>,
}

struct ProjectionCore<T, E> {
    progress: Progress,
    subscribers: Vec<(SubscriberId, Arc<dyn StateSubscriber<T, E>>)>,
}

struct ProjectionInner<T, E> {
    core: Mutex<ProjectionCore<T, E>>,
    tx: watch::Sender<RequestState<T, E>>,
    epoch: AtomicU64,
    next_subscriber: AtomicU64,
}

/// Handle to one activation's projected [`RequestState`]
pub struct StateProjection<T, E> {
    inner: Arc<ProjectionInner<T, E>>,
    epoch: u64,
}

impl<T, E> Clone for StateProjection<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            epoch: self.epoch,
        }
    }
}

impl<T, E> StateProjection<T, E>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    E: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: RequestState<T, E>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            inner: Arc::new(ProjectionInner {
                core: Mutex::new(ProjectionCore {
                    progress: Progress::default(),
                    subscribers: Vec::new(),
                }),
                tx,
                epoch: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(0),
            }),
            epoch: 0,
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> RequestState<T, E> {
        self.inner.tx.borrow().clone()
    }

    /// Async view of the state; the receiver starts at the current state.
    pub fn watch(&self) -> watch::Receiver<RequestState<T, E>> {
        self.inner.tx.subscribe()
    }

    /// Register an observer for all future changes.
    pub fn subscribe(&self, subscriber: impl StateSubscriber<T, E>) -> SubscriberId {
        let id = SubscriberId(self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut core) = self.inner.core.lock() {
            core.subscribers.push((id, Arc::new(subscriber)));
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let Ok(mut core) = self.inner.core.lock() else {
            return false;
        };
        let before = core.subscribers.len();
        core.subscribers.retain(|(entry, _)| *entry != id);
        core.subscribers.len() != before
    }

    /// Returns false once the projection was re-armed past this handle or closed.
    pub fn is_current(&self) -> bool {
        self.inner.epoch.load(Ordering::Acquire) == self.epoch
    }

    /// Starts a new epoch with `state`, invalidating every older handle, and
    /// returns the handle for the new epoch.
    pub(crate) fn renew(&self, state: RequestState<T, E>) -> Self {
        let Ok(mut core) = self.inner.core.lock() else {
            return self.clone();
        };
        let epoch = self.inner.epoch.load(Ordering::Acquire).wrapping_add(1) % CLOSED;
        self.inner.epoch.store(epoch, Ordering::Release);
        core.progress = Progress::default();
        Self::publish(&self.inner, &core, |current| {
            *current = state;
        });
        Self {
            inner: self.inner.clone(),
            epoch,
        }
    }

    /// Stops all further transitions. Subscribers are dropped.
    pub(crate) fn close(&self) {
        if let Ok(mut core) = self.inner.core.lock() {
            self.inner.epoch.store(CLOSED, Ordering::Release);
            core.progress = Progress::default();
            core.subscribers.clear();
        }
    }

    /// A fetch is starting: `loading` if no value is known yet, `validating` otherwise.
    pub(crate) fn begin_fetch(&self) -> bool {
        self.transition(|state, progress| {
            progress.pending += 1;
            if state.value.is_some() {
                state.loading = false;
                state.validating = true;
            } else {
                state.loading = true;
                state.validating = false;
            }
        })
    }

    /// Serve a cached value without fetching.
    pub(crate) fn serve_cached(&self, value: T) -> bool {
        self.transition(|state, progress| {
            state.value = Some(value);
            state.loading = false;
            state.validating = progress.pending > 0;
        })
    }

    /// A fetch finished with `value`.
    pub(crate) fn finish_success(&self, value: T) -> bool {
        self.transition(|state, progress| {
            progress.pending = progress.pending.saturating_sub(1);
            state.value = Some(value);
            state.error = None;
            state.loading = false;
            state.validating = progress.pending > 0;
        })
    }

    /// Fetch `fetch_id` failed; the last good value, if any, stays in place.
    ///
    /// Several reconciles of one activation may await the same fetch. Returns
    /// true only for the first of them, which reports the failure.
    pub(crate) fn finish_failure(&self, fetch_id: u64, failure: FetchFailure<E>) -> bool {
        let mut first_report = false;
        self.transition(|state, progress| {
            progress.pending = progress.pending.saturating_sub(1);
            if progress.reported_fetch != Some(fetch_id) {
                progress.reported_fetch = Some(fetch_id);
                first_report = true;
            }
            state.error = Some(failure);
            let running = progress.pending > 0;
            state.loading = running && state.value.is_none();
            state.validating = running && state.value.is_some();
        });
        first_report
    }

    fn transition(&self, apply: impl FnOnce(&mut RequestState<T, E>, &mut Progress)) -> bool {
        let Ok(mut core) = self.inner.core.lock() else {
            return false;
        };
        // Checked under the core lock: renew/close advance the epoch while holding it.
        if !self.is_current() {
            return false;
        }
        let mut progress = core.progress;
        let changed = Self::publish(&self.inner, &core, |state| apply(state, &mut progress));
        core.progress = progress;
        changed
    }

    fn publish(
        inner: &ProjectionInner<T, E>,
        core: &ProjectionCore<T, E>,
        apply: impl FnOnce(&mut RequestState<T, E>),
    ) -> bool {
        let changed = inner.tx.send_if_modified(|state| {
            let before = state.clone();
            apply(state);
            *state != before
        });
        if changed {
            debug_assert!(inner.tx.borrow().is_consistent());
            let snapshot = inner.tx.borrow().clone();
            for (_, subscriber) in &core.subscribers {
                subscriber.on_state_change(&snapshot);
            }
        }
        changed
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for StateProjection<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateProjection")
            .field("state", &*self.inner.tx.borrow())
            .field("epoch", &self.epoch)
            .finish()
    }
}
