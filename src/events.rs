//! # External revalidation signals
//!
//! The engine never talks to a concrete environment. Whatever fires "focus
//! regained" or "network restored" (a window system, a connectivity monitor, a
//! test) is injected as an [`EventBus`]. Triggers subscribe on activation start
//! and unsubscribe on teardown by dropping the returned [`Subscription`].

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

/// The zero-payload signals the engine can revalidate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// The host regained focus (window/tab/app brought to the foreground)
    FocusRegained,
    /// Network connectivity was restored
    NetworkRestored,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::FocusRegained => f.write_str("focus"),
            Signal::NetworkRestored => f.write_str("reconnect"),
        }
    }
}

/// Callback registered for a signal
pub type SignalCallback = Arc<dyn Fn() + Send + Sync>;

/// Subscription capability over the host's signal source
pub trait EventBus: Send + Sync + 'static {
    /// Register `callback` for every occurrence of `signal`.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    fn subscribe(&self, signal: Signal, callback: SignalCallback) -> Subscription;
}

/// Unsubscribe token; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Creates a token running `unsubscribe` exactly once, on [`Subscription::cancel`] or drop.
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A token with nothing to release
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[derive(Default)]
struct SignalBusInner {
    listeners: Mutex<HashMap<Signal, Vec<(u64, SignalCallback)>>>,
    next_id: AtomicU64,
}

/// In-memory [`EventBus`]: the host (or a test) calls [`SignalBus::emit`] and
/// every current subscriber of that signal runs synchronously.
///
/// Cloning is cheap: all clones share the same listeners.
#[derive(Clone, Default)]
pub struct SignalBus {
    inner: Arc<SignalBusInner>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `signal`, returning the number of callbacks that ran.
    pub fn emit(&self, signal: Signal) -> usize {
        // Callbacks run outside the lock so they may subscribe or unsubscribe.
        let callbacks: Vec<SignalCallback> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners
                .get(&signal)
                .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default(),
            Err(_) => return 0,
        };

        crate::debug_log!(
            "📣 [SIGNAL] {} fired for {} subscriber(s)",
            signal,
            callbacks.len()
        );
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    /// Number of live subscriptions for `signal`
    pub fn subscriber_count(&self, signal: Signal) -> usize {
        self.inner
            .listeners
            .lock()
            .map(|listeners| listeners.get(&signal).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl EventBus for SignalBus {
    fn subscribe(&self, signal: Signal, callback: SignalCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        match self.inner.listeners.lock() {
            Ok(mut listeners) => listeners.entry(signal).or_default().push((id, callback)),
            Err(_) => return Subscription::noop(),
        }

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Ok(mut listeners) = inner.listeners.lock() {
                if let Some(entries) = listeners.get_mut(&signal) {
                    entries.retain(|(entry_id, _)| *entry_id != id);
                }
            }
        })
    }
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBus")
            .field("focus", &self.subscriber_count(Signal::FocusRegained))
            .field("reconnect", &self.subscriber_count(Signal::NetworkRestored))
            .finish()
    }
}
