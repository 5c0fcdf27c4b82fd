//! Shared runtime components that back every activation.
//!
//! This module lets us manage the cache store, the fetch coordinator and the
//! event bus from one place.

pub mod request;
pub mod tasks;

use std::{fmt, sync::Arc};

use crate::{
    activation::Activation,
    cache::CacheStore,
    events::{EventBus, SignalBus},
    fetcher::Fetcher,
    key::IntoCacheKey,
    policy::{Policy, PolicyOptions},
    projection::{StateProjection, StateSubscriber},
    types::ValueBounds,
};
use request::{FetchCoordinator, Reconciled};

/// Configuration for the runtime.
#[derive(Default)]
pub struct RuntimeConfig {
    cache: Option<CacheStore>,
    event_bus: Option<Arc<dyn EventBus>>,
    default_policy: PolicyOptions,
}

impl RuntimeConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing cache store instead of starting with an empty one.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use the host's signal source. Defaults to an in-memory [`SignalBus`].
    pub fn with_event_bus(mut self, event_bus: impl EventBus) -> Self {
        self.event_bus = Some(Arc::new(event_bus));
        self
    }

    /// Settings used by [`SwrRuntime::default_policy`].
    pub fn with_default_policy(mut self, options: PolicyOptions) -> Self {
        self.default_policy = options;
        self
    }

    /// Construct a runtime from this configuration.
    pub fn build(self) -> SwrRuntime {
        let cache = self.cache.unwrap_or_default();
        let (event_bus, signals): (Arc<dyn EventBus>, _) = match self.event_bus {
            Some(event_bus) => (event_bus, None),
            None => {
                let signals = SignalBus::new();
                (Arc::new(signals.clone()), Some(signals))
            }
        };

        SwrRuntime {
            coordinator: FetchCoordinator::new(cache),
            event_bus,
            signals,
            default_policy: self.default_policy,
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("shared_cache", &self.cache.is_some())
            .field("custom_event_bus", &self.event_bus.is_some())
            .field("default_policy", &self.default_policy)
            .finish()
    }
}

/// Central runtime that holds onto the shared handles.
///
/// Cheap to clone; clones share the cache store and the event bus.
#[derive(Clone)]
pub struct SwrRuntime {
    coordinator: FetchCoordinator,
    event_bus: Arc<dyn EventBus>,
    signals: Option<SignalBus>,
    default_policy: PolicyOptions,
}

impl SwrRuntime {
    /// A runtime with an empty cache and an in-memory signal bus
    pub fn new() -> Self {
        RuntimeConfig::new().build()
    }

    /// Access the cache store handle.
    pub fn cache(&self) -> &CacheStore {
        self.coordinator.cache()
    }

    /// Access the fetch coordinator.
    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn event_bus(&self) -> &Arc<dyn EventBus> {
        &self.event_bus
    }

    /// The built-in signal bus, unless a custom event bus was configured
    pub fn signals(&self) -> Option<&SignalBus> {
        self.signals.as_ref()
    }

    /// A fresh policy from the configured default settings
    pub fn default_policy<E>(&self) -> Policy<E> {
        self.default_policy.clone().into_policy()
    }

    /// Start an activation: seed its state from the cache, arm its triggers
    /// and run the initial reconcile.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate<K, F>(
        &self,
        key: K,
        fetcher: F,
        policy: Policy<F::Error>,
    ) -> Activation<F::Output, F::Error>
    where
        K: IntoCacheKey,
        F: Fetcher,
    {
        let mut activation = Activation::idle(self.clone(), key.into_cache_key());
        activation.arm(fetcher, policy);
        activation
    }

    /// Like [`SwrRuntime::activate`], with `subscriber` registered before the
    /// first transition so it observes every state change.
    pub fn activate_with<K, F, S>(
        &self,
        key: K,
        fetcher: F,
        policy: Policy<F::Error>,
        subscriber: S,
    ) -> Activation<F::Output, F::Error>
    where
        K: IntoCacheKey,
        F: Fetcher,
        S: StateSubscriber<F::Output, F::Error>,
    {
        let mut activation = Activation::idle(self.clone(), key.into_cache_key());
        activation.subscribe(subscriber);
        activation.arm(fetcher, policy);
        activation
    }

    /// Run one reconcile outside any activation.
    pub async fn reconcile<F>(
        &self,
        key: impl IntoCacheKey,
        fetcher: &F,
        policy: &Policy<F::Error>,
        projection: &StateProjection<F::Output, F::Error>,
    ) -> Reconciled
    where
        F: Fetcher,
    {
        self.coordinator
            .reconcile(&key.into_cache_key(), fetcher, policy, projection)
            .await
    }

    /// Read the cached value for `key`, if any.
    pub fn cached<T: ValueBounds>(&self, key: impl IntoCacheKey) -> Option<T> {
        let key = key.into_cache_key();
        self.cache().get::<T>(key.as_str()).map(|entry| entry.value)
    }

    /// Drop the cached value for `key`; the next reconcile fetches.
    pub fn invalidate(&self, key: impl IntoCacheKey) -> bool {
        let key = key.into_cache_key();
        let removed = self.cache().remove(key.as_str());
        if removed {
            crate::debug_log!("🗑️ [INVALIDATE] Removed cached value for key: {}", key);
        }
        removed
    }
}

impl Default for SwrRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SwrRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwrRuntime")
            .field("cache", &self.cache().stats())
            .field("builtin_signals", &self.signals.is_some())
            .field("default_policy", &self.default_policy)
            .finish()
    }
}
