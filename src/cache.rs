//! # Cache Store for swr-engine
//!
//! This module implements the shared, type-erased cache behind every activation:
//! - **Entries**: one [`CacheEntry`] per key, `{value, fetched_at}`, replaced
//!   wholesale on every successful fetch and never evicted by the engine.
//! - **Last write wins**: a write carrying an older `fetched_at` than the stored
//!   entry is ignored, so racing fetches for one key settle on the newest result.
//! - **In-flight tracking**: the fetch currently running for a key is kept here
//!   so concurrent reconciles can join it instead of fetching again.
//!
//! ## Example
//! ```rust
//! use swr_engine::cache::CacheStore;
//! use tokio::time::Instant;
//!
//! let cache = CacheStore::new();
//! cache.set("my_key", 42u32, Instant::now());
//! let entry = cache.get::<u32>("my_key").unwrap();
//! assert_eq!(entry.value, 42);
//! ```

use std::{
    any::Any,
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

/// A cached value together with the time of the fetch that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Time elapsed since the entry was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Returns true if the entry was fetched less than `window` ago.
    ///
    /// A zero window is never satisfied.
    pub fn is_within(&self, window: Duration) -> bool {
        self.age() < window
    }
}

struct StoredEntry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
}

/// Outcome of a shared fetch: the value and the moment it arrived.
pub(crate) type FetchOutcome<T, E> = Result<(T, Instant), E>;

/// A fetch that any number of reconciles for the same key can await.
pub(crate) type InFlightFetch<T, E> = Shared<BoxFuture<'static, FetchOutcome<T, E>>>;

struct InFlightSlot {
    id: u64,
    fetch: Box<dyn Any + Send + Sync>,
}

/// Handle to a registered in-flight fetch.
pub(crate) struct FetchTicket<T, E> {
    pub id: u64,
    pub fetch: InFlightFetch<T, E>,
    /// False when the caller joined a fetch somebody else started.
    pub started: bool,
}

/// Shared cache of fetch results keyed by request identity
///
/// Cloning is cheap: all clones see the same entries.
#[derive(Clone, Default)]
pub struct CacheStore {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
    /// Tracks the fetch currently running per key to enable request deduplication
    in_flight: Arc<Mutex<HashMap<String, InFlightSlot>>>,
    next_fetch_id: Arc<AtomicU64>,
}

impl CacheStore {
    /// Creates a new, empty cache store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves the entry stored for `key`.
    ///
    /// Returns `None` when nothing is cached, or when the cached value was
    /// written with a different type than `T`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<CacheEntry<T>> {
        let entries = self.entries.lock().ok()?;
        let stored = entries.get(key)?;
        match stored.value.downcast_ref::<T>() {
            Some(value) => Some(CacheEntry {
                value: value.clone(),
                fetched_at: stored.fetched_at,
            }),
            None => {
                crate::debug_log!(
                    "⚠️ [CACHE-TYPE] Entry for key {} holds a different type than requested",
                    key
                );
                None
            }
        }
    }

    /// Stores `value` for `key`, fetched at `fetched_at`.
    ///
    /// The previous entry is replaced wholesale. Returns `false` (and leaves the
    /// store untouched) when the existing entry is newer than `fetched_at`.
    pub fn set<T: Send + Sync + 'static>(&self, key: &str, value: T, fetched_at: Instant) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        if let Some(existing) = entries.get(key) {
            if existing.fetched_at > fetched_at {
                crate::debug_log!(
                    "⏸️ [CACHE-STORE] Ignoring older result for key: {} (stored entry is newer)",
                    key
                );
                return false;
            }
        }
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: Arc::new(value),
                fetched_at,
            },
        );
        crate::log_cache_store!("Stored data for key: {}", key);
        true
    }

    /// Returns true if an entry exists for `key`, whatever its type.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    /// Removes the entry for `key`. The engine never calls this itself.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self
            .entries
            .lock()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            crate::debug_log!("🗑️ [CACHE-REMOVE] Removed cache entry for key: {}", key);
        }
        removed
    }

    /// Clears all cached entries. In-flight fetches are left running.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            #[cfg(feature = "tracing")]
            let count = entries.len();
            entries.clear();
            crate::debug_log!("🗑️ [CACHE-CLEAR] Cleared {} cache entries", count);
        }
    }

    /// Gets the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a fetch is currently running for `key`.
    pub fn is_fetching(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .map(|in_flight| in_flight.contains_key(key))
            .unwrap_or(false)
    }

    /// Registers a fetch for `key`, or joins the one already running.
    ///
    /// `start` only builds the (lazy) future; it is called under the in-flight
    /// lock so that two reconciles racing on the same key cannot both start.
    pub(crate) fn begin_fetch<T, E>(
        &self,
        key: &str,
        start: impl FnOnce() -> InFlightFetch<T, E>,
    ) -> FetchTicket<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let id = self.next_fetch_id();
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return FetchTicket {
                id,
                fetch: start(),
                started: true,
            };
        };

        if let Some(slot) = in_flight.get(key) {
            if let Some(fetch) = slot.fetch.downcast_ref::<InFlightFetch<T, E>>() {
                return FetchTicket {
                    id: slot.id,
                    fetch: fetch.clone(),
                    started: false,
                };
            }
            crate::debug_log!(
                "⚠️ [CACHE-TYPE] In-flight fetch for key {} has another type, starting a new one",
                key
            );
        }

        let fetch = start();
        in_flight.insert(
            key.to_string(),
            InFlightSlot {
                id,
                fetch: Box::new(fetch.clone()),
            },
        );
        FetchTicket {
            id,
            fetch,
            started: true,
        }
    }

    /// Allocates an id for a fetch, registered or not.
    pub(crate) fn next_fetch_id(&self) -> u64 {
        self.next_fetch_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Unregisters the in-flight fetch `id` for `key`, if it is still the
    /// registered one.
    pub(crate) fn finish_fetch(&self, key: &str, id: u64) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            if in_flight.get(key).is_some_and(|slot| slot.id == id) {
                in_flight.remove(key);
            }
        }
    }

    /// Gets cache statistics.
    pub fn stats(&self) -> CacheStats {
        let in_flight = self
            .in_flight
            .lock()
            .map(|in_flight| in_flight.len())
            .unwrap_or(0);

        let Ok(entries) = self.entries.lock() else {
            return CacheStats {
                in_flight,
                ..CacheStats::default()
            };
        };

        let entry_count = entries.len();
        let total_age: Duration = entries
            .values()
            .map(|entry| entry.fetched_at.elapsed())
            .sum();
        let avg_age = if entry_count > 0 {
            total_age / u32::try_from(entry_count).unwrap_or(u32::MAX)
        } else {
            Duration::ZERO
        };

        CacheStats {
            entry_count,
            in_flight,
            avg_age,
        }
    }
}

/// General cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub in_flight: usize,
    pub avg_age: Duration,
}
