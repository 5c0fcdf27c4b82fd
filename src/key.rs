//! Cache key normalization utilities for swr-engine

use std::fmt;

/// Opaque identity of a cached resource.
///
/// Two activations with the same key share one cache entry and compete for the
/// same in-flight fetch. An empty key is "disabled": activating it performs no
/// fetching at all and arms no triggers.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from anything string-like.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The disabled key.
    pub fn disabled() -> Self {
        Self(String::new())
    }

    /// Returns `true` when this key disables fetching.
    pub fn is_disabled(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trait for normalizing the different key formats callers hand to the engine
///
/// This trait allows [`SwrRuntime::activate`](crate::runtime::SwrRuntime::activate)
/// to accept keys in different formats:
/// - `&str`, `String` and `&String` for plain keys
/// - `Option<_>` of any of those, where `None` disables fetching
/// - [`CacheKey`] itself
///
/// # Examples
///
/// ```rust
/// use swr_engine::key::{CacheKey, IntoCacheKey};
///
/// assert_eq!("user:1".into_cache_key(), CacheKey::new("user:1"));
/// assert!(None::<&str>.into_cache_key().is_disabled());
/// assert!("".into_cache_key().is_disabled());
/// ```
pub trait IntoCacheKey {
    /// Convert the input into a [`CacheKey`]
    fn into_cache_key(self) -> CacheKey;
}

impl IntoCacheKey for CacheKey {
    fn into_cache_key(self) -> CacheKey {
        self
    }
}

impl IntoCacheKey for &CacheKey {
    fn into_cache_key(self) -> CacheKey {
        self.clone()
    }
}

impl IntoCacheKey for &str {
    fn into_cache_key(self) -> CacheKey {
        CacheKey::new(self)
    }
}

impl IntoCacheKey for String {
    fn into_cache_key(self) -> CacheKey {
        CacheKey(self)
    }
}

impl IntoCacheKey for &String {
    fn into_cache_key(self) -> CacheKey {
        CacheKey::new(self.as_str())
    }
}

// `None` behaves like an empty key: the activation stays idle.
impl<K> IntoCacheKey for Option<K>
where
    K: IntoCacheKey,
{
    fn into_cache_key(self) -> CacheKey {
        self.map(IntoCacheKey::into_cache_key)
            .unwrap_or_else(CacheKey::disabled)
    }
}
