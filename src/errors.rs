//! Error types for swr-engine
//!
//! Fetch failures never leave the engine as `Err`: they are captured as a
//! [`FetchFailure`], projected into [`RequestState::error`](crate::state::RequestState)
//! and handed to the policy's `on_error` callback. [`EngineError`] covers the
//! few fallible operations of the engine itself (global runtime setup).

use std::fmt;

use crate::key::CacheKey;

/// Errors raised by the engine's own setup and configuration paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Global runtime not initialized. Call swr_engine::init() first.")]
    NotInitialized,
    #[error("Global runtime already initialized")]
    AlreadyInitialized,
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for engine setup operations
pub type EngineResult<T> = Result<T, EngineError>;

/// The single failure kind of the engine: the fetcher's own error, tagged with
/// the key it was fetching.
///
/// No distinction is made between transport, parsing or application errors;
/// that classification belongs to the fetcher's error type `E`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FetchFailure<E> {
    key: CacheKey,
    error: E,
}

impl<E> FetchFailure<E> {
    pub fn new(key: CacheKey, error: E) -> Self {
        Self { key, error }
    }

    /// The key whose fetch failed
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The underlying error raised by the fetcher
    pub fn error(&self) -> &E {
        &self.error
    }

    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: fmt::Display> fmt::Display for FetchFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch for key `{}` failed: {}", self.key, self.error)
    }
}

impl<E> std::error::Error for FetchFailure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
