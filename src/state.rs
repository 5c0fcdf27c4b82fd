//! State: the per-activation view of a request
//!
//! This module provides [`RequestState`] and the [`AsyncState`] trait for working
//! with the state of a revalidating request.

use serde::Serialize;

use crate::errors::FetchFailure;

/// Common trait for async state types that represent loading, success, and error states
pub trait AsyncState {
    /// The type of successful data
    type Data;
    /// The type of error
    type Error;

    /// Returns true if no value has been produced yet and a fetch is running
    fn is_loading(&self) -> bool;

    /// Returns true if a value is present
    fn is_success(&self) -> bool;

    /// Returns true if the most recent fetch failed
    fn is_error(&self) -> bool;

    /// Returns the data if present, None otherwise
    fn data(&self) -> Option<&Self::Data>;

    /// Returns the error if the last fetch failed, None otherwise
    fn error(&self) -> Option<&Self::Error>;
}

/// Snapshot of one activation's request: `{value, error, loading, validating}`.
///
/// - `loading` is true only while no value has been produced for the activation
///   and a fetch is running. `loading` implies `value.is_none()`.
/// - `validating` is true while a fetch runs even though a value is already known.
/// - A failed fetch sets `error` but leaves the last good `value` in place, so
///   `value` and `error` can both be `Some`. Check `error` explicitly.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct RequestState<T, E> {
    pub value: Option<T>,
    pub error: Option<FetchFailure<E>>,
    pub loading: bool,
    pub validating: bool,
}

impl<T, E> Default for RequestState<T, E> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
            loading: false,
            validating: false,
        }
    }
}

impl<T, E> AsyncState for RequestState<T, E> {
    type Data = T;
    type Error = FetchFailure<E>;

    fn is_loading(&self) -> bool {
        self.loading
    }

    fn is_success(&self) -> bool {
        self.value.is_some()
    }

    fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn data(&self) -> Option<&T> {
        self.value.as_ref()
    }

    fn error(&self) -> Option<&FetchFailure<E>> {
        self.error.as_ref()
    }
}

impl<T, E> RequestState<T, E> {
    /// State seeded for a fresh activation: either a cached value is already
    /// known, or the initial fetch is about to start.
    pub(crate) fn seeded(value: Option<T>, fetching: bool) -> Self {
        let loading = fetching && value.is_none();
        Self {
            value,
            error: None,
            loading,
            validating: false,
        }
    }

    /// Returns true if a fetch is in progress, whether or not a value is known
    pub fn is_fetching(&self) -> bool {
        self.loading || self.validating
    }

    /// Returns true when neither `loading` nor `validating` is set
    pub fn is_settled(&self) -> bool {
        !self.is_fetching()
    }

    /// Maps a RequestState<T, E> to RequestState<U, E> by applying a function to the value.
    pub fn map<U, F>(self, op: F) -> RequestState<U, E>
    where
        F: FnOnce(T) -> U,
    {
        RequestState {
            value: self.value.map(op),
            error: self.error,
            loading: self.loading,
            validating: self.validating,
        }
    }

    /// Checks the relationships between the four fields that every published
    /// state must satisfy.
    pub fn is_consistent(&self) -> bool {
        !(self.loading && (self.value.is_some() || self.validating))
    }
}
