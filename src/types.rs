//! Common types and aliases used throughout swr-engine

/// Common trait bounds for values produced by a fetcher
pub trait ValueBounds: Clone + PartialEq + Send + Sync + 'static {}
impl<T> ValueBounds for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Common trait bounds for errors produced by a fetcher
pub trait ErrorBounds: Clone + PartialEq + Send + Sync + 'static {}
impl<T> ErrorBounds for T where T: Clone + PartialEq + Send + Sync + 'static {}
