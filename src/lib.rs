#![doc = include_str!("../README.md")]

// Core modules
pub mod activation;
pub mod cache;
pub mod errors;
pub mod events;
pub mod fetcher;
pub mod global;
pub mod key;
mod log_utils;
pub mod policy;
pub mod projection;
pub mod runtime;
pub mod state;
pub mod types;

// Re-export commonly used items at crate root for convenience
pub use global::init;
pub use runtime::{RuntimeConfig, SwrRuntime};

pub mod prelude {
    //! The prelude exports the most common types and functions for using swr-engine.

    // Runtime and activations
    pub use crate::activation::Activation;
    pub use crate::runtime::{RuntimeConfig, SwrRuntime};

    // Fetchers and policies
    pub use crate::fetcher::{Fetcher, fetcher_fn};
    pub use crate::policy::{Policy, PolicyOptions};

    // Keys
    pub use crate::key::{CacheKey, IntoCacheKey};

    // The request state, needed for matching
    pub use crate::state::{AsyncState, RequestState};

    // Host signals
    pub use crate::events::{EventBus, Signal, SignalBus, Subscription};

    // Global initialization
    pub use crate::global::{get_global_runtime, init};

    // Error types
    pub use crate::errors::{EngineError, EngineResult, FetchFailure};
}
