//! # Global Runtime Management
//!
//! An optional process-wide [`SwrRuntime`], for hosts that want one cache store
//! and one event bus shared by every activation without threading a runtime
//! handle around.

use std::sync::OnceLock;

use crate::{
    errors::{EngineError, EngineResult},
    runtime::{RuntimeConfig, SwrRuntime},
};

/// Global singleton runtime
static GLOBAL_RUNTIME: OnceLock<SwrRuntime> = OnceLock::new();

impl RuntimeConfig {
    /// Install a runtime built from this configuration as the global runtime.
    ///
    /// ## Errors
    ///
    /// Returns [`EngineError::AlreadyInitialized`] if a global runtime exists;
    /// the existing one is kept.
    pub fn init(self) -> EngineResult<()> {
        GLOBAL_RUNTIME
            .set(self.build())
            .map_err(|_| EngineError::AlreadyInitialized)
    }
}

/// Initialize the global runtime with default settings
///
/// Calling it again is harmless.
///
/// ## Example
///
/// ```rust
/// use swr_engine::global::{get_global_runtime, init};
///
/// init().unwrap();
/// let runtime = get_global_runtime().unwrap();
/// assert!(runtime.cache().is_empty());
/// ```
pub fn init() -> EngineResult<()> {
    GLOBAL_RUNTIME.get_or_init(SwrRuntime::new);
    Ok(())
}

/// Get the global runtime instance
///
/// ## Errors
///
/// Returns `EngineError::NotInitialized` if neither [`init`] nor
/// [`RuntimeConfig::init`] has been called yet.
pub fn get_global_runtime() -> EngineResult<&'static SwrRuntime> {
    GLOBAL_RUNTIME.get().ok_or(EngineError::NotInitialized)
}

/// Check if the global runtime has been initialized
pub fn is_initialized() -> bool {
    GLOBAL_RUNTIME.get().is_some()
}

/// Ensure that the global runtime has been initialized
///
/// Useful for a clearer error in code paths that depend on the global runtime.
pub fn ensure_initialized() -> EngineResult<()> {
    if !is_initialized() {
        return Err(EngineError::Configuration(
            "Global runtime not initialized. Call init() at application startup.".to_string(),
        ));
    }
    Ok(())
}
