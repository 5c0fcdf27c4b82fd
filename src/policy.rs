//! Revalidation policy: how often, and in response to what, an activation refetches.

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::errors::FetchFailure;

/// Default minimum time between two fetches of the same key.
pub const DEFAULT_DEDUPING_INTERVAL: Duration = Duration::from_millis(2000);

/// Side-effecting callback invoked on every fetch failure.
pub type ErrorCallback<E> = Arc<dyn Fn(&FetchFailure<E>) + Send + Sync>;

/// Per-activation revalidation policy
///
/// A policy is fixed for the lifetime of an activation; changing it means
/// re-arming the activation (see [`Activation::rearm`](crate::activation::Activation::rearm)).
///
/// ```rust
/// use std::time::Duration;
/// use swr_engine::policy::Policy;
///
/// let policy: Policy<String> = Policy::new()
///     .with_refresh_interval(Duration::from_secs(5))
///     .revalidate_on_focus(false)
///     .on_error(|failure| eprintln!("{failure}"));
///
/// assert_eq!(policy.refresh_interval(), Duration::from_secs(5));
/// assert!(!policy.revalidates_on_focus());
/// assert!(policy.revalidates_on_reconnect());
/// ```
pub struct Policy<E> {
    refresh_interval: Duration,
    deduping_interval: Duration,
    revalidate_on_focus: bool,
    revalidate_on_reconnect: bool,
    dedupe_in_flight: bool,
    keep_detached_results: bool,
    on_error: Option<ErrorCallback<E>>,
}

impl<E> Policy<E> {
    /// Create a policy with default settings: no polling, a 2s deduping
    /// interval, focus and reconnect revalidation on.
    pub fn new() -> Self {
        Self {
            refresh_interval: Duration::ZERO,
            deduping_interval: DEFAULT_DEDUPING_INTERVAL,
            revalidate_on_focus: true,
            revalidate_on_reconnect: true,
            dedupe_in_flight: true,
            keep_detached_results: false,
            on_error: None,
        }
    }

    /// Poll every `interval`. `Duration::ZERO` disables polling.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Minimum time since the key's last successful fetch before another
    /// fetch is allowed, whatever triggered it.
    pub fn with_deduping_interval(mut self, interval: Duration) -> Self {
        self.deduping_interval = interval;
        self
    }

    /// Arm or disarm the focus trigger
    pub fn revalidate_on_focus(mut self, enabled: bool) -> Self {
        self.revalidate_on_focus = enabled;
        self
    }

    /// Arm or disarm the reconnect trigger
    pub fn revalidate_on_reconnect(mut self, enabled: bool) -> Self {
        self.revalidate_on_reconnect = enabled;
        self
    }

    /// When enabled, a reconcile that finds a fetch already running for its
    /// key awaits that fetch instead of starting another one. When disabled,
    /// only the elapsed-time check dedupes.
    pub fn dedupe_in_flight(mut self, enabled: bool) -> Self {
        self.dedupe_in_flight = enabled;
        self
    }

    /// When enabled, a fetch that completes after its activation detached
    /// still writes its result to the cache store.
    pub fn keep_detached_results(mut self, enabled: bool) -> Self {
        self.keep_detached_results = enabled;
        self
    }

    /// Set the callback invoked on every fetch failure
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FetchFailure<E>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn deduping_interval(&self) -> Duration {
        self.deduping_interval
    }

    pub fn revalidates_on_focus(&self) -> bool {
        self.revalidate_on_focus
    }

    pub fn revalidates_on_reconnect(&self) -> bool {
        self.revalidate_on_reconnect
    }

    pub fn dedupes_in_flight(&self) -> bool {
        self.dedupe_in_flight
    }

    pub fn keeps_detached_results(&self) -> bool {
        self.keep_detached_results
    }

    /// Returns true when the interval trigger should be armed
    pub fn polls(&self) -> bool {
        !self.refresh_interval.is_zero()
    }

    pub(crate) fn report_error(&self, failure: &FetchFailure<E>) {
        if let Some(on_error) = &self.on_error {
            on_error(failure);
        }
    }

    /// The serializable part of this policy
    pub fn options(&self) -> PolicyOptions {
        PolicyOptions {
            refresh_interval_ms: duration_to_ms(self.refresh_interval),
            deduping_interval_ms: duration_to_ms(self.deduping_interval),
            revalidate_on_focus: self.revalidate_on_focus,
            revalidate_on_reconnect: self.revalidate_on_reconnect,
            dedupe_in_flight: self.dedupe_in_flight,
            keep_detached_results: self.keep_detached_results,
        }
    }
}

impl<E> Default for Policy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Policy<E> {
    fn clone(&self) -> Self {
        Self {
            refresh_interval: self.refresh_interval,
            deduping_interval: self.deduping_interval,
            revalidate_on_focus: self.revalidate_on_focus,
            revalidate_on_reconnect: self.revalidate_on_reconnect,
            dedupe_in_flight: self.dedupe_in_flight,
            keep_detached_results: self.keep_detached_results,
            on_error: self.on_error.clone(),
        }
    }
}

impl<E> fmt::Debug for Policy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("refresh_interval", &self.refresh_interval)
            .field("deduping_interval", &self.deduping_interval)
            .field("revalidate_on_focus", &self.revalidate_on_focus)
            .field("revalidate_on_reconnect", &self.revalidate_on_reconnect)
            .field("dedupe_in_flight", &self.dedupe_in_flight)
            .field("keep_detached_results", &self.keep_detached_results)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Serializable policy settings, using the option names of the configuration
/// table (`refreshIntervalMs`, `dedupingIntervalMs`, ...).
///
/// Missing fields take the [`Policy::new`] defaults. `onError` is code, not
/// configuration, so it is attached afterwards with [`Policy::on_error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyOptions {
    pub refresh_interval_ms: u64,
    pub deduping_interval_ms: u64,
    pub revalidate_on_focus: bool,
    pub revalidate_on_reconnect: bool,
    pub dedupe_in_flight: bool,
    pub keep_detached_results: bool,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Policy::<()>::new().options()
    }
}

impl PolicyOptions {
    /// Build a policy from these options, without an error callback.
    pub fn into_policy<E>(self) -> Policy<E> {
        Policy::new()
            .with_refresh_interval(Duration::from_millis(self.refresh_interval_ms))
            .with_deduping_interval(Duration::from_millis(self.deduping_interval_ms))
            .revalidate_on_focus(self.revalidate_on_focus)
            .revalidate_on_reconnect(self.revalidate_on_reconnect)
            .dedupe_in_flight(self.dedupe_in_flight)
            .keep_detached_results(self.keep_detached_results)
    }
}

impl<E> From<PolicyOptions> for Policy<E> {
    fn from(options: PolicyOptions) -> Self {
        options.into_policy()
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
