//! Revalidation triggers for one activation: the interval timer, the focus and
//! reconnect signals, and manual requests.
//!
//! Arming returns two halves. [`TriggerSet`] owns the signal subscriptions and
//! stays with the activation; dropping it unsubscribes synchronously.
//! [`TriggerStream`] is consumed by the activation's driver task.

use std::fmt;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::{Instant, Interval, MissedTickBehavior},
};

use crate::{
    events::{EventBus, Signal, Subscription},
    key::CacheKey,
    policy::Policy,
};

/// Bound on queued trigger events. Triggers are idempotent requests to
/// reconcile, so events arriving while the queue is full are coalesced.
const TRIGGER_QUEUE: usize = 16;

/// What asked for a revalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The activation started
    Initial,
    /// The refresh interval elapsed
    Interval,
    /// Focus was regained
    Focus,
    /// Network connectivity was restored
    Reconnect,
    /// [`Activation::revalidate`](crate::activation::Activation::revalidate) was called
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Initial => "initial",
            Trigger::Interval => "interval",
            Trigger::Focus => "focus",
            Trigger::Reconnect => "reconnect",
            Trigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// The armed triggers of an activation
pub struct TriggerSet {
    subscriptions: Vec<Subscription>,
    manual: mpsc::Sender<Trigger>,
    armed: Vec<Trigger>,
}

impl TriggerSet {
    /// Arm the triggers `policy` enables for `key`.
    ///
    /// The interval's first tick is one full period from now; the initial
    /// fetch covers time zero. Must be called from within a tokio runtime.
    pub fn arm<E>(
        key: &CacheKey,
        policy: &Policy<E>,
        events: &dyn EventBus,
    ) -> (Self, TriggerStream) {
        let (tx, rx) = mpsc::channel(TRIGGER_QUEUE);
        let mut subscriptions = Vec::new();
        let mut armed = vec![Trigger::Manual];

        if policy.revalidates_on_focus() {
            subscriptions.push(subscribe(events, key, Signal::FocusRegained, Trigger::Focus, &tx));
            armed.push(Trigger::Focus);
        }
        if policy.revalidates_on_reconnect() {
            subscriptions.push(subscribe(
                events,
                key,
                Signal::NetworkRestored,
                Trigger::Reconnect,
                &tx,
            ));
            armed.push(Trigger::Reconnect);
        }

        let interval = policy.polls().then(|| {
            let period = policy.refresh_interval();
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            armed.push(Trigger::Interval);
            interval
        });

        crate::debug_log!("🎯 [TRIGGER] Armed {:?} for key: {}", armed, key);

        (
            Self {
                subscriptions,
                manual: tx,
                armed,
            },
            TriggerStream { rx, interval },
        )
    }

    /// Queue a trigger by hand. Returns false when it was coalesced into an
    /// already queued one or the driver is gone.
    pub fn fire(&self, trigger: Trigger) -> bool {
        enqueue(&self.manual, trigger)
    }

    pub fn is_armed(&self, trigger: Trigger) -> bool {
        self.armed.contains(&trigger)
    }

    /// Number of live signal subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl fmt::Debug for TriggerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerSet").field("armed", &self.armed).finish()
    }
}

/// Receiving half of an armed [`TriggerSet`]
pub struct TriggerStream {
    rx: mpsc::Receiver<Trigger>,
    interval: Option<Interval>,
}

impl TriggerStream {
    /// Wait for the next trigger. Returns `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<Trigger> {
        match &mut self.interval {
            Some(interval) => tokio::select! {
                _ = interval.tick() => Some(Trigger::Interval),
                trigger = self.rx.recv() => trigger,
            },
            None => self.rx.recv().await,
        }
    }
}

fn subscribe(
    events: &dyn EventBus,
    key: &CacheKey,
    signal: Signal,
    trigger: Trigger,
    tx: &mpsc::Sender<Trigger>,
) -> Subscription {
    let tx = tx.clone();
    let key = key.clone();
    events.subscribe(
        signal,
        std::sync::Arc::new(move || {
            crate::log_trigger!("{} signal for key: {}", signal, key);
            enqueue(&tx, trigger);
        }),
    )
}

fn enqueue(tx: &mpsc::Sender<Trigger>, trigger: Trigger) -> bool {
    match tx.try_send(trigger) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            crate::debug_log!("🎯 [TRIGGER] Queue full, coalescing {} trigger", trigger);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SignalBus;
    use std::time::Duration;

    fn key() -> CacheKey {
        CacheKey::new("k")
    }

    #[tokio::test(start_paused = true)]
    async fn test_arms_only_enabled_signals() {
        let bus = SignalBus::new();
        let policy: Policy<()> = Policy::new().revalidate_on_focus(false);
        let (set, _stream) = TriggerSet::arm(&key(), &policy, &bus);

        assert!(!set.is_armed(Trigger::Focus));
        assert!(set.is_armed(Trigger::Reconnect));
        assert!(!set.is_armed(Trigger::Interval));
        assert_eq!(bus.subscriber_count(Signal::FocusRegained), 0);
        assert_eq!(bus.subscriber_count(Signal::NetworkRestored), 1);
        assert_eq!(set.subscription_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_reaches_stream() {
        let bus = SignalBus::new();
        let (_set, mut stream) = TriggerSet::arm(&key(), &Policy::<()>::new(), &bus);

        bus.emit(Signal::NetworkRestored);
        bus.emit(Signal::FocusRegained);

        assert_eq!(stream.next().await, Some(Trigger::Reconnect));
        assert_eq!(stream.next().await, Some(Trigger::Focus));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_first_tick_is_one_period_out() {
        let bus = SignalBus::new();
        let policy: Policy<()> = Policy::new().with_refresh_interval(Duration::from_millis(5000));
        let start = Instant::now();
        let (set, mut stream) = TriggerSet::arm(&key(), &policy, &bus);
        assert!(set.is_armed(Trigger::Interval));

        assert_eq!(stream.next().await, Some(Trigger::Interval));
        assert_eq!(start.elapsed(), Duration::from_millis(5000));
        assert_eq!(stream.next().await, Some(Trigger::Interval));
        assert_eq!(start.elapsed(), Duration::from_millis(10000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_set_unsubscribes_and_ends_stream() {
        let bus = SignalBus::new();
        let (set, mut stream) = TriggerSet::arm(&key(), &Policy::<()>::new(), &bus);
        assert_eq!(bus.subscriber_count(Signal::FocusRegained), 1);

        drop(set);
        assert_eq!(bus.subscriber_count(Signal::FocusRegained), 0);
        assert_eq!(bus.subscriber_count(Signal::NetworkRestored), 0);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_coalesces() {
        let bus = SignalBus::new();
        let (set, mut stream) = TriggerSet::arm(&key(), &Policy::<()>::new(), &bus);

        for _ in 0..TRIGGER_QUEUE {
            assert!(set.fire(Trigger::Manual));
        }
        assert!(!set.fire(Trigger::Manual));

        let mut drained = 0;
        while let Ok(trigger) = stream.rx.try_recv() {
            assert_eq!(trigger, Trigger::Manual);
            drained += 1;
        }
        assert_eq!(drained, TRIGGER_QUEUE);
    }
}
