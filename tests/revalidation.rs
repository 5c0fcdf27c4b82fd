use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use swr_engine::prelude::*;
use tokio::time::sleep;

fn counting_fetcher(delay_ms: u64) -> (impl Fetcher<Output = u32, Error = String>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let fetcher = fetcher_fn(move || {
        let counter = counter.clone();
        async move {
            let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
            sleep(Duration::from_millis(delay_ms)).await;
            Ok(value)
        }
    });
    (fetcher, calls)
}

fn quiet_policy() -> Policy<String> {
    Policy::new()
        .revalidate_on_focus(false)
        .revalidate_on_reconnect(false)
}

async fn advance(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

type Recorded = Arc<Mutex<Vec<RequestState<u32, String>>>>;

fn recorder() -> (Recorded, impl Fn(&RequestState<u32, String>) + Send + Sync + 'static) {
    let log: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (log, move |state: &RequestState<u32, String>| {
        sink.lock().unwrap().push(state.clone());
    })
}

#[tokio::test(start_paused = true)]
async fn repeated_revalidation_inside_window_fetches_once() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(10);
    let activation = runtime.activate("user:1", fetcher, quiet_policy());
    advance(20).await;

    for _ in 0..5 {
        assert!(activation.revalidate());
        advance(300).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1, "all reconciles within 2s are deduped");

    advance(1000).await;
    activation.revalidate();
    advance(20).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(activation.state().value, Some(2));
}

#[tokio::test(start_paused = true)]
async fn second_activation_within_window_is_served_from_cache() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(10);
    let _first = runtime.activate("user:1", fetcher.clone(), quiet_policy());
    advance(500).await;

    let (log, subscriber) = recorder();
    let second = runtime.activate_with("user:1", fetcher, quiet_policy(), subscriber);
    let seeded = second.state();
    assert_eq!(seeded.value, Some(1));
    assert!(!seeded.loading);

    advance(100).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(log.lock().unwrap().is_empty(), "a deduped reconcile changes nothing");
}

#[tokio::test(start_paused = true)]
async fn interval_polls_once_per_period() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(10);
    let policy = quiet_policy().with_refresh_interval(Duration::from_millis(5000));
    let activation = runtime.activate("ticker", fetcher, policy);

    advance(4990).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    advance(20).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    advance(5020).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(activation.state().value, Some(3));
}

#[tokio::test(start_paused = true)]
async fn failed_revalidation_keeps_value_and_reports_once() {
    let runtime = SwrRuntime::new();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let fetcher = fetcher_fn(move || {
        let counter = counter.clone();
        async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(1u32),
                _ => Err("network down".to_string()),
            }
        }
    });
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let policy = quiet_policy().on_error(move |failure| {
        sink.lock().unwrap().push(failure.error().clone());
    });

    let activation = runtime.activate("user:1", fetcher, policy);
    advance(2500).await;
    activation.revalidate();
    advance(10).await;

    let state = activation.state();
    assert_eq!(state.value, Some(1));
    assert_eq!(state.error.as_ref().map(|f| f.error().as_str()), Some("network down"));
    assert!(state.is_settled());
    assert_eq!(*errors.lock().unwrap(), vec!["network down".to_string()]);
    assert_eq!(runtime.cached::<u32>("user:1"), Some(1));
}

fn failing_fetcher(delay_ms: u64) -> (impl Fetcher<Output = u32, Error = String>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let fetcher = fetcher_fn(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(delay_ms)).await;
            Err::<u32, _>("network down".to_string())
        }
    });
    (fetcher, calls)
}

fn error_counter() -> (Policy<String>, Arc<AtomicU32>) {
    let reported = Arc::new(AtomicU32::new(0));
    let sink = reported.clone();
    let policy = Policy::new().on_error(move |_: &FetchFailure<String>| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    (policy, reported)
}

#[tokio::test(start_paused = true)]
async fn first_fetch_failure_without_cache_settles_with_error() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = failing_fetcher(10);
    let (policy, reported) = error_counter();

    let activation = runtime.activate("user:1", fetcher, policy);
    assert!(activation.state().loading);
    advance(50).await;

    let state = activation.state();
    assert_eq!(state.value, None);
    assert_eq!(
        state.error.as_ref().map(|f| f.error().as_str()),
        Some("network down")
    );
    assert!(!state.loading);
    assert!(state.is_settled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert!(!runtime.cache().contains("user:1"));
}

#[tokio::test(start_paused = true)]
async fn trigger_joining_a_failing_fetch_reports_once() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = failing_fetcher(100);
    let (policy, reported) = error_counter();
    let activation = runtime.activate("user:1", fetcher, policy);
    let signals = runtime.signals().unwrap().clone();

    advance(10).await;
    signals.emit(Signal::FocusRegained);
    advance(200).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "the focus reconcile joins the running fetch");
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert!(activation.state().is_settled());
    assert!(activation.state().error.is_some());
}

#[tokio::test(start_paused = true)]
async fn keys_are_isolated() {
    let runtime = SwrRuntime::new();
    let (fetch_a, calls_a) = counting_fetcher(10);
    let b_fetcher = fetcher_fn(|| async { Ok::<_, String>(99u32) });

    let a = runtime.activate("a", fetch_a, quiet_policy());
    let b = runtime.activate("b", b_fetcher, quiet_policy());
    advance(50).await;

    assert_eq!(a.state().value, Some(1));
    assert_eq!(b.state().value, Some(99));
    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.cache().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn loading_is_never_set_alongside_a_value() {
    let runtime = SwrRuntime::new();
    let (fetcher, _) = counting_fetcher(10);
    let (log, subscriber) = recorder();
    let policy = quiet_policy().with_refresh_interval(Duration::from_millis(3000));
    let _activation = runtime.activate_with("k", fetcher, policy, subscriber);

    advance(10_000).await;

    let log = log.lock().unwrap();
    assert!(log.len() >= 4);
    assert!(log.iter().all(RequestState::is_consistent));
    assert!(log.iter().skip(1).all(|state| !state.loading));
}

#[tokio::test(start_paused = true)]
async fn only_enabled_signals_trigger_revalidation() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(10);
    let policy = Policy::new()
        .revalidate_on_focus(false)
        .revalidate_on_reconnect(true);
    let activation = runtime.activate("k", fetcher, policy);
    let signals = runtime.signals().unwrap().clone();

    assert!(!activation.is_armed(swr_engine::runtime::tasks::Trigger::Focus));
    assert_eq!(signals.subscriber_count(Signal::FocusRegained), 0);
    assert_eq!(signals.subscriber_count(Signal::NetworkRestored), 1);

    advance(2500).await;
    signals.emit(Signal::FocusRegained);
    advance(20).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    signals.emit(Signal::NetworkRestored);
    advance(20).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_activations_share_one_fetch() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(100);

    let a = runtime.activate("user:1", fetcher.clone(), quiet_policy());
    let b = runtime.activate("user:1", fetcher.clone(), quiet_policy());
    let c = runtime.activate("user:1", fetcher, quiet_policy());
    advance(150).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "all activations share a single fetch");
    for activation in [&a, &b, &c] {
        assert_eq!(activation.state().value, Some(1));
    }
}

#[tokio::test(start_paused = true)]
async fn dropping_activation_stops_every_trigger() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(10);
    let policy = Policy::new().with_refresh_interval(Duration::from_millis(1000));
    let activation = runtime.activate("k", fetcher, policy);
    let signals = runtime.signals().unwrap().clone();
    advance(20).await;

    drop(activation);
    assert_eq!(signals.subscriber_count(Signal::FocusRegained), 0);
    assert_eq!(signals.subscriber_count(Signal::NetworkRestored), 0);

    advance(20_000).await;
    signals.emit(Signal::FocusRegained);
    signals.emit(Signal::NetworkRestored);
    advance(20).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_key_leaves_activation_idle() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(10);
    let activation = runtime.activate(None::<&str>, fetcher, Policy::new());
    advance(5000).await;

    assert!(!activation.is_active());
    assert_eq!(activation.state(), RequestState::default());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(runtime.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_cache_is_shown_while_revalidating() {
    let runtime = SwrRuntime::new();
    let (fetcher, calls) = counting_fetcher(50);
    let first = runtime.activate("k", fetcher.clone(), quiet_policy());
    advance(100).await;
    first.detach();
    advance(5000).await;

    let (log, subscriber) = recorder();
    let second = runtime.activate_with("k", fetcher, quiet_policy(), subscriber);
    assert_eq!(second.state().value, Some(1));
    assert!(!second.state().loading);

    advance(100).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let log = log.lock().unwrap();
    assert!(log.iter().any(|s| s.validating && s.value == Some(1)));
    assert_eq!(log.last().unwrap().value, Some(2));
    assert!(log.iter().all(|s| !s.loading));
}

#[tokio::test(start_paused = true)]
async fn rearm_switches_key_and_ignores_late_results() {
    let runtime = SwrRuntime::new();
    let slow = fetcher_fn(|| async {
        sleep(Duration::from_millis(100)).await;
        Ok::<_, String>("old".to_string())
    });
    let fast = fetcher_fn(|| async { Ok::<_, String>("new".to_string()) });

    let mut activation = runtime.activate("a", slow, quiet_policy());
    advance(10).await;
    assert!(activation.state().loading);

    activation.rearm("b", fast, quiet_policy());
    assert_eq!(activation.key().as_str(), "b");
    advance(200).await;

    assert_eq!(activation.state().value.as_deref(), Some("new"));
    assert_eq!(runtime.cached::<String>("b").as_deref(), Some("new"));
    assert!(!runtime.cache().contains("a"), "results of a torn down activation are dropped");
}

#[tokio::test(start_paused = true)]
async fn detached_results_fill_cache_when_allowed() {
    let runtime = SwrRuntime::new();
    let (fetcher, _) = counting_fetcher(100);

    let dropped = runtime.activate(
        "kept",
        fetcher.clone(),
        quiet_policy().keep_detached_results(true),
    );
    advance(10).await;
    drop(dropped);

    let discarded = runtime.activate("discarded", fetcher, quiet_policy());
    advance(10).await;
    drop(discarded);

    advance(200).await;
    assert!(runtime.cache().contains("kept"));
    assert!(!runtime.cache().contains("discarded"));
    assert_eq!(runtime.cache().stats().in_flight, 0);
}
