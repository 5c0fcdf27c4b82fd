//! A user profile kept fresh by polling and by focus/reconnect signals.
//!
//! Run with `cargo run --example user_profile`.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use swr_engine::prelude::*;
use tokio::time::sleep;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct User {
    id: u32,
    name: String,
    revision: u32,
}

/// Stands in for an HTTP client: every call bumps the revision, and every
/// fourth call fails the way a dropped connection would.
#[derive(Clone)]
struct UserApi {
    user_id: u32,
    calls: Arc<AtomicU32>,
}

impl Fetcher for UserApi {
    type Output = User;
    type Error = String;

    fn fetch(&self) -> impl Future<Output = Result<User, String>> + Send + 'static {
        let user_id = self.user_id;
        let calls = self.calls.clone();
        async move {
            sleep(Duration::from_millis(150)).await;
            let revision = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if revision % 4 == 0 {
                return Err("network down".to_string());
            }
            Ok(User {
                id: user_id,
                name: format!("User {user_id}"),
                revision,
            })
        }
    }
}

fn render(state: &RequestState<User, String>) -> String {
    if let Some(failure) = &state.error {
        return format!("Error loading user ({failure})");
    }
    if state.loading {
        return "Loading...".to_string();
    }
    if state.validating {
        return "Validating...".to_string();
    }
    match &state.value {
        Some(user) => format!("{} (revision {})", user.name, user.revision),
        None => "Nothing to show".to_string(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    let runtime = SwrRuntime::new();
    let api = UserApi {
        user_id: 1,
        calls: Arc::new(AtomicU32::new(0)),
    };
    let policy = Policy::<String>::new()
        .with_refresh_interval(Duration::from_secs(2))
        .revalidate_on_focus(true)
        .on_error(|failure| eprintln!("on_error: {failure}"));

    let profile = runtime.activate_with(
        "users/1",
        api,
        policy,
        |state: &RequestState<User, String>| {
            println!("render: {}", render(state));
        },
    );

    sleep(Duration::from_millis(2500)).await;
    if let Some(signals) = runtime.signals() {
        // Inside the deduping interval of the last poll: served from cache.
        signals.emit(Signal::FocusRegained);
        sleep(Duration::from_millis(2500)).await;
        signals.emit(Signal::NetworkRestored);
    }
    sleep(Duration::from_secs(3)).await;

    if let Some(user) = profile.state().value {
        match serde_json::to_string_pretty(&user) {
            Ok(json) => println!("final:\n{json}"),
            Err(err) => eprintln!("could not serialize user: {err}"),
        }
    }
    println!("cache: {:?}", runtime.cache().stats());
    profile.detach();
}
