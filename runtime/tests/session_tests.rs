//! Request session behavior across cache policies, cancellation and reset.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use swr_request_core::{
    CachePolicy, CancellationToken, ConfigError, RequestAction, RequestDescriptor, RequestError,
    RequestOptions, RequestState, Response, TransportError,
};
use swr_request_runtime::RequestSession;
use swr_request_testing::{Gate, RecordingCacheStore, ScriptedExecutor, init_test_tracing};
use tokio::sync::broadcast;

type Page = Vec<String>;

fn page(items: &[&str]) -> Page {
    items.iter().map(ToString::to_string).collect()
}

fn replacing_options(
    executor: ScriptedExecutor<Option<String>>,
    policy: CachePolicy,
) -> RequestOptions<u32, Option<String>> {
    RequestOptions::new(None)
        .with_build_request(|id: u32| json!({ "id": id }))
        .with_cache_policy(policy)
        .with_executor(executor)
}

fn paging_options(
    executor: ScriptedExecutor<Page>,
    policy: CachePolicy,
    initial: Page,
) -> RequestOptions<u32, Page> {
    RequestOptions::new(initial)
        .with_build_request(|n: u32| json!({ "page": n, "filter": "all" }))
        .with_cache_policy(policy)
        .with_merge_data(|current: &Page, incoming: Page| {
            current.iter().cloned().chain(incoming).collect()
        })
        .with_executor(executor)
}

const PAGE_ONE_KEY: &str = r#"{"filter":"all","page":1}"#;

fn drain<T: Clone>(actions: &mut broadcast::Receiver<RequestAction<T>>) -> Vec<RequestAction<T>> {
    let mut seen = Vec::new();
    while let Ok(action) = actions.try_recv() {
        seen.push(action);
    }
    seen
}

#[tokio::test]
async fn cold_then_warm_cache_revalidates() {
    init_test_tracing();

    let gate = Gate::new();
    let executor = ScriptedExecutor::new()
        .respond(Some("A".to_string()))
        .gated(Some("B".to_string()), &gate);
    let cache = RecordingCacheStore::new();
    let session = RequestSession::with_cache(
        replacing_options(executor.clone(), CachePolicy::CacheAndNetwork),
        cache.clone(),
    )
    .unwrap();

    // First call: cold cache
    let response = session.do_request(1).await.unwrap();
    assert_eq!(response.data.as_deref(), Some("A"));
    assert_eq!(
        session.state().await,
        RequestState {
            loading: false,
            error: None,
            data: Some("A".to_string()),
        }
    );
    assert_eq!(cache.entry(r#"{"id":1}"#).as_deref(), Some(r#""A""#));

    // Second call: warm cache, live response differs
    let mut actions = session.subscribe_actions();
    let task = session.spawn_request(1);
    executor.wait_for_calls(2).await;

    assert_eq!(session.data().await.as_deref(), Some("A"));
    assert!(!session.loading().await);

    gate.open();
    task.join().await.unwrap();

    assert_eq!(session.data().await.as_deref(), Some("B"));
    assert_eq!(cache.entry(r#"{"id":1}"#).as_deref(), Some(r#""B""#));
    assert_eq!(
        drain(&mut actions),
        vec![
            RequestAction::Succeed {
                payload: Some("A".to_string())
            },
            RequestAction::BackgroundSucceed {
                payload: Some("B".to_string()),
                baseline: Some("A".to_string()),
            },
        ]
    );
}

#[tokio::test]
async fn no_cache_passes_through_loading() {
    init_test_tracing();

    let gate = Gate::new();
    let executor = ScriptedExecutor::new().gated(page(&["b"]), &gate);
    let session =
        RequestSession::new(paging_options(executor.clone(), CachePolicy::NoCache, page(&["a"])))
            .unwrap();
    let mut actions = session.subscribe_actions();

    let task = session.spawn_request(1);
    executor.wait_for_calls(1).await;

    assert!(session.loading().await);
    assert!(session.is_pending());

    gate.open();
    let response = task.join().await.unwrap();

    assert_eq!(response.data, page(&["b"]));
    assert_eq!(session.state().await, RequestState::new(page(&["a", "b"])));
    assert!(!session.is_pending());
    assert_eq!(
        drain(&mut actions),
        vec![
            RequestAction::Start,
            RequestAction::Succeed {
                payload: page(&["b"])
            },
        ]
    );
}

#[tokio::test]
async fn no_cache_never_touches_cache_store() {
    let executor = ScriptedExecutor::new().respond(page(&["b"]));
    let cache = RecordingCacheStore::new().with_entry(PAGE_ONE_KEY, r#"["stale"]"#);
    let session = RequestSession::with_cache(
        paging_options(executor, CachePolicy::NoCache, Vec::new()),
        cache.clone(),
    )
    .unwrap();

    session.do_request(1).await.unwrap();

    assert_eq!(session.data().await, page(&["b"]));
    assert_eq!(cache.read_count(), 0);
    assert_eq!(cache.write_count(), 0);
}

#[tokio::test]
async fn cold_cache_writes_under_canonical_key() {
    let executor = ScriptedExecutor::new().respond(page(&["b"]));
    let cache = RecordingCacheStore::new();
    let session = RequestSession::with_cache(
        paging_options(executor.clone(), CachePolicy::CacheAndNetwork, page(&["a"])),
        cache.clone(),
    )
    .unwrap();
    let mut actions = session.subscribe_actions();

    session.do_request(1).await.unwrap();

    assert_eq!(session.data().await, page(&["a", "b"]));
    assert_eq!(drain(&mut actions)[0], RequestAction::Start);

    let writes = cache.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0.as_str(), PAGE_ONE_KEY);
    assert_eq!(writes[0].1, r#"["b"]"#);
    assert_eq!(
        executor.calls()[0].as_value(),
        &json!({ "filter": "all", "page": 1 })
    );
}

#[tokio::test]
async fn warm_cache_unchanged_response_applies_once() {
    let executor = ScriptedExecutor::new().respond(page(&["b"]));
    let cache = RecordingCacheStore::new().with_entry(PAGE_ONE_KEY, r#"["b"]"#);
    let session = RequestSession::with_cache(
        paging_options(executor.clone(), CachePolicy::CacheAndNetwork, page(&["a"])),
        cache.clone(),
    )
    .unwrap();
    let mut actions = session.subscribe_actions();

    let response = session.do_request(1).await.unwrap();

    assert_eq!(response.raw, r#"["b"]"#);
    assert_eq!(executor.call_count(), 1);
    assert_eq!(session.state().await, RequestState::new(page(&["a", "b"])));
    assert_eq!(cache.write_count(), 0);
    assert_eq!(
        drain(&mut actions),
        vec![RequestAction::Succeed {
            payload: page(&["b"])
        }]
    );
}

#[tokio::test]
async fn warm_cache_changed_response_merges_onto_baseline() {
    let gate = Gate::new();
    let executor = ScriptedExecutor::new().gated(page(&["c"]), &gate);
    let cache = RecordingCacheStore::new().with_entry(PAGE_ONE_KEY, r#"["b"]"#);
    let session = RequestSession::with_cache(
        paging_options(executor.clone(), CachePolicy::CacheAndNetwork, page(&["a"])),
        cache.clone(),
    )
    .unwrap();
    let mut actions = session.subscribe_actions();

    let task = session.spawn_request(1);
    executor.wait_for_calls(1).await;

    // Cache hit is visible before the live call settles, without loading
    assert_eq!(session.state().await, RequestState::new(page(&["a", "b"])));

    gate.open();
    task.join().await.unwrap();

    // Merged onto ["a"], not onto ["a", "b"]
    assert_eq!(session.state().await, RequestState::new(page(&["a", "c"])));
    assert_eq!(cache.entry(PAGE_ONE_KEY).as_deref(), Some(r#"["c"]"#));

    let seen = drain(&mut actions);
    assert!(!seen.contains(&RequestAction::Start));
    assert_eq!(
        seen.last(),
        Some(&RequestAction::BackgroundSucceed {
            payload: page(&["c"]),
            baseline: page(&["a"]),
        })
    );
}

#[tokio::test]
async fn unreadable_cache_entry_falls_back_to_fetch() {
    init_test_tracing();

    let executor = ScriptedExecutor::new().respond(page(&["b"]));
    let cache = RecordingCacheStore::new().with_entry(PAGE_ONE_KEY, "{not json");
    let session = RequestSession::with_cache(
        paging_options(executor, CachePolicy::CacheAndNetwork, Vec::new()),
        cache.clone(),
    )
    .unwrap();
    let mut actions = session.subscribe_actions();

    session.do_request(1).await.unwrap();

    assert_eq!(drain(&mut actions)[0], RequestAction::Start);
    assert_eq!(cache.entry(PAGE_ONE_KEY).as_deref(), Some(r#"["b"]"#));
}

#[tokio::test]
async fn transport_failure_is_recorded_and_returned() {
    let error = TransportError::new("internal server error")
        .with_status(500)
        .with_payload(json!({ "code": "E_DOWN" }));
    let executor = ScriptedExecutor::new()
        .respond(page(&["b"]))
        .fail(error.clone());
    let session =
        RequestSession::new(paging_options(executor, CachePolicy::NoCache, page(&["a"]))).unwrap();

    session.do_request(1).await.unwrap();
    let result = session.do_request(2).await;

    assert_eq!(result.unwrap_err(), RequestError::Transport(error.clone()));
    assert_eq!(
        session.state().await,
        RequestState {
            loading: false,
            error: Some(error),
            data: page(&["a"]),
        }
    );
}

#[tokio::test]
async fn failed_revalidation_drops_cached_data() {
    let executor = ScriptedExecutor::new().fail(TransportError::new("offline"));
    let cache = RecordingCacheStore::new().with_entry(PAGE_ONE_KEY, r#"["b"]"#);
    let session = RequestSession::with_cache(
        paging_options(executor, CachePolicy::CacheAndNetwork, Vec::new()),
        cache.clone(),
    )
    .unwrap();

    let result = session.do_request(1).await;

    assert!(matches!(result, Err(RequestError::Transport(_))));
    assert_eq!(session.error().await, Some(TransportError::new("offline")));
    assert!(session.data().await.is_empty());
    assert_eq!(cache.write_count(), 0);
}

#[tokio::test]
async fn abort_cancels_in_flight_request() {
    init_test_tracing();

    let cancelled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cancelled);
    let executor = ScriptedExecutor::new().until_cancelled();
    let session = RequestSession::new(
        replacing_options(executor.clone(), CachePolicy::NoCache).with_on_cancelled(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    let task = session.spawn_request(1);
    executor.wait_for_calls(1).await;
    assert!(session.loading().await);

    session.abort().unwrap();
    let result = task.join().await;

    assert_eq!(result.unwrap_err(), RequestError::Cancelled);
    assert_eq!(session.state().await, RequestState::new(None));
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert!(!session.is_pending());
}

#[tokio::test]
async fn abort_during_revalidation_keeps_cached_data() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cancelled);
    let executor = ScriptedExecutor::new().until_cancelled();
    let cache = RecordingCacheStore::new().with_entry(PAGE_ONE_KEY, r#"["b"]"#);
    let session = RequestSession::with_cache(
        paging_options(executor.clone(), CachePolicy::CacheAndNetwork, page(&["a"]))
            .with_on_cancelled(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        cache.clone(),
    )
    .unwrap();

    let task = session.spawn_request(1);
    executor.wait_for_calls(1).await;
    assert!(session.is_pending());

    session.abort().unwrap();

    assert_eq!(task.join().await.unwrap_err(), RequestError::Cancelled);
    assert_eq!(session.state().await, RequestState::new(page(&["a", "b"])));
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(cache.write_count(), 0);
    assert!(!session.is_pending());
}

#[tokio::test]
async fn dropped_request_releases_token() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cancelled);
    let executor = ScriptedExecutor::new().until_cancelled();
    let session = RequestSession::new(
        replacing_options(executor, CachePolicy::NoCache).with_on_cancelled(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    let mut states = session.subscribe();

    let timed_out = tokio::time::timeout(Duration::from_millis(20), session.do_request(1)).await;
    assert!(timed_out.is_err());

    assert!(!session.is_pending());
    assert_eq!(session.abort(), Err(RequestError::NoPendingRequest));
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);

    let settled = tokio::time::timeout(Duration::from_secs(1), states.wait_for(|s| !s.loading))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(settled, RequestState::new(None));
}

#[tokio::test]
async fn abort_without_request_fails_and_leaves_state() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cancelled);
    let executor = ScriptedExecutor::new().respond(Some("A".to_string()));
    let session = RequestSession::new(
        replacing_options(executor, CachePolicy::NoCache).with_on_cancelled(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    assert_eq!(session.abort(), Err(RequestError::NoPendingRequest));

    session.do_request(1).await.unwrap();
    let before = session.state().await;

    assert_eq!(session.abort(), Err(RequestError::NoPendingRequest));
    assert_eq!(session.state().await, before);
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn abort_only_reaches_latest_request() {
    let gate = Gate::new();
    let executor = ScriptedExecutor::new()
        .gated(Some("first".to_string()), &gate)
        .until_cancelled();
    let session =
        RequestSession::new(replacing_options(executor.clone(), CachePolicy::NoCache)).unwrap();

    let first = session.spawn_request(1);
    executor.wait_for_calls(1).await;
    let second = session.spawn_request(2);
    executor.wait_for_calls(2).await;

    session.abort().unwrap();
    assert_eq!(second.join().await.unwrap_err(), RequestError::Cancelled);

    gate.open();
    let response = first.join().await.unwrap();

    assert_eq!(response.data.as_deref(), Some("first"));
    assert_eq!(session.data().await.as_deref(), Some("first"));
}

#[tokio::test]
async fn reset_restores_initial_state() {
    let executor = ScriptedExecutor::new()
        .respond(page(&["b"]))
        .fail(TransportError::new("boom"));
    let session =
        RequestSession::new(paging_options(executor, CachePolicy::NoCache, page(&["a"]))).unwrap();

    session.do_request(1).await.unwrap();
    session.reset().await;
    assert_eq!(session.state().await, RequestState::new(page(&["a"])));

    let _ = session.do_request(2).await;
    assert!(session.error().await.is_some());
    session.reset().await;
    assert_eq!(session.state().await, RequestState::new(page(&["a"])));
}

#[tokio::test]
async fn reset_does_not_stop_in_flight_request() {
    let gate = Gate::new();
    let executor = ScriptedExecutor::new().gated(page(&["b"]), &gate);
    let session =
        RequestSession::new(paging_options(executor.clone(), CachePolicy::NoCache, page(&["a"])))
            .unwrap();

    let task = session.spawn_request(1);
    executor.wait_for_calls(1).await;

    session.reset().await;
    assert!(!session.loading().await);

    gate.open();
    task.join().await.unwrap();

    // Settles into the reset state
    assert_eq!(session.data().await, page(&["a", "b"]));
}

#[tokio::test]
async fn update_data_keeps_flags() {
    let gate = Gate::new();
    let executor = ScriptedExecutor::new().gated(page(&["b"]), &gate);
    let session =
        RequestSession::new(paging_options(executor.clone(), CachePolicy::NoCache, Vec::new()))
            .unwrap();

    let task = session.spawn_request(1);
    executor.wait_for_calls(1).await;

    session.update_data(page(&["manual"])).await;
    assert!(session.loading().await);
    assert_eq!(session.data().await, page(&["manual"]));

    gate.open();
    task.join().await.unwrap();
    assert_eq!(session.data().await, page(&["manual", "b"]));
}

#[tokio::test]
async fn state_subscribers_see_settled_state() {
    let executor = ScriptedExecutor::new().respond(Some("A".to_string()));
    let session =
        RequestSession::new(replacing_options(executor, CachePolicy::NoCache)).unwrap();
    let mut states = session.subscribe();

    session.do_request(1).await.unwrap();

    assert!(states.has_changed().unwrap());
    assert_eq!(states.borrow_and_update().data.as_deref(), Some("A"));
}

#[tokio::test]
async fn settings_document_configures_session() {
    let executor = ScriptedExecutor::new().respond(Some("A".to_string()));
    let options = replacing_options(executor, CachePolicy::NoCache)
        .apply_settings(&json!({ "cache_policy": "cache-and-network", "initial_data": "seed" }))
        .unwrap();
    let session = RequestSession::with_cache(options, RecordingCacheStore::new()).unwrap();

    assert_eq!(session.cache_policy(), CachePolicy::CacheAndNetwork);
    assert_eq!(session.data().await.as_deref(), Some("seed"));
}

#[tokio::test]
async fn invalid_settings_rejected_before_any_request() {
    let executor = ScriptedExecutor::<Option<String>>::new();

    let unknown = replacing_options(executor.clone(), CachePolicy::NoCache)
        .apply_settings(&json!({ "retry": 3 }));
    assert!(matches!(unknown, Err(ConfigError::UnknownOption(_))));

    let not_callable = replacing_options(executor.clone(), CachePolicy::NoCache)
        .apply_settings(&json!({ "merge_data": "append" }));
    assert!(matches!(not_callable, Err(ConfigError::NotCallable(_))));

    let bad_policy = replacing_options(executor.clone(), CachePolicy::NoCache)
        .apply_settings(&json!({ "cache_policy": "network-only" }));
    assert!(matches!(bad_policy, Err(ConfigError::InvalidCachePolicy(_))));

    assert_eq!(executor.call_count(), 0);
}

async fn exploding_transport(
    _request: RequestDescriptor,
    _signal: CancellationToken,
) -> Result<Response<Option<String>>, RequestError> {
    panic!("transport exploded")
}

#[tokio::test]
async fn panicking_task_reports_internal_error() {
    let session = RequestSession::new(
        RequestOptions::new(None)
            .with_build_request(|id: u32| json!({ "id": id }))
            .with_executor(exploding_transport),
    )
    .unwrap();

    let mut states = session.subscribe();

    let result = session.spawn_request(1).join().await;

    assert!(matches!(result, Err(RequestError::Internal(_))));
    assert!(!session.is_pending());
    assert_eq!(session.abort(), Err(RequestError::NoPendingRequest));

    let settled = tokio::time::timeout(Duration::from_secs(1), states.wait_for(|s| !s.loading))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(settled, RequestState::new(None));
}

#[tokio::test]
async fn clones_share_session() {
    let gate = Gate::new();
    let executor = ScriptedExecutor::new().gated(Some("A".to_string()), &gate);
    let session =
        RequestSession::new(replacing_options(executor.clone(), CachePolicy::NoCache)).unwrap();
    let handle = session.clone();

    let task = session.spawn_request(1);
    executor.wait_for_calls(1).await;

    assert!(handle.is_pending());
    gate.open();

    tokio::time::timeout(Duration::from_secs(1), task.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.data().await.as_deref(), Some("A"));
}
