//! # SWR Request Testing
//!
//! Testing utilities for request sessions.
//!
//! This crate provides:
//! - [`ScriptedExecutor`]: a request executor that replays scripted replies
//! - [`RecordingCacheStore`]: an in-memory cache store that records traffic
//! - [`ReducerTest`]: Given-When-Then testing for reducers
//! - proptest strategies for request actions
//!
//! ## Example
//!
//! ```ignore
//! use swr_request_testing::{RecordingCacheStore, ScriptedExecutor};
//! use swr_request_runtime::RequestSession;
//!
//! #[tokio::test]
//! async fn test_cold_cache() {
//!     let executor = ScriptedExecutor::new().respond("A".to_string());
//!     let cache = RecordingCacheStore::new();
//!     let session = RequestSession::with_cache(options(executor.clone()), cache.clone())?;
//!
//!     session.do_request(1).await?;
//!
//!     assert_eq!(cache.write_count(), 1);
//! }
//! ```


pub use reducer_test::{ReducerTest, assertions};

/// Install a test-friendly tracing subscriber
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test;
/// only the first call installs the subscriber.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Mock implementations of the session's collaborators.
pub mod mocks {
    use futures::future::BoxFuture;
    use serde::Serialize;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use swr_request_core::{
        CacheKey, CacheStore, CancellationToken, MemoryCacheStore, RequestDescriptor,
        RequestError, RequestExecutor, Response, TransportError,
    };
    use tokio::sync::{Notify, watch};

    /// Releases a gated reply
    ///
    /// Opening the gate before the executor reaches it is fine; the reply is
    /// released as soon as it is awaited.
    #[derive(Debug, Clone, Default)]
    pub struct Gate(Arc<Notify>);

    impl Gate {
        /// Create a closed gate
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Release the reply waiting on this gate
        pub fn open(&self) {
            self.0.notify_one();
        }
    }

    enum Step<T> {
        Respond(Response<T>),
        Fail(TransportError),
        UntilCancelled,
        Gated(Response<T>, Gate),
    }

    struct ScriptInner<T> {
        steps: Mutex<VecDeque<Step<T>>>,
        calls: Mutex<Vec<RequestDescriptor>>,
        call_count: watch::Sender<usize>,
    }

    /// Request executor that replays a script, one step per call
    ///
    /// Cloning shares the script and the call log, so a test can keep a
    /// clone after handing one to a session. Calls beyond the end of the
    /// script fail with a transport error.
    ///
    /// # Example
    ///
    /// ```
    /// use swr_request_testing::mocks::ScriptedExecutor;
    ///
    /// let executor = ScriptedExecutor::new()
    ///     .respond("A".to_string())
    ///     .respond("B".to_string());
    /// assert_eq!(executor.call_count(), 0);
    /// ```
    pub struct ScriptedExecutor<T> {
        inner: Arc<ScriptInner<T>>,
    }

    impl<T> ScriptedExecutor<T> {
        /// Create an executor with an empty script
        #[must_use]
        pub fn new() -> Self {
            let (call_count, _) = watch::channel(0);
            Self {
                inner: Arc::new(ScriptInner {
                    steps: Mutex::new(VecDeque::new()),
                    calls: Mutex::new(Vec::new()),
                    call_count,
                }),
            }
        }

        fn push(self, step: Step<T>) -> Self {
            self.inner
                .steps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(step);
            self
        }

        /// Reply with `data`, serialized to JSON for the raw body
        ///
        /// # Panics
        ///
        /// Panics if `data` cannot be serialized.
        #[must_use]
        #[allow(clippy::expect_used)] // Test helper
        pub fn respond(self, data: T) -> Self
        where
            T: Serialize,
        {
            let response = Response::from_data(data).expect("scripted data should serialize");
            self.push(Step::Respond(response))
        }

        /// Reply with a prepared response
        #[must_use]
        pub fn respond_with(self, response: Response<T>) -> Self {
            self.push(Step::Respond(response))
        }

        /// Fail with a transport error
        #[must_use]
        pub fn fail(self, error: TransportError) -> Self {
            self.push(Step::Fail(error))
        }

        /// Never reply; settle as cancelled once the signal fires
        #[must_use]
        pub fn until_cancelled(self) -> Self {
            self.push(Step::UntilCancelled)
        }

        /// Reply with `data` once `gate` opens, or settle as cancelled
        ///
        /// # Panics
        ///
        /// Panics if `data` cannot be serialized.
        #[must_use]
        #[allow(clippy::expect_used)] // Test helper
        pub fn gated(self, data: T, gate: &Gate) -> Self
        where
            T: Serialize,
        {
            let response = Response::from_data(data).expect("scripted data should serialize");
            self.push(Step::Gated(response, gate.clone()))
        }

        /// Descriptors of every call so far, in call order
        #[must_use]
        pub fn calls(&self) -> Vec<RequestDescriptor> {
            self.inner
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of calls so far
        #[must_use]
        pub fn call_count(&self) -> usize {
            *self.inner.call_count.borrow()
        }

        /// Wait until at least `count` calls were made
        pub async fn wait_for_calls(&self, count: usize) {
            let mut rx = self.inner.call_count.subscribe();
            // Sender lives as long as self
            let _ = rx.wait_for(|calls| *calls >= count).await;
        }
    }

    impl<T> Default for ScriptedExecutor<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> Clone for ScriptedExecutor<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T> std::fmt::Debug for ScriptedExecutor<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("ScriptedExecutor")
                .field("calls", &self.call_count())
                .finish_non_exhaustive()
        }
    }

    impl<T: Send + Sync + 'static> RequestExecutor<T> for ScriptedExecutor<T> {
        fn execute(
            &self,
            request: RequestDescriptor,
            signal: CancellationToken,
        ) -> BoxFuture<'_, Result<Response<T>, RequestError>> {
            self.inner
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);

            let step = self
                .inner
                .steps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            self.inner.call_count.send_modify(|calls| *calls += 1);

            Box::pin(async move {
                match step {
                    Some(Step::Respond(response)) => Ok(response),
                    Some(Step::Fail(error)) => Err(RequestError::Transport(error)),
                    Some(Step::UntilCancelled) => {
                        signal.cancelled().await;
                        Err(RequestError::Cancelled)
                    },
                    Some(Step::Gated(response, gate)) => {
                        tokio::select! {
                            () = signal.cancelled() => Err(RequestError::Cancelled),
                            () = gate.0.notified() => Ok(response),
                        }
                    },
                    None => Err(RequestError::transport("script exhausted")),
                }
            })
        }
    }

    /// In-memory cache store that records reads and writes
    ///
    /// Cloning shares the entries and the log.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingCacheStore {
        entries: MemoryCacheStore,
        writes: Arc<Mutex<Vec<(CacheKey, String)>>>,
        reads: Arc<AtomicUsize>,
    }

    impl RecordingCacheStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed an entry without recording a write
        #[must_use]
        pub fn with_entry(self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.entries.set(&CacheKey::new(key), value.into());
            self
        }

        /// Current value under `key`, without recording a read
        #[must_use]
        pub fn entry(&self, key: &str) -> Option<String> {
            self.entries.get(&CacheKey::new(key))
        }

        /// Every write so far, in order
        #[must_use]
        pub fn writes(&self) -> Vec<(CacheKey, String)> {
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of writes so far
        #[must_use]
        pub fn write_count(&self) -> usize {
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// Number of reads so far
        #[must_use]
        pub fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl CacheStore for RecordingCacheStore {
        fn get(&self, key: &CacheKey) -> Option<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.entries.get(key)
        }

        fn set(&self, key: &CacheKey, value: String) {
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((key.clone(), value.clone()));
            self.entries.set(key, value);
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use swr_request_core::{RequestAction, TransportError};

    /// Strategy producing any request action, with payloads from `payload`
    pub fn request_action<T, P>(payload: P) -> impl Strategy<Value = RequestAction<T>>
    where
        T: Clone + std::fmt::Debug + 'static,
        P: Strategy<Value = T> + Clone + 'static,
    {
        prop_oneof![
            Just(RequestAction::Start),
            payload
                .clone()
                .prop_map(|payload| RequestAction::Succeed { payload }),
            (payload.clone(), payload.clone()).prop_map(|(payload, baseline)| {
                RequestAction::BackgroundSucceed { payload, baseline }
            }),
            transport_error().prop_map(|error| RequestAction::Fail { error }),
            Just(RequestAction::Cancel),
            Just(RequestAction::Reset),
            payload.prop_map(|value| RequestAction::SetData { value }),
        ]
    }

    /// Strategy producing transport errors with an optional HTTP status
    pub fn transport_error() -> impl Strategy<Value = TransportError> {
        ("[a-z ]{1,16}", proptest::option::of(400_u16..600)).prop_map(|(message, status)| {
            let error = TransportError::new(message);
            match status {
                Some(status) => error.with_status(status),
                None => error,
            }
        })
    }
}

// Re-export commonly used items
pub use mocks::{Gate, RecordingCacheStore, ScriptedExecutor};
