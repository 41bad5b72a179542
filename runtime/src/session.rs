//! Request sessions.
//!
//! A [`RequestSession`] owns one [`RequestState`] and drives it through the
//! request reducer. It decides per call whether to serve from the cache store,
//! issues the transport call with a fresh cancellation token, writes the cache
//! and turns every outcome into an action.
//!
//! # Cache policies
//!
//! - **no-cache**: `Start`, transport call, then `Succeed` or `Fail`/`Cancel`.
//!   The cache store is never read or written.
//! - **cache-and-network**, cold cache: as no-cache, then the raw response is
//!   written under the request's cache key.
//! - **cache-and-network**, warm cache: the cached data is dispatched as
//!   `Succeed` straight away without `Start`, then the transport call runs. If
//!   the raw live response differs from the cached one it is dispatched as
//!   `BackgroundSucceed` against the data captured before the cache hit, and
//!   written back to the cache.

use crate::cancellation::{CancellationController, InFlightToken};
use crate::metrics::SessionMetrics;
use crate::store::Store;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use swr_request_core::options::BuildRequestFn;
use swr_request_core::{
    CacheKey, CachePolicy, CacheStore, ConfigError, RequestAction, RequestDescriptor,
    RequestEnvironment, RequestError, RequestExecutor, RequestOptions, RequestReducer,
    RequestState, Response, TransportError,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

type RequestStore<T> =
    Store<RequestState<T>, RequestAction<T>, RequestEnvironment<T>, RequestReducer<T>>;

/// One logical request session
///
/// Cloning is cheap; every clone drives the same state, cache store and
/// cancellation controller.
///
/// # Type Parameters
///
/// - `Args`: Call-time arguments passed to `build_request`
/// - `T`: Data type held in state (also the response payload type)
pub struct RequestSession<Args, T>
where
    T: Clone,
{
    inner: Arc<SessionInner<Args, T>>,
}

struct SessionInner<Args, T>
where
    T: Clone,
{
    store: RequestStore<T>,
    build_request: BuildRequestFn<Args>,
    cache_policy: CachePolicy,
    cache: Option<Arc<dyn CacheStore>>,
    executor: Arc<dyn RequestExecutor<T>>,
    cancellation: CancellationController,
}

/// Releases a request's token when its transport call ends
///
/// If the call never settled (the request future was dropped or the executor
/// panicked) while the token was still current, a `Cancel` is dispatched so
/// `loading` does not stay set.
struct InFlightGuard<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    cancellation: &'a CancellationController,
    store: &'a RequestStore<T>,
    token: InFlightToken,
    settled: bool,
}

impl<T> Drop for InFlightGuard<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let released = self.cancellation.release(&self.token);
        if self.settled || !released {
            return;
        }

        tracing::debug!(token = self.token.id(), "Request dropped before settling");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    let _ = store.send(RequestAction::Cancel).await;
                });
            },
            Err(_) => tracing::warn!("No runtime to settle dropped request"),
        }
    }
}

/// Cached entry that parsed into the data type
struct CachedEntry<T> {
    raw: String,
    data: T,
}

impl<Args, T> RequestSession<Args, T>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    /// Create a session without a cache store
    ///
    /// Cache reads and writes become no-ops, so `cache-and-network` behaves
    /// like `no-cache`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `options` is missing a required callable.
    pub fn new(options: RequestOptions<Args, T>) -> Result<Self, ConfigError> {
        Self::build(options, None)
    }

    /// Create a session backed by a cache store
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `options` is missing a required callable.
    pub fn with_cache<C>(options: RequestOptions<Args, T>, cache: C) -> Result<Self, ConfigError>
    where
        C: CacheStore + 'static,
    {
        Self::build(options, Some(Arc::new(cache)))
    }

    fn build(
        options: RequestOptions<Args, T>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self, ConfigError> {
        let resolved = options.resolve()?;

        tracing::debug!(
            policy = %resolved.cache_policy,
            has_cache = cache.is_some(),
            "Creating request session"
        );

        let initial_state = RequestState::new(resolved.environment.initial_data.clone());
        let store = Store::new(initial_state, RequestReducer::new(), resolved.environment);

        Ok(Self {
            inner: Arc::new(SessionInner {
                store,
                build_request: resolved.build_request,
                cache_policy: resolved.cache_policy,
                cache,
                executor: resolved.executor,
                cancellation: CancellationController::new(resolved.on_cancelled),
            }),
        })
    }

    /// Issue a request
    ///
    /// Resolves once the live transport call settled, after its outcome was
    /// dispatched. On a warm cache the cached data is already in state before
    /// the transport call starts.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Cancelled`] if the request was aborted
    /// - [`RequestError::Transport`] (or whatever the executor returned) if
    ///   the transport call failed; the same error is recorded into state
    #[tracing::instrument(skip(self, args), name = "do_request", fields(policy = %self.inner.cache_policy))]
    pub async fn do_request(&self, args: Args) -> Result<Response<T>, RequestError> {
        let request = (self.inner.build_request)(args);
        let key = request.cache_key();

        SessionMetrics::record_request(self.inner.cache_policy);

        let cached = if self.inner.cache_policy.uses_cache() {
            self.read_cache(&key)
        } else {
            None
        };

        match cached {
            Some(entry) => self.revalidate(request, &key, entry).await,
            None => self.fetch(request, &key).await,
        }
    }

    /// Issue a request on a background task
    ///
    /// Requires a Tokio runtime.
    pub fn spawn_request(&self, args: Args) -> RequestTask<T>
    where
        Args: Send + 'static,
    {
        let session = self.clone();
        RequestTask {
            handle: tokio::spawn(async move { session.do_request(args).await }),
        }
    }

    async fn fetch(
        &self,
        request: RequestDescriptor,
        key: &CacheKey,
    ) -> Result<Response<T>, RequestError> {
        let store = &self.inner.store;
        let _ = store.send(RequestAction::Start).await;

        match self.execute(request).await {
            Ok(response) => {
                let _ = store
                    .send(RequestAction::Succeed {
                        payload: response.data.clone(),
                    })
                    .await;

                if self.inner.cache_policy.uses_cache() {
                    self.write_cache(key, &response.raw);
                }

                Ok(response)
            },
            Err(error) => Err(self.settle_error(error).await),
        }
    }

    async fn revalidate(
        &self,
        request: RequestDescriptor,
        key: &CacheKey,
        cached: CachedEntry<T>,
    ) -> Result<Response<T>, RequestError> {
        let store = &self.inner.store;

        // Baseline is read under the same lock that applies the cache hit
        let (baseline, _) = store
            .snapshot_and_send(
                RequestAction::Succeed {
                    payload: cached.data,
                },
                |state| state.data.clone(),
            )
            .await;

        let response = match self.execute(request).await {
            Ok(response) => response,
            Err(error) => return Err(self.settle_error(error).await),
        };

        let changed = response.raw != cached.raw;
        SessionMetrics::record_revalidation(changed);

        if changed {
            tracing::debug!(key = %key, "Revalidation returned fresh data");
            let _ = store
                .send(RequestAction::BackgroundSucceed {
                    payload: response.data.clone(),
                    baseline,
                })
                .await;
            self.write_cache(key, &response.raw);
        } else {
            tracing::debug!(key = %key, "Revalidation matched cached data");
        }

        Ok(response)
    }

    async fn execute(&self, request: RequestDescriptor) -> Result<Response<T>, RequestError> {
        let mut guard = InFlightGuard {
            cancellation: &self.inner.cancellation,
            store: &self.inner.store,
            token: self.inner.cancellation.issue(),
            settled: false,
        };
        let signal = guard.token.signal();

        let result = tokio::select! {
            biased;
            () = signal.cancelled() => Err(RequestError::Cancelled),
            result = self.inner.executor.execute(request, signal.clone()) => result,
        };

        guard.settled = true;
        result
    }

    async fn settle_error(&self, error: RequestError) -> RequestError {
        let action = if error.is_cancelled() {
            SessionMetrics::record_cancellation();
            tracing::debug!("Request cancelled");
            RequestAction::Cancel
        } else {
            SessionMetrics::record_failure();
            tracing::warn!(error = %error, "Request failed");
            RequestAction::Fail {
                error: error.to_transport(),
            }
        };

        let _ = self.inner.store.send(action).await;
        error
    }

    fn read_cache(&self, key: &CacheKey) -> Option<CachedEntry<T>> {
        let Some(raw) = self.inner.cache.as_ref().and_then(|cache| cache.get(key)) else {
            SessionMetrics::record_cache_miss();
            tracing::debug!(key = %key, "Cache miss");
            return None;
        };

        match serde_json::from_str(&raw) {
            Ok(data) => {
                SessionMetrics::record_cache_hit();
                tracing::debug!(key = %key, "Cache hit");
                Some(CachedEntry { raw, data })
            },
            Err(e) => {
                SessionMetrics::record_cache_miss();
                tracing::warn!(key = %key, error = %e, "Ignoring unreadable cache entry");
                None
            },
        }
    }

    fn write_cache(&self, key: &CacheKey, raw: &str) {
        if let Some(cache) = &self.inner.cache {
            cache.set(key, raw.to_string());
            tracing::trace!(key = %key, "Cache entry written");
        }
    }

    /// Return to the initial state
    ///
    /// A request already in flight still settles into the reset state.
    pub async fn reset(&self) {
        let _ = self.inner.store.send(RequestAction::Reset).await;
    }

    /// Replace data directly, leaving `loading` and `error` as they are
    pub async fn update_data(&self, value: T) {
        let _ = self.inner.store.send(RequestAction::SetData { value }).await;
    }

    /// Cancel the in-flight request and invoke the cancellation callback
    ///
    /// The aborted request then settles as [`RequestError::Cancelled`] and
    /// clears `loading` without recording an error.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoPendingRequest`] if nothing is in flight.
    pub fn abort(&self) -> Result<(), RequestError> {
        self.inner.cancellation.abort()
    }

    /// Check if a request currently holds the cancellation token
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.cancellation.is_pending()
    }

    /// The cache policy this session runs with
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        self.inner.cache_policy
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> RequestState<T> {
        self.inner.store.state(Clone::clone).await
    }

    /// Whether a live request is in flight
    pub async fn loading(&self) -> bool {
        self.inner.store.state(|s| s.loading).await
    }

    /// Error from the last failed request
    pub async fn error(&self) -> Option<TransportError> {
        self.inner.store.state(|s| s.error.clone()).await
    }

    /// Current data
    pub async fn data(&self) -> T {
        self.inner.store.state(|s| s.data.clone()).await
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.inner.store.subscribe_state()
    }

    /// Subscribe to every dispatched action
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<RequestAction<T>> {
        self.inner.store.subscribe_actions()
    }
}

impl<Args, T> Clone for RequestSession<Args, T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Args, T> std::fmt::Debug for RequestSession<Args, T>
where
    T: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSession")
            .field("cache_policy", &self.inner.cache_policy)
            .field("has_cache", &self.inner.cache.is_some())
            .field("cancellation", &self.inner.cancellation)
            .finish_non_exhaustive()
    }
}

/// A request running on a background task
#[derive(Debug)]
pub struct RequestTask<T> {
    handle: JoinHandle<Result<Response<T>, RequestError>>,
}

impl<T> RequestTask<T> {
    /// Check if the request has settled
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the request to settle
    ///
    /// # Errors
    ///
    /// Returns the request's own error, or [`RequestError::Internal`] if the
    /// task panicked or was aborted.
    pub async fn join(self) -> Result<Response<T>, RequestError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Request task did not complete");
                Err(RequestError::Internal(e.to_string()))
            },
        }
    }
}
