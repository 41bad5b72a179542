//! # SWR Request Runtime
//!
//! Runtime implementation for stale-while-revalidate request sessions.
//!
//! This crate provides the imperative shell around the pure request state
//! machine in `swr-request-core`.
//!
//! ## Core Components
//!
//! - **Store**: State container that serializes dispatches through a reducer,
//!   executes returned effects and notifies observers
//! - **Cancellation Controller**: Owns the single in-flight cancellation token
//! - **Request Session**: The request orchestrator (cache policy, transport
//!   calls, cache writes, cancellation and dispatch)
//!
//! ## Example
//!
//! ```ignore
//! use swr_request_runtime::RequestSession;
//!
//! let session = RequestSession::with_cache(options, cache_store)?;
//!
//! // Issue a request; state moves through loading → settled
//! let response = session.do_request(42).await?;
//!
//! // Read state
//! let data = session.data().await;
//! ```

use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use swr_request_core::{effect::Effect, reducer::Reducer};
use tokio::sync::{RwLock, watch};

/// Cancellation controller for in-flight requests
pub mod cancellation;

/// Metric names and descriptions
pub mod metrics;

/// Request sessions (the request orchestrator)
pub mod session;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects produced by
/// that action to complete.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle together with its tracking side
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (_tx, rx) = watch::channel(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all tracked effects to complete
    pub async fn wait(&mut self) {
        loop {
            if self.effects.load(Ordering::SeqCst) == 0 {
                return;
            }

            // Sender dropped means every tracking clone is gone
            if self.completion.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait for all tracked effects to complete, giving up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`tokio::time::error::Elapsed`] if effects are still running
    /// when `timeout` expires.
    pub async fn wait_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, self.wait()).await
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending_effects())
            .finish()
    }
}

/// Internal: counting side of an [`EffectHandle`]
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Store module - The runtime for reducers
///
/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, BoxFuture, DecrementGuard, Effect, EffectHandle, EffectTracking, Reducer, RwLock,
    };
    use tokio::sync::{broadcast, watch};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; every mutation goes through the reducer)
    /// 2. Reducer (transition logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. Observers (state snapshots and dispatched actions)
    ///
    /// Cloning a Store is cheap and every clone shares the same state.
    ///
    /// The store runs any reducer. [`RequestReducer`] only ever returns
    /// `Effect::None`, so request sessions drop the returned [`EffectHandle`];
    /// the effect runner serves reducers that describe follow-up work.
    ///
    /// [`RequestReducer`]: swr_request_core::RequestReducer
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: Arc<E>,
        /// Every dispatched action, in reduction order
        action_broadcast: broadcast::Sender<A>,
        /// Latest state snapshot, replaced after every reduction
        state_watch: Arc<watch::Sender<S>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Clone + Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast keeps the last 16 actions for slow observers;
        /// use [`Store::with_broadcast_capacity`] to change that.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new Store with custom action broadcast capacity
        ///
        /// # Arguments
        ///
        /// - `initial_state`: The starting state for the store
        /// - `reducer`: The reducer implementation
        /// - `environment`: Injected dependencies
        /// - `capacity`: Action broadcast channel capacity (number of actions buffered)
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));
            let (state_watch, _) = watch::channel(initial_state.clone());

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment: Arc::new(environment),
                action_broadcast,
                state_watch: Arc::new(state_watch),
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Publishes the new state and the action to observers
        /// 4. Starts executing returned effects asynchronously
        ///
        /// Concurrent `send()` calls serialize at the reducer level.
        /// `send()` returns after starting effect execution, not completion;
        /// use the returned [`EffectHandle`] to wait.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> EffectHandle {
            let ((), handle) = self.snapshot_and_send(action, |_| ()).await;
            handle
        }

        /// Read a projection of state and send an action under one write lock
        ///
        /// `project` sees the state exactly as it was before `action` was
        /// reduced; no other dispatch can interleave between the two.
        pub async fn snapshot_and_send<F, T>(&self, action: A, project: F) -> (T, EffectHandle)
        where
            F: FnOnce(&S) -> T,
        {
            metrics::counter!(crate::metrics::STORE_ACTIONS_TOTAL).increment(1);

            let (handle, tracking) = EffectHandle::new();

            let (snapshot, effects) = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let snapshot = project(&state);

                let start = std::time::Instant::now();
                let effects = self
                    .reducer
                    .reduce(&mut state, action.clone(), &self.environment);
                metrics::histogram!(crate::metrics::STORE_REDUCER_DURATION)
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());

                // Publish while still holding the lock so observers see
                // actions in reduction order
                self.state_watch.send_replace(state.clone());
                let _ = self.action_broadcast.send(action);

                (snapshot, effects)
            };

            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            (snapshot, handle)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let loading = store.state(|s| s.loading).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Subscribe to state snapshots
        ///
        /// The receiver always holds the latest state; intermediate states
        /// may be skipped by slow observers.
        #[must_use]
        pub fn subscribe_state(&self) -> watch::Receiver<S> {
            self.state_watch.subscribe()
        }

        /// Subscribe to every action dispatched to this store
        ///
        /// Only actions sent after subscribing are received.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Access the environment the reducer runs with
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            if effect.is_none() {
                return;
            }

            tracking.increment();
            let guard = DecrementGuard(tracking.clone());
            let run = self.run_effect(effect);

            tokio::spawn(async move {
                let _guard = guard;
                run.await;
            });
        }

        fn run_effect(&self, effect: Effect<A>) -> BoxFuture<'static, ()> {
            let store = self.clone();

            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(future) => {
                        if let Some(action) = future.await {
                            tracing::trace!("Effect produced an action, sending to store");
                            let _ = store.send(action).await;
                        }
                    },
                    Effect::Parallel(effects) => {
                        let runs = effects.into_iter().map(|e| store.run_effect(e));
                        futures::future::join_all(runs).await;
                    },
                    Effect::Sequential(effects) => {
                        for effect in effects {
                            store.run_effect(effect).await;
                        }
                    },
                }
            })
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: Arc::clone(&self.environment),
                action_broadcast: self.action_broadcast.clone(),
                state_watch: Arc::clone(&self.state_watch),
            }
        }
    }
}

// Re-export for convenience
pub use cancellation::{CancellationController, InFlightToken};
pub use session::{RequestSession, RequestTask};
pub use store::Store;
