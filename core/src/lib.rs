//! # SWR Request Core
//!
//! Core traits and types for managing the lifecycle of a single asynchronous
//! request under a stale-while-revalidate cache policy.
//!
//! This crate holds the functional core: the request state machine, the
//! request/cache/executor abstractions, and option validation. The runtime
//! crate (`swr-request-runtime`) owns the imperative shell that sequences
//! cache reads, transport calls and dispatches.
//!
//! ## Core Concepts
//!
//! - **State**: [`RequestState`] - `loading`, `error` and `data` for one session
//! - **Action**: [`RequestAction`] - every transition the state machine accepts
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Environment**: [`RequestEnvironment`] - the merge function and initial data
//! - **Executor**: [`RequestExecutor`] - the abstract transport
//! - **Cache Store**: [`CacheStore`] - an abstract string-keyed store
//!
//! ## Example
//!
//! ```
//! use swr_request_core::{RequestAction, RequestEnvironment, RequestReducer, RequestState};
//! use swr_request_core::reducer::Reducer;
//!
//! let reducer = RequestReducer::<Option<String>>::new();
//! let env = RequestEnvironment::replacing(None::<String>);
//! let mut state = RequestState::new(None);
//!
//! reducer.reduce(&mut state, RequestAction::Start, &env);
//! assert!(state.loading);
//!
//! reducer.reduce(&mut state, RequestAction::Succeed { payload: Some("A".to_string()) }, &env);
//! assert!(!state.loading);
//! assert_eq!(state.data.as_deref(), Some("A"));
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};
pub use tokio_util::sync::CancellationToken;

/// Request actions (state machine events)
pub mod action;

/// Cache store abstraction and the in-memory store
pub mod cache;

/// Error taxonomy
pub mod error;

/// Request executor abstraction and transport responses
pub mod executor;

/// Options, cache policy and the options validator
pub mod options;

/// Request descriptors and cache keys
pub mod request;

/// Request state, reducer and environment
pub mod state;

/// Reducer module - The core trait for state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all transition logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CounterReducer {
    ///     type State = CounterState;
    ///     type Action = CounterAction;
    ///     type Environment = ();
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut CounterState,
    ///         action: CounterAction,
    ///         _env: &(),
    ///     ) -> SmallVec<[Effect<CounterAction>; 4]> {
    ///         match action {
    ///             CounterAction::Increment => state.count += 1,
    ///         }
    ///         smallvec![Effect::None]
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Updates state in place
        /// 2. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
///
/// [`RequestReducer`](crate::RequestReducer) performs no effects of its own;
/// these variants are for reducers that feed actions back into the store.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

pub use action::RequestAction;
pub use cache::{CacheStore, MemoryCacheStore};
pub use error::{ConfigError, RequestError, TransportError};
pub use executor::{RequestExecutor, Response};
pub use options::{CachePolicy, RequestOptions, ResolvedOptions};
pub use request::{CacheKey, RequestDescriptor};
pub use state::{MergeFn, RequestEnvironment, RequestReducer, RequestState};
