//! Request state machine.
//!
//! [`RequestReducer`] is the only code that mutates a [`RequestState`]. It is a
//! pure state machine: every transition returns `Effect::None`, and all I/O
//! (cache, transport, cancellation) stays in the runtime's session.
//!
//! | action | result |
//! |---|---|
//! | `Start` | `loading = true`, `error = None` |
//! | `Succeed` | `loading = false`, `error = None`, `data = merge(data, payload)` |
//! | `BackgroundSucceed` | `loading = false`, `error = None`, `data = merge(baseline, payload)` |
//! | `Fail` | `loading = false`, `error = Some(..)`, `data = initial_data` |
//! | `Cancel` | `loading = false` |
//! | `Reset` | initial state |
//! | `SetData` | `data = value` |

use crate::action::RequestAction;
use crate::effect::Effect;
use crate::error::TransportError;
use crate::reducer::Reducer;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Merges an incoming payload into the current data.
pub type MergeFn<T> = Arc<dyn Fn(&T, T) -> T + Send + Sync>;

/// Loading, error and data for one request session.
///
/// `loading` and `error` are never set together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestState<T> {
    /// A live request is in flight
    pub loading: bool,
    /// Error from the last failed request
    pub error: Option<TransportError>,
    /// Current data
    pub data: T,
}

impl<T> RequestState<T> {
    /// Create the initial state: idle, no error, `initial_data`
    #[must_use]
    pub const fn new(initial_data: T) -> Self {
        Self {
            loading: false,
            error: None,
            data: initial_data,
        }
    }

    /// Check if the last request failed
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<T: Default> Default for RequestState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Dependencies the request reducer needs.
pub struct RequestEnvironment<T> {
    /// Data restored on `Reset` and `Fail`
    pub initial_data: T,
    /// Merge applied on `Succeed` and `BackgroundSucceed`
    pub merge: MergeFn<T>,
}

impl<T> RequestEnvironment<T> {
    /// Create an environment with a custom merge function
    #[must_use]
    pub fn new(initial_data: T, merge: MergeFn<T>) -> Self {
        Self {
            initial_data,
            merge,
        }
    }

    /// Create an environment whose merge replaces data with the payload
    #[must_use]
    pub fn replacing(initial_data: T) -> Self
    where
        T: 'static,
    {
        Self::new(initial_data, replace_merge())
    }
}

impl<T: Clone> Clone for RequestEnvironment<T> {
    fn clone(&self) -> Self {
        Self {
            initial_data: self.initial_data.clone(),
            merge: Arc::clone(&self.merge),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RequestEnvironment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEnvironment")
            .field("initial_data", &self.initial_data)
            .field("merge", &"<fn>")
            .finish()
    }
}

/// Default merge: the incoming payload replaces the current data.
#[must_use]
pub fn replace_merge<T: 'static>() -> MergeFn<T> {
    Arc::new(|_current: &T, incoming: T| incoming)
}

/// Reducer implementing the request state machine.
pub struct RequestReducer<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> RequestReducer<T> {
    /// Create a new request reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for RequestReducer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RequestReducer<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RequestReducer<T> {}

impl<T> fmt::Debug for RequestReducer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestReducer")
    }
}

impl<T: Clone> Reducer for RequestReducer<T> {
    type State = RequestState<T>;
    type Action = RequestAction<T>;
    type Environment = RequestEnvironment<T>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RequestAction::Start => {
                state.loading = true;
                state.error = None;
            },
            RequestAction::Succeed { payload } => {
                state.loading = false;
                state.error = None;
                state.data = (env.merge)(&state.data, payload);
            },
            RequestAction::BackgroundSucceed { payload, baseline } => {
                state.loading = false;
                state.error = None;
                state.data = (env.merge)(&baseline, payload);
            },
            RequestAction::Fail { error } => {
                state.loading = false;
                state.error = Some(error);
                state.data = env.initial_data.clone();
            },
            RequestAction::Cancel => {
                state.loading = false;
            },
            RequestAction::Reset => {
                *state = RequestState::new(env.initial_data.clone());
            },
            RequestAction::SetData { value } => {
                state.data = value;
            },
        }

        // Pure state machine - no side effects
        smallvec![Effect::None]
    }
}
