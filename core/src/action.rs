//! Request actions.
//!
//! Each variant is one event the request state machine accepts. Actions are
//! dispatched by the session (never by the reducer itself) and are broadcast to
//! action observers after the reducer has applied them.

use crate::error::TransportError;

/// Events accepted by [`RequestReducer`](crate::RequestReducer).
#[derive(Clone, Debug, PartialEq)]
pub enum RequestAction<T> {
    /// A live request started; shows the loading indicator
    Start,

    /// A response (live, or served from cache) arrived
    Succeed {
        /// Payload merged into the current data
        payload: T,
    },

    /// A background revalidation produced a response that differs from the
    /// cached one
    BackgroundSucceed {
        /// Fresh payload from the live request
        payload: T,
        /// Data as it was before the cache hit was applied
        baseline: T,
    },

    /// The request failed with a transport error
    Fail {
        /// Error recorded into state
        error: TransportError,
    },

    /// The request was cancelled
    Cancel,

    /// Return to the initial state
    Reset,

    /// Replace data directly, bypassing the request path
    SetData {
        /// New data value
        value: T,
    },
}

impl<T> RequestAction<T> {
    /// Short event name, used in logs and metrics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed { .. } => "succeed",
            Self::BackgroundSucceed { .. } => "background_succeed",
            Self::Fail { .. } => "fail",
            Self::Cancel => "cancel",
            Self::Reset => "reset",
            Self::SetData { .. } => "set_data",
        }
    }
}
