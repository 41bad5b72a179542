//! Request executor abstraction.
//!
//! The executor is the abstract transport: it receives a
//! [`RequestDescriptor`] plus a [`CancellationToken`] and resolves to a
//! [`Response`]. Cancellation is cooperative; an executor must watch the token
//! and return [`RequestError::Cancelled`] once it fires.

use crate::error::RequestError;
use crate::request::RequestDescriptor;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// A transport response: the decoded payload plus its raw serialized body.
///
/// The raw body is what gets cached, and what a background revalidation
/// compares against the cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    /// Decoded payload
    pub data: T,
    /// Serialized body exactly as cached
    pub raw: String,
}

impl<T> Response<T> {
    /// Create a response from an already-decoded payload and its raw body
    #[must_use]
    pub const fn new(data: T, raw: String) -> Self {
        Self { data, raw }
    }

    /// Create a response by serializing `data` to JSON for the raw body
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `data` cannot be encoded.
    pub fn from_data(data: T) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
    {
        let raw = serde_json::to_string(&data)?;
        Ok(Self { data, raw })
    }

    /// Create a response by decoding a raw JSON body
    ///
    /// # Errors
    ///
    /// Returns the deserializer error if `raw` is not valid JSON for `T`.
    pub fn from_raw(raw: impl Into<String>) -> Result<Self, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        let raw = raw.into();
        let data = serde_json::from_str(&raw)?;
        Ok(Self { data, raw })
    }
}

/// Executes requests on behalf of a session.
///
/// This trait returns boxed futures instead of `impl Future` so sessions can
/// hold executors as `Arc<dyn RequestExecutor<T>>`.
///
/// Any `Fn(RequestDescriptor, CancellationToken) -> impl Future` with the
/// right output implements this trait, so closures work directly:
///
/// ```
/// use swr_request_core::{RequestDescriptor, RequestError, RequestExecutor, Response};
/// use swr_request_core::CancellationToken;
///
/// async fn fetch(request: RequestDescriptor) -> Result<Response<String>, RequestError> {
///     Ok(Response::new(format!("echo {}", request.as_value()), "\"raw\"".to_string()))
/// }
///
/// let executor = |request: RequestDescriptor, _signal: CancellationToken| fetch(request);
/// fn assert_executor<E: RequestExecutor<String>>(_e: &E) {}
/// assert_executor(&executor);
/// ```
pub trait RequestExecutor<T>: Send + Sync {
    /// Execute `request`, observing `signal` for cancellation
    ///
    /// # Errors
    ///
    /// - [`RequestError::Cancelled`] when `signal` fired before completion
    /// - [`RequestError::Transport`] for any other transport failure
    fn execute(
        &self,
        request: RequestDescriptor,
        signal: CancellationToken,
    ) -> BoxFuture<'_, Result<Response<T>, RequestError>>;
}

impl<T, F, Fut> RequestExecutor<T> for F
where
    F: Fn(RequestDescriptor, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<T>, RequestError>> + Send + 'static,
{
    fn execute(
        &self,
        request: RequestDescriptor,
        signal: CancellationToken,
    ) -> BoxFuture<'_, Result<Response<T>, RequestError>> {
        Box::pin(self(request, signal))
    }
}
