//! Request options and the options validator.
//!
//! Options come from two places:
//!
//! - **Code**: the [`RequestOptions`] builder supplies the callables
//!   (`build_request`, `execute_request`, `merge_data`, `on_cancelled`) and may
//!   also set `cache_policy` and `initial_data`.
//! - **Settings documents**: a JSON object (for example read from a config
//!   file) overlaid with [`RequestOptions::apply_settings`]. Only plain data
//!   options can be set this way.
//!
//! Either way the session only runs with options that passed
//! [`RequestOptions::check`].
//!
//! # Example
//!
//! ```
//! use swr_request_core::{CachePolicy, RequestDescriptor, RequestError, RequestOptions, Response};
//! use swr_request_core::CancellationToken;
//! use serde_json::json;
//!
//! let options = RequestOptions::<u32, Option<String>>::new(None)
//!     .with_build_request(|id: u32| json!({ "id": id }))
//!     .with_executor(|_request: RequestDescriptor, _signal: CancellationToken| async {
//!         Ok::<_, RequestError>(Response::new(Some("A".to_string()), "\"A\"".to_string()))
//!     })
//!     .apply_settings(&json!({ "cache_policy": "cache-and-network" }))?;
//!
//! assert_eq!(options.cache_policy(), CachePolicy::CacheAndNetwork);
//! assert!(options.check().is_ok());
//! # Ok::<(), swr_request_core::ConfigError>(())
//! ```

use crate::error::ConfigError;
use crate::executor::RequestExecutor;
use crate::request::RequestDescriptor;
use crate::state::{MergeFn, RequestEnvironment, replace_merge};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Builds a request descriptor from call-time arguments.
pub type BuildRequestFn<Args> = Arc<dyn Fn(Args) -> RequestDescriptor + Send + Sync>;

/// Invoked whenever an in-flight request is aborted.
pub type CancelledFn = Arc<dyn Fn() + Send + Sync>;

fn ignore_cancelled() -> CancelledFn {
    Arc::new(|| {})
}

/// The recognized option names, in settings-document spelling.
pub const RECOGNIZED_OPTIONS: [&str; 6] = [
    "build_request",
    "cache_policy",
    "merge_data",
    "initial_data",
    "on_cancelled",
    "execute_request",
];

/// Options whose values must be callables supplied in code.
pub const CALLABLE_OPTIONS: [&str; 4] = [
    "build_request",
    "merge_data",
    "on_cancelled",
    "execute_request",
];

/// How a session uses the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Always go to the network; never read or write the cache
    #[default]
    NoCache,
    /// Serve cached data immediately, then revalidate in the background
    CacheAndNetwork,
}

impl CachePolicy {
    /// The literal used in settings documents
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoCache => "no-cache",
            Self::CacheAndNetwork => "cache-and-network",
        }
    }

    /// Whether this policy reads and writes the cache store
    #[must_use]
    pub const fn uses_cache(self) -> bool {
        matches!(self, Self::CacheAndNetwork)
    }
}

impl FromStr for CachePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-cache" => Ok(Self::NoCache),
            "cache-and-network" => Ok(Self::CacheAndNetwork),
            other => Err(ConfigError::InvalidCachePolicy(other.to_string())),
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a settings document without applying it.
///
/// # Errors
///
/// - [`ConfigError::InvalidSetting`] if `settings` is not a JSON object
/// - [`ConfigError::UnknownOption`] for a key outside [`RECOGNIZED_OPTIONS`]
/// - [`ConfigError::NotCallable`] for a data value under a callable option
/// - [`ConfigError::InvalidCachePolicy`] for an unsupported `cache_policy`
pub fn validate_settings(settings: &serde_json::Value) -> Result<(), ConfigError> {
    let Some(object) = settings.as_object() else {
        return Err(ConfigError::InvalidSetting {
            option: "<root>".to_string(),
            reason: "settings must be a JSON object".to_string(),
        });
    };

    for (key, value) in object {
        if !RECOGNIZED_OPTIONS.contains(&key.as_str()) {
            return Err(ConfigError::UnknownOption(key.clone()));
        }

        if CALLABLE_OPTIONS.contains(&key.as_str()) {
            return Err(ConfigError::NotCallable(key.clone()));
        }

        if key == "cache_policy" {
            match value.as_str() {
                Some(policy) => {
                    policy.parse::<CachePolicy>()?;
                },
                None => return Err(ConfigError::InvalidCachePolicy(value.to_string())),
            }
        }
    }

    Ok(())
}

/// Session options, as assembled by the caller.
///
/// Unset callables fall back to defaults where one exists (`merge_data`
/// replaces, `on_cancelled` does nothing). `build_request` and
/// `execute_request` have no default.
pub struct RequestOptions<Args, T> {
    build_request: Option<BuildRequestFn<Args>>,
    cache_policy: CachePolicy,
    merge_data: Option<MergeFn<T>>,
    initial_data: T,
    on_cancelled: Option<CancelledFn>,
    execute_request: Option<Arc<dyn RequestExecutor<T>>>,
}

impl<Args, T> RequestOptions<Args, T> {
    /// Start building options around the initial data
    #[must_use]
    pub fn new(initial_data: T) -> Self {
        Self {
            build_request: None,
            cache_policy: CachePolicy::default(),
            merge_data: None,
            initial_data,
            on_cancelled: None,
            execute_request: None,
        }
    }

    /// Set the descriptor builder
    #[must_use]
    pub fn with_build_request<F, D>(mut self, build: F) -> Self
    where
        F: Fn(Args) -> D + Send + Sync + 'static,
        D: Into<RequestDescriptor>,
    {
        self.build_request = Some(Arc::new(move |args: Args| -> RequestDescriptor {
            build(args).into()
        }));
        self
    }

    /// Set the request executor
    #[must_use]
    pub fn with_executor<E>(mut self, executor: E) -> Self
    where
        E: RequestExecutor<T> + 'static,
    {
        self.execute_request = Some(Arc::new(executor));
        self
    }

    /// Set an already shared request executor
    #[must_use]
    pub fn with_shared_executor(mut self, executor: Arc<dyn RequestExecutor<T>>) -> Self {
        self.execute_request = Some(executor);
        self
    }

    /// Set the cache policy
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Set the merge function
    #[must_use]
    pub fn with_merge_data<F>(mut self, merge: F) -> Self
    where
        F: Fn(&T, T) -> T + Send + Sync + 'static,
    {
        self.merge_data = Some(Arc::new(merge));
        self
    }

    /// Set the cancellation callback
    #[must_use]
    pub fn with_on_cancelled<F>(mut self, on_cancelled: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancelled = Some(Arc::new(on_cancelled));
        self
    }

    /// Replace the initial data
    #[must_use]
    pub fn with_initial_data(mut self, initial_data: T) -> Self {
        self.initial_data = initial_data;
        self
    }

    /// The configured cache policy
    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// The configured initial data
    #[must_use]
    pub const fn initial_data(&self) -> &T {
        &self.initial_data
    }

    /// Overlay a settings document onto these options.
    ///
    /// # Errors
    ///
    /// Everything [`validate_settings`] rejects, plus
    /// [`ConfigError::InvalidSetting`] if `initial_data` does not deserialize
    /// into `T`.
    pub fn apply_settings(mut self, settings: &serde_json::Value) -> Result<Self, ConfigError>
    where
        T: DeserializeOwned,
    {
        validate_settings(settings)?;

        if let Some(policy) = settings.get("cache_policy").and_then(serde_json::Value::as_str) {
            self.cache_policy = policy.parse()?;
        }

        if let Some(initial) = settings.get("initial_data") {
            self.initial_data = serde_json::from_value(initial.clone()).map_err(|e| {
                ConfigError::InvalidSetting {
                    option: "initial_data".to_string(),
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(self)
    }

    /// Check that every required callable is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCallable`] naming the first missing option.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.build_request.is_none() {
            return Err(ConfigError::MissingCallable("build_request"));
        }
        if self.execute_request.is_none() {
            return Err(ConfigError::MissingCallable("execute_request"));
        }
        Ok(())
    }

    /// Validate and fill in defaults.
    ///
    /// # Errors
    ///
    /// Returns whatever [`RequestOptions::check`] rejects.
    pub fn resolve(self) -> Result<ResolvedOptions<Args, T>, ConfigError>
    where
        T: 'static,
    {
        self.check()?;

        let (Some(build_request), Some(executor)) = (self.build_request, self.execute_request)
        else {
            return Err(ConfigError::MissingCallable("build_request"));
        };

        Ok(ResolvedOptions {
            build_request,
            cache_policy: self.cache_policy,
            environment: RequestEnvironment::new(
                self.initial_data,
                self.merge_data.unwrap_or_else(replace_merge),
            ),
            on_cancelled: self.on_cancelled.unwrap_or_else(ignore_cancelled),
            executor,
        })
    }
}

impl<Args, T: fmt::Debug> fmt::Debug for RequestOptions<Args, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("build_request", &self.build_request.as_ref().map(|_| "<fn>"))
            .field("cache_policy", &self.cache_policy)
            .field("merge_data", &self.merge_data.as_ref().map(|_| "<fn>"))
            .field("initial_data", &self.initial_data)
            .field("on_cancelled", &self.on_cancelled.as_ref().map(|_| "<fn>"))
            .field("execute_request", &self.execute_request.as_ref().map(|_| "<executor>"))
            .finish()
    }
}

/// Options that passed validation, with every default filled in.
pub struct ResolvedOptions<Args, T> {
    /// Descriptor builder
    pub build_request: BuildRequestFn<Args>,
    /// Cache policy
    pub cache_policy: CachePolicy,
    /// Reducer environment (initial data and merge)
    pub environment: RequestEnvironment<T>,
    /// Cancellation callback
    pub on_cancelled: CancelledFn,
    /// Request executor
    pub executor: Arc<dyn RequestExecutor<T>>,
}

impl<Args, T: fmt::Debug> fmt::Debug for ResolvedOptions<Args, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("cache_policy", &self.cache_policy)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
