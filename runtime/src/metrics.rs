//! Metrics for request sessions.
//!
//! Metrics go through the `metrics` facade; install any recorder (for example
//! a Prometheus exporter) in the application to collect them. Without a
//! recorder every call is a no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use swr_request_runtime::metrics::register_metrics;
//!
//! // After installing a recorder
//! register_metrics();
//! ```

use metrics::{describe_counter, describe_histogram};
use swr_request_core::CachePolicy;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Requests issued, labelled by `policy`
pub const REQUESTS_TOTAL: &str = "swr_request_requests_total";
/// Cache lookups that found an entry
pub const CACHE_HITS_TOTAL: &str = "swr_request_cache_hits_total";
/// Cache lookups that found nothing usable
pub const CACHE_MISSES_TOTAL: &str = "swr_request_cache_misses_total";
/// Background revalidations, labelled by `outcome` (`changed` or `unchanged`)
pub const REVALIDATIONS_TOTAL: &str = "swr_request_revalidations_total";
/// Requests that settled with a transport error
pub const FAILURES_TOTAL: &str = "swr_request_failures_total";
/// Requests that settled as cancelled
pub const CANCELLATIONS_TOTAL: &str = "swr_request_cancellations_total";
/// Actions dispatched through a store
pub const STORE_ACTIONS_TOTAL: &str = "store_actions_total";
/// Time spent inside the reducer per action
pub const STORE_REDUCER_DURATION: &str = "store_reducer_duration_seconds";

/// Register all metric descriptions.
///
/// Call once after installing a recorder.
pub fn register_metrics() {
    // Session metrics
    describe_counter!(REQUESTS_TOTAL, "Total number of requests issued");
    describe_counter!(CACHE_HITS_TOTAL, "Total number of cache hits");
    describe_counter!(
        CACHE_MISSES_TOTAL,
        "Total number of cache misses (absent or unreadable entries)"
    );
    describe_counter!(
        REVALIDATIONS_TOTAL,
        "Total number of background revalidations"
    );
    describe_counter!(
        FAILURES_TOTAL,
        "Total number of requests that failed with a transport error"
    );
    describe_counter!(CANCELLATIONS_TOTAL, "Total number of cancelled requests");

    // Store metrics
    describe_counter!(
        STORE_ACTIONS_TOTAL,
        "Total number of actions dispatched through stores"
    );
    describe_histogram!(STORE_REDUCER_DURATION, "Time taken to execute reducers");
}

/// Request session metrics recorder.
pub struct SessionMetrics;

impl SessionMetrics {
    /// Record a request being issued.
    pub fn record_request(policy: CachePolicy) {
        counter!(REQUESTS_TOTAL, "policy" => policy.as_str()).increment(1);
    }

    /// Record a cache hit.
    pub fn record_cache_hit() {
        counter!(CACHE_HITS_TOTAL).increment(1);
    }

    /// Record a cache miss.
    pub fn record_cache_miss() {
        counter!(CACHE_MISSES_TOTAL).increment(1);
    }

    /// Record a finished background revalidation.
    pub fn record_revalidation(changed: bool) {
        let outcome = if changed { "changed" } else { "unchanged" };
        counter!(REVALIDATIONS_TOTAL, "outcome" => outcome).increment(1);
    }

    /// Record a transport failure.
    pub fn record_failure() {
        counter!(FAILURES_TOTAL).increment(1);
    }

    /// Record a cancellation.
    pub fn record_cancellation() {
        counter!(CANCELLATIONS_TOTAL).increment(1);
    }
}
