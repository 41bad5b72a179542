//! Cache store abstraction.
//!
//! Sessions under the `cache-and-network` policy persist the raw body of each
//! changed live response here, keyed by the request's [`CacheKey`]. Stores are
//! synchronous and best-effort: a session without a store simply skips every
//! cache operation.

use crate::request::CacheKey;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// String-keyed persistent store used for cached responses.
///
/// Implementations decide their own eviction (e.g. clearing at a session
/// boundary). Entries are never invalidated by the request session.
pub trait CacheStore: Send + Sync {
    /// Look up the serialized response stored under `key`
    fn get(&self, key: &CacheKey) -> Option<String>;

    /// Store `value` under `key`, replacing any previous entry
    fn set(&self, key: &CacheKey, value: String);
}

impl<C: CacheStore + ?Sized> CacheStore for Arc<C> {
    fn get(&self, key: &CacheKey) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &CacheKey, value: String) {
        (**self).set(key, value);
    }
}

/// In-memory cache store whose entries live as long as the store itself.
///
/// Cloning shares the underlying map, so one store can back several sessions.
///
/// # Example
///
/// ```
/// use swr_request_core::{CacheKey, CacheStore, MemoryCacheStore};
///
/// let store = MemoryCacheStore::new();
/// let key = CacheKey::new(r#"{"id":1}"#);
///
/// store.set(&key, "\"A\"".to_string());
/// assert_eq!(store.get(&key).as_deref(), Some("\"A\""));
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<HashMap<CacheKey, String>>>,
}

impl MemoryCacheStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &CacheKey, value: String) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.clone(), value);
    }
}
