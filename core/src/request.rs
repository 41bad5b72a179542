//! Transport-agnostic request descriptors and their cache keys.
//!
//! A [`RequestDescriptor`] is whatever the options' `build_request` produced
//! from the call arguments, held as a JSON value. The executor interprets it;
//! the session only needs its canonical JSON form as a [`CacheKey`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Description of a request, independent of any concrete transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestDescriptor(serde_json::Value);

impl RequestDescriptor {
    /// Wrap a JSON value as a descriptor
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Build a descriptor from any serializable value
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `value` cannot be represented as JSON
    /// (for example a map with non-string keys).
    pub fn from_serialize<S: Serialize>(value: &S) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self)
    }

    /// Borrow the underlying JSON value
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consume the descriptor, returning its JSON value
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Canonical cache key for this descriptor.
    ///
    /// Compact JSON with object keys in sorted order at every depth, so two
    /// descriptors that are equal as JSON always produce the same key. The
    /// order does not depend on which map backs `serde_json::Value`.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey(canonical(&self.0).to_string())
    }
}

fn canonical(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonical(value)))
                    .collect(),
            )
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

impl From<serde_json::Value> for RequestDescriptor {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Key under which a response is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an existing key string
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_is_compact_json() {
        let descriptor = RequestDescriptor::new(json!({"id": 1}));
        assert_eq!(descriptor.cache_key().as_str(), r#"{"id":1}"#);
    }

    #[test]
    fn test_cache_key_ignores_insertion_order() {
        let a = RequestDescriptor::new(json!({"url": "/users", "page": 2, "filter": {"b": 1, "a": 0}}));
        let b = RequestDescriptor::new(json!({"filter": {"a": 0, "b": 1}, "page": 2, "url": "/users"}));

        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(
            a.cache_key().as_str(),
            r#"{"filter":{"a":0,"b":1},"page":2,"url":"/users"}"#
        );
    }

    #[test]
    fn test_cache_key_sorts_objects_inside_arrays() {
        let mut inner = serde_json::Map::new();
        inner.insert("z".to_string(), json!(1));
        inner.insert("m".to_string(), json!({"y": true, "x": null}));
        let descriptor = RequestDescriptor::new(json!({"ops": [serde_json::Value::Object(inner)]}));

        assert_eq!(
            descriptor.cache_key().as_str(),
            r#"{"ops":[{"m":{"x":null,"y":true},"z":1}]}"#
        );
    }

    #[test]
    fn test_from_serialize() {
        #[derive(Serialize)]
        struct Query {
            id: u32,
            tags: Vec<&'static str>,
        }

        let descriptor = RequestDescriptor::from_serialize(&Query {
            id: 7,
            tags: vec!["new"],
        })
        .unwrap();

        assert_eq!(descriptor.as_value(), &json!({"id": 7, "tags": ["new"]}));
    }
}
