//! Cache key derivation.
//!
//! Keys are `"{namespace}:{sha256 hex}"` over the canonical JSON of the
//! request parameters. Parameters are held in a `BTreeMap`, and `serde_json`
//! maps are ordered too (no `preserve_order` feature), so the serialized form
//! is independent of insertion order at every nesting level.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Parameters that identify one cached result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CacheParams(BTreeMap<String, Value>);

impl CacheParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter. An inserted `null` and a missing parameter derive
    /// different keys.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn canonical_json(&self) -> String {
        // Serializing a map of strings to JSON values cannot fail.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl From<HashMap<String, Value>> for CacheParams {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for CacheParams {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Deterministic cache key for `params` under `namespace`.
pub fn derive_key(namespace: &str, params: &CacheParams) -> String {
    let digest = Sha256::digest(params.canonical_json().as_bytes());
    format!("{}:{}", namespace, hex::encode(digest))
}

/// Glob matching every key of a namespace.
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{}:*", namespace)
}
