//! Memoized upstream responses keyed by request fingerprint.

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Raw response text keyed by a canonical request fingerprint.
///
/// Lives for one process run and has no eviction; concurrent writers to the
/// same key simply overwrite each other.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, String>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: String, text: String) {
        self.entries.write().insert(key, text);
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Canonical JSON fingerprint of a request.
///
/// `safe_url` must already have credentials stripped. Object keys are
/// serialized in sorted order, so equal requests yield equal keys.
pub fn cache_key(safe_url: &str, options: &Value) -> String {
    json!({ "safeUrl": safe_url, "options": options }).to_string()
}
