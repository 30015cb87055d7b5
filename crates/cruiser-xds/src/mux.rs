//! Type-URL multiplexing over the per-type caches.

use std::collections::HashMap;
use std::sync::Arc;

use crate::LinearCache;

/// Classifies discovery requests to a per-type [`LinearCache`] by their
/// `type_url`, the way a single aggregated stream multiplexes all resource
/// types.
#[derive(Debug, Default)]
pub struct MuxCache {
    caches: HashMap<String, Arc<LinearCache>>,
}

impl MuxCache {
    /// Create an empty mux.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache under its own type URL.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<LinearCache>) -> Self {
        self.caches
            .insert(cache.type_url().as_str().to_owned(), cache);
        self
    }

    /// Look up the cache serving a type URL.
    pub fn cache_for(&self, type_url: &str) -> Option<&Arc<LinearCache>> {
        self.caches.get(type_url)
    }

    /// Type URLs with a registered cache.
    pub fn type_urls(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }
}
