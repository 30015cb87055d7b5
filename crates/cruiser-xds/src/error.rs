//! Error types for cache operations.

/// Errors raised by the resource caches.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A resource with the wrong type URL was offered to a typed cache.
    #[error("type mismatch for resource {name}: cache serves {expected}, got {actual}")]
    TypeMismatch {
        /// Type URL the cache serves.
        expected: String,
        /// Type URL of the offered resource.
        actual: String,
        /// Name of the offending resource.
        name: String,
    },
}
