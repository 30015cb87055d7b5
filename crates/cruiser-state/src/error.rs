//! Error types for the state pipeline.

/// Errors raised while syncing, decoding, or building state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// A route references a parent that is not in the same snapshot.
    #[error("no parent route found: route {route} references parent {parent}")]
    NoParentFound {
        /// The referencing route.
        route: String,
        /// The missing parent name.
        parent: String,
    },

    /// A resource instance failed to decode.
    #[error("failed to decode {resource_type} instance: {source}")]
    Decode {
        /// Resource type selector of the offending instance.
        resource_type: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A cache transaction failed.
    #[error(transparent)]
    Cache(#[from] cruiser_xds::CacheError),

    /// The tfstate source failed to list, fetch, or parse.
    #[error("tfstate source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A snapshot subscriber went away.
    #[error("snapshot channel closed")]
    ChannelClosed,

    /// A projection task failed to run.
    #[error("projection task failed: {0}")]
    Task(String),

    /// Invalid manager configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StateError {
    /// Wrap an arbitrary error as a source failure.
    pub fn source_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(error))
    }

    /// Wrap a JSON decode failure for the given resource type.
    pub fn decode(resource_type: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            resource_type: resource_type.into(),
            source,
        }
    }
}
