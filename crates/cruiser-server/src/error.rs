//! Error types for the data plane.

use std::path::PathBuf;

/// Errors raised while configuring or running the data plane.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// No listener address configured.
    #[error("empty listener address")]
    EmptyListenerAddress,

    /// HTTP/2 requested without TLS material.
    #[error("empty tls config for http2 protocol")]
    EmptyHttp2TlsConfig,

    /// No handler configured for the listener.
    #[error("empty http handler")]
    EmptyHttpHandler,

    /// `open` called on a listener that is already serving.
    #[error("listener already open")]
    AlreadyOpen,

    /// The configured address does not parse.
    #[error("invalid listener address {address}: {source}")]
    InvalidListenerAddress {
        /// The offending address.
        address: String,
        /// The parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// Binding the listener socket failed.
    #[error("bind {address}: {source}")]
    Bind {
        /// The address being bound.
        address: String,
        /// The bind failure.
        #[source]
        source: std::io::Error,
    },

    /// Accepting a connection failed; the serve loop is over.
    #[error("accept: {0}")]
    Accept(#[source] std::io::Error),

    /// A route names a backend provider that is not registered.
    #[error("no backend provider registered: {provider}")]
    NoBackendProvider {
        /// The missing provider.
        provider: String,
    },

    /// A route references a parent missing from the compiled table.
    #[error("parent route not found: route {route} references parent {parent}")]
    ParentRouteNotFound {
        /// The referencing route.
        route: String,
        /// The missing parent.
        parent: String,
    },

    /// A header-regexp matcher pattern does not compile.
    #[error("invalid header pattern {pattern:?}: {source}")]
    InvalidHeaderPattern {
        /// The offending pattern.
        pattern: String,
        /// The regex failure.
        #[source]
        source: regex::Error,
    },

    /// The swap handler was closed; no further swaps are accepted.
    #[error("swap handler closed")]
    SwapClosed,

    /// Reading TLS material failed.
    #[error("read tls material {path}: {source}")]
    TlsIo {
        /// The file being read.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// No certificate found in the configured PEM file.
    #[error("no certificates found in {path}")]
    NoCertificate {
        /// The file searched.
        path: PathBuf,
    },

    /// No private key found in the configured PEM file.
    #[error("no private key found in {path}")]
    NoPrivateKey {
        /// The file searched.
        path: PathBuf,
    },

    /// Building the TLS server configuration failed.
    #[error("tls configuration: {0}")]
    Tls(#[from] rustls::Error),
}
