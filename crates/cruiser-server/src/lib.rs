//! # cruiser-server
//!
//! The HTTP data plane: listener bring-up, hot-swappable routing, and the
//! translation layers that turn routes into live handlers.
//!
//! - [`ListenerServer`] - HTTP/2 (TLS) or H2C listener with graceful
//!   shutdown bounded by a timeout
//! - [`SwapHandler`] - atomic handler replacement used during route
//!   snapshot rotations
//! - [`Router`] - a matcher tree compiled from one routes snapshot,
//!   dispatching to backend providers
//! - [`grpc`] - the gRPC bridge: an unknown-service handler over raw byte
//!   frames feeding a [`grpc::GrpcMethodBackend`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod grpc;

mod error;
mod handler;
mod listener;
mod router;
mod swap;
mod tls;

pub use error::ServerError;
pub use handler::{empty_body, full_body, BoxError, HttpBody, HttpHandler, HttpRequest, HttpResponse};
pub use listener::{ListenerProtocol, ListenerServer, ListenerServerBuilder};
pub use router::{BackendProvider, BackendProviderKey, Router, RouterBuilder};
pub use swap::SwapHandler;
pub use tls::TlsConfig;
