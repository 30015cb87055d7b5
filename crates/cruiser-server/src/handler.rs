//! The handler seam between the listener and everything it serves.
//!
//! Bodies are unified into a boxed body so routers, backend handlers, and
//! the gRPC bridge compose without generics at the seams.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Boxed error used at body and handler boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The body type flowing through handlers.
pub type HttpBody = UnsyncBoxBody<Bytes, BoxError>;

/// A request as seen by handlers.
pub type HttpRequest = http::Request<HttpBody>;

/// A response as produced by handlers.
pub type HttpResponse = http::Response<HttpBody>;

/// An empty response body.
pub fn empty_body() -> HttpBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// A full response body from a byte payload.
pub fn full_body(data: impl Into<Bytes>) -> HttpBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An HTTP handler.
///
/// Handlers are infallible: every failure path renders a response (the
/// backends attach a correlation id and a generic message).
#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Serve one request.
    async fn handle(&self, request: HttpRequest) -> HttpResponse;
}
