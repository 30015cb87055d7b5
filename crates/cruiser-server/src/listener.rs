//! Listener server.
//!
//! Binds the data-plane socket and serves connections over HTTP/2 behind
//! TLS, or over H2C (plaintext HTTP/2 with prior knowledge, plus HTTP/1.1)
//! for deployments that terminate TLS upstream.
//!
//! `open` validates, binds, and spawns the accept loop; the loop's terminal
//! result is forwarded on a close channel. `close` cancels accepting, drains
//! in-flight connections gracefully, and force-aborts whatever is still
//! running once the shutdown timeout elapses.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::{BoxError, HttpHandler, HttpResponse};
use crate::ServerError;
use http_body_util::BodyExt;

/// Wire protocol served by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerProtocol {
    /// HTTP/2 over TLS.
    Http2,
    /// Cleartext HTTP/2 (prior knowledge) and HTTP/1.1.
    H2c,
}

/// The data-plane listener.
pub struct ListenerServer {
    protocol: ListenerProtocol,
    address: String,
    tls: Option<Arc<rustls::ServerConfig>>,
    handler: Option<Arc<dyn HttpHandler>>,
    shutdown_timeout: Duration,
    running: Option<Running>,
}

struct Running {
    shutdown: CancellationToken,
    closed_rx: mpsc::Receiver<Result<(), ServerError>>,
}

impl ListenerServer {
    /// Start building a listener.
    pub fn builder() -> ListenerServerBuilder {
        ListenerServerBuilder::default()
    }

    /// The address the listener serves on.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Validate the configuration, bind the socket, and start serving.
    pub async fn open(&mut self) -> Result<(), ServerError> {
        if self.address.is_empty() {
            return Err(ServerError::EmptyListenerAddress);
        }
        if self.protocol == ListenerProtocol::Http2 && self.tls.is_none() {
            return Err(ServerError::EmptyHttp2TlsConfig);
        }
        if self.running.is_some() {
            return Err(ServerError::AlreadyOpen);
        }
        let handler = self
            .handler
            .clone()
            .ok_or(ServerError::EmptyHttpHandler)?;

        let address: SocketAddr =
            self.address
                .parse()
                .map_err(|source| ServerError::InvalidListenerAddress {
                    address: self.address.clone(),
                    source,
                })?;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.address.clone(),
                source,
            })?;

        let acceptor = self.tls.as_ref().map(|tls| TlsAcceptor::from(Arc::clone(tls)));
        let shutdown = CancellationToken::new();
        let (closed_tx, closed_rx) = mpsc::channel(1);

        info!(address = %address, protocol = ?self.protocol, "listener open");
        tokio::spawn(accept_loop(
            listener,
            acceptor,
            self.protocol,
            handler,
            shutdown.clone(),
            self.shutdown_timeout,
            closed_tx,
        ));

        self.running = Some(Running {
            shutdown,
            closed_rx,
        });
        Ok(())
    }

    /// Stop accepting, drain connections within the shutdown timeout, and
    /// return the serve loop's terminal result. Closing a listener that was
    /// never opened is a no-op.
    pub async fn close(&mut self) -> Result<(), ServerError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        running.shutdown.cancel();
        running.closed_rx.recv().await.unwrap_or(Ok(()))
    }
}

/// Builder for [`ListenerServer`].
#[derive(Default)]
pub struct ListenerServerBuilder {
    protocol: Option<ListenerProtocol>,
    address: String,
    tls: Option<Arc<rustls::ServerConfig>>,
    handler: Option<Arc<dyn HttpHandler>>,
    shutdown_timeout: Option<Duration>,
}

impl ListenerServerBuilder {
    /// Set the wire protocol (default H2C).
    #[must_use]
    pub fn listener_protocol(mut self, protocol: ListenerProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Set the bind address.
    #[must_use]
    pub fn listener_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Provide TLS material for HTTP/2 serving.
    #[must_use]
    pub fn tls_config(mut self, tls: Option<Arc<rustls::ServerConfig>>) -> Self {
        self.tls = tls;
        self
    }

    /// Set the handler every connection dispatches to.
    #[must_use]
    pub fn http_handler(mut self, handler: Arc<dyn HttpHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Bound graceful shutdown (default 20s).
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Build the listener. Configuration is validated at `open`.
    pub fn build(self) -> ListenerServer {
        ListenerServer {
            protocol: self.protocol.unwrap_or(ListenerProtocol::H2c),
            address: self.address,
            tls: self.tls,
            handler: self.handler,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(Duration::from_secs(20)),
            running: None,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    protocol: ListenerProtocol,
    handler: Arc<dyn HttpHandler>,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
    closed_tx: mpsc::Sender<Result<(), ServerError>>,
) {
    let drain = CancellationToken::new();
    let mut connections = JoinSet::new();

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "connection accepted");
                    connections.spawn(serve_connection(
                        stream,
                        acceptor.clone(),
                        protocol,
                        Arc::clone(&handler),
                        drain.clone(),
                    ));
                }
                Err(source) => break Err(ServerError::Accept(source)),
            },
        }
    };

    // Ask in-flight connections to finish, then force the stragglers.
    drain.cancel();
    let drained = tokio::time::timeout(shutdown_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(remaining = connections.len(), "graceful shutdown timed out, aborting connections");
        connections.abort_all();
    }

    let _ = closed_tx.send(result).await;
}

async fn serve_connection(
    stream: TcpStream,
    acceptor: Option<TlsAcceptor>,
    protocol: ListenerProtocol,
    handler: Arc<dyn HttpHandler>,
    drain: CancellationToken,
) {
    let service = service_fn(move |request: http::Request<Incoming>| {
        let handler = Arc::clone(&handler);
        async move {
            let request = request.map(|body| body.map_err(BoxError::from).boxed_unsync());
            Ok::<HttpResponse, std::convert::Infallible>(handler.handle(request).await)
        }
    });

    match protocol {
        ListenerProtocol::Http2 => {
            let Some(acceptor) = acceptor else {
                // Unreachable past open-time validation.
                return;
            };
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(error) => {
                    debug!(error = %error, "tls handshake failed");
                    return;
                }
            };
            let builder = hyper::server::conn::http2::Builder::new(TokioExecutor::new());
            let connection = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(connection);

            let mut draining = false;
            loop {
                tokio::select! {
                    result = connection.as_mut() => {
                        if let Err(error) = result {
                            debug!(error = %error, "connection error");
                        }
                        break;
                    }
                    _ = drain.cancelled(), if !draining => {
                        draining = true;
                        connection.as_mut().graceful_shutdown();
                    }
                }
            }
        }
        ListenerProtocol::H2c => {
            let builder =
                hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
            let connection = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(connection);

            let mut draining = false;
            loop {
                tokio::select! {
                    result = connection.as_mut() => {
                        if let Err(error) = result {
                            debug!(error = %error, "connection error");
                        }
                        break;
                    }
                    _ = drain.cancelled(), if !draining => {
                        draining = true;
                        connection.as_mut().graceful_shutdown();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{empty_body, HttpRequest};
    use async_trait::async_trait;

    struct Ok200;

    #[async_trait]
    impl HttpHandler for Ok200 {
        async fn handle(&self, _request: HttpRequest) -> HttpResponse {
            http::Response::builder().body(empty_body()).unwrap()
        }
    }

    fn h2c_listener(address: &str) -> ListenerServer {
        ListenerServer::builder()
            .listener_protocol(ListenerProtocol::H2c)
            .listener_address(address)
            .http_handler(Arc::new(Ok200))
            .shutdown_timeout(Duration::from_millis(200))
            .build()
    }

    #[tokio::test]
    async fn empty_address_is_rejected() {
        let mut server = h2c_listener("");
        assert!(matches!(
            server.open().await,
            Err(ServerError::EmptyListenerAddress)
        ));
    }

    #[tokio::test]
    async fn http2_requires_tls() {
        let mut server = ListenerServer::builder()
            .listener_protocol(ListenerProtocol::Http2)
            .listener_address("127.0.0.1:0")
            .http_handler(Arc::new(Ok200))
            .build();
        assert!(matches!(
            server.open().await,
            Err(ServerError::EmptyHttp2TlsConfig)
        ));
    }

    #[tokio::test]
    async fn handler_is_required() {
        let mut server = ListenerServer::builder()
            .listener_protocol(ListenerProtocol::H2c)
            .listener_address("127.0.0.1:0")
            .build();
        assert!(matches!(
            server.open().await,
            Err(ServerError::EmptyHttpHandler)
        ));
    }

    #[tokio::test]
    async fn open_close_cycle() {
        let mut server = h2c_listener("127.0.0.1:0");
        server.open().await.expect("opens");
        assert!(matches!(server.open().await, Err(ServerError::AlreadyOpen)));
        server.close().await.expect("clean close");
        // Closing again is a no-op.
        server.close().await.expect("idempotent close");
    }

    #[tokio::test]
    async fn invalid_address_is_rejected() {
        let mut server = h2c_listener("not-an-address");
        assert!(matches!(
            server.open().await,
            Err(ServerError::InvalidListenerAddress { .. })
        ));
    }
}
