//! gRPC bridge.
//!
//! An unknown-service gRPC handler over raw byte frames: any method path is
//! accepted, and each call is translated through a [`GrpcMethodBackend`]
//! supplied by a backend provider. Two flows run concurrently per call and
//! share one backend instance:
//!
//! - the receive flow delivers incoming metadata (`begin`) and request
//!   frames (`request`)
//! - the send flow pulls results (`response`), publishing the first
//!   result's metadata as the response headers
//!
//! The dispatcher joins both flows, forwards the first error into the
//! response stream as the call's status, and always runs `end`.

mod codec;

pub use codec::{Frame, RawCodec, RawDecoder, RawEncoder};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use http_body_util::BodyExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::BoxFuture;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status, Streaming};
use tracing::debug;

use crate::handler::{BoxError, HttpHandler, HttpRequest, HttpResponse};

/// In-flight response frames buffered per call.
const FRAME_BUFFER: usize = 4;

/// The per-call translation target of the bridge.
///
/// `request` and `response` may run concurrently on the same backend; the
/// interleaving contract is: `begin` once before any `response` result,
/// `request` per inbound frame, `close_requests` when the inbound side is
/// done, `end` after both flows finish.
#[async_trait]
pub trait GrpcMethodBackend: Send + Sync {
    /// Deliver the call's incoming metadata.
    async fn begin(&self, metadata: MetadataMap) -> Result<(), Status>;

    /// Deliver one request frame.
    async fn request(&self, payload: Bytes) -> Result<(), Status>;

    /// Pull the next result: outgoing metadata plus one response payload,
    /// `None` at end of stream, or the call's terminal status.
    async fn response(&self) -> Result<Option<(MetadataMap, Bytes)>, Status>;

    /// Signal that no further `request` calls will be made.
    fn close_requests(&self);

    /// Always runs once both flows have finished.
    async fn end(&self);
}

/// Builds a backend for each call, keyed by the gRPC method path.
pub trait GrpcMethodBackendFactory: Send + Sync {
    /// Create the backend for one call to `method`.
    fn method_backend(&self, method: &str) -> Arc<dyn GrpcMethodBackend>;
}

/// The unknown-service gRPC handler.
pub struct GrpcBridge {
    factory: Arc<dyn GrpcMethodBackendFactory>,
}

impl GrpcBridge {
    /// Create a bridge over a backend factory.
    pub fn new(factory: Arc<dyn GrpcMethodBackendFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl HttpHandler for GrpcBridge {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let method = request.uri().path().to_owned();
        debug!(method = %method, "bridging grpc call");

        let backend = self.factory.method_backend(&method);
        let mut grpc = tonic::server::Grpc::new(RawCodec);
        let response = grpc.streaming(BridgeStreaming { backend }, request).await;
        response.map(|body| body.map_err(BoxError::from).boxed_unsync())
    }
}

struct BridgeStreaming {
    backend: Arc<dyn GrpcMethodBackend>,
}

impl tonic::server::StreamingService<Frame> for BridgeStreaming {
    type Response = Frame;
    type ResponseStream = ReceiverStream<Result<Frame, Status>>;
    type Future = BoxFuture<tonic::Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Streaming<Frame>>) -> Self::Future {
        let backend = Arc::clone(&self.backend);
        Box::pin(async move {
            let metadata = request.metadata().clone();
            let frames = request.into_inner();

            let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);
            let (header_tx, header_rx) = oneshot::channel();
            tokio::spawn(dispatch(backend, metadata, frames, frame_tx, header_tx));

            // Response headers wait for the first backend result, the
            // moment the original contract set them.
            let mut response = tonic::Response::new(ReceiverStream::new(frame_rx));
            if let Ok(metadata) = header_rx.await {
                *response.metadata_mut() = metadata;
            }
            Ok(response)
        })
    }
}

/// Run both flows of one call, forward the first failure as the call
/// status, and finish the backend.
async fn dispatch<S>(
    backend: Arc<dyn GrpcMethodBackend>,
    metadata: MetadataMap,
    frames: S,
    frame_tx: mpsc::Sender<Result<Frame, Status>>,
    header_tx: oneshot::Sender<MetadataMap>,
) where
    S: Stream<Item = Result<Frame, Status>> + Send + Unpin + 'static,
{
    let receive = tokio::spawn(receive_flow(Arc::clone(&backend), metadata, frames));
    let send = tokio::spawn(send_flow(
        Arc::clone(&backend),
        frame_tx.clone(),
        header_tx,
    ));

    let (receive_result, send_result) = tokio::join!(receive, send);
    backend.end().await;

    for result in [flatten(receive_result), flatten(send_result)] {
        if let Err(status) = result {
            let _ = frame_tx.send(Err(status)).await;
            break;
        }
    }
}

fn flatten(joined: Result<Result<(), Status>, tokio::task::JoinError>) -> Result<(), Status> {
    joined.unwrap_or_else(|e| Err(Status::internal(format!("flow task failed: {e}"))))
}

/// Deliver incoming metadata and request frames to the backend.
///
/// The request side is always closed on the way out so the send flow can
/// terminate.
async fn receive_flow<S>(
    backend: Arc<dyn GrpcMethodBackend>,
    metadata: MetadataMap,
    mut frames: S,
) -> Result<(), Status>
where
    S: Stream<Item = Result<Frame, Status>> + Send + Unpin,
{
    let result = async {
        backend.begin(metadata).await?;
        while let Some(frame) = frames.next().await.transpose()? {
            backend.request(frame.payload).await?;
        }
        Ok(())
    }
    .await;

    backend.close_requests();
    result
}

/// Stream backend results to the client, publishing the first result's
/// metadata as response headers.
async fn send_flow(
    backend: Arc<dyn GrpcMethodBackend>,
    frame_tx: mpsc::Sender<Result<Frame, Status>>,
    header_tx: oneshot::Sender<MetadataMap>,
) -> Result<(), Status> {
    let mut header_tx = Some(header_tx);
    loop {
        match backend.response().await {
            Ok(Some((metadata, payload))) => {
                if let Some(tx) = header_tx.take() {
                    let _ = tx.send(metadata);
                }
                if frame_tx.send(Ok(Frame { payload })).await.is_err() {
                    // Client went away.
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(status) => {
                if let Some(tx) = header_tx.take() {
                    let _ = tx.send(status.metadata().clone());
                }
                return Err(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_stream::wrappers::ReceiverStream as TestStream;

    /// Echo backend: queues one uppercased response per request.
    #[derive(Default)]
    struct EchoBackend {
        begun_with: Mutex<Option<MetadataMap>>,
        queue: Mutex<VecDeque<Result<Option<(MetadataMap, Bytes)>, Status>>>,
        closed: Mutex<bool>,
        ended: Mutex<bool>,
        notify: tokio::sync::Notify,
    }

    #[async_trait]
    impl GrpcMethodBackend for EchoBackend {
        async fn begin(&self, metadata: MetadataMap) -> Result<(), Status> {
            *self.begun_with.lock().unwrap() = Some(metadata);
            Ok(())
        }

        async fn request(&self, payload: Bytes) -> Result<(), Status> {
            let mut metadata = MetadataMap::new();
            metadata.insert("x-backend", "echo".parse().unwrap());
            let echoed = payload.to_ascii_uppercase();
            self.queue
                .lock()
                .unwrap()
                .push_back(Ok(Some((metadata, Bytes::from(echoed)))));
            self.notify.notify_one();
            Ok(())
        }

        async fn response(&self) -> Result<Option<(MetadataMap, Bytes)>, Status> {
            loop {
                if let Some(item) = self.queue.lock().unwrap().pop_front() {
                    return item;
                }
                if *self.closed.lock().unwrap() {
                    return Ok(None);
                }
                self.notify.notified().await;
            }
        }

        fn close_requests(&self) {
            *self.closed.lock().unwrap() = true;
            self.notify.notify_one();
        }

        async fn end(&self) {
            *self.ended.lock().unwrap() = true;
        }
    }

    fn frames(payloads: &[&str]) -> TestStream<Result<Frame, Status>> {
        let (tx, rx) = mpsc::channel(8);
        for payload in payloads {
            tx.try_send(Ok(Frame::new(payload.as_bytes().to_vec())))
                .unwrap();
        }
        TestStream::new(rx)
    }

    #[tokio::test]
    async fn unary_call_round_trips() {
        let backend = Arc::new(EchoBackend::default());
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let (header_tx, header_rx) = oneshot::channel();

        let mut metadata = MetadataMap::new();
        metadata.insert("x-tenant", "t1".parse().unwrap());
        let stream = frames(&["hello"]);

        dispatch(
            Arc::clone(&backend) as Arc<dyn GrpcMethodBackend>,
            metadata,
            stream,
            frame_tx,
            header_tx,
        )
        .await;

        // Incoming metadata reached begin.
        let begun = backend.begun_with.lock().unwrap().clone().unwrap();
        assert_eq!(begun.get("x-tenant").unwrap(), "t1");

        // The response frame is the echoed payload.
        let frame = frame_rx.recv().await.unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"HELLO");
        assert!(frame_rx.recv().await.is_none());

        // Headers carry the first result's metadata.
        let headers = header_rx.await.unwrap();
        assert_eq!(headers.get("x-backend").unwrap(), "echo");

        assert!(*backend.ended.lock().unwrap());
    }

    #[tokio::test]
    async fn backend_error_becomes_stream_status() {
        #[derive(Default)]
        struct FailingBackend {
            closed: Mutex<bool>,
            notify: tokio::sync::Notify,
        }

        #[async_trait]
        impl GrpcMethodBackend for FailingBackend {
            async fn begin(&self, _metadata: MetadataMap) -> Result<(), Status> {
                Ok(())
            }

            async fn request(&self, _payload: Bytes) -> Result<(), Status> {
                Ok(())
            }

            async fn response(&self) -> Result<Option<(MetadataMap, Bytes)>, Status> {
                loop {
                    if *self.closed.lock().unwrap() {
                        let mut status = Status::resource_exhausted("too many requests");
                        status
                            .metadata_mut()
                            .insert("x-error-id", "abc123".parse().unwrap());
                        return Err(status);
                    }
                    self.notify.notified().await;
                }
            }

            fn close_requests(&self) {
                *self.closed.lock().unwrap() = true;
                self.notify.notify_one();
            }

            async fn end(&self) {}
        }

        let backend = Arc::new(FailingBackend::default());
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let (header_tx, header_rx) = oneshot::channel();
        let stream = frames(&["payload"]);

        dispatch(
            backend as Arc<dyn GrpcMethodBackend>,
            MetadataMap::new(),
            stream,
            frame_tx,
            header_tx,
        )
        .await;

        let status = frame_rx.recv().await.unwrap().expect_err("status");
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);
        assert_eq!(status.metadata().get("x-error-id").unwrap(), "abc123");

        // Error metadata is also published as headers.
        let headers = header_rx.await.unwrap();
        assert!(headers.get("x-error-id").is_some());
    }

    #[tokio::test]
    async fn streaming_call_gets_one_response_per_request() {
        let backend = Arc::new(EchoBackend::default());
        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let (header_tx, _header_rx) = oneshot::channel();
        let stream = frames(&["a", "b", "c"]);

        dispatch(
            backend as Arc<dyn GrpcMethodBackend>,
            MetadataMap::new(),
            stream,
            frame_tx,
            header_tx,
        )
        .await;

        let mut payloads = Vec::new();
        while let Some(frame) = frame_rx.recv().await {
            payloads.push(frame.unwrap().payload);
        }
        assert_eq!(payloads, vec![Bytes::from("A"), Bytes::from("B"), Bytes::from("C")]);
    }
}
