//! gRPC-bridge Lambda backend.
//!
//! Each bridged call gets one `LambdaMethodBackend`. Request frames are
//! base64-encoded into an API-Gateway envelope whose `path` is the gRPC
//! method; the decoded function response is queued for the send flow, which
//! makes `request` and `response` safe to run concurrently on the same
//! backend. Non-200 responses map to gRPC statuses per the translation
//! table, with a correlation id in `x-error-id`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use cruiser_core::LambdaBackend;
use cruiser_server::grpc::{GrpcMethodBackend, GrpcMethodBackendFactory};
use tokio::sync::mpsc;
use tonic::metadata::MetadataMap;
use tonic::{Code, Status};
use tracing::error;
use uuid::Uuid;

use super::{decode_proxy_response, invoke_function};
use crate::AwsError;

type CallResult = Result<(MetadataMap, Bytes), Status>;

/// Creates one [`LambdaMethodBackend`] per bridged call.
pub struct LambdaMethodBackendFactory {
    client: aws_sdk_lambda::Client,
    backend: LambdaBackend,
}

impl LambdaMethodBackendFactory {
    /// Create a factory for a function.
    pub fn new(client: aws_sdk_lambda::Client, backend: LambdaBackend) -> Self {
        Self { client, backend }
    }
}

impl GrpcMethodBackendFactory for LambdaMethodBackendFactory {
    fn method_backend(&self, method: &str) -> Arc<dyn GrpcMethodBackend> {
        Arc::new(LambdaMethodBackend::new(
            self.client.clone(),
            self.backend.clone(),
            method.to_owned(),
        ))
    }
}

/// The per-call Lambda translation target.
pub struct LambdaMethodBackend {
    client: aws_sdk_lambda::Client,
    backend: LambdaBackend,
    method: String,
    incoming: Mutex<MetadataMap>,
    results_tx: Mutex<Option<mpsc::UnboundedSender<CallResult>>>,
    results_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<CallResult>>,
}

impl LambdaMethodBackend {
    /// Create a backend for one call to `method`.
    pub fn new(client: aws_sdk_lambda::Client, backend: LambdaBackend, method: String) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            client,
            backend,
            method,
            incoming: Mutex::new(MetadataMap::new()),
            results_tx: Mutex::new(Some(results_tx)),
            results_rx: tokio::sync::Mutex::new(results_rx),
        }
    }

    fn queue(&self, result: CallResult) {
        if let Some(tx) = self.results_tx.lock().expect("results lock poisoned").as_ref() {
            let _ = tx.send(result);
        }
    }
}

#[async_trait]
impl GrpcMethodBackend for LambdaMethodBackend {
    async fn begin(&self, metadata: MetadataMap) -> Result<(), Status> {
        *self.incoming.lock().expect("metadata lock poisoned") = metadata;
        Ok(())
    }

    async fn request(&self, payload: Bytes) -> Result<(), Status> {
        let incoming = self
            .incoming
            .lock()
            .expect("metadata lock poisoned")
            .clone();
        let envelope = build_grpc_envelope(&self.method, &incoming, &payload);
        let payload = serde_json::to_vec(&envelope)
            .map_err(AwsError::EncodePayload)
            .map_err(wrap_grpc_error)?;

        let response_payload = invoke_function(
            &self.client,
            &self.backend.function_name,
            &self.backend.qualifier,
            payload,
        )
        .await
        .map_err(wrap_grpc_error)?;

        let (response, body) =
            decode_proxy_response(&response_payload).map_err(wrap_grpc_error)?;
        self.queue(call_result(&response, body));
        Ok(())
    }

    async fn response(&self) -> Result<Option<(MetadataMap, Bytes)>, Status> {
        let mut rx = self.results_rx.lock().await;
        match rx.recv().await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    fn close_requests(&self) {
        self.results_tx.lock().expect("results lock poisoned").take();
    }

    async fn end(&self) {}
}

/// Wrap an internal failure: correlation id to the client, detail to the
/// log.
fn wrap_grpc_error(error: AwsError) -> Status {
    let error_id = Uuid::new_v4().to_string();
    error!(error = %error, error_id = %error_id, "error handling request");
    Status::internal(format!("internal server error: {error_id}"))
}

fn build_grpc_envelope(
    method: &str,
    incoming: &MetadataMap,
    payload: &[u8],
) -> ApiGatewayProxyRequest {
    ApiGatewayProxyRequest {
        http_method: http::Method::POST,
        path: Some(method.to_owned()),
        multi_value_headers: incoming.clone().into_headers(),
        body: Some(BASE64.encode(payload)),
        is_base64_encoded: true,
        ..Default::default()
    }
}

/// Translate a decoded function response into the call result the send
/// flow delivers.
fn call_result(response: &ApiGatewayProxyResponse, body: Vec<u8>) -> CallResult {
    // Outgoing metadata is the union of both header maps.
    let mut merged = response.multi_value_headers.clone();
    for (name, value) in &response.headers {
        merged.append(name, value.clone());
    }
    let mut outgoing = MetadataMap::from_headers(merged);

    if response.status_code == 200 {
        return Ok((outgoing, Bytes::from(body)));
    }

    let (code, message) = map_http_status(response.status_code);
    let error_id = Uuid::new_v4().to_string();
    outgoing.insert(
        "x-error-id",
        error_id.parse().expect("uuid is a valid metadata value"),
    );

    if code == Code::Ok {
        // 410 maps to OK; the call succeeds with an empty payload.
        return Ok((outgoing, Bytes::new()));
    }

    let mut status = Status::new(code, message);
    *status.metadata_mut() = outgoing;
    Err(status)
}

/// The HTTP to gRPC status translation table.
fn map_http_status(status_code: i64) -> (Code, &'static str) {
    match status_code {
        204 => (Code::OutOfRange, "out of range"),
        401 => (Code::Unauthenticated, "unauthorized"),
        403 => (Code::PermissionDenied, "forbidden"),
        404 => (Code::NotFound, "not found"),
        405 => (Code::Unimplemented, "method not allowed"),
        409 => (Code::AlreadyExists, "already exists"),
        410 => (Code::Ok, "moved permanently"),
        412 => (Code::FailedPrecondition, "failed precondition"),
        429 => (Code::ResourceExhausted, "too many requests"),
        500 => (Code::Internal, "internal server error"),
        501 => (Code::Unimplemented, "not implemented"),
        503 => (Code::Unavailable, "service unavailable"),
        _ => (Code::Internal, "internal server error"),
    }
}
