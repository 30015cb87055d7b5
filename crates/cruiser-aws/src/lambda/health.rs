//! Lambda gRPC health checking.
//!
//! Backends bridged over Lambda still speak the standard gRPC health
//! protocol; the check invokes `grpc.health.v1.Health/Check` through the
//! same API-Gateway envelope the bridge uses and records the outcome per
//! function.

use std::time::SystemTime;

use aws_lambda_events::apigw::ApiGatewayProxyRequest;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cruiser_core::LambdaBackend;
use dashmap::DashMap;
use prost::Message;

use super::{decode_proxy_response, invoke_function};
use crate::AwsError;

/// `grpc.health.v1.HealthCheckRequest`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HealthCheckRequest {
    /// Service to check; `*` checks the whole server.
    #[prost(string, tag = "1")]
    pub service: String,
}

/// `grpc.health.v1.HealthCheckResponse`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HealthCheckResponse {
    /// Reported serving status.
    #[prost(enumeration = "ServingStatus", tag = "1")]
    pub status: i32,
}

/// Serving status reported by the health protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ServingStatus {
    /// Unknown.
    Unknown = 0,
    /// Serving.
    Serving = 1,
    /// Not serving.
    NotServing = 2,
    /// The requested service is unknown to the server.
    ServiceUnknown = 3,
}

/// One recorded health observation.
#[derive(Debug, Clone)]
pub struct BackendHealth {
    /// Whether the backend reported `SERVING`.
    pub healthy: bool,
    /// When the observation was made.
    pub checked_at: SystemTime,
}

/// Health observations keyed by `function:qualifier`.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    entries: DashMap<String, BackendHealth>,
}

impl HealthRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation for a backend.
    pub fn record(&self, backend: &LambdaBackend, healthy: bool) {
        self.entries.insert(
            registry_key(backend),
            BackendHealth {
                healthy,
                checked_at: SystemTime::now(),
            },
        );
    }

    /// The latest observation for a backend, if any.
    pub fn status(&self, backend: &LambdaBackend) -> Option<BackendHealth> {
        self.entries.get(&registry_key(backend)).map(|e| e.clone())
    }

    /// Number of backends with an observation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no backend has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn registry_key(backend: &LambdaBackend) -> String {
    format!("{}:{}", backend.function_name, backend.qualifier)
}

/// Invoke the function's health endpoint and report whether it serves.
pub async fn check_lambda(
    client: &aws_sdk_lambda::Client,
    backend: &LambdaBackend,
) -> Result<bool, AwsError> {
    let check = HealthCheckRequest {
        service: "*".to_owned(),
    };
    let envelope = ApiGatewayProxyRequest {
        http_method: http::Method::POST,
        path: Some("grpc.health.v1.Health/Check".to_owned()),
        body: Some(BASE64.encode(check.encode_to_vec())),
        is_base64_encoded: true,
        ..Default::default()
    };
    let payload = serde_json::to_vec(&envelope).map_err(AwsError::EncodePayload)?;

    let response_payload = invoke_function(
        client,
        &backend.function_name,
        &backend.qualifier,
        payload,
    )
    .await?;
    let (_, body) = decode_proxy_response(&response_payload)?;

    let response = HealthCheckResponse::decode(body.as_slice())?;
    Ok(response.status == ServingStatus::Serving as i32)
}
