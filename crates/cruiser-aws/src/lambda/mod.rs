//! Lambda-backed request handling.
//!
//! Both backends speak the API-Gateway v1 proxy shape to the function:
//! requests are wrapped into a proxy request envelope, responses come back
//! as a proxy response whose body may be base64-encoded.

mod grpc;
mod health;
mod http;

pub use grpc::{LambdaMethodBackend, LambdaMethodBackendFactory};
pub use health::{check_lambda, BackendHealth, HealthRegistry};
pub use http::LambdaHttpBackend;

use aws_lambda_events::apigw::ApiGatewayProxyResponse;
use aws_lambda_events::encodings::Body;
use aws_sdk_lambda::types::InvocationType;
use aws_smithy_types::Blob;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::AwsError;

/// Invoke a function synchronously and return the raw response payload.
///
/// A `FunctionError` marker on the invocation result is treated as a
/// failure even when the call itself succeeded.
pub(crate) async fn invoke_function(
    client: &aws_sdk_lambda::Client,
    function_name: &str,
    qualifier: &str,
    payload: Vec<u8>,
) -> Result<Vec<u8>, AwsError> {
    let mut invoke = client
        .invoke()
        .function_name(function_name)
        .invocation_type(InvocationType::RequestResponse)
        .payload(Blob::new(payload));
    if !qualifier.is_empty() {
        invoke = invoke.qualifier(qualifier);
    }

    let result = invoke
        .send()
        .await
        .map_err(|e| AwsError::invoke(function_name, e))?;

    if let Some(function_error) = result.function_error() {
        return Err(AwsError::FunctionError(function_error.to_owned()));
    }

    Ok(result
        .payload()
        .map(|blob| blob.as_ref().to_vec())
        .unwrap_or_default())
}

/// Parse an invocation payload as an API-Gateway proxy response and decode
/// its body (base64 when flagged).
pub(crate) fn decode_proxy_response(
    payload: &[u8],
) -> Result<(ApiGatewayProxyResponse, Vec<u8>), AwsError> {
    let response: ApiGatewayProxyResponse =
        serde_json::from_slice(payload).map_err(AwsError::DecodeResponse)?;
    let body = decode_proxy_body(&response)?;
    Ok((response, body))
}

fn decode_proxy_body(response: &ApiGatewayProxyResponse) -> Result<Vec<u8>, AwsError> {
    let Some(body) = &response.body else {
        return Ok(Vec::new());
    };
    match body {
        Body::Empty => Ok(Vec::new()),
        Body::Binary(bytes) => Ok(bytes.clone()),
        Body::Text(text) => {
            if response.is_base64_encoded {
                Ok(BASE64.decode(text)?)
            } else {
                Ok(text.as_bytes().to_vec())
            }
        }
    }
}
