//! HTTP-envelope Lambda backend.
//!
//! Wraps a plain HTTP request into an API-Gateway v1 proxy request, invokes
//! the function synchronously, and writes the proxy response back to the
//! client. Every failure path answers `500` with a correlation id echoed in
//! the `x-error-id` header; detail stays in the server log.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use cruiser_core::LambdaBackend;
use cruiser_server::{full_body, HttpHandler, HttpRequest, HttpResponse};
use http_body_util::BodyExt;
use query_map::QueryMap;
use tracing::error;
use uuid::Uuid;

use super::{decode_proxy_response, invoke_function};
use crate::AwsError;

/// A route backend that proxies requests to one Lambda function.
pub struct LambdaHttpBackend {
    client: aws_sdk_lambda::Client,
    backend: LambdaBackend,
}

impl LambdaHttpBackend {
    /// Create a backend over a function.
    pub fn new(client: aws_sdk_lambda::Client, backend: LambdaBackend) -> Self {
        Self { client, backend }
    }

    async fn proxy(&self, request: HttpRequest) -> Result<HttpResponse, AwsError> {
        let (parts, body) = request.into_parts();
        let body = body.collect().await.map_err(AwsError::ReadBody)?.to_bytes();

        let envelope = build_proxy_request(&parts, &body);
        let payload = serde_json::to_vec(&envelope).map_err(AwsError::EncodePayload)?;

        let response_payload = invoke_function(
            &self.client,
            &self.backend.function_name,
            &self.backend.qualifier,
            payload,
        )
        .await?;

        let (response, body) = decode_proxy_response(&response_payload)?;
        proxy_response_to_http(&response, body)
    }
}

#[async_trait]
impl HttpHandler for LambdaHttpBackend {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.proxy(request).await {
            Ok(response) => response,
            Err(error) => wrap_http_error(&error),
        }
    }
}

/// Answer a failed request: correlation id in the header and body, full
/// detail only in the log.
fn wrap_http_error(error: &AwsError) -> HttpResponse {
    let error_id = Uuid::new_v4().to_string();
    error!(error = %error, error_id = %error_id, "error handling request");

    http::Response::builder()
        .status(http::StatusCode::INTERNAL_SERVER_ERROR)
        .header("x-error-id", &error_id)
        .body(full_body(format!("internal server error: {error_id}")))
        .expect("static response")
}

fn build_proxy_request(parts: &http::request::Parts, body: &[u8]) -> ApiGatewayProxyRequest {
    let queries: HashMap<String, Vec<String>> = parts
        .uri
        .query()
        .map(|query| {
            let mut map: HashMap<String, Vec<String>> = HashMap::new();
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                map.entry(key.into_owned()).or_default().push(value.into_owned());
            }
            map
        })
        .unwrap_or_default();

    ApiGatewayProxyRequest {
        http_method: parts.method.clone(),
        path: Some(parts.uri.path().to_owned()),
        multi_value_headers: parts.headers.clone(),
        multi_value_query_string_parameters: QueryMap::from(queries),
        body: Some(String::from_utf8_lossy(body).into_owned()),
        is_base64_encoded: false,
        ..Default::default()
    }
}

fn proxy_response_to_http(
    response: &ApiGatewayProxyResponse,
    body: Vec<u8>,
) -> Result<HttpResponse, AwsError> {
    let status = u16::try_from(response.status_code)
        .ok()
        .and_then(|code| http::StatusCode::from_u16(code).ok())
        .ok_or(AwsError::InvalidStatusCode(response.status_code))?;

    let mut http_response = http::Response::builder()
        .status(status)
        .body(full_body(body))
        .expect("valid response");

    let headers = http_response.headers_mut();
    for (name, value) in &response.multi_value_headers {
        headers.append(name, value.clone());
    }
    for (name, value) in &response.headers {
        headers.append(name, value.clone());
    }

    Ok(http_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruiser_server::empty_body;

    fn parts(uri: &str) -> http::request::Parts {
        let request = http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-tenant", "t1")
            .header("accept", "application/json")
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[test]
    fn envelope_carries_method_path_headers_and_queries() {
        let envelope = build_proxy_request(&parts("/users?page=2&page=3&q=x"), b"payload");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["httpMethod"], "POST");
        assert_eq!(json["path"], "/users");
        assert_eq!(json["isBase64Encoded"], false);
        assert_eq!(json["body"], "payload");
        assert_eq!(json["multiValueHeaders"]["x-tenant"][0], "t1");
        assert_eq!(
            json["multiValueQueryStringParameters"]["page"],
            serde_json::json!(["2", "3"])
        );
    }

    #[test]
    fn response_copies_both_header_maps_and_status() {
        let payload = br#"{
            "statusCode": 201,
            "headers": {"x-single": "s"},
            "multiValueHeaders": {"x-multi": ["a", "b"]},
            "body": "done",
            "isBase64Encoded": false
        }"#;
        let (response, body) = decode_proxy_response(payload).unwrap();
        let http_response = proxy_response_to_http(&response, body).unwrap();

        assert_eq!(http_response.status(), http::StatusCode::CREATED);
        assert_eq!(http_response.headers().get("x-single").unwrap(), "s");
        let multi: Vec<_> = http_response.headers().get_all("x-multi").iter().collect();
        assert_eq!(multi.len(), 2);
    }

    #[test]
    fn bogus_status_code_is_rejected() {
        let response = ApiGatewayProxyResponse {
            status_code: 12345,
            ..Default::default()
        };
        assert!(matches!(
            proxy_response_to_http(&response, Vec::new()),
            Err(AwsError::InvalidStatusCode(12345))
        ));
    }

    #[test]
    fn error_wrapper_sets_correlation_header() {
        let response = wrap_http_error(&AwsError::FunctionError("Unhandled".into()));
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-error-id"));
    }

    #[tokio::test]
    async fn request_body_collection_works_with_boxed_bodies() {
        // Exercise the body plumbing the listener hands us.
        let request: HttpRequest = http::Request::builder()
            .uri("/x")
            .body(empty_body())
            .unwrap();
        let (_, body) = request.into_parts();
        let collected = body.collect().await.unwrap().to_bytes();
        assert!(collected.is_empty());
    }
}
