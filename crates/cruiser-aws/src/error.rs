//! Error types for the AWS provider.

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the AWS provider.
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    /// Listing the tfstate bucket failed.
    #[error("list objects in {bucket}: {source}")]
    ListObjects {
        /// The bucket being listed.
        bucket: String,
        /// The underlying SDK failure.
        #[source]
        source: BoxError,
    },

    /// Reading an object digest failed.
    #[error("head object {key}: {source}")]
    HeadObject {
        /// The object key.
        key: String,
        /// The underlying SDK failure.
        #[source]
        source: BoxError,
    },

    /// Downloading an object failed.
    #[error("get object {key}: {source}")]
    GetObject {
        /// The object key.
        key: String,
        /// The underlying SDK failure.
        #[source]
        source: BoxError,
    },

    /// A downloaded tfstate document did not parse.
    #[error("parse tfstate {key}: {source}")]
    ParseTfstate {
        /// The object key.
        key: String,
        /// The JSON failure.
        #[source]
        source: serde_json::Error,
    },

    /// Invoking a Lambda function failed.
    #[error("invoke lambda {function_name}: {source}")]
    Invoke {
        /// The function being invoked.
        function_name: String,
        /// The underlying SDK failure.
        #[source]
        source: BoxError,
    },

    /// The Lambda runtime reported a function error.
    #[error("lambda function error: {0}")]
    FunctionError(String),

    /// Reading the request body failed.
    #[error("read request body: {0}")]
    ReadBody(#[source] BoxError),

    /// Serializing the invocation envelope failed.
    #[error("encode invocation payload: {0}")]
    EncodePayload(#[source] serde_json::Error),

    /// The Lambda response did not parse as an API-Gateway response.
    #[error("decode lambda response: {0}")]
    DecodeResponse(#[source] serde_json::Error),

    /// The response body was flagged base64 but did not decode.
    #[error("decode base64 body: {0}")]
    DecodeBody(#[from] base64::DecodeError),

    /// The response carried a status code outside the HTTP range.
    #[error("invalid status code in lambda response: {0}")]
    InvalidStatusCode(i64),

    /// A health-check response did not decode.
    #[error("decode health response: {0}")]
    DecodeHealth(#[from] prost::DecodeError),

    /// A service-discovery call failed.
    #[error("service discovery: {0}")]
    ServiceDiscovery(#[source] BoxError),

    /// A discovered service carries an unusable port tag.
    #[error("invalid service port {value:?} for service {service}: {source}")]
    InvalidServicePort {
        /// The discovered service name.
        service: String,
        /// The tag value.
        value: String,
        /// The parse failure.
        #[source]
        source: std::num::ParseIntError,
    },
}

impl AwsError {
    pub(crate) fn invoke<E>(function_name: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Invoke {
            function_name: function_name.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn service_discovery<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ServiceDiscovery(Box::new(source))
    }
}
