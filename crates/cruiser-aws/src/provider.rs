//! The AWS backend provider.
//!
//! Owns the SDK clients shared by every backend, converts route handler
//! descriptors into live Lambda backends, and runs the periodic health
//! check loop over the handlers of the current snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aws_config::BehaviorVersion;
use cruiser_core::RouteHandler;
use cruiser_server::grpc::GrpcBridge;
use cruiser_server::{BackendProvider, BackendProviderKey, HttpHandler};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lambda::{
    check_lambda, HealthRegistry, LambdaHttpBackend, LambdaMethodBackendFactory,
};

/// The AWS provider: SDK clients plus backend construction.
pub struct AwsProvider {
    config: aws_config::SdkConfig,
    lambda: aws_sdk_lambda::Client,
    s3: aws_sdk_s3::Client,
    service_discovery: aws_sdk_servicediscovery::Client,
    health: Arc<HealthRegistry>,
    health_check_interval: Option<Duration>,
    health_check_token: Mutex<Option<CancellationToken>>,
}

impl AwsProvider {
    /// Start building a provider.
    pub fn builder() -> AwsProviderBuilder {
        AwsProviderBuilder::default()
    }

    /// The Lambda client.
    pub fn lambda_client(&self) -> aws_sdk_lambda::Client {
        self.lambda.clone()
    }

    /// The S3 client on the ambient credentials.
    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        self.s3.clone()
    }

    /// An S3 client on assumed-role credentials.
    pub async fn s3_client_with_role(&self, role_arn: &str) -> aws_sdk_s3::Client {
        let provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
            .session_name("cruiser-tfstate")
            .configure(&self.config)
            .build()
            .await;
        let config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(provider)
            .load()
            .await;
        aws_sdk_s3::Client::new(&config)
    }

    /// The Cloud Map client.
    pub fn service_discovery_client(&self) -> aws_sdk_servicediscovery::Client {
        self.service_discovery.clone()
    }

    /// Health observations recorded by the check loop.
    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }
}

impl BackendProvider for AwsProvider {
    fn key(&self) -> BackendProviderKey {
        BackendProviderKey::Aws
    }

    fn to_http_backend(&self, handler: &RouteHandler) -> Arc<dyn HttpHandler> {
        let RouteHandler::AwsLambda(backend) = handler;
        Arc::new(LambdaHttpBackend::new(self.lambda.clone(), backend.clone()))
    }

    fn to_grpc_backend(&self, handler: &RouteHandler) -> Arc<dyn HttpHandler> {
        let RouteHandler::AwsLambda(backend) = handler;
        Arc::new(GrpcBridge::new(Arc::new(LambdaMethodBackendFactory::new(
            self.lambda.clone(),
            backend.clone(),
        ))))
    }

    /// Re-arm the periodic health check over the given handlers, replacing
    /// any loop armed for a previous snapshot.
    fn health_check_handlers(&self, handlers: &[RouteHandler]) {
        let Some(interval) = self.health_check_interval else {
            return;
        };
        if handlers.is_empty() {
            return;
        }

        let token = CancellationToken::new();
        if let Some(previous) = self
            .health_check_token
            .lock()
            .expect("health lock poisoned")
            .replace(token.clone())
        {
            previous.cancel();
        }

        let backends: Vec<_> = handlers
            .iter()
            .map(|handler| {
                let RouteHandler::AwsLambda(backend) = handler;
                backend.clone()
            })
            .collect();
        let client = self.lambda.clone();
        let registry = Arc::clone(&self.health);

        tokio::spawn(async move {
            loop {
                let mut checks = JoinSet::new();
                for backend in backends.clone() {
                    let client = client.clone();
                    let registry = Arc::clone(&registry);
                    checks.spawn(async move {
                        match check_lambda(&client, &backend).await {
                            Ok(healthy) => registry.record(&backend, healthy),
                            Err(error) => {
                                warn!(
                                    function = %backend.function_name,
                                    error = %error,
                                    "health check failed"
                                );
                                registry.record(&backend, false);
                            }
                        }
                    });
                }
                while checks.join_next().await.is_some() {}

                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("health check loop replaced");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
    }
}

/// Builder for [`AwsProvider`].
#[derive(Debug, Default)]
pub struct AwsProviderBuilder {
    dynamodb_endpoint: Option<String>,
    health_check_interval: Option<Duration>,
}

impl AwsProviderBuilder {
    /// Override the DynamoDB endpoint. Accepted for environment parity; no
    /// DynamoDB client is currently constructed.
    #[must_use]
    pub fn dynamodb_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.dynamodb_endpoint = endpoint;
        self
    }

    /// Enable periodic health checking of snapshot handlers.
    #[must_use]
    pub fn health_check_interval(mut self, interval: Option<Duration>) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Load the ambient AWS configuration and build the provider.
    pub async fn build(self) -> AwsProvider {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        if let Some(endpoint) = &self.dynamodb_endpoint {
            debug!(endpoint = %endpoint, "dynamodb endpoint override set; no dynamodb client in use");
        }

        AwsProvider {
            lambda: aws_sdk_lambda::Client::new(&config),
            s3: aws_sdk_s3::Client::new(&config),
            service_discovery: aws_sdk_servicediscovery::Client::new(&config),
            config,
            health: Arc::new(HealthRegistry::new()),
            health_check_interval: self.health_check_interval,
            health_check_token: Mutex::new(None),
        }
    }
}
