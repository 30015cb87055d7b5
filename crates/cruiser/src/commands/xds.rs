//! `cruiser xds start`: the Envoy control plane.
//!
//! The discovery services are bound over the xDS state's classified caches
//! and served through the shared listener. Cloud Map discovery, when
//! namespaces are configured, feeds the endpoint overlay.

use std::sync::Arc;

use async_trait::async_trait;
use cruiser_aws::{AwsProvider, ServiceDiscoveryXds};
use cruiser_server::{full_body, BoxError, HttpHandler, HttpRequest, HttpResponse, ListenerServer};
use cruiser_state::{Projection, StateManager, XdsState};
use http_body_util::BodyExt;
use tower::ServiceExt;
use tracing::{debug, error, info};

use crate::args::{GlobalArgs, XdsArgs};
use crate::commands::{listener_protocol, shutdown_token, tfstate_source, tls_server_config};

/// Serves the tonic route set through the listener's handler seam.
struct GrpcService {
    routes: tonic::service::Routes,
}

#[async_trait]
impl HttpHandler for GrpcService {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let request =
            request.map(|body| body.map_err(tonic::Status::from_error).boxed_unsync());
        match self.routes.clone().oneshot(request).await {
            Ok(response) => response.map(|body| body.map_err(BoxError::from).boxed_unsync()),
            Err(error) => {
                error!(error = %error, "grpc route error");
                http::Response::builder()
                    .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                    .body(full_body("internal error"))
                    .expect("static response")
            }
        }
    }
}

pub async fn run(global: GlobalArgs, args: XdsArgs) -> anyhow::Result<()> {
    let shutdown = shutdown_token();

    let provider = Arc::new(
        AwsProvider::builder()
            .dynamodb_endpoint(global.dynamodb_endpoint.clone())
            .build()
            .await,
    );
    let source = tfstate_source(&global, &provider).await?;

    let (xds_state, mut xds_rx) = XdsState::new();
    let manager = StateManager::builder()
        .tfstate_source(source)
        .projection(Arc::clone(&xds_state) as Arc<dyn Projection>)
        .periodic_sync_interval(global.period_sync_interval)
        .build()?;

    let grpc = GrpcService {
        routes: cruiser_xds::xds_routes(xds_state.mux()),
    };
    let mut server = ListenerServer::builder()
        .listener_address(&global.listener_address)
        .listener_protocol(listener_protocol(&global))
        .tls_config(tls_server_config(&global)?)
        .http_handler(Arc::new(grpc) as Arc<dyn HttpHandler>)
        .shutdown_timeout(global.shutdown_timeout)
        .build();

    let mut manager_task = tokio::spawn(manager.run(shutdown.clone()));
    let mut discovery_task = if args.aws_service_discovery_namespaces.is_empty() {
        let idle = shutdown.clone();
        tokio::spawn(async move {
            idle.cancelled().await;
            Ok::<(), cruiser_aws::AwsError>(())
        })
    } else {
        let discovery = ServiceDiscoveryXds::builder()
            .service_discovery_client(provider.service_discovery_client())
            .namespaces(args.aws_service_discovery_namespaces.clone())
            .service_port_tag_key(args.aws_service_port_tag_key.clone())
            .periodic_sync_interval(global.period_sync_interval)
            .xds_state(Arc::clone(&xds_state))
            .build();
        tokio::spawn(discovery.run(shutdown.clone()))
    };

    server.open().await?;
    info!(address = %global.listener_address, "xds control plane started");

    let result: anyhow::Result<()> = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("xds: shutting down");
                break Ok(());
            }
            joined = &mut manager_task => {
                break match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => {
                        error!(error = %error, "state sync failed");
                        Err(error.into())
                    }
                    Err(error) => Err(error.into()),
                };
            }
            joined = &mut discovery_task => {
                break match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => {
                        error!(error = %error, "service discovery failed");
                        Err(error.into())
                    }
                    Err(error) => Err(error.into()),
                };
            }
            update = xds_rx.recv() => {
                if update.is_some() {
                    debug!("xds update received");
                }
            }
        }
    };

    shutdown.cancel();
    server.close().await?;
    result
}
