//! `cruiser router start`: the data plane.
//!
//! A routes snapshot arriving from the state manager compiles into a fresh
//! router, which is swapped into the serving handler atomically. Sync
//! errors are fatal; the process is restart-oriented.

use std::sync::Arc;

use cruiser_aws::AwsProvider;
use cruiser_server::{
    BackendProvider, HttpHandler, ListenerServer, Router, SwapHandler,
};
use cruiser_state::{Projection, RoutesState, StateManager};
use tracing::{debug, error, info};

use crate::args::{GlobalArgs, RouterArgs};
use crate::commands::{listener_protocol, shutdown_token, tfstate_source, tls_server_config};

pub async fn run(global: GlobalArgs, args: RouterArgs) -> anyhow::Result<()> {
    let shutdown = shutdown_token();

    let provider = Arc::new(
        AwsProvider::builder()
            .dynamodb_endpoint(global.dynamodb_endpoint.clone())
            .health_check_interval(args.health_check_interval)
            .build()
            .await,
    );
    let source = tfstate_source(&global, &provider).await?;

    let (routes_state, mut routes_rx) = RoutesState::new();
    let manager = StateManager::builder()
        .tfstate_source(source)
        .projection(routes_state as Arc<dyn Projection>)
        .periodic_sync_interval(global.period_sync_interval)
        .build()?;

    let swap = SwapHandler::new();
    let mut server = ListenerServer::builder()
        .listener_address(&global.listener_address)
        .listener_protocol(listener_protocol(&global))
        .tls_config(tls_server_config(&global)?)
        .http_handler(Arc::clone(&swap) as Arc<dyn HttpHandler>)
        .shutdown_timeout(global.shutdown_timeout)
        .build();

    let mut manager_task = tokio::spawn(manager.run(shutdown.clone()));
    server.open().await?;
    info!(address = %global.listener_address, "router started");

    let mut snapshots_open = true;
    let result: anyhow::Result<()> = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("router: shutting down");
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
            snapshot = routes_rx.recv(), if snapshots_open => {
                let Some(routes) = snapshot else {
                    snapshots_open = false;
                    continue;
                };
                debug!(routes = routes.len(), "routes update received");

                let router = match Router::builder()
                    .backend_provider(Arc::clone(&provider) as Arc<dyn BackendProvider>)
                    .routes(&routes)
                    .build()
                {
                    Ok(router) => router,
                    Err(error) => {
                        error!(error = %error, "route table compilation failed");
                        break Err(error.into());
                    }
                };
                router.do_health_check();

                if let Err(error) = swap.swap(Arc::new(router)).await {
                    break Err(error.into());
                }
            }
        }
    };

    shutdown.cancel();
    swap.close();
    server.close().await?;
    result
}
