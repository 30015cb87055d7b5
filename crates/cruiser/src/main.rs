//! The cruiser binary: `router start` serves the data plane, `xds start`
//! serves the Envoy control plane. Both are fed by the same tfstate sync.

mod args;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{Cli, Command, RouterCommand, XdsCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Router {
            command: RouterCommand::Start(router_args),
        } => commands::router::run(cli.global, router_args).await,
        Command::Xds {
            command: XdsCommand::Start(xds_args),
        } => commands::xds::run(cli.global, xds_args).await,
    }
}
