//! Command-line surface.
//!
//! Every flag is also readable from a `CRUISER_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// A small control/data plane for modern cloud native applications.
#[derive(Debug, Parser)]
#[command(name = "cruiser", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Router is a proxy server for serverless endpoints.
    Router {
        #[command(subcommand)]
        command: RouterCommand,
    },
    /// xDS is the control plane for Envoy proxy.
    Xds {
        #[command(subcommand)]
        command: XdsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum RouterCommand {
    /// Start the router server.
    Start(RouterArgs),
}

#[derive(Debug, Subcommand)]
pub enum XdsCommand {
    /// Start the xDS server.
    Start(XdsArgs),
}

/// Flags shared by both runtime modes.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Serve HTTP/2 behind TLS instead of H2C.
    #[arg(
        long,
        env = "CRUISER_ENABLE_TLS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_tls: bool,

    /// TLS certificate file (PEM).
    #[arg(long, env = "CRUISER_TLS_CERTIFICATE")]
    pub tls_certificate: Option<PathBuf>,

    /// TLS private key file (PEM).
    #[arg(long, env = "CRUISER_TLS_PRIVATE_KEY")]
    pub tls_private_key: Option<PathBuf>,

    /// Listener address.
    #[arg(
        long,
        env = "CRUISER_LISTENER_ADDRESS",
        default_value = "0.0.0.0:4880"
    )]
    pub listener_address: String,

    /// Graceful shutdown timeout.
    #[arg(
        long,
        env = "CRUISER_SHUTDOWN_TIMEOUT",
        default_value = "20s",
        value_parser = humantime::parse_duration
    )]
    pub shutdown_timeout: Duration,

    /// Interval between tfstate sync cycles.
    #[arg(
        long,
        env = "CRUISER_PERIOD_SYNC_INTERVAL",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub period_sync_interval: Duration,

    /// Where tfstate documents come from.
    #[arg(long, env = "CRUISER_TFSTATE_SOURCE", value_enum)]
    pub tfstate_source: Option<TfstateSourceSelector>,

    /// Bucket holding .tfstate objects (aws-s3 source).
    #[arg(long, env = "CRUISER_AWS_TFSTATE_BUCKET")]
    pub aws_tfstate_bucket: Option<String>,

    /// Role to assume for reading the tfstate bucket.
    #[arg(long, env = "CRUISER_AWS_TFSTATE_ROLE_ARN")]
    pub aws_tfstate_role_arn: Option<String>,

    /// DynamoDB endpoint override.
    #[arg(long, env = "CRUISER_DYNAMODB_ENDPOINT")]
    pub dynamodb_endpoint: Option<String>,
}

/// Supported tfstate sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TfstateSourceSelector {
    /// Read .tfstate objects from an S3 bucket.
    #[value(name = "aws-s3")]
    AwsS3,
}

/// Router-mode flags.
#[derive(Debug, Clone, Args)]
pub struct RouterArgs {
    /// Interval between backend health checks; disabled when unset.
    #[arg(
        long,
        env = "CRUISER_HEALTH_CHECK_INTERVAL",
        value_parser = humantime::parse_duration
    )]
    pub health_check_interval: Option<Duration>,
}

/// xDS-mode flags.
#[derive(Debug, Clone, Args)]
pub struct XdsArgs {
    /// Cloud Map namespaces feeding the endpoint overlay.
    #[arg(
        long = "aws-service-discovery-namespaces",
        env = "CRUISER_AWS_SERVICE_DISCOVERY_NAMESPACES",
        value_delimiter = ','
    )]
    pub aws_service_discovery_namespaces: Vec<String>,

    /// Cloud Map tag key carrying the service port.
    #[arg(
        long = "aws-service-port-tag-key",
        env = "CRUISER_AWS_SERVICE_PORT_TAG_KEY",
        default_value = "port"
    )]
    pub aws_service_port_tag_key: String,
}
