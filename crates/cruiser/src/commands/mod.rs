//! Shared wiring for the runtime modes.

pub mod router;
pub mod xds;

use std::sync::Arc;

use anyhow::Context;
use cruiser_aws::{AwsProvider, S3Bucket, S3TfstateSource};
use cruiser_server::{ListenerProtocol, TlsConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::args::{GlobalArgs, TfstateSourceSelector};

/// Root cancellation token, cancelled on SIGINT/SIGTERM.
pub(crate) fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();

    tokio::spawn(async move {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
        info!("shutdown signal received");
        signal_token.cancel();
    });

    token
}

/// The wire protocol the listener speaks, per the TLS flag.
pub(crate) fn listener_protocol(global: &GlobalArgs) -> ListenerProtocol {
    if global.enable_tls {
        ListenerProtocol::Http2
    } else {
        ListenerProtocol::H2c
    }
}

/// Load TLS material when TLS is enabled.
pub(crate) fn tls_server_config(
    global: &GlobalArgs,
) -> anyhow::Result<Option<Arc<rustls::ServerConfig>>> {
    if !global.enable_tls {
        return Ok(None);
    }
    let (Some(certificate), Some(private_key)) =
        (&global.tls_certificate, &global.tls_private_key)
    else {
        anyhow::bail!("tls enabled but --tls-certificate / --tls-private-key not provided");
    };
    let config = TlsConfig::new(certificate, private_key)
        .load_server_config()
        .context("load tls material")?;
    Ok(Some(config))
}

/// Build the configured tfstate source.
pub(crate) async fn tfstate_source(
    global: &GlobalArgs,
    provider: &AwsProvider,
) -> anyhow::Result<S3TfstateSource<S3Bucket>> {
    match global.tfstate_source {
        None => anyhow::bail!("no tfstate source selected, pass --tfstate-source"),
        Some(TfstateSourceSelector::AwsS3) => {
            let bucket = global
                .aws_tfstate_bucket
                .as_deref()
                .filter(|bucket| !bucket.is_empty())
                .context("empty aws tfstate bucket")?;

            let client = match &global.aws_tfstate_role_arn {
                Some(role_arn) => provider.s3_client_with_role(role_arn).await,
                None => provider.s3_client(),
            };
            Ok(S3TfstateSource::new(S3Bucket::new(client, bucket)))
        }
    }
}
