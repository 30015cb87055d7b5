//! TLS material loading for the listener.

use std::path::PathBuf;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::ServerError;

/// Paths to the listener's TLS material.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub certificate_path: PathBuf,
    /// PEM private key.
    pub private_key_path: PathBuf,
}

impl TlsConfig {
    /// Create a config from certificate and key paths.
    pub fn new(certificate_path: impl Into<PathBuf>, private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            private_key_path: private_key_path.into(),
        }
    }

    /// Load the material into a rustls server config with `h2` ALPN.
    pub fn load_server_config(&self) -> Result<Arc<rustls::ServerConfig>, ServerError> {
        let certificates = self.load_certificates()?;
        let private_key = self.load_private_key()?;

        let mut config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certificates, private_key)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Arc::new(config))
    }

    fn load_certificates(&self) -> Result<Vec<CertificateDer<'static>>, ServerError> {
        let pem = std::fs::read(&self.certificate_path).map_err(|source| ServerError::TlsIo {
            path: self.certificate_path.clone(),
            source,
        })?;
        let certificates = rustls_pemfile::certs(&mut pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ServerError::TlsIo {
                path: self.certificate_path.clone(),
                source,
            })?;
        if certificates.is_empty() {
            return Err(ServerError::NoCertificate {
                path: self.certificate_path.clone(),
            });
        }
        Ok(certificates)
    }

    fn load_private_key(&self) -> Result<PrivateKeyDer<'static>, ServerError> {
        let pem = std::fs::read(&self.private_key_path).map_err(|source| ServerError::TlsIo {
            path: self.private_key_path.clone(),
            source,
        })?;
        rustls_pemfile::private_key(&mut pem.as_slice())
            .map_err(|source| ServerError::TlsIo {
                path: self.private_key_path.clone(),
                source,
            })?
            .ok_or_else(|| ServerError::NoPrivateKey {
                path: self.private_key_path.clone(),
            })
    }
}
