//! TLS configuration and certificate loading.

use std::io::BufReader;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

/// Protocol versions offered to clients. TLS 1.2 is the floor.
static PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

/// Error type for TLS material.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("no certificate found in PEM input")]
    NoCertificate,

    #[error("no private key found in PEM input")]
    NoPrivateKey,

    #[error("failed to read PEM input: {0}")]
    Pem(#[from] std::io::Error),

    #[error("certificate and key rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Parsed server certificate chain and key.
pub struct TlsMaterial {
    config: Arc<rustls::ServerConfig>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial").finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// Parse a PEM certificate chain and private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut BufReader::new(cert_pem)).collect::<Result<_, _>>()?;
        if certs.is_empty() {
            return Err(TlsError::NoCertificate);
        }

        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(key_pem))?
            .ok_or(TlsError::NoPrivateKey)?;

        let mut config = rustls::ServerConfig::builder_with_protocol_versions(PROTOCOL_VERSIONS)
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Load PEM files from disk.
    pub fn from_pem_files(
        cert_path: &std::path::Path,
        key_path: &std::path::Path,
    ) -> Result<Self, TlsError> {
        let cert = std::fs::read(cert_path)?;
        let key = std::fs::read(key_path)?;
        Self::from_pem(&cert, &key)
    }

    pub fn rustls_config(&self) -> RustlsConfig {
        RustlsConfig::from_config(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_material_rejected() {
        let err = TlsMaterial::from_pem(b"", b"").unwrap_err();
        assert!(matches!(err, TlsError::NoCertificate));
    }

    #[test]
    fn test_garbage_material_rejected() {
        assert!(TlsMaterial::from_pem(b"not a pem", b"still not a pem").is_err());
    }

    #[test]
    fn test_missing_key_rejected() {
        let cert = b"-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----\n";
        let err = TlsMaterial::from_pem(cert, b"").unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey));
    }
}
