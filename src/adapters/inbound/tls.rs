//! TLS acceptor setup
//!
//! Certificates come from PEM files or are generated self-signed for
//! testing. Certificate provisioning beyond that is left to the operator.

use crate::error::{GatewayError, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// TLS acceptor shared by every HTTPS listener.
#[derive(Clone)]
pub struct TlsConfig {
    pub acceptor: TlsAcceptor,
}

impl TlsConfig {
    /// Load TLS config from certificate and key files.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let open = |path: &Path| {
            File::open(path)
                .map_err(|e| GatewayError::Tls(format!("cannot open {}: {}", path.display(), e)))
        };

        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut BufReader::new(open(cert_path)?))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| GatewayError::Tls(format!("invalid certificate: {}", e)))?;
        if certs.is_empty() {
            return Err(GatewayError::Tls(format!(
                "no certificate found in {}",
                cert_path.display()
            )));
        }

        let key = rustls_pemfile::private_key(&mut BufReader::new(open(key_path)?))
            .map_err(|e| GatewayError::Tls(format!("invalid private key: {}", e)))?
            .ok_or_else(|| {
                GatewayError::Tls(format!("no private key found in {}", key_path.display()))
            })?;

        Self::from_certs_and_key(certs, key)
    }

    pub fn from_certs_and_key(
        certs: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self> {
        let mut config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| GatewayError::Tls(e.to_string()))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// Generate a self-signed certificate for testing.
    pub fn self_signed(domain: &str) -> Result<Self> {
        let subject_alt_names = vec![
            domain.to_string(),
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ];

        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(subject_alt_names)
                .map_err(|e| GatewayError::Tls(format!("certificate generation failed: {}", e)))?;
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        Self::from_certs_and_key(vec![cert.der().clone()], key_der)
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig").finish_non_exhaustive()
    }
}
