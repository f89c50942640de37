//! TLS configuration
//!
//! Builds the rustls acceptor used for AUTH TLS and protected data channels.

use std::path::Path;
use std::sync::Arc;

use log::info;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use tokio_rustls::TlsAcceptor;

use crate::error::TlsError;

/// Loads a PEM certificate chain and private key into a `TlsAcceptor`.
pub fn load_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_pem = std::fs::read(cert_file).map_err(|e| {
        TlsError::CertificateLoad(format!("{}: {e}", cert_file.display()))
    })?;
    let key_pem = std::fs::read(key_file)
        .map_err(|e| TlsError::PrivateKeyLoad(format!("{}: {e}", key_file.display())))?;

    let acceptor = acceptor_from_pem(&cert_pem, &key_pem)?;
    info!("TLS enabled with certificate {}", cert_file.display());
    Ok(acceptor)
}

/// Builds an acceptor from in-memory PEM data.
pub fn acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor, TlsError> {
    let cert_chain = parse_certificates(cert_pem)?;
    let key = parse_private_key(key_pem)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Config(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| TlsError::Config(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut cursor = std::io::Cursor::new(pem);
    let chain = certs(&mut cursor)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertificateLoad(e.to_string()))?;
    if chain.is_empty() {
        return Err(TlsError::CertificateLoad("no certificate found".into()));
    }
    Ok(chain)
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut cursor = std::io::Cursor::new(pem);
    private_key(&mut cursor)
        .map_err(|e| TlsError::PrivateKeyLoad(e.to_string()))?
        .ok_or_else(|| TlsError::PrivateKeyLoad("no private key found".into()))
}
