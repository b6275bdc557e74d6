// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client certificate loading and TLS configuration.
//!
//! The orchestrator authenticates workers by client certificate, and the worker
//! authenticates the orchestrator by its server certificate chain. Chain
//! verification is always on: there is no switch to skip it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tracing::debug;

/// ALPN protocol identifier advertised by pulse workers.
pub const ALPN_PULSE: &[u8] = b"pulse/1";

/// Errors raised while loading certificate material or building a TLS config.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {kind} file {path}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// A client certificate chain plus its private key.
#[derive(Debug)]
pub struct ClientIdentity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Load a PEM certificate chain and PEM private key from disk.
pub fn load_client_identity(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<ClientIdentity, TlsError> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();

    let cert_chain = load_certificates(cert_path, "certificate")?;

    let mut reader = open(key_path, "private key")?;
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            kind: "private key",
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

    debug!(
        cert = %cert_path.display(),
        chain_len = cert_chain.len(),
        "Loaded client identity"
    );

    Ok(ClientIdentity { cert_chain, key })
}

/// Load extra trust anchors (PEM) for orchestrators signed by a private CA.
pub fn load_trust_anchors(
    path: impl AsRef<Path>,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    load_certificates(path.as_ref(), "CA certificate")
}

/// Build a rustls client config presenting `identity` and verifying the
/// server against the webpki roots plus `extra_roots`.
pub fn build_client_tls(
    identity: ClientIdentity,
    extra_roots: Vec<CertificateDer<'static>>,
) -> Result<rustls::ClientConfig, TlsError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for cert in extra_roots {
        roots.add(cert)?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_root_certificates(roots)
        .with_client_auth_cert(identity.cert_chain, identity.key)?;
    config.alpn_protocols = vec![ALPN_PULSE.to_vec()];

    Ok(config)
}

fn load_certificates(
    path: &Path,
    kind: &'static str,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path, kind)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            kind,
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

fn open(path: &Path, kind: &'static str) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            kind,
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_certificate_file() {
        let err = load_client_identity("/nonexistent/client.pem", "/nonexistent/client.key")
            .unwrap_err();
        match err {
            TlsError::Read { kind, path, .. } => {
                assert_eq!(kind, "certificate");
                assert_eq!(path, PathBuf::from("/nonexistent/client.pem"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_error_display_names_the_file() {
        let err = load_trust_anchors("/nonexistent/ca.pem").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("CA certificate"));
        assert!(msg.contains("/nonexistent/ca.pem"));
    }
}
