// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Certificate loading and client construction tests for pulse-protocol.

use std::io::Write;
use std::time::Duration;

use pulse_protocol::tls::{self, TlsError};
use pulse_protocol::{PulseClient, PulseClientConfig};
use tempfile::NamedTempFile;

struct Fixture {
    cert: NamedTempFile,
    key: NamedTempFile,
}

fn self_signed(host: &str) -> Fixture {
    let certified = rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();

    let mut cert = NamedTempFile::new().unwrap();
    cert.write_all(certified.cert.pem().as_bytes()).unwrap();

    let mut key = NamedTempFile::new().unwrap();
    key.write_all(certified.key_pair.serialize_pem().as_bytes())
        .unwrap();

    Fixture { cert, key }
}

#[test]
fn test_load_client_identity_from_pem_files() {
    let fixture = self_signed("worker.local");

    let identity = tls::load_client_identity(fixture.cert.path(), fixture.key.path()).unwrap();
    assert_eq!(identity.cert_chain.len(), 1);
}

#[test]
fn test_missing_key_file_is_reported() {
    let fixture = self_signed("worker.local");

    let err = tls::load_client_identity(fixture.cert.path(), "/does/not/exist.key").unwrap_err();
    assert!(matches!(err, TlsError::Read { kind: "private key", .. }));
}

#[test]
fn test_certificate_file_without_pem_blocks() {
    let fixture = self_signed("worker.local");
    let mut garbage = NamedTempFile::new().unwrap();
    garbage.write_all(b"not a certificate").unwrap();

    let err = tls::load_client_identity(garbage.path(), fixture.key.path()).unwrap_err();
    assert!(matches!(err, TlsError::NoCertificate(_)));
}

#[test]
fn test_key_file_without_pem_blocks() {
    let fixture = self_signed("worker.local");
    let mut garbage = NamedTempFile::new().unwrap();
    garbage.write_all(b"not a key").unwrap();

    let err = tls::load_client_identity(fixture.cert.path(), garbage.path()).unwrap_err();
    assert!(matches!(err, TlsError::NoPrivateKey(_)));
}

#[test]
fn test_build_client_tls_advertises_alpn() {
    let fixture = self_signed("worker.local");
    let identity = tls::load_client_identity(fixture.cert.path(), fixture.key.path()).unwrap();

    let config = tls::build_client_tls(identity, Vec::new()).unwrap();
    assert_eq!(config.alpn_protocols, vec![tls::ALPN_PULSE.to_vec()]);
}

#[test]
fn test_extra_trust_anchor_is_accepted() {
    let fixture = self_signed("worker.local");
    let ca = self_signed("orchestrator.local");

    let identity = tls::load_client_identity(fixture.cert.path(), fixture.key.path()).unwrap();
    let roots = tls::load_trust_anchors(ca.cert.path()).unwrap();

    assert!(tls::build_client_tls(identity, roots).is_ok());
}

#[tokio::test]
async fn test_client_creation_and_initial_state() {
    let fixture = self_signed("worker.local");
    let identity = tls::load_client_identity(fixture.cert.path(), fixture.key.path()).unwrap();
    let tls_config = tls::build_client_tls(identity, Vec::new()).unwrap();

    let client = PulseClient::new(PulseClientConfig::for_host("localhost", 59_991), tls_config)
        .expect("client should build");
    assert!(!client.is_connected().await);

    // Closing without a connection should be safe
    client.close().await;
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_connect_times_out_without_server() {
    let fixture = self_signed("worker.local");
    let identity = tls::load_client_identity(fixture.cert.path(), fixture.key.path()).unwrap();
    let tls_config = tls::build_client_tls(identity, Vec::new()).unwrap();

    let config = PulseClientConfig {
        connect_timeout: Duration::from_millis(100),
        ..PulseClientConfig::for_host("127.0.0.1", 59_992)
    };
    let client = PulseClient::new(config, tls_config).unwrap();

    assert!(client.connect().await.is_err());
}
