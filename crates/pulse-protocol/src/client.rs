// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QUIC client used by a worker to reach its orchestrator.
//!
//! One connection is kept per client and re-established lazily when it drops.
//! Every call opens a fresh bidirectional stream carrying one request frame and
//! one response frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{Connection, Endpoint, IdleTimeout, TransportConfig};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::frame::{Frame, FrameError, FrameKind, read_frame, write_frame};
use crate::worker_proto::RpcError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot open local QUIC endpoint: {0}")]
    Endpoint(#[source] std::io::Error),

    #[error("invalid transport settings: {0}")]
    Transport(String),

    #[error("cannot resolve {target}: {reason}")]
    Resolve { target: String, reason: String },

    #[error("connect error: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("no connection to {0} within {1:?}")]
    ConnectTimeout(String, Duration),

    #[error("no response within {0:?}")]
    RequestTimeout(Duration),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("server error: {code} - {message}")]
    Server { code: String, message: String },
}

impl From<quinn::WriteError> for ClientError {
    fn from(e: quinn::WriteError) -> Self {
        ClientError::Stream(e.to_string())
    }
}

impl From<quinn::ClosedStream> for ClientError {
    fn from(e: quinn::ClosedStream) -> Self {
        ClientError::Stream(e.to_string())
    }
}

/// Where and how to reach the orchestrator.
#[derive(Debug, Clone)]
pub struct PulseClientConfig {
    pub host: String,
    pub port: u16,
    /// Name the server certificate must be valid for
    pub server_name: String,
    /// `None` disables keep-alive pings
    pub keep_alive: Option<Duration>,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Bound on a whole request, long polls included
    pub request_timeout: Duration,
}

impl PulseClientConfig {
    /// Target `host:port` and verify the server certificate against `host`.
    pub fn for_host(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            server_name: host.clone(),
            host,
            port,
            keep_alive: Some(Duration::from_secs(10)),
            idle_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(90),
        }
    }

    /// `host:port` as dialed.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn quic_config(&self, tls: rustls::ClientConfig) -> Result<quinn::ClientConfig, ClientError> {
        let mut transport = TransportConfig::default();
        transport.keep_alive_interval(self.keep_alive);
        let idle = IdleTimeout::try_from(self.idle_timeout)
            .map_err(|e| ClientError::Transport(format!("idle timeout: {e}")))?;
        transport.max_idle_timeout(Some(idle));

        let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let mut quic = quinn::ClientConfig::new(Arc::new(crypto));
        quic.transport_config(Arc::new(transport));
        Ok(quic)
    }
}

pub struct PulseClient {
    endpoint: Endpoint,
    config: PulseClientConfig,
    connection: Mutex<Option<Connection>>,
}

impl PulseClient {
    /// Bind a client endpoint. Does not dial; see [`PulseClient::connect`].
    pub fn new(config: PulseClientConfig, tls: rustls::ClientConfig) -> Result<Self, ClientError> {
        let mut endpoint =
            Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0))).map_err(ClientError::Endpoint)?;
        endpoint.set_default_client_config(config.quic_config(tls)?);
        Ok(Self {
            endpoint,
            config,
            connection: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PulseClientConfig {
        &self.config
    }

    /// Make sure a live connection exists.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.live_connection().await.map(drop)
    }

    #[instrument(skip(self), fields(target = %self.config.target()))]
    async fn live_connection(&self) -> Result<Connection, ClientError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            match conn.close_reason() {
                None => return Ok(conn.clone()),
                Some(reason) => warn!(%reason, "Connection lost, reconnecting"),
            }
        }

        let addr = resolve(self.config.target()).await?;
        debug!(%addr, "Dialing orchestrator");
        let connecting = self.endpoint.connect(addr, &self.config.server_name)?;
        let conn = tokio::time::timeout(self.config.connect_timeout, connecting)
            .await
            .map_err(|_| {
                ClientError::ConnectTimeout(self.config.target(), self.config.connect_timeout)
            })??;

        info!(%addr, "Connected to orchestrator");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Send `request` on a new stream and decode the reply as `Resp`.
    ///
    /// An error frame from the server surfaces as [`ClientError::Server`].
    pub async fn request<Req, Resp>(&self, request: &Req) -> Result<Resp, ClientError>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let conn = self.live_connection().await?;
        let call = async {
            let (mut send, mut recv) = conn.open_bi().await?;
            write_frame(&mut send, &Frame::encode(FrameKind::Request, request)?).await?;
            send.finish()?;

            let reply = read_frame(&mut recv).await?;
            if reply.kind == FrameKind::Error {
                let RpcError { code, message } = reply.message()?;
                return Err(ClientError::Server { code, message });
            }
            Ok::<Resp, ClientError>(reply.message()?)
        };

        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| ClientError::RequestTimeout(self.config.request_timeout))?
    }

    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| conn.close_reason().is_none())
    }

    /// Close the connection and wait for the endpoint to go idle.
    pub async fn close(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.close(0u32.into(), b"worker shutting down");
        }
        self.endpoint.wait_idle().await;
    }
}

/// First address `target` resolves to.
async fn resolve(target: String) -> Result<SocketAddr, ClientError> {
    let first = match tokio::net::lookup_host(target.clone()).await {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            return Err(ClientError::Resolve {
                target,
                reason: e.to_string(),
            });
        }
    };
    first.ok_or_else(|| ClientError::Resolve {
        target,
        reason: "no addresses".to_string(),
    })
}

impl Drop for PulseClient {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.get_mut().take() {
            conn.close(0u32.into(), b"client dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_host_verifies_against_host() {
        let config = PulseClientConfig::for_host("acme.tmprl.cloud", 7233);
        assert_eq!(config.server_name, "acme.tmprl.cloud");
        assert_eq!(config.target(), "acme.tmprl.cloud:7233");
        assert_eq!(config.keep_alive, Some(Duration::from_secs(10)));
        assert!(config.request_timeout > config.connect_timeout);
    }

    #[test]
    fn test_server_error_display_keeps_code_and_message() {
        let err = ClientError::Server {
            code: "NOT_FOUND".to_string(),
            message: "unknown run".to_string(),
        };
        assert_eq!(err.to_string(), "server error: NOT_FOUND - unknown run");
    }

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let addr = resolve("127.0.0.1:7233".to_string()).await.unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 7233)));
    }

    #[tokio::test]
    async fn test_resolve_without_port_names_the_target() {
        match resolve("orchestrator-without-port".to_string()).await {
            Err(ClientError::Resolve { target, .. }) => {
                assert_eq!(target, "orchestrator-without-port");
            }
            other => panic!("expected a resolve error, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_display() {
        let err = ClientError::ConnectTimeout("h:1".to_string(), Duration::from_millis(100));
        assert_eq!(err.to_string(), "no connection to h:1 within 100ms");
    }
}
