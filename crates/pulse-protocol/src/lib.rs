// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pulse Protocol - QUIC + mutual TLS + Protobuf communication layer
//!
//! This crate provides the client side of the wire protocol between a pulse
//! worker process and the orchestration service that schedules its work.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RPC: RpcRequest / RpcResponse, one call per bidi stream    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Framing: u32 length + u16 kind + protobuf body (prost)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TLS 1.3, client certificate, ALPN pulse/1 (rustls)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  QUIC (quinn)                                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pulse_protocol::{PulseClient, PulseClientConfig, tls, worker_proto};
//!
//! let identity = tls::load_client_identity("client.pem", "client.key")?;
//! let tls_config = tls::build_client_tls(identity, Vec::new())?;
//!
//! let client = PulseClient::new(
//!     PulseClientConfig::for_host("acme.tmprl.cloud", 7233),
//!     tls_config,
//! )?;
//! client.connect().await?;
//!
//! let request = worker_proto::RpcRequest {
//!     request: Some(worker_proto::rpc_request::Request::Heartbeat(
//!         worker_proto::HeartbeatRequest { run_id: "run-1".to_string() },
//!     )),
//! };
//! let response: worker_proto::RpcResponse = client.request(&request).await?;
//! ```

pub mod client;
pub mod frame;
pub mod tls;
pub mod worker_proto;

// Re-export main types
pub use client::{ClientError, PulseClient, PulseClientConfig};
pub use frame::{Frame, FrameError, FrameHeader, FrameKind};
pub use tls::{ClientIdentity, TlsError};
