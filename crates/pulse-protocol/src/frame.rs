// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stream framing.
//!
//! Every RPC uses its own bidirectional QUIC stream and sends exactly one frame
//! each way. A frame is a fixed 6-byte header followed by a protobuf body:
//!
//! ```text
//! +----------------+-------------+---------------------+
//! | body len (u32) | kind (u16)  | body (len bytes)    |
//! +----------------+-------------+---------------------+
//! ```
//!
//! Both integers are big-endian.

use bytes::Bytes;
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a frame body. Larger frames are refused in both directions.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

pub const HEADER_LEN: usize = 6;

/// What a frame body holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Response,
    /// Body is an `RpcError`
    Error,
}

impl FrameKind {
    fn code(self) -> u16 {
        match self {
            FrameKind::Request => 1,
            FrameKind::Response => 2,
            FrameKind::Error => 3,
        }
    }

    fn from_code(code: u16) -> Result<Self, FrameError> {
        match code {
            1 => Ok(FrameKind::Request),
            2 => Ok(FrameKind::Response),
            3 => Ok(FrameKind::Error),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame body of {0} bytes exceeds the {MAX_BODY_LEN} byte limit")]
    TooLarge(usize),

    #[error("unknown frame kind {0}")]
    UnknownKind(u16),

    #[error("stream closed before a frame arrived")]
    Closed,

    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame body: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub body_len: usize,
    pub kind: FrameKind,
}

impl FrameHeader {
    pub fn parse(raw: [u8; HEADER_LEN]) -> Result<Self, FrameError> {
        let [a, b, c, d, e, f] = raw;
        let body_len = u32::from_be_bytes([a, b, c, d]) as usize;
        if body_len > MAX_BODY_LEN {
            return Err(FrameError::TooLarge(body_len));
        }
        Ok(Self {
            body_len,
            kind: FrameKind::from_code(u16::from_be_bytes([e, f]))?,
        })
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut raw = [0u8; HEADER_LEN];
        raw[..4].copy_from_slice(&(self.body_len as u32).to_be_bytes());
        raw[4..].copy_from_slice(&self.kind.code().to_be_bytes());
        raw
    }
}

/// One frame: a kind plus its still-encoded protobuf body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub body: Bytes,
}

impl Frame {
    /// Encode `message` as the body of a frame of `kind`.
    pub fn encode<M: Message>(kind: FrameKind, message: &M) -> Result<Self, FrameError> {
        let body = message.encode_to_vec();
        if body.len() > MAX_BODY_LEN {
            return Err(FrameError::TooLarge(body.len()));
        }
        Ok(Self {
            kind,
            body: body.into(),
        })
    }

    /// Decode the body as `M`.
    pub fn message<M: Message + Default>(&self) -> Result<M, FrameError> {
        Ok(M::decode(self.body.clone())?)
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            body_len: self.body.len(),
            kind: self.kind,
        }
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.header().to_bytes()).await?;
    writer.write_all(&frame.body).await?;
    Ok(())
}

/// Read one frame. A stream that ends before the header is [`FrameError::Closed`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut raw).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
            _ => e.into(),
        });
    }
    let header = FrameHeader::parse(raw)?;

    let mut body = vec![0u8; header.body_len];
    reader.read_exact(&mut body).await?;
    Ok(Frame {
        kind: header.kind,
        body: body.into(),
    })
}
