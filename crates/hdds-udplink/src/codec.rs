// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message codec collaborator.
//!
//! The link never looks at message bytes. It hands each outbound message to
//! [`MessageCodec::encode`] together with a reusable transmit buffer, and each
//! received datagram to [`MessageCodec::decode`]. Outbound and inbound
//! message types are distinct associated types so a received message can
//! never be fed back into `send()` by accident.
//!
//! Two reference codecs ship with the crate:
//!
//! - [`FramedCodec`]: 4-byte header (magic + length) followed by the payload
//! - [`RawCodec`]: the datagram is the message
//!
//! ```text
//! FramedCodec wire format
//! +-------------+--------------+------------------+
//! | magic (2B)  | length (2B)  | payload          |
//! | 0x4855 BE   | BE           | `length` bytes   |
//! +-------------+--------------+------------------+
//! ```

use std::fmt;

/// Codec failure kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Output buffer cannot hold the encoded message.
    BufferTooSmall { needed: usize, available: usize },
    /// Input ended before the message did.
    Truncated { needed: usize, available: usize },
    /// Frame does not start with the expected magic.
    BadMagic(u16),
    /// Payload length does not fit the length field.
    PayloadTooLarge(usize),
    /// Any other codec-specific rejection.
    Malformed(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small: need {} bytes, have {}", needed, available)
            }
            Self::Truncated { needed, available } => {
                write!(f, "truncated input: need {} bytes, have {}", needed, available)
            }
            Self::BadMagic(m) => write!(f, "bad frame magic: 0x{:04x}", m),
            Self::PayloadTooLarge(n) => write!(f, "payload too large: {} bytes", n),
            Self::Malformed(msg) => write!(f, "malformed message: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Encode/decode capability used by the link workers.
///
/// Implementations must be stateless or internally synchronized: the send
/// and receive workers call into the same codec instance concurrently.
pub trait MessageCodec: Send + Sync + 'static {
    /// Message type produced by the application.
    type Outbound: Send + 'static;
    /// Message type delivered to the application.
    type Inbound: Send + 'static;

    /// Encode `msg` into `buf`. Returns the number of bytes written.
    fn encode(&self, msg: &Self::Outbound, buf: &mut [u8]) -> Result<usize, CodecError>;

    /// Decode one message from `buf`. Returns the message and the number of
    /// bytes consumed.
    fn decode(&self, buf: &[u8]) -> Result<(Self::Inbound, usize), CodecError>;
}

// ---------------------------------------------------------------------------
// Framed codec
// ---------------------------------------------------------------------------

/// Frame magic ("HU").
pub const FRAME_MAGIC: u16 = 0x4855;

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Application payload destined for the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame(pub Vec<u8>);

/// Payload received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame(pub Vec<u8>);

impl OutboundFrame {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self(payload.into())
    }
}

impl InboundFrame {
    pub fn payload(&self) -> &[u8] {
        &self.0
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.0
    }
}

/// Length-prefixed codec with a magic guard.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedCodec;

impl MessageCodec for FramedCodec {
    type Outbound = OutboundFrame;
    type Inbound = InboundFrame;

    fn encode(&self, msg: &OutboundFrame, buf: &mut [u8]) -> Result<usize, CodecError> {
        let len = msg.0.len();
        let len16 = u16::try_from(len).map_err(|_| CodecError::PayloadTooLarge(len))?;
        let total = FRAME_HEADER_SIZE + len;
        if buf.len() < total {
            return Err(CodecError::BufferTooSmall {
                needed: total,
                available: buf.len(),
            });
        }
        buf[0..2].copy_from_slice(&FRAME_MAGIC.to_be_bytes());
        buf[2..4].copy_from_slice(&len16.to_be_bytes());
        buf[FRAME_HEADER_SIZE..total].copy_from_slice(&msg.0);
        Ok(total)
    }

    fn decode(&self, buf: &[u8]) -> Result<(InboundFrame, usize), CodecError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(CodecError::Truncated {
                needed: FRAME_HEADER_SIZE,
                available: buf.len(),
            });
        }
        let magic = u16::from_be_bytes([buf[0], buf[1]]);
        if magic != FRAME_MAGIC {
            return Err(CodecError::BadMagic(magic));
        }
        let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        let total = FRAME_HEADER_SIZE + len;
        if buf.len() < total {
            return Err(CodecError::Truncated {
                needed: total,
                available: buf.len(),
            });
        }
        Ok((InboundFrame(buf[FRAME_HEADER_SIZE..total].to_vec()), total))
    }
}

// ---------------------------------------------------------------------------
// Raw codec
// ---------------------------------------------------------------------------

/// Datagram to transmit as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDatagram(pub Vec<u8>);

/// Datagram received as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram(pub Vec<u8>);

/// Passthrough codec: one datagram is one message.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl MessageCodec for RawCodec {
    type Outbound = OutboundDatagram;
    type Inbound = InboundDatagram;

    fn encode(&self, msg: &OutboundDatagram, buf: &mut [u8]) -> Result<usize, CodecError> {
        let len = msg.0.len();
        if buf.len() < len {
            return Err(CodecError::BufferTooSmall {
                needed: len,
                available: buf.len(),
            });
        }
        buf[..len].copy_from_slice(&msg.0);
        Ok(len)
    }

    fn decode(&self, buf: &[u8]) -> Result<(InboundDatagram, usize), CodecError> {
        Ok((InboundDatagram(buf.to_vec()), buf.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framed_encode_layout() {
        let mut buf = [0u8; 16];
        let n = FramedCodec
            .encode(&OutboundFrame::new(b"ping".to_vec()), &mut buf)
            .unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf[..8], &[0x48, 0x55, 0x00, 0x04, b'p', b'i', b'n', b'g']);
    }

    #[test]
    fn test_framed_decode_reports_consumed() {
        // Frame followed by trailing garbage; only the frame is consumed.
        let wire = [0x48, 0x55, 0x00, 0x02, 0xAA, 0xBB, 0xFF, 0xFF];
        let (frame, used) = FramedCodec.decode(&wire).unwrap();
        assert_eq!(frame.payload(), &[0xAA, 0xBB]);
        assert_eq!(used, 6);
    }

    #[test]
    fn test_framed_encode_buffer_too_small() {
        let mut buf = [0u8; 5];
        let err = FramedCodec
            .encode(&OutboundFrame::new(vec![1, 2, 3]), &mut buf)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferTooSmall {
                needed: 7,
                available: 5
            }
        );
    }

    #[test]
    fn test_framed_encode_payload_too_large() {
        let mut buf = vec![0u8; 70_000];
        let err = FramedCodec
            .encode(&OutboundFrame::new(vec![0u8; 65_536]), &mut buf)
            .unwrap_err();
        assert_eq!(err, CodecError::PayloadTooLarge(65_536));
    }

    #[test]
    fn test_framed_decode_rejects_bad_input() {
        assert!(matches!(
            FramedCodec.decode(&[0x48]),
            Err(CodecError::Truncated { needed: 4, available: 1 })
        ));
        assert_eq!(
            FramedCodec.decode(&[0xDE, 0xAD, 0x00, 0x00]).unwrap_err(),
            CodecError::BadMagic(0xDEAD)
        );
        assert!(matches!(
            FramedCodec.decode(&[0x48, 0x55, 0x00, 0x09, 1, 2]),
            Err(CodecError::Truncated { needed: 13, available: 6 })
        ));
    }

    #[test]
    fn test_raw_codec() {
        let mut buf = [0u8; 4];
        assert_eq!(
            RawCodec
                .encode(&OutboundDatagram(vec![9, 8, 7]), &mut buf)
                .unwrap(),
            3
        );
        assert!(RawCodec
            .encode(&OutboundDatagram(vec![0; 5]), &mut buf)
            .is_err());

        let (dgram, used) = RawCodec.decode(&[1, 2]).unwrap();
        assert_eq!(dgram, InboundDatagram(vec![1, 2]));
        assert_eq!(used, 2);
    }
}
