//! # Frames - Wire Representation of Machine Traffic
//!
//! Two frame kinds travel over a link:
//!
//! - **Hello**: first frame sent by the initiating side of a link, naming the
//!   initiator so the accepting side can bind the stream to a peer.
//! - **Clock**: a Lamport [`Message`], the sender id plus the logical clock
//!   value stamped at send time.
//!
//! Encoding produces the length prefix and body in one buffer so a writer can
//! issue a single `write_all`. Decoding works on the body only; the reader is
//! responsible for the length prefix (see [`check_frame_len`]).

use crate::constants::{
    CLOCK_PAYLOAD_SIZE, FRAME_MAGIC, HEADER_SIZE, HELLO_PAYLOAD_SIZE, LENGTH_PREFIX_SIZE,
    MAX_FRAME_LEN, PROTOCOL_VERSION,
};
use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one machine in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(u32);

impl ActorId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ActorId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActorId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Self)
    }
}

/// A Lamport message: who sent it and the sender's clock at send time.
///
/// Immutable once built; the transport carries it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message {
    sender: ActorId,
    clock: u64,
}

impl Message {
    pub const fn new(sender: ActorId, clock: u64) -> Self {
        Self { sender, clock }
    }

    pub const fn sender(&self) -> ActorId {
        self.sender
    }

    pub const fn clock(&self) -> u64 {
        self.clock
    }
}

/// Frame kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameKind {
    Hello = 1,
    Clock = 2,
}

impl FrameKind {
    /// Exact payload size required for this kind
    pub const fn payload_size(self) -> usize {
        match self {
            FrameKind::Hello => HELLO_PAYLOAD_SIZE,
            FrameKind::Clock => CLOCK_PAYLOAD_SIZE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FrameKind::Hello => "Hello",
            FrameKind::Clock => "Clock",
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Hello { actor_id: ActorId },
    Clock(Message),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Hello { .. } => FrameKind::Hello,
            Frame::Clock(_) => FrameKind::Clock,
        }
    }

    /// Total encoded size including the length prefix
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_SIZE + HEADER_SIZE + self.kind().payload_size()
    }

    /// Encode into a fresh buffer: length prefix followed by the body
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the length-prefixed frame to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let mut payload = [0u8; CLOCK_PAYLOAD_SIZE];
        let payload_len = {
            let mut cursor = &mut payload[..];
            match self {
                Frame::Hello { actor_id } => cursor.put_u32(actor_id.get()),
                Frame::Clock(message) => {
                    cursor.put_u32(message.sender().get());
                    cursor.put_u64(message.clock());
                }
            }
            self.kind().payload_size()
        };
        let payload = &payload[..payload_len];

        buf.reserve(self.encoded_len());
        buf.put_u32((HEADER_SIZE + payload_len) as u32);
        buf.put_u16(FRAME_MAGIC);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.kind().into());
        buf.put_u32(crc32fast::hash(payload));
        buf.put_slice(payload);
    }

    /// Decode a frame body (everything after the length prefix)
    pub fn decode(body: &[u8]) -> ProtocolResult<Self> {
        if body.len() < HEADER_SIZE {
            return Err(ProtocolError::message_too_small(
                HEADER_SIZE,
                body.len(),
                "frame header",
            ));
        }

        let (mut header, mut payload) = body.split_at(HEADER_SIZE);

        let magic = header.get_u16();
        if magic != FRAME_MAGIC {
            return Err(ProtocolError::invalid_magic(FRAME_MAGIC, magic));
        }

        let version = header.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                version,
                supported: PROTOCOL_VERSION,
            });
        }

        let kind_byte = header.get_u8();
        let kind = FrameKind::try_from(kind_byte)
            .map_err(|_| ProtocolError::UnknownFrameKind { kind: kind_byte })?;

        if payload.len() != kind.payload_size() {
            return Err(ProtocolError::PayloadSizeMismatch {
                kind: kind.name(),
                expected: kind.payload_size(),
                got: payload.len(),
            });
        }

        let expected = header.get_u32();
        let calculated = crc32fast::hash(payload);
        if expected != calculated {
            return Err(ProtocolError::checksum_mismatch(expected, calculated));
        }

        let frame = match kind {
            FrameKind::Hello => Frame::Hello {
                actor_id: ActorId::new(payload.get_u32()),
            },
            FrameKind::Clock => {
                let sender = ActorId::new(payload.get_u32());
                let clock = payload.get_u64();
                Frame::Clock(Message::new(sender, clock))
            }
        };

        Ok(frame)
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Frame::Clock(message)
    }
}

/// Validate a length prefix read off the wire before reading the body
pub fn check_frame_len(len: usize) -> ProtocolResult<()> {
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::frame_too_large(len, MAX_FRAME_LEN));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_frame_layout() {
        let frame = Frame::Clock(Message::new(ActorId::new(1), 5));
        let bytes = frame.encode();

        assert_eq!(bytes.len(), frame.encoded_len());
        assert_eq!(&bytes[..4], &20u32.to_be_bytes());
        assert_eq!(&bytes[4..6], &FRAME_MAGIC.to_be_bytes());
        assert_eq!(bytes[6], PROTOCOL_VERSION);
        assert_eq!(bytes[7], 2);
        assert_eq!(&bytes[12..16], &1u32.to_be_bytes());
        assert_eq!(&bytes[16..24], &5u64.to_be_bytes());
    }

    #[test]
    fn test_decode_hello() {
        let bytes = Frame::Hello {
            actor_id: ActorId::new(3),
        }
        .encode();

        let frame = Frame::decode(&bytes[LENGTH_PREFIX_SIZE..]).unwrap();
        assert_eq!(
            frame,
            Frame::Hello {
                actor_id: ActorId::new(3)
            }
        );
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let bytes = Frame::Clock(Message::new(ActorId::new(2), 42)).encode();
        let mut body = bytes[LENGTH_PREFIX_SIZE..].to_vec();
        let last = body.len() - 1;
        body[last] ^= 0xFF;

        let err = Frame::decode(&body).unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let bytes = Frame::Clock(Message::new(ActorId::new(2), 42)).encode();
        let mut body = bytes[LENGTH_PREFIX_SIZE..].to_vec();
        body[3] = 9;

        assert_eq!(
            Frame::decode(&body).unwrap_err(),
            ProtocolError::UnknownFrameKind { kind: 9 }
        );
    }

    #[test]
    fn test_short_body_rejected() {
        let err = Frame::decode(&[0x1A, 0x4C, 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooSmall { need: 8, got: 3, .. }));
    }

    #[test]
    fn test_frame_len_bounds() {
        assert!(check_frame_len(HEADER_SIZE + CLOCK_PAYLOAD_SIZE).is_ok());
        assert!(check_frame_len(MAX_FRAME_LEN).is_ok());
        assert!(!check_frame_len(MAX_FRAME_LEN + 1).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_actor_id_parsing() {
        assert_eq!("7".parse::<ActorId>().unwrap(), ActorId::new(7));
        assert_eq!(" 12 ".parse::<ActorId>().unwrap().get(), 12);
        assert!("seven".parse::<ActorId>().is_err());
        assert_eq!(ActorId::new(4).to_string(), "4");
    }
}
