//! TCP Frame Transport
//!
//! Length-prefixed frame I/O over the two halves of a TCP stream. Readers and
//! writers are generic over tokio's async I/O traits so the same code runs on
//! `OwnedReadHalf`/`OwnedWriteHalf` in production and on in-memory duplex
//! pipes in tests.

use crate::{Result, TransportError};
use bytes::BytesMut;
use codec::{check_frame_len, Frame, ProtocolError, LENGTH_PREFIX_SIZE};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Result of reading one frame off a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A well-formed frame
    Frame(Frame),
    /// A complete frame whose body failed validation; its bytes were consumed
    Malformed(ProtocolError),
    /// Peer closed the stream at a frame boundary
    Closed,
}

/// Reading half of a link with a reusable body buffer
pub struct FrameReader<R> {
    stream: R,
    pub(crate) peer_addr: SocketAddr,
    pub(crate) bytes_received: u64,
    /// Reusable read buffer
    read_buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            bytes_received: 0,
            read_buffer: BytesMut::with_capacity(codec::MAX_FRAME_LEN),
        }
    }

    /// Read the next frame.
    ///
    /// Oversized length prefixes, truncated frames and I/O failures are
    /// errors: the stream position can no longer be trusted and the link
    /// must end. EOF is a clean close only at a frame boundary.
    pub async fn read_frame(&mut self) -> Result<ReadOutcome> {
        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_SIZE {
            let n = self
                .stream
                .read(&mut len_bytes[filled..])
                .await
                .map_err(|e| TransportError::io("Failed to read frame length", e))?;
            if n == 0 {
                if filled == 0 {
                    return Ok(ReadOutcome::Closed);
                }
                return Err(TransportError::io(
                    format!("Stream ended after {} of {} length bytes", filled, LENGTH_PREFIX_SIZE),
                    std::io::Error::from(ErrorKind::UnexpectedEof),
                ));
            }
            filled += n;
        }

        let frame_len = u32::from_be_bytes(len_bytes) as usize;
        check_frame_len(frame_len)?;

        self.read_buffer.clear();
        self.read_buffer.resize(frame_len, 0);
        self.stream
            .read_exact(&mut self.read_buffer[..])
            .await
            .map_err(|e| TransportError::io("Failed to read frame body", e))?;

        self.bytes_received += (LENGTH_PREFIX_SIZE + frame_len) as u64;

        match Frame::decode(&self.read_buffer) {
            Ok(frame) => {
                debug!(
                    peer = %self.peer_addr,
                    kind = frame.kind().name(),
                    total_received = self.bytes_received,
                    "Received frame"
                );
                Ok(ReadOutcome::Frame(frame))
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    peer = %self.peer_addr,
                    error = %e,
                    category = e.category(),
                    "Discarding malformed frame"
                );
                Ok(ReadOutcome::Malformed(e))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Writing half of a link. Callers serialize access (see `PeerSession`).
pub struct FrameWriter<W> {
    stream: W,
    pub(crate) peer_addr: SocketAddr,
    pub(crate) bytes_sent: u64,
    /// Reusable write buffer
    write_buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            bytes_sent: 0,
            write_buffer: BytesMut::with_capacity(64),
        }
    }

    /// Write one frame with its length prefix in a single `write_all`
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_buffer.clear();
        frame.encode_into(&mut self.write_buffer);

        self.stream
            .write_all(&self.write_buffer)
            .await
            .map_err(|e| TransportError::io("Failed to write frame", e))?;

        // Flush to ensure immediate transmission
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::io("Failed to flush TCP stream", e))?;

        self.bytes_sent += self.write_buffer.len() as u64;

        debug!(
            peer = %self.peer_addr,
            kind = frame.kind().name(),
            total_sent = self.bytes_sent,
            "Sent frame"
        );

        Ok(())
    }

    /// Shut down the write direction; the peer's reader observes EOF
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            // Already-reset sockets are expected during teardown
            if e.kind() != ErrorKind::NotConnected {
                warn!(peer = %self.peer_addr, "Error shutting down TCP stream: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{ActorId, Message};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:5001".parse().unwrap()
    }

    #[tokio::test]
    async fn test_frames_cross_a_pipe_in_order() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client, test_addr());
        let mut reader = FrameReader::new(server, test_addr());

        writer
            .send_frame(&Frame::Hello {
                actor_id: ActorId::new(1),
            })
            .await
            .unwrap();
        for clock in 1..=3 {
            writer
                .send_frame(&Frame::Clock(Message::new(ActorId::new(1), clock)))
                .await
                .unwrap();
        }
        drop(writer);

        assert_eq!(
            reader.read_frame().await.unwrap(),
            ReadOutcome::Frame(Frame::Hello {
                actor_id: ActorId::new(1)
            })
        );
        for clock in 1..=3 {
            assert_eq!(
                reader.read_frame().await.unwrap(),
                ReadOutcome::Frame(Frame::Clock(Message::new(ActorId::new(1), clock)))
            );
        }
        assert_eq!(reader.read_frame().await.unwrap(), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server, test_addr());

        // Valid length prefix, garbage body
        client.write_all(&8u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0xFF; 8]).await.unwrap();
        client
            .write_all(&Frame::Clock(Message::new(ActorId::new(2), 7)).encode())
            .await
            .unwrap();

        assert!(matches!(
            reader.read_frame().await.unwrap(),
            ReadOutcome::Malformed(ProtocolError::InvalidMagic { .. })
        ));
        assert_eq!(
            reader.read_frame().await.unwrap(),
            ReadOutcome::Frame(Frame::Clock(Message::new(ActorId::new(2), 7)))
        );
    }

    #[tokio::test]
    async fn test_oversized_frame_ends_stream() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server, test_addr());

        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_an_error() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server, test_addr());

        client.write_all(&20u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0x1A, 0x4C]).await.unwrap();
        drop(client);

        assert!(matches!(
            reader.read_frame().await.unwrap_err(),
            TransportError::Io { .. }
        ));
    }

    #[tokio::test]
    async fn test_partial_length_prefix_is_an_error() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server, test_addr());

        client.write_all(&[0x00, 0x00]).await.unwrap();
        drop(client);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
        assert!(err.to_string().contains("2 of 4"));
    }

    #[tokio::test]
    async fn test_length_prefix_split_across_writes() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server, test_addr());

        let bytes = Frame::Clock(Message::new(ActorId::new(3), 11)).encode();
        let read = tokio::spawn(async move { reader.read_frame().await });
        client.write_all(&bytes[..1]).await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(&bytes[1..]).await.unwrap();

        assert_eq!(
            read.await.unwrap().unwrap(),
            ReadOutcome::Frame(Frame::Clock(Message::new(ActorId::new(3), 11)))
        );
    }
}
