//! Peer Sessions
//!
//! One established, identified link to one peer. The write half lives behind
//! an async mutex so concurrent senders never interleave frame bytes; the read
//! half is owned by the session's read loop in [`crate::PeerTransport`].

use crate::transports::FrameWriter;
use crate::{Result, TransportError};
use codec::{ActorId, Frame, Message};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::debug;

/// Which side opened the TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Initiator,
    Acceptor,
}

/// The lower id always dials the higher id, so each pair gets one link.
pub fn initiates_link(local: ActorId, peer: ActorId) -> bool {
    local < peer
}

pub struct PeerSession {
    peer: ActorId,
    remote_addr: SocketAddr,
    role: LinkRole,
    writer: Mutex<FrameWriter<OwnedWriteHalf>>,
    alive: AtomicBool,
}

impl PeerSession {
    pub(crate) fn new(
        peer: ActorId,
        remote_addr: SocketAddr,
        role: LinkRole,
        writer: FrameWriter<OwnedWriteHalf>,
    ) -> Self {
        Self {
            peer,
            remote_addr,
            role,
            writer: Mutex::new(writer),
            alive: AtomicBool::new(true),
        }
    }

    pub fn peer(&self) -> ActorId {
        self.peer
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Write one clock frame. A failed write marks the session dead.
    pub async fn send(&self, message: Message) -> Result<()> {
        if !self.is_alive() {
            return Err(TransportError::session(self.peer, "session closed"));
        }

        let mut writer = self.writer.lock().await;
        match writer.send_frame(&Frame::Clock(message)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.alive.store(false, Ordering::Release);
                Err(TransportError::session(self.peer, e.to_string()))
            }
        }
    }

    /// Close the write direction. Idempotent.
    pub async fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            debug!(peer = %self.peer, remote = %self.remote_addr, "Closing session");
            self.writer.lock().await.shutdown().await;
        }
    }

    /// Mark dead without touching the socket (read loop saw EOF)
    pub(crate) fn mark_closed(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", &self.peer)
            .field("remote_addr", &self.remote_addr)
            .field("role", &self.role)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_id_initiates() {
        assert!(initiates_link(ActorId::new(1), ActorId::new(2)));
        assert!(!initiates_link(ActorId::new(3), ActorId::new(2)));
        assert!(!initiates_link(ActorId::new(2), ActorId::new(2)));
    }
}
