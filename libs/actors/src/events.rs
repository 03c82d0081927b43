//! Tick events and the records they produce

use chrono::{DateTime, Local};
use codec::{ActorId, Message};
use std::fmt;

/// What one tick does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickEvent {
    Internal,
    SendOne(ActorId),
    SendAll(Vec<ActorId>),
    Receive(Message),
}

/// Kind of a processed event as it appears in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Internal,
    Send,
    Receive,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Internal => "INTERNAL",
            EventKind::Send => "SEND",
            EventKind::Receive => "RECEIVE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub wall_clock_time: DateTime<Local>,
    pub actor_id: ActorId,
    pub kind: EventKind,
    /// Clock after the event
    pub clock: u64,
    /// Pending inbound messages, counted after any dequeue
    pub queue_len: usize,
    /// Receive: the sender. Send: every designated peer.
    pub peers: Vec<ActorId>,
    /// Receive only
    pub message_clock: Option<u64>,
    /// Send only: designated peers whose delivery failed
    pub failed_peers: Vec<ActorId>,
}

impl EventRecord {
    fn base(actor_id: ActorId, kind: EventKind, clock: u64, queue_len: usize) -> Self {
        Self {
            wall_clock_time: Local::now(),
            actor_id,
            kind,
            clock,
            queue_len,
            peers: Vec::new(),
            message_clock: None,
            failed_peers: Vec::new(),
        }
    }

    pub fn internal(actor_id: ActorId, clock: u64, queue_len: usize) -> Self {
        Self::base(actor_id, EventKind::Internal, clock, queue_len)
    }

    pub fn send(
        actor_id: ActorId,
        clock: u64,
        queue_len: usize,
        peers: Vec<ActorId>,
        failed_peers: Vec<ActorId>,
    ) -> Self {
        Self {
            peers,
            failed_peers,
            ..Self::base(actor_id, EventKind::Send, clock, queue_len)
        }
    }

    pub fn receive(actor_id: ActorId, clock: u64, queue_len: usize, message: &Message) -> Self {
        Self {
            peers: vec![message.sender()],
            message_clock: Some(message.clock()),
            ..Self::base(actor_id, EventKind::Receive, clock, queue_len)
        }
    }

    /// Peers that actually got the message
    pub fn delivered_peers(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.peers
            .iter()
            .copied()
            .filter(|peer| !self.failed_peers.contains(peer))
    }

    /// Free-text tail of a log line
    pub fn details(&self) -> String {
        match self.kind {
            EventKind::Internal => "Internal event".to_string(),
            EventKind::Receive => format!(
                "Message clock: {} from machine {}",
                self.message_clock.unwrap_or_default(),
                join_ids(&self.peers)
            ),
            EventKind::Send => {
                let mut details = format!("Sent to machine {}", join_ids(&self.peers));
                if !self.failed_peers.is_empty() {
                    details.push_str(&format!("; failed: {}", join_ids(&self.failed_peers)));
                }
                details
            }
        }
    }

    /// `YYYY-mm-dd HH:MM:SS | KIND | Clock: c | Queue: n | details`
    pub fn to_log_line(&self) -> String {
        format!(
            "{} | {} | Clock: {} | Queue: {} | {}",
            self.wall_clock_time.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.clock,
            self.queue_len,
            self.details()
        )
    }
}

fn join_ids(ids: &[ActorId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
