//! Event Scheduler (Tick Loop)
//!
//! The single control loop of a machine. Each tick does exactly one thing:
//!
//! 1. If a message is waiting, receive it (queue draining comes first so a
//!    slow machine catches up).
//! 2. Otherwise draw an outcome from [`ActionWeights`]: send to one peer,
//!    send to every peer, or take an internal step.
//!
//! Every processed event advances the [`LamportClock`] and produces one
//! [`EventRecord`] for the sink. Transport failures surface only as
//! `failed_peers` on the record.

use crate::clock::LamportClock;
use crate::events::{EventRecord, TickEvent};
use crate::queue::InboundQueue;
use crate::sink::EventSink;
use async_trait::async_trait;
use codec::{ActorId, Message};
use machine_config::SimulationSettings;
use network::{PeerTransport, TransportError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Where the scheduler hands outgoing messages
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_to(&self, peer: ActorId, message: Message) -> Result<(), TransportError>;
}

#[async_trait]
impl Outbound for PeerTransport {
    async fn send_to(&self, peer: ActorId, message: Message) -> Result<(), TransportError> {
        self.send(peer, message).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Processing,
    ShuttingDown,
}

/// Relative weights of the tick outcomes when the queue is empty.
///
/// `send_one` applies to each peer separately, so the outcome space is
/// `peers * send_one + send_all + internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionWeights {
    pub send_one: u32,
    pub send_all: u32,
    pub internal: u32,
}

impl Default for ActionWeights {
    fn default() -> Self {
        Self {
            send_one: 1,
            send_all: 1,
            internal: 7,
        }
    }
}

impl From<&SimulationSettings> for ActionWeights {
    fn from(settings: &SimulationSettings) -> Self {
        Self {
            send_one: settings.send_one_weight,
            send_all: settings.send_all_weight,
            internal: settings.internal_weight,
        }
    }
}

impl ActionWeights {
    pub fn total(&self, peer_count: usize) -> u64 {
        peer_count as u64 * u64::from(self.send_one)
            + u64::from(self.send_all)
            + u64::from(self.internal)
    }

    /// Map a draw in `0..total(peers.len())` to an outcome.
    ///
    /// Draws are laid out as: one `send_one` band per peer in the given
    /// order, then `send_all`, then `internal`. Out-of-range draws are
    /// internal.
    pub fn pick(&self, draw: u64, peers: &[ActorId]) -> TickEvent {
        let send_one = u64::from(self.send_one);
        let per_peer_span = peers.len() as u64 * send_one;

        if draw < per_peer_span {
            return TickEvent::SendOne(peers[(draw / send_one) as usize]);
        }
        if draw - per_peer_span < u64::from(self.send_all) {
            return TickEvent::SendAll(peers.to_vec());
        }
        TickEvent::Internal
    }

    /// Draw one outcome. With no peers every outcome is internal.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R, peers: &[ActorId]) -> TickEvent {
        let total = self.total(peers.len());
        if peers.is_empty() || total == 0 {
            return TickEvent::Internal;
        }
        self.pick(rng.gen_range(0..total), peers)
    }
}

/// Uniform draw of a tick rate in `min..=max`
pub fn draw_tick_rate<R: Rng + ?Sized>(rng: &mut R, min: u32, max: u32) -> u32 {
    rng.gen_range(min.max(1)..=max.max(min).max(1))
}

pub struct EventScheduler {
    actor_id: ActorId,
    clock: LamportClock,
    queue: InboundQueue,
    /// Ascending by id
    peers: Vec<ActorId>,
    outbound: Arc<dyn Outbound>,
    sink: Box<dyn EventSink>,
    weights: ActionWeights,
    rng: StdRng,
    tick_rate: u32,
    state: SchedulerState,
    events_processed: u64,
}

/// Resolves once the shutdown flag is set or its sender is gone
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

impl EventScheduler {
    pub fn new(
        actor_id: ActorId,
        queue: InboundQueue,
        outbound: Arc<dyn Outbound>,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            actor_id,
            clock: LamportClock::new(),
            queue,
            peers: Vec::new(),
            outbound,
            sink,
            weights: ActionWeights::default(),
            rng: StdRng::from_entropy(),
            tick_rate: 1,
            state: SchedulerState::Idle,
            events_processed: 0,
        }
    }

    pub fn with_peers(mut self, mut peers: Vec<ActorId>) -> Self {
        peers.retain(|peer| *peer != self.actor_id);
        peers.sort();
        peers.dedup();
        self.peers = peers;
        self
    }

    pub fn with_weights(mut self, weights: ActionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Ticks per second; zero is treated as one
    pub fn with_tick_rate(mut self, tick_rate: u32) -> Self {
        self.tick_rate = tick_rate.max(1);
        self
    }

    pub fn with_clock(mut self, clock: LamportClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn queue(&self) -> &InboundQueue {
        &self.queue
    }

    /// Run one tick. Returns `None` once shutting down.
    pub async fn tick(&mut self) -> Option<EventRecord> {
        if self.state == SchedulerState::ShuttingDown {
            return None;
        }

        // Pop and length under one lock so a concurrent enqueue cannot
        // inflate the recorded queue length
        let record = match self.queue.dequeue_with_len() {
            Some((message, pending)) => {
                self.apply(TickEvent::Receive(message), Some(pending)).await
            }
            None => {
                let event = self.weights.choose(&mut self.rng, &self.peers);
                self.apply(event, None).await
            }
        };
        Some(record)
    }

    /// Apply one event: advance the clock, transmit if needed, record it
    pub async fn process(&mut self, event: TickEvent) -> EventRecord {
        self.apply(event, None).await
    }

    /// `pending` is the queue length observed when a received message was
    /// popped; without it the current length is recorded.
    async fn apply(&mut self, event: TickEvent, pending: Option<usize>) -> EventRecord {
        self.state = SchedulerState::Processing;

        let record = match event {
            TickEvent::Receive(message) => {
                let clock = self.clock.advance_on_receive(message.clock());
                let queue_len = pending.unwrap_or_else(|| self.queue.len());
                EventRecord::receive(self.actor_id, clock, queue_len, &message)
            }
            TickEvent::Internal => {
                let clock = self.clock.advance_internal();
                EventRecord::internal(self.actor_id, clock, self.queue.len())
            }
            TickEvent::SendOne(peer) => self.send_to_peers(vec![peer]).await,
            TickEvent::SendAll(peers) => self.send_to_peers(peers).await,
        };

        if let Err(e) = self.sink.record(&record) {
            warn!(machine = %self.actor_id, error = %e, "Failed to write event record");
        }
        self.events_processed += 1;
        self.state = SchedulerState::Idle;
        record
    }

    /// One send event: a single clock advance, the same timestamp to every
    /// designated peer
    async fn send_to_peers(&mut self, peers: Vec<ActorId>) -> EventRecord {
        let timestamp = self.clock.advance_on_send();
        let message = Message::new(self.actor_id, timestamp);

        let mut failed_peers = Vec::new();
        for peer in &peers {
            if let Err(e) = self.outbound.send_to(*peer, message).await {
                debug!(
                    machine = %self.actor_id,
                    peer = %peer,
                    category = e.category(),
                    "Delivery failed: {}",
                    e
                );
                failed_peers.push(*peer);
            }
        }

        EventRecord::send(
            self.actor_id,
            timestamp,
            self.queue.len(),
            peers,
            failed_peers,
        )
    }

    /// Tick at the configured rate until the shutdown flag is set, then
    /// flush the sink.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.tick_rate));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            machine = %self.actor_id,
            tick_rate = self.tick_rate,
            peers = self.peers.len(),
            "Tick loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;
        }

        self.state = SchedulerState::ShuttingDown;
        if let Err(e) = self.sink.flush() {
            warn!(machine = %self.actor_id, error = %e, "Failed to flush event log");
        }

        info!(
            machine = %self.actor_id,
            clock = self.clock.value(),
            events = self.events_processed,
            "Tick loop stopped"
        );
    }
}

impl std::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScheduler")
            .field("actor_id", &self.actor_id)
            .field("clock", &self.clock)
            .field("peers", &self.peers)
            .field("tick_rate", &self.tick_rate)
            .field("state", &self.state)
            .finish()
    }
}
