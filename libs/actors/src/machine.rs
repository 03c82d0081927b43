//! Machine
//!
//! Wires one machine together: inbound queue, peer transport, event sink and
//! tick loop. Lifecycle is `new` → `start` → `shutdown`; `run_until` does all
//! three around a caller-supplied stop signal.

use crate::error::{MachineError, Result};
use crate::queue::InboundQueue;
use crate::scheduler::{draw_tick_rate, ActionWeights, EventScheduler};
use crate::sink::{EventSink, FileSink};
use codec::ActorId;
use machine_config::{ConfigError, MachineConfig, MachineLayout, SimulationSettings};
use network::{PeerTransport, TransportConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// Per-process overrides on top of the shared configuration
#[derive(Debug, Clone, Default)]
pub struct MachineOptions {
    /// Replaces `simulation.log_dir`
    pub log_dir: Option<PathBuf>,
    /// Fixed tick rate instead of a random draw
    pub rate: Option<u32>,
    /// Seed for the tick-rate draw and action choices
    pub seed: Option<u64>,
}

/// Final state of a stopped machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSummary {
    pub clock: u64,
    pub events_processed: u64,
}

pub struct Machine {
    layout: MachineLayout,
    settings: SimulationSettings,
    tick_rate: u32,
    transport: PeerTransport,
    scheduler: Option<EventScheduler>,
    tick_task: Option<JoinHandle<EventScheduler>>,
    stop_tx: watch::Sender<bool>,
}

impl Machine {
    /// Build a machine that logs to `<log_dir>/log_<id>.txt`
    pub fn new(config: &MachineConfig, id: ActorId, options: MachineOptions) -> Result<Self> {
        let log_dir = options
            .log_dir
            .clone()
            .unwrap_or_else(|| config.simulation.log_dir.clone());

        Self::build(config, id, options, |tick_rate| {
            let sink = FileSink::create(&log_dir, id, tick_rate)?;
            Ok(Box::new(sink) as Box<dyn EventSink>)
        })
    }

    /// Build a machine with a caller-provided sink
    pub fn with_sink(
        config: &MachineConfig,
        id: ActorId,
        options: MachineOptions,
        sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        Self::build(config, id, options, |_| Ok(sink))
    }

    fn build(
        config: &MachineConfig,
        id: ActorId,
        options: MachineOptions,
        make_sink: impl FnOnce(u32) -> Result<Box<dyn EventSink>>,
    ) -> Result<Self> {
        let layout = config.layout_for(id)?;
        let settings = config.simulation.clone();

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let tick_rate = match options.rate {
            Some(0) => {
                return Err(ConfigError::invalid("rate", "tick rate must be at least 1").into())
            }
            Some(rate) => rate,
            None => draw_tick_rate(&mut rng, settings.min_rate, settings.max_rate),
        };

        let sink = make_sink(tick_rate)?;

        let queue = InboundQueue::new();
        let transport = PeerTransport::new(
            id,
            layout.peers.clone(),
            Arc::new(queue.producer()),
            TransportConfig::from(&settings),
        );

        let scheduler = EventScheduler::new(id, queue, Arc::new(transport.clone()), sink)
            .with_peers(layout.peers.iter().map(|peer| peer.id).collect())
            .with_weights(ActionWeights::from(&settings))
            .with_rng(rng)
            .with_tick_rate(tick_rate);

        info!(
            machine = %id,
            address = %layout.local.address(),
            peers = layout.peers.len(),
            tick_rate,
            "Machine created"
        );

        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            layout,
            settings,
            tick_rate,
            transport,
            scheduler: Some(scheduler),
            tick_task: None,
            stop_tx,
        })
    }

    pub fn id(&self) -> ActorId {
        self.layout.local.id
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn transport(&self) -> &PeerTransport {
        &self.transport
    }

    /// Bind, link up with every peer, then start ticking.
    ///
    /// Fails if the listener cannot bind or an outbound peer stays
    /// unreachable past the grace window.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(ConfigError::invalid("machine", "already started").into());
        };

        let bound = self.transport.listen(&self.layout.local.address()).await?;
        if let Err(e) = self.transport.establish_links().await {
            self.transport.shutdown().await;
            return Err(MachineError::Transport(e));
        }

        let stop_rx = self.stop_tx.subscribe();
        self.tick_task = Some(tokio::spawn(async move {
            scheduler.run(stop_rx).await;
            scheduler
        }));

        info!(machine = %self.id(), addr = %bound, "Machine started");
        Ok(bound)
    }

    /// Stop ticking, close every link and flush the event log.
    ///
    /// Returns the final clock if the tick loop stopped within the
    /// shutdown bound.
    pub async fn shutdown(&mut self) -> Option<MachineSummary> {
        info!(machine = %self.id(), "Shutting down machine");
        self.stop_tx.send_replace(true);

        let summary = match self.tick_task.take() {
            Some(mut task) => match timeout(self.settings.shutdown_timeout(), &mut task).await {
                Ok(Ok(scheduler)) => Some(MachineSummary {
                    clock: scheduler.clock(),
                    events_processed: scheduler.events_processed(),
                }),
                Ok(Err(e)) => {
                    warn!(machine = %self.id(), error = %e, "Tick loop task failed");
                    None
                }
                Err(_) => {
                    warn!(machine = %self.id(), "Tick loop did not stop in time, aborting");
                    task.abort();
                    None
                }
            },
            None => self.scheduler.as_ref().map(|scheduler| MachineSummary {
                clock: scheduler.clock(),
                events_processed: scheduler.events_processed(),
            }),
        };

        let aborted = self.transport.shutdown().await;
        if aborted > 0 {
            warn!(machine = %self.id(), aborted, "Some transport tasks were aborted");
        }

        if let Some(summary) = summary {
            info!(
                machine = %self.id(),
                clock = summary.clock,
                events = summary.events_processed,
                "Machine stopped"
            );
        }
        summary
    }

    /// Start, wait for `signal`, then shut down
    pub async fn run_until<F>(mut self, signal: F) -> Result<Option<MachineSummary>>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        Ok(self.shutdown().await)
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id())
            .field("tick_rate", &self.tick_rate)
            .field("transport", &self.transport)
            .field("running", &self.tick_task.is_some())
            .finish()
    }
}
