//! Per-Machine Lamport Runtime
//!
//! Everything one virtual machine runs between process start and shutdown.
//!
//! # Architecture
//!
//! ```text
//!  read loops ──deliver──▶ InboundQueue ──dequeue──▶ EventScheduler
//!  (PeerTransport)                                     │   │    │
//!                                                      │   │    └─▶ EventSink
//!                                                      │   └─▶ LamportClock
//!  PeerTransport ◀──────────── send_to (Outbound) ─────┘
//! ```
//!
//! The queue is the only state shared between read loops and the tick loop.
//! The clock lives inside the scheduler and is never shared.
//!
//! # Examples
//!
//! ```rust,no_run
//! use codec::ActorId;
//! use machine_actors::{Machine, MachineOptions};
//! use machine_config::load_config;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None)?;
//! let machine = Machine::new(&config, ActorId::new(1), MachineOptions::default())?;
//! let summary = machine
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! println!("final clock: {:?}", summary.map(|s| s.clock));
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod events;
pub mod machine;
pub mod queue;
pub mod scheduler;
pub mod sink;

pub use clock::{lamport_receive, LamportClock};
pub use error::{MachineError, Result};
pub use events::{EventKind, EventRecord, TickEvent};
pub use machine::{Machine, MachineOptions, MachineSummary};
pub use queue::{InboundQueue, QueueProducer};
pub use scheduler::{draw_tick_rate, ActionWeights, EventScheduler, Outbound, SchedulerState};
pub use sink::{EventSink, FileSink, MemorySink};
