//! # Lamport Machines Configuration
//!
//! Static configuration consumed once at startup, before any session opens:
//!
//! - **Peer table**: machine id → host/port, identical for every machine
//! - **Simulation settings**: tick-rate range, action weights, connection
//!   retry window, shutdown bound, event log directory
//!
//! ## Usage
//!
//! ```rust,no_run
//! use codec::ActorId;
//! use machine_config::load_config;
//!
//! let config = load_config(None)?;
//! let layout = config.layout_for(ActorId::new(1))?;
//! println!("{} talks to {} peers", layout.local.address(), layout.peers.len());
//! # Ok::<(), machine_config::ConfigError>(())
//! ```

pub mod error;
pub mod machine_config;

// Re-export commonly used types
pub use error::{ConfigError, Result};
pub use machine_config::{
    load_config, MachineConfig, MachineLayout, Peer, PeerAddress, SimulationSettings,
    DEFAULT_CONFIG_PATH, ENV_PREFIX,
};
