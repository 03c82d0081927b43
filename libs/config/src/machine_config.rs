//! Machine Configuration Module
//!
//! Loads the static peer table and simulation settings shared by every
//! machine. Supports TOML or JSON files (format chosen by extension) with
//! environment overrides under the `LAMPORT_` prefix, e.g.
//! `LAMPORT_SIMULATION__MAX_RATE=3`.

use crate::error::{ConfigError, Result};
use codec::ActorId;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default config path used by the binaries
pub const DEFAULT_CONFIG_PATH: &str = "config/machines.toml";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "LAMPORT";

/// Network address of one machine as written in the config file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

/// Static descriptor of a machine: id plus address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: ActorId,
    pub host: String,
    pub port: u16,
}

impl Peer {
    pub fn new(id: ActorId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    /// `host:port`, accepted by tokio's address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Tunables for the tick loop and transport startup
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SimulationSettings {
    /// Slowest tick rate a machine may draw (ticks per second)
    pub min_rate: u32,
    /// Fastest tick rate a machine may draw (ticks per second)
    pub max_rate: u32,
    /// Weight of "send to this peer" outcomes, applied to each peer
    pub send_one_weight: u32,
    /// Weight of the "send to every peer" outcome
    pub send_all_weight: u32,
    /// Weight of the internal-event outcome
    pub internal_weight: u32,
    /// How long startup keeps retrying unreachable peers
    pub connect_grace_ms: u64,
    pub connect_base_delay_ms: u64,
    pub connect_max_delay_ms: u64,
    /// Upper bound on waiting for reader tasks during shutdown
    pub shutdown_timeout_ms: u64,
    /// Directory for `log_<id>.txt` event logs
    pub log_dir: PathBuf,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            min_rate: 1,
            max_rate: 6,
            send_one_weight: 1,
            send_all_weight: 1,
            internal_weight: 7,
            connect_grace_ms: 10_000,
            connect_base_delay_ms: 100,
            connect_max_delay_ms: 1_000,
            shutdown_timeout_ms: 2_000,
            log_dir: PathBuf::from("."),
        }
    }
}

impl SimulationSettings {
    pub fn connect_grace(&self) -> Duration {
        Duration::from_millis(self.connect_grace_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_rate == 0 {
            return Err(ConfigError::invalid("simulation.min_rate", "must be at least 1"));
        }
        if self.min_rate > self.max_rate {
            return Err(ConfigError::invalid(
                "simulation.max_rate",
                format!("{} is below min_rate {}", self.max_rate, self.min_rate),
            ));
        }
        if self.internal_weight == 0 && self.send_one_weight == 0 && self.send_all_weight == 0 {
            return Err(ConfigError::invalid(
                "simulation.internal_weight",
                "at least one action weight must be non-zero",
            ));
        }
        if self.connect_base_delay_ms == 0 || self.connect_max_delay_ms < self.connect_base_delay_ms
        {
            return Err(ConfigError::invalid(
                "simulation.connect_max_delay_ms",
                "retry delays must satisfy 0 < base <= max",
            ));
        }
        Ok(())
    }
}

/// Raw on-disk shape; machine ids are map keys and arrive as strings
#[derive(Debug, Deserialize)]
struct RawMachineConfig {
    machines: BTreeMap<String, PeerAddress>,
    #[serde(default)]
    simulation: SimulationSettings,
}

/// The local machine and everyone it talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineLayout {
    pub local: Peer,
    /// Every other machine, ascending by id
    pub peers: Vec<Peer>,
}

/// Main configuration: peer table plus simulation settings
#[derive(Debug, Clone)]
pub struct MachineConfig {
    machines: BTreeMap<ActorId, PeerAddress>,
    pub simulation: SimulationSettings,
}

impl MachineConfig {
    /// Load configuration from a file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading machine configuration from {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let raw: RawMachineConfig = config.try_deserialize()?;
        Self::from_parts(raw.machines, raw.simulation)
    }

    /// Build from already-parsed parts, validating ids, ports and settings
    pub fn from_parts(
        machines: BTreeMap<String, PeerAddress>,
        simulation: SimulationSettings,
    ) -> Result<Self> {
        if machines.is_empty() {
            return Err(ConfigError::invalid("machines", "peer table is empty"));
        }

        let mut table = BTreeMap::new();
        for (key, address) in machines {
            let id: ActorId = key.parse().map_err(|_| {
                ConfigError::invalid(
                    format!("machines.{}", key),
                    "machine ids must be non-negative integers",
                )
            })?;
            if address.port == 0 {
                return Err(ConfigError::invalid(
                    format!("machines.{}.port", key),
                    "port must be non-zero",
                ));
            }
            if table.insert(id, address).is_some() {
                return Err(ConfigError::invalid(
                    format!("machines.{}", key),
                    "duplicate machine id",
                ));
            }
        }

        simulation.validate()?;

        debug!(machines = table.len(), "Peer table loaded");
        Ok(Self {
            machines: table,
            simulation,
        })
    }

    /// All configured ids, ascending
    pub fn machine_ids(&self) -> Vec<ActorId> {
        self.machines.keys().copied().collect()
    }

    pub fn get(&self, id: ActorId) -> Option<Peer> {
        self.machines
            .get(&id)
            .map(|address| Peer::new(id, address.host.clone(), address.port))
    }

    /// Split the table into the local machine and its peers
    pub fn layout_for(&self, id: ActorId) -> Result<MachineLayout> {
        let local = self.get(id).ok_or(ConfigError::UnknownMachine { id })?;
        let peers = self
            .machines
            .iter()
            .filter(|(peer_id, _)| **peer_id != id)
            .map(|(peer_id, address)| Peer::new(*peer_id, address.host.clone(), address.port))
            .collect();

        Ok(MachineLayout { local, peers })
    }
}

/// Convenience function to load configuration from the default path
pub fn load_config(path: Option<&Path>) -> Result<MachineConfig> {
    MachineConfig::load(path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH)))
}
