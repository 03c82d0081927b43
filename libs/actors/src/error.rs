//! Machine Error Types

use machine_config::ConfigError;
use network::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can stop a machine from starting
#[derive(Error, Debug)]
pub enum MachineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Event log could not be opened or written
    #[error("Event log error at {path:?}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MachineError>;

impl MachineError {
    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Sink {
            path: path.into(),
            source,
        }
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            MachineError::Config(_) => "config",
            MachineError::Transport(e) => e.category(),
            MachineError::Sink { .. } => "sink",
        }
    }
}
