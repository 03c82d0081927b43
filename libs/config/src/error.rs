//! Configuration errors

use codec::ActorId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// File missing, unreadable, or not deserializable
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config_crate::ConfigError),

    /// Requested machine id is not in the peer table
    #[error("Machine {id} is not present in the peer table")]
    UnknownMachine { id: ActorId },

    /// Values loaded but rejected by validation
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
