//! Error type for simulation operations.

use crate::schema::ConfigError;

/// Errors surfaced by the simulation core.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid settings: {0}")]
    Settings(#[from] ConfigError),

    #[error("Communication with rank {peer} failed: {msg}")]
    Communication { peer: usize, msg: String },

    #[error("Ghost-free array has {actual} elements, subdomain holds {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Fields are already initialized")]
    AlreadyInitialized,

    #[error("Checkpoint I/O failed: {0}")]
    Checkpoint(#[from] std::io::Error),
}

impl SimulationError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SimulationError::Configuration(msg.into())
    }

    pub fn communication(peer: usize, msg: impl Into<String>) -> Self {
        SimulationError::Communication {
            peer,
            msg: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
