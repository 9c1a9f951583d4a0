//! Error types for the router module

use slotroute_core::ConfigError;
use slotroute_types::{NodeAddress, SlotError};
use thiserror::Error;

/// Router error types
#[derive(Debug, Error)]
pub enum RouterError {
    /// The store rejected the command; never retried
    #[error("Command error: {0}")]
    Command(String),

    /// A seed demanded authentication during topology discovery
    #[error("Authentication required by {address}: {message}")]
    Authentication { address: NodeAddress, message: String },

    /// A seed runs without cluster support while cluster mode is forced
    #[error("Cluster support disabled on {address}: {message}")]
    ClusterDisabled { address: NodeAddress, message: String },

    /// Command name outside the supported set
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A slot mapping could not be built
    #[error("Invalid slot mapping: {0}")]
    InvalidMapping(#[from] SlotError),
}
