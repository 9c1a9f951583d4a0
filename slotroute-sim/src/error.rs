//! Error types for cluster administration

use slotroute_types::{NodeAddress, SlotError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeAddress),

    #[error("Slot {0} has no owner")]
    Unowned(u16),

    #[error("Slot {0} is not migrating")]
    NotMigrating(u16),

    #[error("Slot {slot} is already owned by {owner}")]
    AlreadyOwner { slot: u16, owner: NodeAddress },

    #[error("Cannot spread {nodes} nodes over {slot_count} slots")]
    TooManyNodes { nodes: usize, slot_count: u16 },

    #[error("Invalid slot range: {0}")]
    Slot(#[from] SlotError),
}
