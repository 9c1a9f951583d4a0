// ========== Core Modules ==========
pub mod address;
pub mod reply;
pub mod slot;

// Export commonly used types
pub use address::NodeAddress;
pub use reply::{
    ConnectivityKind, NodeError, Redirect, RedirectKind, Value, AUTH_REQUIRED_PREFIX,
    CLUSTER_DISABLED_SUFFIX,
};
pub use slot::{key_slot, SlotAssignment, SlotRange, SlotReport, DEFAULT_HASH_SLOTS};

// Error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Missing port in address: {0}")]
    MissingPort(String),

    #[error("Empty host in address: {0}")]
    EmptyHost(String),

    #[error("Invalid port in address: {0}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("Invalid slot range {start}-{end} for a space of {slot_count} slots")]
    InvalidRange { start: u16, end: u16, slot_count: u16 },

    #[error("Slot space must contain at least one slot")]
    EmptySlotSpace,

    #[error("Single-node mapping requires exactly one address, got {0}")]
    NotSingleAddress(usize),
}
