//! slotroute Core - Shared library for the router and node pools
//!
//! This crate provides the configuration types and the in-memory slot
//! table used by node pool implementations.

pub mod config;
pub mod slot_table;

pub use config::{ConfigError, ConnectionConfig, RouterConfig, SeedTarget};
pub use slot_table::{SlotNode, SlotTable};
