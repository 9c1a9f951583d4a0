//! slotroute Sim - In-memory cluster for the router
//!
//! Provides a [`SimCluster`] that answers topology queries and commands the
//! way a slot-partitioned cluster does, plus a [`SimPool`] that routes
//! through it. Together they let the router run end to end without a
//! network:
//! - Slot layouts that change behind the router's back (`MOVED`)
//! - Slot migrations in progress (`ASK`)
//! - Nodes going down and failing over
//! - Standalone and password-protected deployments

mod cluster;
mod error;
mod pool;
mod store;

pub use cluster::SimCluster;
pub use error::SimError;
pub use pool::SimPool;
