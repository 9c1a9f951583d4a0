//! slotroute Router - Cluster-aware command routing
//!
//! Routes commands to the node owning the key's slot and recovers from
//! redirects and unreachable nodes.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │  execute(command, args)
//!   ▼
//! ┌─────────────────────────┐   MOVED   ┌─────────────────────────┐
//! │     CommandRouter       │──────────►│    TopologyManager      │
//! │  (retry / redirects)    │           │  (discovery, refresh)   │
//! └───────────┬─────────────┘           └───────────┬─────────────┘
//!             │ execute(call, hint)                 │ retain / upsert
//!             ▼                                     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         NodePool                            │
//! │              (slot table, per-node clients)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Refreshes are serialized by the topology manager; command execution is
//! not, so commands that need no refresh keep flowing while one runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use slotroute_router::CommandRouter;
//!
//! let router = CommandRouter::connect(config, pool, source).await?;
//! router.set(["user:1", "alice"]).await?;
//! let name = router.get(["user:1"]).await?;
//! ```

// Core modules
mod command;
mod error;
mod pool;
mod types;

// Routing
mod router;
mod topology;


// Re-exports: Error types
pub use error::RouterError;

// Re-exports: Core types
pub use command::Command;
pub use types::{Attempt, CommandCall, NodeDescriptor, RedirectHint};

// Re-exports: Collaborator traits
pub use pool::{NodePool, TopologySource};

// Re-exports: Routers
pub use router::CommandRouter;
pub use topology::TopologyManager;
