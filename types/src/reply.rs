//! Node replies and failures
//!
//! A node either answers with a [`Value`] or fails with a [`NodeError`].
//! Error replies are kept as raw text; [`Redirect::parse`] recognises the
//! cluster redirect forms:
//!
//! ```text
//! MOVED 3999 127.0.0.1:7001    slot permanently owned elsewhere
//! ASK 3999 127.0.0.1:7001      slot migrating, retry once with ASKING
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::NodeAddress;

/// Reply text suffix of a node that runs without cluster support
pub const CLUSTER_DISABLED_SUFFIX: &str = "cluster support disabled";

/// Reply text prefix of a node that requires authentication
pub const AUTH_REQUIRED_PREFIX: &str = "NOAUTH Authentication required";

/// Value returned by a successful command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Ok,
    Status(String),
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Value::Bulk(data.into())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bulk(b) => Some(b),
            Value::Status(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

/// Class of transport failure reported by a node client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityKind {
    Refused,
    Timeout,
    CannotConnect,
    PermissionDenied,
}

impl fmt::Display for ConnectivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityKind::Refused => write!(f, "connection refused"),
            ConnectivityKind::Timeout => write!(f, "timed out"),
            ConnectivityKind::CannotConnect => write!(f, "cannot connect"),
            ConnectivityKind::PermissionDenied => write!(f, "permission denied"),
        }
    }
}

/// Failure of a single call against a node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// The node could not be reached
    #[error("{kind} ({address})")]
    Connectivity {
        kind: ConnectivityKind,
        address: NodeAddress,
    },

    /// The node answered with an error reply
    #[error("{0}")]
    Reply(String),
}

impl NodeError {
    pub fn connectivity(kind: ConnectivityKind, address: NodeAddress) -> Self {
        NodeError::Connectivity { kind, address }
    }

    pub fn reply(message: impl Into<String>) -> Self {
        NodeError::Reply(message.into())
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, NodeError::Connectivity { .. })
    }

    /// First whitespace-separated token of an error reply (`MOVED`, `ERR`, ...)
    pub fn reply_code(&self) -> Option<&str> {
        match self {
            NodeError::Reply(msg) => msg.split_whitespace().next(),
            NodeError::Connectivity { .. } => None,
        }
    }

    pub fn is_cluster_disabled(&self) -> bool {
        matches!(self, NodeError::Reply(msg) if msg.trim_end().ends_with(CLUSTER_DISABLED_SUFFIX))
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, NodeError::Reply(msg) if msg.starts_with(AUTH_REQUIRED_PREFIX))
    }
}

/// Which redirect a node answered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectKind {
    Moved,
    Ask,
}

impl fmt::Display for RedirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectKind::Moved => write!(f, "MOVED"),
            RedirectKind::Ask => write!(f, "ASK"),
        }
    }
}

/// A parsed `MOVED`/`ASK` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub slot: u16,
    /// Node named by the reply; `None` when the reply carries no parsable target
    pub target: Option<NodeAddress>,
}

impl Redirect {
    /// Parse a redirect reply.
    ///
    /// Only the leading token decides whether a reply is a redirect; a reply
    /// with a malformed slot or target still counts, with the missing parts
    /// defaulted.
    pub fn parse(message: &str) -> Option<Self> {
        let mut parts = message.split_whitespace();
        let kind = match parts.next()? {
            "MOVED" => RedirectKind::Moved,
            "ASK" => RedirectKind::Ask,
            _ => return None,
        };
        let slot = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let target = parts.next().and_then(|s| s.parse().ok());

        Some(Self { kind, slot, target })
    }

    pub fn moved(slot: u16, target: NodeAddress) -> Self {
        Self { kind: RedirectKind::Moved, slot, target: Some(target) }
    }

    pub fn ask(slot: u16, target: NodeAddress) -> Self {
        Self { kind: RedirectKind::Ask, slot, target: Some(target) }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} {} {}", self.kind, self.slot, target),
            None => write!(f, "{} {}", self.kind, self.slot),
        }
    }
}
