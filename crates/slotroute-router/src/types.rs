//! Common types for the router module
//!
//! Centralizes the per-attempt state shared between the router and node pools.

use serde::{Deserialize, Serialize};
use slotroute_types::{NodeAddress, NodeError, Redirect, SlotRange, Value};

use crate::command::Command;

/// A command and its arguments, ready to hand to a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCall {
    pub command: Command,
    pub args: Vec<Vec<u8>>,
}

impl CommandCall {
    pub fn new<I, A>(command: Command, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        Self {
            command,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Key that decides the slot, for commands that take one
    pub fn key(&self) -> Option<&[u8]> {
        if self.command.is_keyed() {
            self.args.first().map(Vec::as_slice)
        } else {
            None
        }
    }
}

/// How the next attempt should be routed.
///
/// Both flags apply to a single attempt only; the router starts every
/// attempt from the neutral hint unless the previous outcome set one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHint {
    /// Prefix the command with a one-shot `ASKING`
    pub asking: bool,
    /// Ignore slot ownership and pick any known node
    pub random_node: bool,
    /// Node named by the `ASK` reply, when it carried one
    pub target: Option<NodeAddress>,
}

impl RedirectHint {
    pub fn asking(target: Option<NodeAddress>) -> Self {
        Self {
            asking: true,
            random_node: false,
            target,
        }
    }

    pub fn random_node() -> Self {
        Self {
            asking: false,
            random_node: true,
            target: None,
        }
    }

    pub fn is_neutral(&self) -> bool {
        !self.asking && !self.random_node
    }
}

/// Outcome of one attempt, as the retry loop sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Ok(Value),
    Redirect(Redirect),
    ConnectivityFailure(NodeError),
    CommandError(String),
}

impl From<Result<Value, NodeError>> for Attempt {
    fn from(result: Result<Value, NodeError>) -> Self {
        match result {
            Ok(value) => Attempt::Ok(value),
            Err(err @ NodeError::Connectivity { .. }) => Attempt::ConnectivityFailure(err),
            Err(NodeError::Reply(message)) => match Redirect::parse(&message) {
                Some(redirect) => Attempt::Redirect(redirect),
                None => Attempt::CommandError(message),
            },
        }
    }
}

/// A node as enumerated by a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub address: NodeAddress,
    pub ranges: Vec<SlotRange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotroute_types::{ConnectivityKind, RedirectKind};

    #[test]
    fn test_attempt_classification() {
        assert_eq!(Attempt::from(Ok(Value::Ok)), Attempt::Ok(Value::Ok));

        let down = NodeError::connectivity(ConnectivityKind::Timeout, NodeAddress::new("h", 1));
        assert!(matches!(Attempt::from(Err(down)), Attempt::ConnectivityFailure(_)));

        match Attempt::from(Err(NodeError::reply("ASK 7 10.0.0.1:7001"))) {
            Attempt::Redirect(r) => assert_eq!(r.kind, RedirectKind::Ask),
            other => panic!("unexpected attempt: {:?}", other),
        }

        assert_eq!(
            Attempt::from(Err(NodeError::reply("WRONGTYPE Operation against a key"))),
            Attempt::CommandError("WRONGTYPE Operation against a key".to_string())
        );
    }

    #[test]
    fn test_call_key() {
        let call = CommandCall::new(Command::Set, ["user:1", "alice"]);
        assert_eq!(call.key(), Some(&b"user:1"[..]));

        let ping = CommandCall::new(Command::Ping, Vec::<Vec<u8>>::new());
        assert_eq!(ping.key(), None);
    }

    #[test]
    fn test_hint_constructors() {
        assert!(RedirectHint::default().is_neutral());
        assert!(RedirectHint::random_node().random_node);
        let ask = RedirectHint::asking(Some(NodeAddress::new("h", 2)));
        assert!(ask.asking && !ask.random_node);
    }
}
