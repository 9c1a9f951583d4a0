//! Command Router
//!
//! Runs one logical command to completion against the pool, absorbing a
//! bounded number of connectivity failures and cluster redirects.
//!
//! | Outcome            | Next attempt                  | Topology | Backoff |
//! |--------------------|-------------------------------|----------|---------|
//! | value              | none, returned                |          |         |
//! | connectivity error | any node (`random_node`)      |          | late    |
//! | `ASK`              | one-shot `ASKING` to target   |          |         |
//! | `MOVED`            | slot owner                    | refresh  | late    |
//! | other error reply  | none, returned as an error    |          |         |
//!
//! "Late" means more than half of the retry budget has been consumed.

use slotroute_core::RouterConfig;
use slotroute_types::{RedirectKind, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::error::RouterError;
use crate::pool::{NodePool, TopologySource};
use crate::topology::TopologyManager;
use crate::types::{Attempt, CommandCall, RedirectHint};

/// Per-call retry bookkeeping
#[derive(Debug)]
struct RetryState {
    budget: u32,
    remaining: u32,
    hint: RedirectHint,
}

impl RetryState {
    fn new(budget: u32) -> Self {
        Self {
            budget,
            remaining: budget,
            hint: RedirectHint::default(),
        }
    }

    /// Spend one unit of budget and consume the pending hint
    fn next_attempt(&mut self) -> Option<RedirectHint> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(std::mem::take(&mut self.hint))
    }

    fn attempts(&self) -> u32 {
        self.budget - self.remaining
    }

    /// Backoff applies once more than half the budget is spent and another
    /// attempt is still allowed
    fn should_back_off(&self) -> bool {
        self.remaining > 0 && self.attempts() * 2 > self.budget
    }
}

/// Redirect-aware entry point for commands
pub struct CommandRouter {
    pool: Arc<dyn NodePool>,
    topology: Arc<TopologyManager>,
    retry_budget: u32,
    backoff: Duration,
}

impl CommandRouter {
    /// Build a router without touching the network
    pub fn new(
        config: RouterConfig,
        pool: Arc<dyn NodePool>,
        source: Arc<dyn TopologySource>,
    ) -> Result<Self, RouterError> {
        let topology = Arc::new(TopologyManager::new(&config, pool.clone(), source)?);
        Ok(Self {
            pool,
            topology,
            retry_budget: config.request_retry_budget,
            backoff: config.backoff(),
        })
    }

    /// Build a router and load the initial topology, failing on
    /// misconfigured seeds
    pub async fn connect(
        config: RouterConfig,
        pool: Arc<dyn NodePool>,
        source: Arc<dyn TopologySource>,
    ) -> Result<Self, RouterError> {
        let router = Self::new(config, pool, source)?;
        router.topology.refresh(true).await?;
        Ok(router)
    }

    pub fn topology(&self) -> &Arc<TopologyManager> {
        &self.topology
    }

    pub fn pool(&self) -> &Arc<dyn NodePool> {
        &self.pool
    }

    /// Refresh the slot mapping now
    pub async fn reload(&self) -> Result<(), RouterError> {
        self.topology.refresh(false).await
    }

    /// Run a command by name, e.g. `"get"` or `"HSET"`
    pub async fn execute_named<I, A>(&self, name: &str, args: I) -> Result<Option<Value>, RouterError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        let command: Command = name.parse()?;
        self.execute(command, args).await
    }

    /// Run `command` with `args`.
    ///
    /// Returns `Ok(None)` when the retry budget runs out before any node
    /// produced a value or a command error.
    pub async fn execute<I, A>(&self, command: Command, args: I) -> Result<Option<Value>, RouterError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        let call = CommandCall::new(command, args);
        self.execute_call(&call).await
    }

    pub async fn execute_call(&self, call: &CommandCall) -> Result<Option<Value>, RouterError> {
        let mut state = RetryState::new(self.retry_budget);

        while let Some(hint) = state.next_attempt() {
            trace!(
                command = call.command.name(),
                attempt = state.attempts(),
                asking = hint.asking,
                random_node = hint.random_node,
                "Dispatching command"
            );

            match Attempt::from(self.pool.execute(call, &hint).await) {
                Attempt::Ok(value) => return Ok(Some(value)),

                Attempt::CommandError(message) => return Err(RouterError::Command(message)),

                Attempt::ConnectivityFailure(err) => {
                    warn!(
                        command = call.command.name(),
                        attempt = state.attempts(),
                        error = %err,
                        "Node unreachable, retrying on another node"
                    );
                    state.hint = RedirectHint::random_node();
                    self.back_off(&state).await;
                }

                Attempt::Redirect(redirect) => match redirect.kind {
                    RedirectKind::Ask => {
                        debug!(redirect = %redirect, "Slot migrating, retrying with ASKING");
                        state.hint = RedirectHint::asking(redirect.target);
                    }
                    RedirectKind::Moved => {
                        debug!(redirect = %redirect, "Slot moved, refreshing topology");
                        self.topology.refresh(false).await?;
                        self.back_off(&state).await;
                    }
                },
            }
        }

        warn!(
            command = call.command.name(),
            budget = self.retry_budget,
            "Retry budget exhausted without a result"
        );
        Ok(None)
    }

    async fn back_off(&self, state: &RetryState) {
        if state.should_back_off() {
            trace!(delay_ms = self.backoff.as_millis() as u64, "Backing off");
            tokio::time::sleep(self.backoff).await;
        }
    }
}
