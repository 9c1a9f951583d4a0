//! Node pool backed by a [`SimCluster`]

use async_trait::async_trait;
use rand::seq::SliceRandom;
use slotroute_core::{ConnectionConfig, SlotTable};
use slotroute_router::{CommandCall, NodeDescriptor, NodePool, RedirectHint};
use slotroute_types::{NodeAddress, NodeError, SlotAssignment, SlotRange, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use crate::cluster::SimCluster;

/// Routes each attempt through its own slot table, the way a client-side
/// pool would, and hands it to the simulated node
pub struct SimPool {
    cluster: SimCluster,
    table: SlotTable,
    config: ConnectionConfig,
    attempts: AtomicU64,
}

impl SimPool {
    pub fn new(cluster: SimCluster, config: ConnectionConfig) -> Self {
        let table = SlotTable::new(cluster.slot_count());
        Self {
            cluster,
            table,
            config,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Attempts dispatched so far, redirected and failed ones included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn random_node(&self) -> Option<NodeAddress> {
        self.table
            .addresses()
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    fn select(&self, call: &CommandCall, hint: &RedirectHint) -> Option<NodeAddress> {
        if hint.asking {
            if let Some(target) = &hint.target {
                return Some(target.clone());
            }
        }
        if hint.random_node {
            return self.random_node();
        }
        call.key()
            .and_then(|key| self.table.node_for_key(key))
            .or_else(|| self.random_node())
    }
}

#[async_trait]
impl NodePool for SimPool {
    async fn execute(&self, call: &CommandCall, hint: &RedirectHint) -> Result<Value, NodeError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let target = self
            .select(call, hint)
            .ok_or_else(|| NodeError::reply("CLUSTERDOWN No known nodes"))?;

        trace!(node = %target, command = call.command.name(), asking = hint.asking, "Sending command");
        self.cluster.handle(&target, call, hint.asking, &self.config)
    }

    fn add_or_update_node(&self, address: &NodeAddress, ranges: &[SlotRange]) {
        self.table.add_or_update_node(address, ranges);
    }

    fn retain_only(&self, addresses: &HashSet<NodeAddress>) {
        self.table.retain_only(addresses);
    }

    fn apply_assignment(&self, assignment: &SlotAssignment) {
        self.table.replace(assignment);
    }

    fn list_nodes(&self) -> Vec<NodeDescriptor> {
        self.table
            .nodes()
            .into_iter()
            .map(|node| NodeDescriptor {
                address: node.address,
                ranges: node.ranges,
            })
            .collect()
    }

    fn global_configuration(&self) -> ConnectionConfig {
        self.config.clone()
    }
}
