//! Simulated cluster
//!
//! A set of in-memory nodes sharing one authoritative slot layout. Nodes
//! answer like real cluster members: `MOVED` for slots they do not own,
//! `ASK` for keys already handed to an importing node, and refused
//! connections while down. The layout can be reshaped at any time without
//! telling the router, which is what makes redirects happen.

use async_trait::async_trait;
use parking_lot::RwLock;
use slotroute_core::ConnectionConfig;
use slotroute_router::{Command, CommandCall, TopologySource};
use slotroute_types::{
    key_slot, ConnectivityKind, NodeAddress, NodeError, Redirect, SlotRange, SlotReport, Value,
    AUTH_REQUIRED_PREFIX, CLUSTER_DISABLED_SUFFIX,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::SimError;
use crate::store::Keyspace;

#[derive(Debug, Default)]
struct SimNode {
    keyspace: Keyspace,
    up: bool,
    served: u64,
}

#[derive(Debug)]
struct ClusterState {
    nodes: BTreeMap<NodeAddress, SimNode>,
    owners: Vec<Option<NodeAddress>>,
    /// Slot -> node importing it
    migrating: HashMap<u16, NodeAddress>,
    cluster_enabled: bool,
    password: Option<String>,
    topology_queries: u64,
}

impl ClusterState {
    fn node(&self, address: &NodeAddress) -> Result<&SimNode, SimError> {
        self.nodes
            .get(address)
            .ok_or_else(|| SimError::UnknownNode(address.clone()))
    }

    fn ensure_reachable(&self, address: &NodeAddress) -> Result<(), NodeError> {
        match self.nodes.get(address) {
            Some(node) if node.up => Ok(()),
            _ => Err(NodeError::connectivity(ConnectivityKind::Refused, address.clone())),
        }
    }

    fn check_auth(&self, config: &ConnectionConfig) -> Result<(), NodeError> {
        match &self.password {
            Some(expected) if config.password.as_ref() != Some(expected) => {
                Err(NodeError::reply(format!("{}.", AUTH_REQUIRED_PREFIX)))
            }
            _ => Ok(()),
        }
    }

    /// Decide whether `address` may serve `keys` in `slot`
    fn check_route(
        &self,
        address: &NodeAddress,
        slot: u16,
        keys: &[&[u8]],
        asking: bool,
    ) -> Result<(), NodeError> {
        let owner = self.owners[slot as usize]
            .as_ref()
            .ok_or_else(|| NodeError::reply(format!("CLUSTERDOWN Hash slot {} not served", slot)))?;
        let importing = self.migrating.get(&slot);

        if owner == address {
            if let Some(target) = importing {
                let local = self.nodes.get(address).map(|n| &n.keyspace);
                let all_local = local.map_or(false, |ks| keys.iter().all(|k| ks.contains(k)));
                if !all_local {
                    return Err(NodeError::reply(Redirect::ask(slot, target.clone()).to_string()));
                }
            }
            return Ok(());
        }

        if asking && importing == Some(address) {
            return Ok(());
        }
        Err(NodeError::reply(Redirect::moved(slot, owner.clone()).to_string()))
    }

    fn move_keys(
        &mut self,
        from: &NodeAddress,
        to: &NodeAddress,
        pred: impl Fn(&[u8]) -> bool,
    ) -> usize {
        let moved = match self.nodes.get_mut(from) {
            Some(node) => node.keyspace.drain_keys(pred),
            None => return 0,
        };
        let count = moved.len();
        if let Some(node) = self.nodes.get_mut(to) {
            for (key, entry) in moved {
                node.keyspace.insert_entry(key, entry);
            }
        }
        count
    }

    /// Contiguous runs of slots with the same owner
    fn slot_reports(&self) -> Vec<SlotReport> {
        let mut reports = vec![];
        let mut run: Option<(u16, u16, &NodeAddress)> = None;

        for (slot, owner) in self.owners.iter().enumerate() {
            let slot = slot as u16;
            if let (Some(owner), Some((_, end, current))) = (owner, run.as_mut()) {
                if *current == owner {
                    *end = slot;
                    continue;
                }
            }
            if let Some((start, end, address)) = run.take() {
                reports.push(SlotReport::new(SlotRange { start, end }, address.clone()));
            }
            run = owner.as_ref().map(|o| (slot, slot, o));
        }
        if let Some((start, end, address)) = run {
            reports.push(SlotReport::new(SlotRange { start, end }, address.clone()));
        }
        reports
    }
}

/// Handle to a simulated cluster; clones share the same nodes
#[derive(Debug, Clone)]
pub struct SimCluster {
    slot_count: u16,
    state: Arc<RwLock<ClusterState>>,
}

impl SimCluster {
    pub fn new(slot_count: u16) -> Self {
        Self {
            slot_count,
            state: Arc::new(RwLock::new(ClusterState {
                nodes: BTreeMap::new(),
                owners: vec![None; slot_count as usize],
                migrating: HashMap::new(),
                cluster_enabled: true,
                password: None,
                topology_queries: 0,
            })),
        }
    }

    /// A cluster whose slot space is split evenly across `addresses`, the
    /// last node taking the remainder
    pub fn balanced(addresses: &[NodeAddress], slot_count: u16) -> Result<Self, SimError> {
        let cluster = Self::new(slot_count);
        if addresses.is_empty() {
            return Ok(cluster);
        }

        let too_many = || SimError::TooManyNodes {
            nodes: addresses.len(),
            slot_count,
        };
        let node_count = u16::try_from(addresses.len()).map_err(|_| too_many())?;
        if node_count > slot_count {
            return Err(too_many());
        }

        let per_node = slot_count / node_count;
        for (i, address) in (0..node_count).zip(addresses) {
            cluster.add_node(address.clone());
            let start = per_node * i;
            let end = if i + 1 == node_count {
                slot_count - 1
            } else {
                start + per_node - 1
            };
            cluster.assign(address, SlotRange::new(start, end, slot_count)?)?;
        }
        Ok(cluster)
    }

    pub fn slot_count(&self) -> u16 {
        self.slot_count
    }

    /// Add an empty node that owns no slots
    pub fn add_node(&self, address: NodeAddress) {
        let mut state = self.state.write();
        state.nodes.entry(address).or_insert_with(|| SimNode {
            up: true,
            ..SimNode::default()
        });
    }

    /// Hand every slot in `range` to `address`. Keys stay where they are.
    pub fn assign(&self, address: &NodeAddress, range: SlotRange) -> Result<(), SimError> {
        let mut state = self.state.write();
        state.node(address)?;
        for slot in range.slots() {
            if let Some(owner) = state.owners.get_mut(slot as usize) {
                *owner = Some(address.clone());
            }
        }
        Ok(())
    }

    pub fn owner_of(&self, slot: u16) -> Option<NodeAddress> {
        self.state.read().owners.get(slot as usize).cloned().flatten()
    }

    pub fn owner_of_key(&self, key: &[u8]) -> Option<NodeAddress> {
        self.owner_of(key_slot(key, self.slot_count))
    }

    /// Mark `slot` as migrating from its owner to `to`
    pub fn begin_migration(&self, slot: u16, to: &NodeAddress) -> Result<(), SimError> {
        let mut state = self.state.write();
        state.node(to)?;
        let owner = state
            .owners
            .get(slot as usize)
            .cloned()
            .flatten()
            .ok_or(SimError::Unowned(slot))?;
        if &owner == to {
            return Err(SimError::AlreadyOwner { slot, owner });
        }
        debug!(slot, from = %owner, to = %to, "Slot migration started");
        state.migrating.insert(slot, to.clone());
        Ok(())
    }

    /// Move one key of a migrating slot to the importing node. Returns
    /// whether the key existed.
    pub fn migrate_key(&self, key: &[u8]) -> Result<bool, SimError> {
        let slot = key_slot(key, self.slot_count);
        let mut state = self.state.write();
        let to = state
            .migrating
            .get(&slot)
            .cloned()
            .ok_or(SimError::NotMigrating(slot))?;
        let from = state.owners[slot as usize]
            .clone()
            .ok_or(SimError::Unowned(slot))?;
        Ok(state.move_keys(&from, &to, |k| k == key) > 0)
    }

    /// Move the remaining keys of `slot` and transfer ownership
    pub fn finish_migration(&self, slot: u16) -> Result<(), SimError> {
        let slot_count = self.slot_count;
        let mut state = self.state.write();
        let to = state
            .migrating
            .remove(&slot)
            .ok_or(SimError::NotMigrating(slot))?;
        let from = state.owners[slot as usize]
            .clone()
            .ok_or(SimError::Unowned(slot))?;
        let moved = state.move_keys(&from, &to, |k| key_slot(k, slot_count) == slot);
        state.owners[slot as usize] = Some(to.clone());
        info!(slot, from = %from, to = %to, keys = moved, "Slot migrated");
        Ok(())
    }

    /// Migrate `slot` to `to` in one step
    pub fn move_slot(&self, slot: u16, to: &NodeAddress) -> Result<(), SimError> {
        self.begin_migration(slot, to)?;
        self.finish_migration(slot)
    }

    /// Take `from` down and promote `to` to owner of its slots and data
    pub fn fail_over(&self, from: &NodeAddress, to: &NodeAddress) -> Result<(), SimError> {
        let mut state = self.state.write();
        state.node(from)?;
        state.node(to)?;

        let mut slots = 0;
        for owner in state.owners.iter_mut() {
            if owner.as_ref() == Some(from) {
                *owner = Some(to.clone());
                slots += 1;
            }
        }
        state.migrating.retain(|_, target| target != from);
        state.move_keys(from, to, |_| true);
        if let Some(node) = state.nodes.get_mut(from) {
            node.up = false;
        }
        info!(from = %from, to = %to, slots, "Node failed over");
        Ok(())
    }

    /// Stop (`false`) or restart (`true`) a node without touching the layout
    pub fn set_reachable(&self, address: &NodeAddress, up: bool) -> Result<(), SimError> {
        let mut state = self.state.write();
        let node = state
            .nodes
            .get_mut(address)
            .ok_or_else(|| SimError::UnknownNode(address.clone()))?;
        node.up = up;
        Ok(())
    }

    /// Run every node as a standalone server
    pub fn disable_cluster(&self) {
        self.state.write().cluster_enabled = false;
    }

    /// Reject clients whose connection settings lack `password`
    pub fn require_password(&self, password: impl Into<String>) {
        self.state.write().password = Some(password.into());
    }

    pub fn key_count(&self, address: &NodeAddress) -> usize {
        self.state
            .read()
            .nodes
            .get(address)
            .map_or(0, |n| n.keyspace.len())
    }

    /// Commands executed by `address`, redirects excluded
    pub fn served(&self, address: &NodeAddress) -> u64 {
        self.state.read().nodes.get(address).map_or(0, |n| n.served)
    }

    pub fn topology_queries(&self) -> u64 {
        self.state.read().topology_queries
    }

    /// Execute `call` on `address` as that node would
    pub fn handle(
        &self,
        address: &NodeAddress,
        call: &CommandCall,
        asking: bool,
        config: &ConnectionConfig,
    ) -> Result<Value, NodeError> {
        let mut state = self.state.write();
        state.ensure_reachable(address)?;
        state.check_auth(config)?;

        if state.cluster_enabled && call.command.is_keyed() {
            let keys = call_keys(call);
            let slot = self.common_slot(&keys)?;
            state.check_route(address, slot, &keys, asking)?;
        }

        let node = state
            .nodes
            .get_mut(address)
            .ok_or_else(|| NodeError::connectivity(ConnectivityKind::Refused, address.clone()))?;
        node.served += 1;
        node.keyspace.apply(call)
    }

    fn common_slot(&self, keys: &[&[u8]]) -> Result<u16, NodeError> {
        let mut slots = keys.iter().map(|k| key_slot(k, self.slot_count));
        let first = slots.next().unwrap_or(0);
        if slots.any(|s| s != first) {
            return Err(NodeError::reply(
                "CROSSSLOT Keys in request don't hash to the same slot",
            ));
        }
        Ok(first)
    }
}

/// Keys a command touches, in argument order
fn call_keys(call: &CommandCall) -> Vec<&[u8]> {
    match call.command {
        Command::MGet | Command::Del | Command::Exists => {
            call.args.iter().map(Vec::as_slice).collect()
        }
        Command::MSet => call.args.iter().step_by(2).map(Vec::as_slice).collect(),
        _ => call.key().into_iter().collect(),
    }
}

#[async_trait]
impl TopologySource for SimCluster {
    async fn cluster_slots(
        &self,
        config: &ConnectionConfig,
        seed: &NodeAddress,
    ) -> Result<Vec<SlotReport>, NodeError> {
        let mut state = self.state.write();
        state.topology_queries += 1;
        state.ensure_reachable(seed)?;
        state.check_auth(config)?;
        if !state.cluster_enabled {
            return Err(NodeError::reply(format!(
                "ERR This instance has {}",
                CLUSTER_DISABLED_SUFFIX
            )));
        }
        Ok(state.slot_reports())
    }
}
