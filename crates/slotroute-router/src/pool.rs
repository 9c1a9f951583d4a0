//! Collaborator seams
//!
//! The router owns no connections. Execution and slot bookkeeping belong to
//! a [`NodePool`]; cluster-topology queries go through a [`TopologySource`].

use async_trait::async_trait;
use slotroute_core::ConnectionConfig;
use slotroute_types::{NodeAddress, NodeError, SlotAssignment, SlotRange, SlotReport, Value};
use std::collections::HashSet;

use crate::types::{CommandCall, NodeDescriptor, RedirectHint};

/// Slot-aware set of node clients
#[async_trait]
pub trait NodePool: Send + Sync {
    /// Run `call` on the node the hint and the slot table select
    async fn execute(&self, call: &CommandCall, hint: &RedirectHint) -> Result<Value, NodeError>;

    /// Insert a node or replace its slot ranges; repeated calls for the same
    /// address update the existing entry
    fn add_or_update_node(&self, address: &NodeAddress, ranges: &[SlotRange]);

    /// Forget every node whose address is not in `addresses`
    fn retain_only(&self, addresses: &HashSet<NodeAddress>);

    /// Make `assignment` the whole mapping: prune nodes it does not name,
    /// then upsert the ones it does.
    ///
    /// Commands running meanwhile must see the old mapping or the new one.
    /// The default goes through [`retain_only`](Self::retain_only) and
    /// [`add_or_update_node`](Self::add_or_update_node) step by step, so a
    /// pool serving commands during refreshes overrides it with a single
    /// locked update.
    fn apply_assignment(&self, assignment: &SlotAssignment) {
        let keep: HashSet<NodeAddress> = assignment.addresses().cloned().collect();
        self.retain_only(&keep);
        for (address, ranges) in assignment.iter() {
            self.add_or_update_node(address, ranges);
        }
    }

    fn list_nodes(&self) -> Vec<NodeDescriptor>;

    /// Settings used to open ad-hoc discovery connections
    fn global_configuration(&self) -> ConnectionConfig;
}

/// Answers cluster-topology queries against a single node
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Ask `seed`, connected with `config`, for the cluster's slot layout
    async fn cluster_slots(
        &self,
        config: &ConnectionConfig,
        seed: &NodeAddress,
    ) -> Result<Vec<SlotReport>, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotroute_core::SlotTable;

    /// Pool relying on the provided `apply_assignment`
    struct StepwisePool {
        table: SlotTable,
    }

    #[async_trait]
    impl NodePool for StepwisePool {
        async fn execute(&self, _call: &CommandCall, _hint: &RedirectHint) -> Result<Value, NodeError> {
            Ok(Value::Nil)
        }

        fn add_or_update_node(&self, address: &NodeAddress, ranges: &[SlotRange]) {
            self.table.add_or_update_node(address, ranges);
        }

        fn retain_only(&self, addresses: &HashSet<NodeAddress>) {
            self.table.retain_only(addresses);
        }

        fn list_nodes(&self) -> Vec<NodeDescriptor> {
            vec![]
        }

        fn global_configuration(&self) -> ConnectionConfig {
            ConnectionConfig::default()
        }
    }

    #[test]
    fn test_default_apply_prunes_then_upserts() {
        let pool = StepwisePool { table: SlotTable::new(16) };
        let addr = |port| NodeAddress::new("127.0.0.1", port);
        pool.add_or_update_node(&addr(7009), &[SlotRange { start: 0, end: 15 }]);

        pool.apply_assignment(&SlotAssignment::from_reports(vec![
            SlotReport::new(SlotRange { start: 0, end: 7 }, addr(7000)),
            SlotReport::new(SlotRange { start: 8, end: 15 }, addr(7001)),
        ]));

        assert_eq!(pool.table.addresses(), vec![addr(7000), addr(7001)]);
        assert!(pool.table.is_fully_covered());
    }
}
