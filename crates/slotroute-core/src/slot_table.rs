//! Slot table
//!
//! In-memory slot → node table a node pool embeds to route keys. Every slot
//! has at most one owner: assigning a range to a node takes those slots away
//! from whichever node held them before.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use slotroute_types::{key_slot, NodeAddress, SlotAssignment, SlotRange};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A node known to the table and the ranges it currently owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotNode {
    pub address: NodeAddress,
    pub ranges: Vec<SlotRange>,
}

impl SlotNode {
    pub fn owns(&self, slot: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(slot))
    }

    pub fn slot_count(&self) -> usize {
        self.ranges.iter().map(SlotRange::len).sum()
    }
}

#[derive(Debug)]
struct Table {
    nodes: Vec<NodeAddress>,
    /// Index into `nodes` for every slot
    owners: Vec<Option<usize>>,
}

impl Table {
    fn upsert(&mut self, address: &NodeAddress, ranges: &[SlotRange], slot_count: u16) {
        let idx = match self.nodes.iter().position(|a| a == address) {
            Some(idx) => idx,
            None => {
                self.nodes.push(address.clone());
                self.nodes.len() - 1
            }
        };

        for owner in self.owners.iter_mut() {
            if *owner == Some(idx) {
                *owner = None;
            }
        }

        for range in ranges {
            if range.end >= slot_count {
                warn!(
                    address = %address,
                    range = %range,
                    slot_count,
                    "Ignoring slots outside the slot space"
                );
            }
            for slot in range.slots().take_while(|s| *s < slot_count) {
                self.owners[slot as usize] = Some(idx);
            }
        }

        debug!(address = %address, ranges = ranges.len(), "Node upserted");
    }

    fn retain(&mut self, keep: &HashSet<NodeAddress>) {
        let mut remap = Vec::with_capacity(self.nodes.len());
        let mut retained = Vec::with_capacity(self.nodes.len());
        for address in self.nodes.drain(..) {
            if keep.contains(&address) {
                remap.push(Some(retained.len()));
                retained.push(address);
            } else {
                debug!(address = %address, "Node pruned");
                remap.push(None);
            }
        }

        for owner in self.owners.iter_mut() {
            *owner = owner.and_then(|idx| remap[idx]);
        }
        self.nodes = retained;
    }
}

/// Slot table shared between a pool and its topology updates
#[derive(Debug, Clone)]
pub struct SlotTable {
    slot_count: u16,
    table: Arc<RwLock<Table>>,
}

impl SlotTable {
    pub fn new(slot_count: u16) -> Self {
        Self {
            slot_count,
            table: Arc::new(RwLock::new(Table {
                nodes: vec![],
                owners: vec![None; slot_count as usize],
            })),
        }
    }

    pub fn slot_count(&self) -> u16 {
        self.slot_count
    }

    /// Insert a node or replace the ranges of an existing one.
    ///
    /// Upserting the same address twice never creates a second entry.
    pub fn add_or_update_node(&self, address: &NodeAddress, ranges: &[SlotRange]) {
        self.table.write().upsert(address, ranges, self.slot_count);
    }

    /// Drop every node whose address is not in `keep`; their slots become unowned
    pub fn retain_only(&self, keep: &HashSet<NodeAddress>) {
        self.table.write().retain(keep);
    }

    /// Prune to the nodes of `assignment` and upsert each of them under one
    /// write lock. Readers see the table before or after, never in between.
    pub fn replace(&self, assignment: &SlotAssignment) {
        let keep: HashSet<NodeAddress> = assignment.addresses().cloned().collect();

        let mut table = self.table.write();
        table.retain(&keep);
        for (address, ranges) in assignment.iter() {
            table.upsert(address, ranges, self.slot_count);
        }
    }

    /// Owner of `slot`, if any
    pub fn owner_of(&self, slot: u16) -> Option<NodeAddress> {
        let table = self.table.read();
        let idx = (*table.owners.get(slot as usize)?)?;
        table.nodes.get(idx).cloned()
    }

    /// Owner of the slot `key` hashes to
    pub fn node_for_key(&self, key: &[u8]) -> Option<NodeAddress> {
        self.owner_of(key_slot(key, self.slot_count))
    }

    pub fn addresses(&self) -> Vec<NodeAddress> {
        self.table.read().nodes.clone()
    }

    /// Known nodes with the ranges each owns, in insertion order
    pub fn nodes(&self) -> Vec<SlotNode> {
        let table = self.table.read();
        let mut ranges: Vec<Vec<SlotRange>> = vec![vec![]; table.nodes.len()];

        let mut current: Option<(usize, u16, u16)> = None;
        for (slot, owner) in table.owners.iter().enumerate() {
            let slot = slot as u16;
            current = match (current, owner) {
                (Some((idx, start, end)), Some(o)) if idx == *o && end + 1 == slot => {
                    Some((idx, start, slot))
                }
                (prev, owner) => {
                    if let Some((idx, start, end)) = prev {
                        ranges[idx].push(SlotRange { start, end });
                    }
                    owner.map(|o| (o, slot, slot))
                }
            };
        }
        if let Some((idx, start, end)) = current {
            ranges[idx].push(SlotRange { start, end });
        }

        table
            .nodes
            .iter()
            .cloned()
            .zip(ranges)
            .map(|(address, ranges)| SlotNode { address, ranges })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.table.read().nodes.len()
    }

    /// Number of slots with no owner
    pub fn unowned_slots(&self) -> usize {
        self.table.read().owners.iter().filter(|o| o.is_none()).count()
    }

    pub fn is_fully_covered(&self) -> bool {
        self.unowned_slots() == 0
    }
}
