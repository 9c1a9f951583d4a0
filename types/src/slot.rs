//! Hash slots and slot-range assignments
//!
//! Keys map onto a fixed slot space `[0, slot_count)` using CRC16 (XMODEM)
//! with `{hash tag}` support. A discovery pass produces a [`SlotAssignment`]
//! that groups the reported ranges by owning node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{NodeAddress, SlotError};

/// Size of the slot space used by cluster deployments
pub const DEFAULT_HASH_SLOTS: u16 = 16384;

/// Inclusive range of slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    /// Create a range, rejecting `start > end` and slots outside the slot space
    pub fn new(start: u16, end: u16, slot_count: u16) -> Result<Self, SlotError> {
        if start > end || end >= slot_count {
            return Err(SlotError::InvalidRange { start, end, slot_count });
        }
        Ok(Self { start, end })
    }

    /// The range covering the whole slot space
    pub fn full(slot_count: u16) -> Result<Self, SlotError> {
        if slot_count == 0 {
            return Err(SlotError::EmptySlotSpace);
        }
        Ok(Self { start: 0, end: slot_count - 1 })
    }

    pub fn contains(&self, slot: u16) -> bool {
        self.start <= slot && slot <= self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn slots(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// One entry of a cluster-topology answer: a range and the node serving it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotReport {
    pub range: SlotRange,
    pub address: NodeAddress,
}

impl SlotReport {
    pub fn new(range: SlotRange, address: NodeAddress) -> Self {
        Self { range, address }
    }
}

/// Slot ranges grouped by owning node, as reported by a single seed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotAssignment {
    nodes: BTreeMap<NodeAddress, Vec<SlotRange>>,
}

impl SlotAssignment {
    /// Group a topology answer by reporting address
    pub fn from_reports(reports: impl IntoIterator<Item = SlotReport>) -> Self {
        let mut nodes: BTreeMap<NodeAddress, Vec<SlotRange>> = BTreeMap::new();
        for report in reports {
            nodes.entry(report.address).or_default().push(report.range);
        }
        for ranges in nodes.values_mut() {
            ranges.sort();
            ranges.dedup();
        }
        Self { nodes }
    }

    /// Mapping where a single node owns the whole slot space.
    ///
    /// Exactly one address must be supplied.
    pub fn single_node(addresses: &[NodeAddress], slot_count: u16) -> Result<Self, SlotError> {
        let [address] = addresses else {
            return Err(SlotError::NotSingleAddress(addresses.len()));
        };

        let mut nodes = BTreeMap::new();
        nodes.insert(address.clone(), vec![SlotRange::full(slot_count)?]);
        Ok(Self { nodes })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeAddress, &[SlotRange])> {
        self.nodes.iter().map(|(addr, ranges)| (addr, ranges.as_slice()))
    }

    pub fn addresses(&self) -> impl Iterator<Item = &NodeAddress> {
        self.nodes.keys()
    }

    pub fn ranges_of(&self, address: &NodeAddress) -> Option<&[SlotRange]> {
        self.nodes.get(address).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node claiming `slot`, if any
    pub fn owner_of(&self, slot: u16) -> Option<&NodeAddress> {
        self.nodes
            .iter()
            .find(|(_, ranges)| ranges.iter().any(|r| r.contains(slot)))
            .map(|(addr, _)| addr)
    }

    /// Ranges of the slot space no node claims
    pub fn uncovered_slots(&self, slot_count: u16) -> Vec<SlotRange> {
        let mut ranges: Vec<SlotRange> = self.nodes.values().flatten().copied().collect();
        ranges.sort();

        let mut gaps = Vec::new();
        let mut next: u32 = 0;
        for range in ranges {
            if u32::from(range.start) > next {
                gaps.push(SlotRange { start: next as u16, end: range.start - 1 });
            }
            next = next.max(u32::from(range.end) + 1);
        }
        if next < u32::from(slot_count) {
            gaps.push(SlotRange { start: next as u16, end: slot_count - 1 });
        }
        gaps
    }

    pub fn is_complete(&self, slot_count: u16) -> bool {
        self.uncovered_slots(slot_count).is_empty()
    }
}

/// Slot for `key` in a slot space of `slot_count` slots
pub fn key_slot(key: &[u8], slot_count: u16) -> u16 {
    if slot_count == 0 {
        return 0;
    }
    crc16(hash_tag(key)) % slot_count
}

/// Portion of the key that is hashed: the content of the first non-empty
/// `{...}` section, or the whole key
fn hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = key.iter().position(|&b| b == b'{') else {
        return key;
    };
    let rest = &key[open + 1..];
    match rest.iter().position(|&b| b == b'}') {
        Some(close) if close > 0 => &rest[..close],
        _ => key,
    }
}

/// CRC16 (XMODEM polynomial 0x1021)
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
