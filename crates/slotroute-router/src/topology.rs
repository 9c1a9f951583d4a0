//! Topology Manager
//!
//! Keeps the pool's slot table in line with the cluster. Every refresh runs
//! inside one exclusive critical section, so commands observe either the
//! mapping from before a refresh or the one after it, never a mix, and two
//! refreshes never interleave.
//!
//! # Discovery
//!
//! ```text
//! seeds[0] ──ok──► group ranges by node ─► prune + upsert in one pool update
//!    │
//!   err ── cluster disabled ──► standalone fallback (unless forced)
//!    │  ── NOAUTH ────────────► fail immediately
//!    │  ── anything else ─────► next seed
//!    ▼
//! seeds[1] ...                 all seeds failed: mapping untouched
//! ```

use parking_lot::RwLock;
use slotroute_core::{RouterConfig, SeedTarget};
use slotroute_types::{NodeAddress, SlotAssignment};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::RouterError;
use crate::pool::{NodePool, TopologySource};

/// Discovers the cluster layout and applies it to a node pool
pub struct TopologyManager {
    pool: Arc<dyn NodePool>,
    source: Arc<dyn TopologySource>,
    target: SeedTarget,
    slot_count: u16,
    force_cluster_mode: bool,
    /// Current seed snapshot, replaced only while `refresh_lock` is held
    seeds: RwLock<Arc<[NodeAddress]>>,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
}

impl TopologyManager {
    pub fn new(
        config: &RouterConfig,
        pool: Arc<dyn NodePool>,
        source: Arc<dyn TopologySource>,
    ) -> Result<Self, RouterError> {
        config.validate()?;

        let seeds: Arc<[NodeAddress]> = dedup(config.seeds.addresses()).into();
        Ok(Self {
            pool,
            source,
            target: config.seeds.clone(),
            slot_count: config.hash_slot_count,
            force_cluster_mode: config.force_cluster_mode,
            seeds: RwLock::new(seeds),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        })
    }

    /// Snapshot of the seeds the next discovery pass will try
    pub fn seeds(&self) -> Arc<[NodeAddress]> {
        self.seeds.read().clone()
    }

    /// Number of refresh passes started so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn slot_count(&self) -> u16 {
        self.slot_count
    }

    /// Establish or refresh the slot mapping.
    ///
    /// With `force_error` set, a seed reporting disabled cluster support
    /// fails the refresh while cluster mode is forced; otherwise that seed is
    /// skipped. Authentication failures always fail the refresh.
    pub async fn refresh(&self, force_error: bool) -> Result<(), RouterError> {
        let _guard = self.refresh_lock.lock().await;
        let pass = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(pass, force_error, "Topology refresh started");

        match &self.target {
            SeedTarget::Single(address) => {
                let assignment =
                    SlotAssignment::single_node(std::slice::from_ref(address), self.slot_count)?;
                self.apply(&assignment);
                info!(address = %address, "Standalone node mapped to every slot");
            }
            SeedTarget::Cluster(_) => {
                self.discover(force_error).await?;
                self.refresh_seeds();
            }
        }

        Ok(())
    }

    /// Try seeds in order until one answers the topology query
    async fn discover(&self, force_error: bool) -> Result<(), RouterError> {
        let seeds = self.seeds();
        let global = self.pool.global_configuration();

        for seed in seeds.iter() {
            let config = global.for_address(seed);

            let err = match self.source.cluster_slots(&config, seed).await {
                Ok(reports) => {
                    let assignment = SlotAssignment::from_reports(reports);
                    self.apply(&assignment);
                    info!(
                        seed = %seed,
                        nodes = assignment.len(),
                        "Cluster topology refreshed"
                    );
                    return Ok(());
                }
                Err(err) => err,
            };

            if err.is_cluster_disabled() {
                if !self.force_cluster_mode {
                    let assignment =
                        SlotAssignment::single_node(std::slice::from_ref(seed), self.slot_count)?;
                    self.apply(&assignment);
                    info!(seed = %seed, "Cluster support disabled, falling back to standalone mapping");
                    return Ok(());
                }
                if force_error {
                    return Err(RouterError::ClusterDisabled {
                        address: seed.clone(),
                        message: err.to_string(),
                    });
                }
                warn!(seed = %seed, "Cluster support disabled on seed, trying next seed");
                continue;
            }

            if err.is_auth_required() {
                return Err(RouterError::Authentication {
                    address: seed.clone(),
                    message: err.to_string(),
                });
            }

            warn!(seed = %seed, error = %err, "Topology discovery failed, trying next seed");
        }

        warn!(seeds = seeds.len(), "No seed answered the topology query, keeping current mapping");
        Ok(())
    }

    /// Replace the pool's mapping with `assignment` in one step
    fn apply(&self, assignment: &SlotAssignment) {
        self.pool.apply_assignment(assignment);

        let gaps = assignment.uncovered_slots(self.slot_count);
        if !gaps.is_empty() {
            warn!(
                uncovered_ranges = gaps.len(),
                first_gap = %gaps[0],
                "Slot mapping leaves slots without an owner"
            );
        }
    }

    /// Extend the seeds with the pool's current members, keeping order
    fn refresh_seeds(&self) {
        let current = self.seeds();
        let members = self.pool.list_nodes().into_iter().map(|node| node.address);
        let next = dedup(current.iter().cloned().chain(members));

        if next.len() != current.len() {
            debug!(before = current.len(), after = next.len(), "Seed addresses updated");
        }
        *self.seeds.write() = next.into();
    }
}

/// Drop repeated addresses, keeping the first occurrence
fn dedup(addresses: impl IntoIterator<Item = NodeAddress>) -> Vec<NodeAddress> {
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|addr| seen.insert(addr.clone()))
        .collect()
}
