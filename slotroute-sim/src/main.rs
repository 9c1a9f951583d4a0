//! slotroute Sim - Demo entry point
//!
//! Starts a simulated cluster, routes commands through it and reshapes the
//! cluster while the router is running.

use anyhow::Context;
use slotroute_core::{ConnectionConfig, RouterConfig};
use slotroute_router::CommandRouter;
use slotroute_sim::{SimCluster, SimPool};
use slotroute_types::{key_slot, NodeAddress};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration from environment
    let config = RouterConfig::from_env().context("invalid router configuration")?;
    let cluster_mode = config.seeds.is_cluster();
    let seeds = config.seeds.addresses();

    // Simulated nodes live at the seed addresses. A lone cluster seed gets
    // two neighbours so there is somewhere to redirect to.
    let mut nodes = seeds.clone();
    if let (true, [only]) = (cluster_mode, seeds.as_slice()) {
        for offset in 1..=2 {
            nodes.push(NodeAddress::new(only.host.clone(), only.port.saturating_add(offset)));
        }
        nodes.dedup();
    }
    let cluster = SimCluster::balanced(&nodes, config.hash_slot_count)?;
    if !cluster_mode {
        cluster.disable_cluster();
    }

    let pool = Arc::new(SimPool::new(cluster.clone(), ConnectionConfig::default()));
    let router = CommandRouter::connect(config, pool.clone(), Arc::new(cluster.clone())).await?;
    info!(nodes = pool.table().node_count(), cluster_mode, "Router connected");

    for i in 0..10 {
        router.set([format!("user:{}", i), format!("name-{}", i)]).await?;
    }
    router.rpush(["{queue}:jobs", "a", "b", "c"]).await?;
    router.hset(["{queue}:meta", "owner", "demo"]).await?;

    if cluster_mode {
        // Move a slot without telling the router; the next read follows MOVED
        let key = "user:3";
        let slot = key_slot(key.as_bytes(), cluster.slot_count());
        let owner = cluster.owner_of(slot).context("slot has no owner")?;
        if let Some(next) = nodes.iter().find(|a| **a != owner) {
            cluster.move_slot(slot, next)?;
            let value = router.get([key]).await?;
            info!(key, slot, from = %owner, to = %next, ?value, "Read after slot move");
        }

        // Fail the owner of user:5 over to another node
        let key = "user:5";
        let down = cluster.owner_of_key(key.as_bytes()).context("key has no owner")?;
        if let Some(standby) = nodes.iter().find(|a| **a != down) {
            cluster.fail_over(&down, standby)?;
            let value = router.get([key]).await?;
            info!(key, down = %down, standby = %standby, ?value, "Read after failover");
        }
    }

    let jobs = router.lrange(["{queue}:jobs", "0", "-1"]).await?;
    info!(?jobs, "Queue contents");

    info!(
        attempts = pool.attempts(),
        refreshes = router.topology().refresh_count(),
        seeds = router.topology().seeds().len(),
        "Demo finished"
    );

    Ok(())
}
