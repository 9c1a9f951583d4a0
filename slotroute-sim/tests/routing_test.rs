//! End-to-end routing tests against the simulated cluster
//!
//! These tests drive the real router, topology manager and slot table
//! through a cluster whose layout changes underneath them.

use slotroute_core::{ConnectionConfig, RouterConfig, SeedTarget};
use slotroute_router::{CommandRouter, RouterError};
use slotroute_sim::{SimCluster, SimPool};
use slotroute_types::{key_slot, NodeAddress, Value, DEFAULT_HASH_SLOTS};
use std::sync::Arc;
use tracing::info;

/// Initialize tracing for tests
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn addr(port: u16) -> NodeAddress {
    NodeAddress::new("127.0.0.1", port)
}

fn nodes() -> Vec<NodeAddress> {
    vec![addr(7000), addr(7001), addr(7002)]
}

fn config(seeds: Vec<NodeAddress>) -> RouterConfig {
    let mut config = RouterConfig::with_seeds(SeedTarget::Cluster(seeds));
    config.backoff_ms = 1;
    config
}

struct Harness {
    cluster: SimCluster,
    pool: Arc<SimPool>,
    router: Arc<CommandRouter>,
}

async fn start(cluster: SimCluster, config: RouterConfig, conn: ConnectionConfig) -> Result<Harness, RouterError> {
    let pool = Arc::new(SimPool::new(cluster.clone(), conn));
    let router = CommandRouter::connect(config, pool.clone(), Arc::new(cluster.clone())).await?;
    Ok(Harness {
        cluster,
        pool,
        router: Arc::new(router),
    })
}

async fn three_node_harness() -> Harness {
    init_tracing();
    let cluster = SimCluster::balanced(&nodes(), DEFAULT_HASH_SLOTS).unwrap();
    start(cluster, config(vec![addr(7000)]), ConnectionConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_commands_land_on_slot_owners() {
    let h = three_node_harness().await;

    for i in 0..30 {
        let key = format!("user:{}", i);
        assert_eq!(h.router.set([key.clone(), i.to_string()]).await.unwrap(), Some(Value::Ok));
    }

    let total: usize = nodes().iter().map(|n| h.cluster.key_count(n)).sum();
    assert_eq!(total, 30);
    assert!(nodes().iter().all(|n| h.cluster.key_count(n) > 0));

    // every write went straight to its owner
    assert_eq!(h.pool.attempts(), 30);
    assert_eq!(h.router.topology().refresh_count(), 1);
    assert!(h.pool.table().is_fully_covered());

    assert_eq!(
        h.router.get(["user:7"]).await.unwrap(),
        Some(Value::bulk("7"))
    );
}

#[tokio::test]
async fn test_seeds_grow_to_discovered_nodes() {
    let h = three_node_harness().await;

    let seeds = h.router.topology().seeds();
    assert_eq!(seeds.to_vec(), nodes());
}

#[tokio::test]
async fn test_moved_after_reshard_refreshes_once() {
    let h = three_node_harness().await;
    h.router.set(["user:1", "alice"]).await.unwrap();

    let slot = key_slot(b"user:1", DEFAULT_HASH_SLOTS);
    let owner = h.cluster.owner_of(slot).unwrap();
    let next = nodes().into_iter().find(|n| *n != owner).unwrap();
    h.cluster.move_slot(slot, &next).unwrap();
    info!(slot, from = %owner, to = %next, "Slot moved behind the router");

    let refreshes = h.router.topology().refresh_count();
    assert_eq!(h.router.get(["user:1"]).await.unwrap(), Some(Value::bulk("alice")));

    assert_eq!(h.router.topology().refresh_count(), refreshes + 1);
    assert_eq!(h.pool.table().owner_of(slot), Some(next));
}

#[tokio::test]
async fn test_ask_during_migration_needs_no_refresh() {
    let h = three_node_harness().await;
    h.router.set(["{cart}:1", "apple"]).await.unwrap();
    h.router.set(["{cart}:2", "pear"]).await.unwrap();

    let slot = key_slot(b"{cart}:1", DEFAULT_HASH_SLOTS);
    let owner = h.cluster.owner_of(slot).unwrap();
    let importing = nodes().into_iter().find(|n| *n != owner).unwrap();
    h.cluster.begin_migration(slot, &importing).unwrap();
    assert!(h.cluster.migrate_key(b"{cart}:1").unwrap());

    let refreshes = h.router.topology().refresh_count();
    let served = h.cluster.served(&importing);

    // moved key: owner answers ASK, importing node serves it
    assert_eq!(h.router.get(["{cart}:1"]).await.unwrap(), Some(Value::bulk("apple")));
    // key still on the owner: served directly
    assert_eq!(h.router.get(["{cart}:2"]).await.unwrap(), Some(Value::bulk("pear")));

    assert_eq!(h.router.topology().refresh_count(), refreshes);
    assert_eq!(h.cluster.served(&importing), served + 1);
    // the ASK did not change the client's idea of the owner
    assert_eq!(h.pool.table().owner_of(slot), Some(owner));

    h.cluster.finish_migration(slot).unwrap();
    assert_eq!(h.router.get(["{cart}:2"]).await.unwrap(), Some(Value::bulk("pear")));
    assert_eq!(h.pool.table().owner_of(slot), Some(importing));
}

#[tokio::test]
async fn test_failover_recovers_reads() {
    let h = three_node_harness().await;
    h.router.set(["user:5", "eve"]).await.unwrap();

    let down = h.cluster.owner_of_key(b"user:5").unwrap();
    let standby = nodes().into_iter().find(|n| *n != down).unwrap();
    h.cluster.fail_over(&down, &standby).unwrap();

    assert_eq!(h.router.get(["user:5"]).await.unwrap(), Some(Value::bulk("eve")));

    // once the layout is reloaded the dead node is gone from the pool
    h.router.reload().await.unwrap();
    assert!(!h.pool.table().addresses().contains(&down));
    assert!(h.pool.table().is_fully_covered());
}

#[tokio::test]
async fn test_all_nodes_down_exhausts_budget() {
    init_tracing();
    let cluster = SimCluster::balanced(&nodes(), DEFAULT_HASH_SLOTS).unwrap();
    let mut config = config(nodes());
    config.request_retry_budget = 4;
    let h = start(cluster, config, ConnectionConfig::default()).await.unwrap();

    for node in nodes() {
        h.cluster.set_reachable(&node, false).unwrap();
    }

    assert_eq!(h.router.get(["user:1"]).await.unwrap(), None);
    assert_eq!(h.pool.attempts(), 4);
}

#[tokio::test]
async fn test_unreachable_seeds_are_skipped() {
    init_tracing();
    let cluster = SimCluster::balanced(&nodes(), DEFAULT_HASH_SLOTS).unwrap();
    cluster.set_reachable(&addr(7000), false).unwrap();

    let h = start(cluster, config(vec![addr(7000), addr(7001)]), ConnectionConfig::default())
        .await
        .unwrap();

    assert_eq!(h.cluster.topology_queries(), 2);
    assert_eq!(h.pool.table().node_count(), 3);
}

#[tokio::test]
async fn test_standalone_fallback() {
    init_tracing();
    let cluster = SimCluster::balanced(&[addr(6379)], DEFAULT_HASH_SLOTS).unwrap();
    cluster.disable_cluster();

    let mut config = config(vec![addr(6379)]);
    config.force_cluster_mode = false;
    let h = start(cluster, config, ConnectionConfig::default()).await.unwrap();

    assert_eq!(h.pool.table().addresses(), vec![addr(6379)]);
    assert!(h.pool.table().is_fully_covered());
    h.router.sadd(["tags", "rust", "async"]).await.unwrap();
    assert_eq!(h.router.exists(["tags"]).await.unwrap(), Some(Value::Int(1)));
}

#[tokio::test]
async fn test_forced_cluster_mode_rejects_standalone() {
    init_tracing();
    let cluster = SimCluster::balanced(&[addr(6379)], DEFAULT_HASH_SLOTS).unwrap();
    cluster.disable_cluster();

    let result = start(cluster, config(vec![addr(6379)]), ConnectionConfig::default()).await;
    assert!(matches!(
        result,
        Err(RouterError::ClusterDisabled { address, .. }) if address == addr(6379)
    ));
}

#[tokio::test]
async fn test_authentication_is_required() {
    init_tracing();
    let cluster = SimCluster::balanced(&nodes(), DEFAULT_HASH_SLOTS).unwrap();
    cluster.require_password("s3cret");

    let result = start(cluster.clone(), config(nodes()), ConnectionConfig::default()).await;
    assert!(matches!(result, Err(RouterError::Authentication { .. })));
    // the first seed's answer is final
    assert_eq!(cluster.topology_queries(), 1);

    let conn = ConnectionConfig {
        password: Some("s3cret".to_string()),
        ..ConnectionConfig::default()
    };
    let h = start(cluster, config(nodes()), conn).await.unwrap();
    assert_eq!(h.router.incr(["visits"]).await.unwrap(), Some(Value::Int(1)));
}

#[tokio::test]
async fn test_cross_slot_is_a_command_error() {
    let h = three_node_harness().await;

    let err = h.router.mset(["a", "1", "b", "2"]).await.unwrap_err();
    assert!(matches!(err, RouterError::Command(msg) if msg.starts_with("CROSSSLOT")));

    // hash tags keep related keys together
    h.router.mset(["{u1}:name", "ann", "{u1}:mail", "ann@x"]).await.unwrap();
    assert_eq!(
        h.router.mget(["{u1}:name", "{u1}:mail"]).await.unwrap(),
        Some(Value::Array(vec![Value::bulk("ann"), Value::bulk("ann@x")]))
    );
}

#[tokio::test]
async fn test_concurrent_readers_after_reshard() {
    let h = three_node_harness().await;
    h.router.set(["hot", "1"]).await.unwrap();

    let slot = key_slot(b"hot", DEFAULT_HASH_SLOTS);
    let owner = h.cluster.owner_of(slot).unwrap();
    let next = nodes().into_iter().find(|n| *n != owner).unwrap();
    h.cluster.move_slot(slot, &next).unwrap();

    let refreshes = h.router.topology().refresh_count();
    let mut handles = vec![];
    for _ in 0..16 {
        let router = h.router.clone();
        handles.push(tokio::spawn(async move { router.get(["hot"]).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Some(Value::bulk("1")));
    }

    let extra = h.router.topology().refresh_count() - refreshes;
    assert!((1..=16).contains(&extra));
}

#[tokio::test]
async fn test_named_commands() {
    let h = three_node_harness().await;

    h.router.execute_named("rpush", ["jobs", "a", "b"]).await.unwrap();
    assert_eq!(
        h.router.execute_named("LRANGE", ["jobs", "0", "-1"]).await.unwrap(),
        Some(Value::Array(vec![Value::bulk("a"), Value::bulk("b")]))
    );
    assert!(matches!(
        h.router.execute_named("FLUSHALL", Vec::<Vec<u8>>::new()).await,
        Err(RouterError::UnknownCommand(_))
    ));
}
