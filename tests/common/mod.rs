#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shardgraph::graph::{GraphServices, ScopedGraphManager};
use shardgraph::model::{ApplicationScope, Id, Order, SearchByEdgeType};
use shardgraph::store::MemoryColumnStore;
use shardgraph::time::ManualTimeService;
use shardgraph::GraphConfig;

pub const NOW: u64 = 50_000_000;

pub struct TestGraph {
    pub store: Arc<MemoryColumnStore>,
    pub clock: Arc<ManualTimeService>,
    pub services: Arc<GraphServices>,
    pub manager: ScopedGraphManager,
    pub scope: ApplicationScope,
}

pub fn test_config(shard_size: u64) -> GraphConfig {
    GraphConfig {
        shard_size,
        shard_cache_timeout_ms: 1_000,
        shard_min_delta_ms: 2_000,
        shard_repair_chance: 0.0,
        ..Default::default()
    }
}

pub fn make_graph(config: GraphConfig) -> TestGraph {
    let store = Arc::new(MemoryColumnStore::new());
    let clock = Arc::new(ManualTimeService::new(NOW));
    let services = GraphServices::with_time(store.clone(), config, clock.clone()).unwrap();
    let scope = ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap();
    let manager = ScopedGraphManager::new(services.clone(), scope.clone()).unwrap();
    TestGraph { store, clock, services, manager, scope }
}

/// A node created long before `NOW`, so its shards are persisted.
pub fn old_node(id_type: &str) -> Id {
    Id::generate_at(id_type, 1_000).unwrap()
}

pub fn newest_first(node: &Id, edge_type: &str) -> SearchByEdgeType {
    SearchByEdgeType::new(node.clone(), edge_type, u64::MAX, Order::Descending)
}

/// Polls `check` until it holds or five seconds pass.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
