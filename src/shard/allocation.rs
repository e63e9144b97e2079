//! Shard allocation
//!
//! Resolves the shard groups of a meta key and decides when a shard splits.
//!
//! A split is considered only for a group in steady state (one shard) whose
//! shard is older than `now - min_delta` and whose approximate count reached
//! `shard_size`. The shard is then scanned oldest to newest while a window of
//! the last `shard_size` timestamps is kept; the window's front is the edge at
//! position `count - shard_size`, which becomes the new shard's index. The new
//! shard therefore starts out holding `shard_size` edges at most, close to the
//! current head of the row, and older ranges are left alone.
//!
//! Complexity: O(n) store reads over the shard row, O(shard_size) memory.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::GraphConfig;
use crate::error::Result;
use crate::model::{group_shards, ApplicationScope, DirectedEdgeMeta, Shard, ShardEntryGroup, MIN_SHARD};
use crate::serialization::{EdgeColumnFamilies, ShardedEdgeSerialization};
use crate::store::ColumnStore;
use crate::time::TimeService;

use super::EdgeShardSerialization;

pub struct NodeShardAllocation {
    shard_serialization: Arc<EdgeShardSerialization>,
    sharded_edges: Arc<ShardedEdgeSerialization>,
    store: Arc<dyn ColumnStore>,
    time: Arc<dyn TimeService>,
    config: Arc<GraphConfig>,
}

impl NodeShardAllocation {
    pub fn new(
        shard_serialization: Arc<EdgeShardSerialization>,
        sharded_edges: Arc<ShardedEdgeSerialization>,
        store: Arc<dyn ColumnStore>,
        time: Arc<dyn TimeService>,
        config: Arc<GraphConfig>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { shard_serialization, sharded_edges, store, time, config })
    }

    /// Shard groups for `meta`, newest first.
    pub fn get_shards(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) -> Result<Vec<ShardEntryGroup>> {
        let delta = self.config.shard_min_delta_ms;
        if self.is_new_node(meta) {
            tracing::trace!(?meta, "new node, skipping shard lookup");
            return Ok(vec![ShardEntryGroup::single(MIN_SHARD, delta)]);
        }

        let mut shards = self.shard_serialization.get_shard_meta_data(scope, meta)?;
        if shards.is_empty() {
            let batch = self
                .shard_serialization
                .write_shard_meta(scope, &MIN_SHARD, meta)?
                .with_consistency(self.config.write_consistency);
            self.store.execute(batch)?;
            tracing::debug!(?meta, "persisted min shard");
            shards.push(MIN_SHARD);
        } else if !shards.iter().any(Shard::is_min_shard) {
            shards.push(MIN_SHARD);
        }

        Ok(group_shards(shards, delta))
    }

    /// Splits the group's shard if it is full. Returns true when a shard was created.
    pub fn audit_shard(
        &self,
        scope: &ApplicationScope,
        group: &ShardEntryGroup,
        meta: &DirectedEdgeMeta,
    ) -> Result<bool> {
        if group.is_compaction_pending() {
            return Ok(false);
        }
        if self.is_new_node(meta) {
            return Ok(false);
        }

        let shard = group.min_shard();
        let min_time = self.min_time();
        if shard.created_time() >= min_time {
            tracing::trace!(?shard, min_time, "shard too young to split");
            return Ok(false);
        }

        let shard_size = self.config.shard_size;
        let count = self.sharded_edges.approximation().get_count(scope, &shard, meta);
        if count < shard_size {
            return Ok(false);
        }

        let storage = EdgeColumnFamilies::storage();
        let mut window: VecDeque<u64> = VecDeque::with_capacity(shard_size.min(1 << 20) as usize);
        let mut total: u64 = 0;
        for edge in self
            .sharded_edges
            .scan_shard_from(&storage, scope, meta, &shard, shard.index())
        {
            let edge = edge?;
            total += 1;
            window.push_back(edge.timestamp);
            if window.len() as u64 > shard_size {
                window.pop_front();
            }
        }

        if total < shard_size {
            tracing::debug!(?meta, count, total, "approximate count ahead of stored edges");
            return Ok(false);
        }
        let pivot = match window.front() {
            Some(pivot) => *pivot,
            None => return Ok(false),
        };
        if pivot <= shard.index() {
            tracing::debug!(?meta, pivot, "pivot does not advance past current shard");
            return Ok(false);
        }

        let now = self.time.current_time_millis();
        let new_shard = Shard::new(pivot, now, false);
        let batch = self
            .shard_serialization
            .write_shard_meta(scope, &new_shard, meta)?
            .with_consistency(self.config.write_consistency);
        self.store.execute(batch)?;

        tracing::info!(?meta, ?new_shard, total, "allocated new shard");
        Ok(true)
    }

    /// Shards created after this time are too young to split.
    pub fn min_time(&self) -> u64 {
        self.time
            .current_time_millis()
            .saturating_sub(self.config.shard_min_delta_ms)
    }

    /// True when every node of `meta` was created inside the new-node window.
    pub fn is_new_node(&self, meta: &DirectedEdgeMeta) -> bool {
        let window_start = self
            .time
            .current_time_millis()
            .saturating_sub(self.config.new_node_window_ms());
        meta.nodes()
            .iter()
            .all(|node| matches!(node.created_millis(), Some(created) if created > window_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Id, MarkedEdge};
    use crate::shard::NodeShardApproximation;
    use crate::store::{ConsistencyLevel, MemoryColumnStore, MutationBatch};
    use crate::time::ManualTimeService;

    const NOW: u64 = 10_000_000;

    struct Fixture {
        store: Arc<MemoryColumnStore>,
        allocation: NodeShardAllocation,
        sharded: Arc<ShardedEdgeSerialization>,
        shards: Arc<EdgeShardSerialization>,
        clock: Arc<ManualTimeService>,
        scope: ApplicationScope,
    }

    fn make_fixture(shard_size: u64) -> Fixture {
        let store = Arc::new(MemoryColumnStore::new());
        let clock = Arc::new(ManualTimeService::new(NOW));
        let config = Arc::new(GraphConfig {
            shard_size,
            scan_page_size: 7,
            shard_cache_timeout_ms: 1_000,
            shard_min_delta_ms: 2_000,
            ..Default::default()
        });
        let sharded = Arc::new(ShardedEdgeSerialization::new(
            store.clone(),
            Arc::new(NodeShardApproximation::new()),
            config.scan_page_size,
            ConsistencyLevel::One,
        ));
        let shards = Arc::new(EdgeShardSerialization::new(store.clone(), 7, ConsistencyLevel::One));
        let allocation = NodeShardAllocation::new(
            shards.clone(),
            sharded.clone(),
            store.clone(),
            clock.clone(),
            config,
        )
        .unwrap();
        Fixture {
            store,
            allocation,
            sharded,
            shards,
            clock,
            scope: ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap(),
        }
    }

    fn write_edges(f: &Fixture, source: &Id, timestamps: impl Iterator<Item = u64>) {
        let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
        let mut batch = MutationBatch::new();
        for ts in timestamps {
            let target = Id::generate_at("post", 1).unwrap();
            let edge = MarkedEdge::new(Edge::new(source.clone(), "likes", target, ts), false);
            f.sharded
                .write_edge(&mut batch, &EdgeColumnFamilies::storage(), &f.scope, &meta, &[MIN_SHARD], &edge);
        }
        f.store.execute(batch).unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store: Arc<MemoryColumnStore> = Arc::new(MemoryColumnStore::new());
        let config = Arc::new(GraphConfig {
            shard_cache_timeout_ms: 1_000,
            shard_min_delta_ms: 1_500,
            ..Default::default()
        });
        let sharded = Arc::new(ShardedEdgeSerialization::new(
            store.clone(),
            Arc::new(NodeShardApproximation::new()),
            10,
            ConsistencyLevel::One,
        ));
        let shards = Arc::new(EdgeShardSerialization::new(store.clone(), 10, ConsistencyLevel::One));
        let result = NodeShardAllocation::new(shards, sharded, store, Arc::new(ManualTimeService::new(NOW)), config);
        assert!(result.is_err());
    }

    #[test]
    fn test_new_node_skips_store() {
        let f = make_fixture(10);
        let node = Id::generate_at("user", NOW - 500).unwrap();
        let meta = DirectedEdgeMeta::from_source(node, "likes");

        let groups = f.allocation.get_shards(&f.scope, &meta).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].read_shards(), &[MIN_SHARD]);
        assert_eq!(f.store.read_count(), 0);
        assert_eq!(f.store.write_count(), 0);
    }

    #[test]
    fn test_versions_meta_needs_both_nodes_new() {
        let f = make_fixture(10);
        let fresh = Id::generate_at("user", NOW - 10).unwrap();
        let old = Id::generate_at("user", 1).unwrap();
        assert!(f.allocation.is_new_node(&DirectedEdgeMeta::from_versions(fresh.clone(), "likes", fresh.clone())));
        assert!(!f.allocation.is_new_node(&DirectedEdgeMeta::from_versions(fresh, "likes", old)));
    }

    #[test]
    fn test_old_node_persists_min_shard() {
        let f = make_fixture(10);
        let meta = DirectedEdgeMeta::from_source(Id::generate_at("user", 1).unwrap(), "likes");

        let groups = f.allocation.get_shards(&f.scope, &meta).unwrap();
        assert_eq!(groups[0].read_shards(), &[MIN_SHARD]);
        assert_eq!(f.shards.get_shard_meta_data(&f.scope, &meta).unwrap(), vec![MIN_SHARD]);
    }

    #[test]
    fn test_audit_splits_at_count_minus_shard_size() {
        let f = make_fixture(100);
        let source = Id::generate_at("user", 1).unwrap();
        let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
        write_edges(&f, &source, 1..=150);

        let group = ShardEntryGroup::single(MIN_SHARD, 2_000);
        assert!(f.allocation.audit_shard(&f.scope, &group, &meta).unwrap());

        let shards = f.shards.get_shard_meta_data(&f.scope, &meta).unwrap();
        // ascending position 150 - 100 = 50 holds timestamp 51
        assert_eq!(shards, vec![Shard::new(51, NOW, false)]);
    }

    #[test]
    fn test_audit_noop_below_threshold() {
        let f = make_fixture(100);
        let source = Id::generate_at("user", 1).unwrap();
        let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
        write_edges(&f, &source, 1..=99);

        let group = ShardEntryGroup::single(MIN_SHARD, 2_000);
        assert!(!f.allocation.audit_shard(&f.scope, &group, &meta).unwrap());
        assert!(f.shards.get_shard_meta_data(&f.scope, &meta).unwrap().is_empty());
    }

    #[test]
    fn test_audit_noop_for_pending_group() {
        let f = make_fixture(10);
        let source = Id::generate_at("user", 1).unwrap();
        let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
        write_edges(&f, &source, 1..=500);

        let mut group = ShardEntryGroup::new(2_000);
        group.add_shard(Shard::new(300, 5, false));
        group.add_shard(MIN_SHARD);
        assert!(!f.allocation.audit_shard(&f.scope, &group, &meta).unwrap());
    }

    #[test]
    fn test_audit_noop_for_young_shard() {
        let f = make_fixture(10);
        let source = Id::generate_at("user", 1).unwrap();
        let meta = DirectedEdgeMeta::from_source(source.clone(), "likes");
        write_edges(&f, &source, 1..=50);

        let young = Shard::new(0, NOW - 100, true);
        let group = ShardEntryGroup::single(young, 2_000);
        assert!(!f.allocation.audit_shard(&f.scope, &group, &meta).unwrap());

        f.clock.advance(5_000);
        let group = ShardEntryGroup::single(MIN_SHARD, 2_000);
        assert!(f.allocation.audit_shard(&f.scope, &group, &meta).unwrap());
    }
}
