//! Reclaiming empty shards
//!
//! Best effort: checks run on the background pool and a full pool simply
//! means the group is looked at again on a later read.

use std::sync::Arc;

use crate::config::GraphConfig;
use crate::iter::BoxedIter;
use crate::model::{ApplicationScope, DirectedEdgeMeta, MarkedEdge, Shard, ShardEntryGroup};
use crate::store::{ColumnStore, MutationBatch};
use crate::time::TimeService;

use super::{EdgeShardSerialization, NodeShardCache, TaskExecutor, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    NotChecked,
    CompactionPending,
    TooNew,
    ContainsEdges,
    Deleted,
    NoOp,
}

pub struct ShardGroupDeletion {
    store: Arc<dyn ColumnStore>,
    shard_serialization: Arc<EdgeShardSerialization>,
    cache: Arc<NodeShardCache>,
    executor: Arc<TaskExecutor>,
    time: Arc<dyn TimeService>,
    config: Arc<GraphConfig>,
}

impl ShardGroupDeletion {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        shard_serialization: Arc<EdgeShardSerialization>,
        cache: Arc<NodeShardCache>,
        executor: Arc<TaskExecutor>,
        time: Arc<dyn TimeService>,
        config: Arc<GraphConfig>,
    ) -> Arc<Self> {
        Arc::new(Self { store, shard_serialization, cache, executor, time, config })
    }

    /// Deletes the group's shards when they hold no edges.
    ///
    /// `edges` must walk every shard of the group without time bounds.
    pub fn maybe_delete_shard(
        self: &Arc<Self>,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        group: &ShardEntryGroup,
        edges: BoxedIter<MarkedEdge>,
    ) -> TaskHandle<DeleteResult> {
        let this = self.clone();
        let (scope, meta, group) = (scope.clone(), meta.clone(), group.clone());
        match self.executor.submit(move || this.check_and_delete(&scope, &meta, &group, edges)) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "shard deletion check rejected");
                TaskHandle::ready(DeleteResult::NotChecked)
            }
        }
    }

    fn check_and_delete(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        group: &ShardEntryGroup,
        mut edges: BoxedIter<MarkedEdge>,
    ) -> DeleteResult {
        if group.is_compaction_pending() {
            return DeleteResult::CompactionPending;
        }
        if group.is_new(self.time.current_time_millis()) {
            return DeleteResult::TooNew;
        }
        match edges.next() {
            Some(Ok(_)) => return DeleteResult::ContainsEdges,
            Some(Err(e)) => {
                tracing::error!(?meta, error = %e, "could not scan shard group before deletion");
                return DeleteResult::NoOp;
            }
            None => {}
        }

        let candidates: Vec<Shard> = group
            .read_shards()
            .iter()
            .copied()
            .filter(|s| !s.is_min_shard())
            .collect();
        if let Some(open) = candidates.iter().find(|s| !s.is_compacted()) {
            tracing::error!(?meta, shard = ?open, "uncompacted shard in an empty steady group, aborting deletion");
            return DeleteResult::NoOp;
        }
        if candidates.is_empty() {
            return DeleteResult::NoOp;
        }

        let mut batch = MutationBatch::new().with_consistency(self.config.write_consistency);
        for shard in &candidates {
            batch.merge(self.shard_serialization.remove_shard_meta(scope, shard, meta));
        }
        if let Err(e) = self.store.execute(batch) {
            tracing::error!(?meta, error = %e, "failed to delete shards");
            return DeleteResult::NoOp;
        }
        self.cache.invalidate(scope, meta);
        tracing::info!(?meta, shards = ?candidates, "deleted empty shards");
        DeleteResult::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::model::{Edge, Id, MIN_SHARD};
    use crate::serialization::ShardedEdgeSerialization;
    use crate::shard::{NodeShardAllocation, NodeShardApproximation};
    use crate::store::{ConsistencyLevel, MemoryColumnStore};
    use crate::time::ManualTimeService;

    const NOW: u64 = 10_000_000;

    struct Fixture {
        store: Arc<MemoryColumnStore>,
        deletion: Arc<ShardGroupDeletion>,
        shards: Arc<EdgeShardSerialization>,
        executor: Arc<TaskExecutor>,
        scope: ApplicationScope,
        meta: DirectedEdgeMeta,
    }

    fn make_fixture(queue_size: usize) -> Fixture {
        let store = Arc::new(MemoryColumnStore::new());
        let clock = Arc::new(ManualTimeService::new(NOW));
        let config = Arc::new(GraphConfig {
            shard_cache_timeout_ms: 1_000,
            shard_min_delta_ms: 2_000,
            ..Default::default()
        });
        let shards = Arc::new(EdgeShardSerialization::new(store.clone(), 4, ConsistencyLevel::One));
        let sharded = Arc::new(ShardedEdgeSerialization::new(
            store.clone(),
            Arc::new(NodeShardApproximation::new()),
            4,
            ConsistencyLevel::One,
        ));
        let allocation = Arc::new(
            NodeShardAllocation::new(shards.clone(), sharded, store.clone(), clock.clone(), config.clone()).unwrap(),
        );
        let cache = Arc::new(NodeShardCache::new(allocation, clock.clone(), &config));
        let executor = Arc::new(TaskExecutor::new("deletion-test", 1, queue_size).unwrap());
        let deletion = ShardGroupDeletion::new(store.clone(), shards.clone(), cache, executor.clone(), clock, config);
        Fixture {
            store,
            deletion,
            shards,
            executor,
            scope: ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap(),
            meta: DirectedEdgeMeta::from_source(Id::generate_at("user", 1).unwrap(), "likes"),
        }
    }

    fn no_edges() -> BoxedIter<MarkedEdge> {
        Box::new(std::iter::empty())
    }

    fn one_edge(f: &Fixture) -> BoxedIter<MarkedEdge> {
        let source = f.meta.nodes()[0].clone();
        let edge = MarkedEdge::new(Edge::new(source, "likes", Id::generate_at("post", 1).unwrap(), 3), false);
        Box::new(vec![Ok(edge)].into_iter())
    }

    #[test]
    fn test_empty_compacted_shard_is_deleted() {
        let f = make_fixture(4);
        let old = Shard::new(100, NOW - 10_000, true);
        f.store
            .execute(f.shards.write_shard_meta(&f.scope, &old, &f.meta).unwrap())
            .unwrap();

        let group = ShardEntryGroup::single(old, 2_000);
        let result = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, no_edges()).wait().unwrap();
        assert_eq!(result, DeleteResult::Deleted);
        assert!(f.shards.get_shard_meta_data(&f.scope, &f.meta).unwrap().is_empty());
    }

    #[test]
    fn test_group_with_edges_is_kept() {
        let f = make_fixture(4);
        let group = ShardEntryGroup::single(Shard::new(100, NOW - 10_000, true), 2_000);
        let result = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, one_edge(&f)).wait().unwrap();
        assert_eq!(result, DeleteResult::ContainsEdges);
    }

    #[test]
    fn test_pending_group_never_touched() {
        let f = make_fixture(4);
        let mut group = ShardEntryGroup::new(2_000);
        group.add_shard(Shard::new(100, NOW - 10_000, false));
        group.add_shard(MIN_SHARD);
        let result = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, no_edges()).wait().unwrap();
        assert_eq!(result, DeleteResult::CompactionPending);
    }

    #[test]
    fn test_young_group_is_too_new() {
        let f = make_fixture(4);
        let group = ShardEntryGroup::single(Shard::new(100, NOW - 10, true), 2_000);
        let result = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, no_edges()).wait().unwrap();
        assert_eq!(result, DeleteResult::TooNew);
    }

    #[test]
    fn test_min_shard_alone_is_noop() {
        let f = make_fixture(4);
        let group = ShardEntryGroup::single(MIN_SHARD, 2_000);
        let result = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, no_edges()).wait().unwrap();
        assert_eq!(result, DeleteResult::NoOp);
    }

    #[test]
    fn test_uncompacted_single_shard_aborts() {
        let f = make_fixture(4);
        let group = ShardEntryGroup::single(Shard::new(100, NOW - 10_000, false), 2_000);
        let result = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, no_edges()).wait().unwrap();
        assert_eq!(result, DeleteResult::NoOp);
    }

    #[test]
    fn test_saturated_pool_is_not_checked() {
        let f = make_fixture(1);
        let old = Shard::new(100, NOW - 10_000, true);
        f.store
            .execute(f.shards.write_shard_meta(&f.scope, &old, &f.meta).unwrap())
            .unwrap();

        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
        let blocker = f
            .executor
            .submit(move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
        started_rx.recv().unwrap();
        let queued = f.executor.submit(|| ()).unwrap();

        let group = ShardEntryGroup::single(old, 2_000);
        let handle = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, no_edges());
        assert!(handle.is_ready());
        assert_eq!(handle.wait().unwrap(), DeleteResult::NotChecked);

        release_tx.send(()).unwrap();
        blocker.wait().unwrap();
        queued.wait().unwrap();
        assert_eq!(f.shards.get_shard_meta_data(&f.scope, &f.meta).unwrap(), vec![old]);
    }

    #[test]
    fn test_scan_error_is_noop() {
        let f = make_fixture(4);
        let group = ShardEntryGroup::single(Shard::new(100, NOW - 10_000, true), 2_000);
        let failing: BoxedIter<MarkedEdge> = Box::new(vec![Err(GraphError::Connection("down".into()))].into_iter());
        let result = f.deletion.maybe_delete_shard(&f.scope, &f.meta, &group, failing).wait().unwrap();
        assert_eq!(result, DeleteResult::NoOp);
    }
}
