//! Process-wide engine components
//!
//! Everything here is shared by the per-scope managers: one store, one shard
//! cache, one background pool. Built once per store.

use std::sync::Arc;

use crate::config::GraphConfig;
use crate::error::Result;
use crate::model::{ApplicationScope, MarkedEdge};
use crate::serialization::{
    EdgeColumnFamilies, EdgeMetadataSerializationProxy, EdgeMetadataSerializationV1, EdgeMetadataSerializationV2,
    EdgeSerialization, MergedEdgeReader, NodeSerialization, ShardMaintenance, ShardedEdgeSerialization,
};
use crate::shard::{
    EdgeShardSerialization, NoOpShardGroupCompaction, NodeShardAllocation, NodeShardApproximation, NodeShardCache,
    ShardGroupCompaction, ShardGroupCompactionImpl, ShardGroupDeletion, TaskExecutor,
};
use crate::store::{ColumnStore, MutationBatch};
use crate::time::{SystemTimeService, TimeService};

pub struct GraphServices {
    pub store: Arc<dyn ColumnStore>,
    pub config: Arc<GraphConfig>,
    pub time: Arc<dyn TimeService>,
    pub executor: Arc<TaskExecutor>,
    pub shard_serialization: Arc<EdgeShardSerialization>,
    pub sharded_edges: Arc<ShardedEdgeSerialization>,
    pub cache: Arc<NodeShardCache>,
    pub compaction: Arc<dyn ShardGroupCompaction>,
    pub deletion: Arc<ShardGroupDeletion>,
    pub storage: Arc<EdgeSerialization>,
    pub commit_log: Arc<EdgeSerialization>,
    pub merged: Arc<MergedEdgeReader>,
    pub nodes: Arc<NodeSerialization>,
    pub metadata: Arc<EdgeMetadataSerializationProxy>,
}

impl GraphServices {
    pub fn new(store: Arc<dyn ColumnStore>, config: GraphConfig) -> Result<Arc<Self>> {
        Self::with_time(store, config, Arc::new(SystemTimeService))
    }

    pub fn with_time(
        store: Arc<dyn ColumnStore>,
        config: GraphConfig,
        time: Arc<dyn TimeService>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let config = Arc::new(config);
        let page_size = config.scan_page_size;

        let executor = Arc::new(TaskExecutor::new(
            "shard-maintenance",
            config.task_pool_threads,
            config.task_pool_queue_size,
        )?);
        let shard_serialization =
            Arc::new(EdgeShardSerialization::new(store.clone(), page_size, config.read_consistency));
        let sharded_edges = Arc::new(ShardedEdgeSerialization::new(
            store.clone(),
            Arc::new(NodeShardApproximation::new()),
            page_size,
            config.read_consistency,
        ));
        let allocation = Arc::new(NodeShardAllocation::new(
            shard_serialization.clone(),
            sharded_edges.clone(),
            store.clone(),
            time.clone(),
            config.clone(),
        )?);
        let cache = Arc::new(NodeShardCache::new(allocation, time.clone(), &config));

        let compaction: Arc<dyn ShardGroupCompaction> = if config.compaction_enabled {
            Arc::new(ShardGroupCompactionImpl::new(
                store.clone(),
                cache.clone(),
                shard_serialization.clone(),
                sharded_edges.clone(),
                executor.clone(),
                time.clone(),
                config.clone(),
            ))
        } else {
            tracing::info!("shard compaction disabled");
            Arc::new(NoOpShardGroupCompaction)
        };
        let deletion = ShardGroupDeletion::new(
            store.clone(),
            shard_serialization.clone(),
            cache.clone(),
            executor.clone(),
            time.clone(),
            config.clone(),
        );

        let storage = Arc::new(EdgeSerialization::new(
            EdgeColumnFamilies::storage(),
            sharded_edges.clone(),
            cache.clone(),
            Some(ShardMaintenance {
                compaction: compaction.clone(),
                deletion: deletion.clone(),
                companions: vec![EdgeColumnFamilies::commit_log(config.commit_log_ttl())],
            }),
            time.clone(),
            config.clone(),
        ));
        let commit_log = Arc::new(EdgeSerialization::new(
            EdgeColumnFamilies::commit_log(config.commit_log_ttl()),
            sharded_edges.clone(),
            cache.clone(),
            None,
            time.clone(),
            config.clone(),
        ));
        let merged = Arc::new(MergedEdgeReader::new(commit_log.clone(), storage.clone(), config.merge_window()));

        let nodes = Arc::new(NodeSerialization::new(store.clone(), config.max_multiget_rows, config.read_consistency));
        let metadata = Arc::new(EdgeMetadataSerializationProxy::new(
            store.clone(),
            Arc::new(EdgeMetadataSerializationV1::new(store.clone(), page_size, config.read_consistency)),
            Arc::new(EdgeMetadataSerializationV2::new(
                store.clone(),
                page_size,
                config.read_consistency,
                config.metadata_bucket_count,
            )),
            config.merge_window(),
            config.read_consistency,
        )?);

        Ok(Arc::new(Self {
            store,
            config,
            time,
            executor,
            shard_serialization,
            sharded_edges,
            cache,
            compaction,
            deletion,
            storage,
            commit_log,
            merged,
            nodes,
            metadata,
        }))
    }

    pub fn batch(&self) -> MutationBatch {
        MutationBatch::new().with_consistency(self.config.write_consistency)
    }

    /// Writes the edge to the commit log and to storage in one batch.
    pub fn write_edge_columns(
        &self,
        scope: &ApplicationScope,
        edge: &MarkedEdge,
        batch: &mut MutationBatch,
    ) -> Result<()> {
        self.commit_log.write_edge(scope, edge, batch)?;
        self.storage.write_edge(scope, edge, batch)
    }

    /// Removes the edge's columns from the commit log and from storage.
    pub fn delete_edge_columns(
        &self,
        scope: &ApplicationScope,
        edge: &MarkedEdge,
        batch: &mut MutationBatch,
    ) -> Result<()> {
        self.commit_log.delete_edge(scope, edge, batch)?;
        self.storage.delete_edge(scope, edge, batch)
    }
}
