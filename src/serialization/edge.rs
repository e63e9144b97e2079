//! Group-level edge reads and writes
//!
//! Resolves shard groups through the cache, fans writes out to the five row
//! shapes and reads each meta key as a walk over its groups. Inside a group
//! the member shards are read concurrently (first page prefetched in
//! parallel) and merged by `(timestamp, far endpoint)`; duplicates written to
//! several members during a split are collapsed.
//!
//! The storage instance also drives shard maintenance: every fully read group
//! is offered to the compactor, and an empty one to the reclaimer.

use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::GraphConfig;
use crate::error::Result;
use crate::iter::{
    group_spans, BoxedIter, DistinctUntilChanged, GroupSource, OrderedMerge, ShardsColumnIterator, TimeSpan,
};
use crate::model::{
    ApplicationScope, DirectedEdgeMeta, Id, MarkedEdge, Order, SearchByEdge, SearchByEdgeType, SearchByIdType,
    ShardEntryGroup,
};
use crate::shard::{NodeShardCache, ShardGroupCompaction, ShardGroupDeletion};
use crate::store::MutationBatch;
use crate::time::TimeService;

use super::sharded_edge::ShardEdges;
use super::{EdgeColumnFamilies, ShardedEdgeSerialization};

/// Sort order of a meta key's edges: timestamp, then far endpoint.
pub fn edge_comparator(
    meta: &DirectedEdgeMeta,
    order: Order,
) -> impl Fn(&MarkedEdge, &MarkedEdge) -> Ordering + Send + Sync + 'static {
    let meta = meta.clone();
    move |a, b| {
        let ascending = a
            .timestamp
            .cmp(&b.timestamp)
            .then_with(|| meta.other_endpoint(a).cmp(meta.other_endpoint(b)));
        match order {
            Order::Ascending => ascending,
            Order::Descending => ascending.reverse(),
        }
    }
}

/// Identity of one edge version; merges collapse equal keys.
pub type EdgeKey = (Id, String, Id, u64);

pub fn edge_key(edge: &MarkedEdge) -> EdgeKey {
    (edge.source.clone(), edge.edge_type.clone(), edge.target.clone(), edge.timestamp)
}

/// Background maintenance hooks fired by reads of the storage families.
#[derive(Clone)]
pub struct ShardMaintenance {
    pub compaction: Arc<dyn ShardGroupCompaction>,
    pub deletion: Arc<ShardGroupDeletion>,
    /// Other families written to the same shards; a group is only empty when
    /// their rows are empty too.
    pub companions: Vec<EdgeColumnFamilies>,
}

pub struct EdgeSerialization {
    families: EdgeColumnFamilies,
    sharded: Arc<ShardedEdgeSerialization>,
    cache: Arc<NodeShardCache>,
    maintenance: Option<ShardMaintenance>,
    time: Arc<dyn TimeService>,
    config: Arc<GraphConfig>,
}

impl EdgeSerialization {
    pub fn new(
        families: EdgeColumnFamilies,
        sharded: Arc<ShardedEdgeSerialization>,
        cache: Arc<NodeShardCache>,
        maintenance: Option<ShardMaintenance>,
        time: Arc<dyn TimeService>,
        config: Arc<GraphConfig>,
    ) -> Self {
        Self { families, sharded, cache, maintenance, time, config }
    }

    pub fn families(&self) -> &EdgeColumnFamilies {
        &self.families
    }

    /// Adds the edge to the write shards of all five row shapes.
    pub fn write_edge(&self, scope: &ApplicationScope, edge: &MarkedEdge, batch: &mut MutationBatch) -> Result<()> {
        let now = self.time.current_time_millis();
        for meta in DirectedEdgeMeta::all_for_edge(&edge.to_edge()) {
            let group = self.cache.get_write_shard_group(scope, edge.timestamp, &meta)?;
            let shards = group.write_shards(edge.timestamp, now);
            self.sharded.write_edge(batch, &self.families, scope, &meta, &shards, edge);
        }
        Ok(())
    }

    /// Removes the edge from every shard of the group covering its timestamp.
    pub fn delete_edge(&self, scope: &ApplicationScope, edge: &MarkedEdge, batch: &mut MutationBatch) -> Result<()> {
        for meta in DirectedEdgeMeta::all_for_edge(&edge.to_edge()) {
            let group = self.cache.get_write_shard_group(scope, edge.timestamp, &meta)?;
            self.sharded
                .delete_edge(batch, &self.families, scope, &meta, group.read_shards(), edge);
        }
        Ok(())
    }

    pub fn get_edge_versions(&self, scope: &ApplicationScope, search: &SearchByEdge) -> Result<BoxedIter<MarkedEdge>> {
        let meta =
            DirectedEdgeMeta::from_versions(search.source.clone(), search.edge_type.clone(), search.target.clone());
        self.search(scope, meta, search.max_timestamp, search.order, search.last.clone())
    }

    pub fn get_edges_from_source(
        &self,
        scope: &ApplicationScope,
        search: &SearchByEdgeType,
    ) -> Result<BoxedIter<MarkedEdge>> {
        let meta = DirectedEdgeMeta::from_source(search.node.clone(), search.edge_type.clone());
        self.search(scope, meta, search.max_timestamp, search.order, search.last.clone())
    }

    pub fn get_edges_from_source_by_target_type(
        &self,
        scope: &ApplicationScope,
        search: &SearchByIdType,
    ) -> Result<BoxedIter<MarkedEdge>> {
        let base = &search.base;
        let meta = DirectedEdgeMeta::from_source_target_type(
            base.node.clone(),
            base.edge_type.clone(),
            search.id_type.clone(),
        );
        self.search(scope, meta, base.max_timestamp, base.order, base.last.clone())
    }

    pub fn get_edges_to_target(
        &self,
        scope: &ApplicationScope,
        search: &SearchByEdgeType,
    ) -> Result<BoxedIter<MarkedEdge>> {
        let meta = DirectedEdgeMeta::from_target(search.node.clone(), search.edge_type.clone());
        self.search(scope, meta, search.max_timestamp, search.order, search.last.clone())
    }

    pub fn get_edges_to_target_by_source_type(
        &self,
        scope: &ApplicationScope,
        search: &SearchByIdType,
    ) -> Result<BoxedIter<MarkedEdge>> {
        let base = &search.base;
        let meta = DirectedEdgeMeta::from_target_source_type(
            base.node.clone(),
            base.edge_type.clone(),
            search.id_type.clone(),
        );
        self.search(scope, meta, base.max_timestamp, base.order, base.last.clone())
    }

    fn search(
        &self,
        scope: &ApplicationScope,
        meta: DirectedEdgeMeta,
        max_timestamp: u64,
        order: Order,
        last: Option<MarkedEdge>,
    ) -> Result<BoxedIter<MarkedEdge>> {
        let groups = self.cache.get_read_shard_groups(scope, max_timestamp, &meta)?;
        let spans = group_spans(&groups, max_timestamp);
        let mut walk: Vec<(ShardEntryGroup, TimeSpan)> = groups
            .into_iter()
            .zip(spans)
            .map(|(group, mut span)| {
                if let Some(last) = &last {
                    match order {
                        Order::Descending => span.upper = span.upper.min(last.timestamp),
                        Order::Ascending => span.lower = span.lower.max(last.timestamp),
                    }
                }
                (group, span)
            })
            .collect();
        if order == Order::Ascending {
            walk.reverse();
        }

        let source = EdgeGroupSource {
            scope: scope.clone(),
            meta,
            order,
            last,
            families: self.families,
            sharded: self.sharded.clone(),
            window: self.config.merge_window(),
            maintenance: self.maintenance.clone(),
        };
        Ok(Box::new(ShardsColumnIterator::new(source, walk)))
    }
}

struct EdgeGroupSource {
    scope: ApplicationScope,
    meta: DirectedEdgeMeta,
    order: Order,
    last: Option<MarkedEdge>,
    families: EdgeColumnFamilies,
    sharded: Arc<ShardedEdgeSerialization>,
    window: usize,
    maintenance: Option<ShardMaintenance>,
}

impl EdgeGroupSource {
    /// Every edge in the group's shards, ignoring time bounds.
    fn all_group_edges(&self, group: &ShardEntryGroup, companions: &[EdgeColumnFamilies]) -> BoxedIter<MarkedEdge> {
        let families: Vec<EdgeColumnFamilies> =
            std::iter::once(self.families).chain(companions.iter().copied()).collect();
        let mut shards: Vec<ShardEdges> = Vec::new();
        for families in &families {
            for shard in group.read_shards() {
                shards.push(self.sharded.scan_shard(families, &self.scope, &self.meta, shard));
            }
        }
        Box::new(shards.into_iter().flatten())
    }
}

impl GroupSource for EdgeGroupSource {
    type Item = MarkedEdge;

    fn open(&self, group: &ShardEntryGroup, span: TimeSpan) -> Result<BoxedIter<MarkedEdge>> {
        let range = self.sharded.column_range(&self.meta, span, self.order, self.last.as_ref());
        let mut readers: Vec<ShardEdges> = group
            .read_shards()
            .iter()
            .map(|shard| self.sharded.shard_edges(&self.families, &self.scope, &self.meta, shard, range.clone()))
            .collect();

        if readers.len() == 1 {
            if let Some(single) = readers.pop() {
                return Ok(Box::new(single));
            }
        }
        readers.par_iter_mut().for_each(ShardEdges::prefetch);

        let sources: Vec<BoxedIter<MarkedEdge>> = readers
            .into_iter()
            .map(|r| Box::new(r) as BoxedIter<MarkedEdge>)
            .collect();
        let merged = OrderedMerge::new(sources, self.window, edge_comparator(&self.meta, self.order));
        Ok(Box::new(DistinctUntilChanged::new(Box::new(merged), edge_key)))
    }

    fn finished(&self, group: &ShardEntryGroup, emitted: usize) {
        let Some(maintenance) = &self.maintenance else { return };
        if emitted == 0 {
            let edges = self.all_group_edges(group, &maintenance.companions);
            let _ = maintenance.deletion.maybe_delete_shard(&self.scope, &self.meta, group, edges);
        }
        let _ = maintenance.compaction.evaluate_shard_group(&self.scope, &self.meta, group);
    }
}
