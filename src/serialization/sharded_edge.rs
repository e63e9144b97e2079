//! Row-level edge serialization
//!
//! Knows how one meta key's edges map onto shard rows, but not which shards
//! to use: callers resolve shards through the shard cache and pass them in.

use std::ops::Bound;
use std::sync::Arc;

use crate::iter::{BoxedIter, ColumnPager, TimeSpan};
use crate::model::{ApplicationScope, DirectedEdgeMeta, MarkedEdge, Order, Shard};
use crate::shard::NodeShardApproximation;
use crate::store::{codec, max_lower, min_upper, ColumnRange, ColumnStore, ConsistencyLevel, MutationBatch};

use super::EdgeColumnFamilies;

pub struct ShardedEdgeSerialization {
    store: Arc<dyn ColumnStore>,
    approximation: Arc<NodeShardApproximation>,
    page_size: usize,
    consistency: ConsistencyLevel,
}

impl ShardedEdgeSerialization {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        approximation: Arc<NodeShardApproximation>,
        page_size: usize,
        consistency: ConsistencyLevel,
    ) -> Self {
        Self { store, approximation, page_size, consistency }
    }

    pub fn approximation(&self) -> &Arc<NodeShardApproximation> {
        &self.approximation
    }

    /// Appends the edge's column to every shard row in `shards`.
    pub fn write_edge(
        &self,
        batch: &mut MutationBatch,
        families: &EdgeColumnFamilies,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shards: &[Shard],
        edge: &MarkedEdge,
    ) {
        let column_family = families.for_meta(meta.meta_type());
        let column = codec::edge_column(meta, edge);
        for shard in shards {
            batch
                .with_row(column_family, codec::edge_row_key(scope, meta, shard.index()))
                .put_column(column.clone(), codec::deleted_value(edge.deleted), families.ttl());
            if families.counts_toward_shards() {
                self.approximation.increment(scope, shard, 1, meta);
            }
        }
    }

    /// Removes the edge's column from every shard row in `shards`.
    pub fn delete_edge(
        &self,
        batch: &mut MutationBatch,
        families: &EdgeColumnFamilies,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shards: &[Shard],
        edge: &MarkedEdge,
    ) {
        let column_family = families.for_meta(meta.meta_type());
        let column = codec::edge_column(meta, edge);
        for shard in shards {
            batch
                .with_row(column_family, codec::edge_row_key(scope, meta, shard.index()))
                .delete_column(column.clone());
            if families.counts_toward_shards() {
                self.approximation.decrement(scope, shard, 1, meta);
            }
        }
    }

    /// Edges of one shard row within `range`, decoded.
    pub fn shard_edges(
        &self,
        families: &EdgeColumnFamilies,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shard: &Shard,
        range: ColumnRange,
    ) -> ShardEdges {
        let pager = ColumnPager::new(
            self.store.clone(),
            families.for_meta(meta.meta_type()),
            codec::edge_row_key(scope, meta, shard.index()),
            range,
            self.consistency,
        );
        ShardEdges { pager, meta: meta.clone(), families: *families }
    }

    /// Column range covering `span` in `order`, resuming after `last`.
    pub fn column_range(
        &self,
        meta: &DirectedEdgeMeta,
        span: TimeSpan,
        order: Order,
        last: Option<&MarkedEdge>,
    ) -> ColumnRange {
        let mut lower = if span.lower == 0 {
            Bound::Unbounded
        } else {
            Bound::Included(codec::timestamp_column(span.lower))
        };
        let mut upper = match span.upper.checked_add(1) {
            Some(next) => Bound::Excluded(codec::timestamp_column(next)),
            None => Bound::Unbounded,
        };
        if let Some(last) = last {
            let after = Bound::Excluded(codec::edge_column(meta, last));
            match order {
                Order::Descending => upper = min_upper(upper, after),
                Order::Ascending => lower = max_lower(lower, after),
            }
        }
        ColumnRange::new(lower, upper, order == Order::Descending, self.page_size)
    }

    /// Every column of a shard row, oldest first.
    pub fn scan_shard(
        &self,
        families: &EdgeColumnFamilies,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shard: &Shard,
    ) -> ShardEdges {
        self.shard_edges(families, scope, meta, shard, ColumnRange::all(self.page_size))
    }

    /// Edges at or above `from` in one shard row, oldest first.
    pub fn scan_shard_from(
        &self,
        families: &EdgeColumnFamilies,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        shard: &Shard,
        from: u64,
    ) -> BoxedIter<MarkedEdge> {
        let range = ColumnRange::new(
            Bound::Included(codec::timestamp_column(from)),
            Bound::Unbounded,
            false,
            self.page_size,
        );
        Box::new(self.shard_edges(families, scope, meta, shard, range))
    }
}

/// Decoded edges of one shard row.
pub struct ShardEdges {
    pager: ColumnPager,
    meta: DirectedEdgeMeta,
    families: EdgeColumnFamilies,
}

impl ShardEdges {
    pub fn prefetch(&mut self) {
        self.pager.prefetch();
    }
}

impl Iterator for ShardEdges {
    type Item = crate::error::Result<MarkedEdge>;

    fn next(&mut self) -> Option<Self::Item> {
        let column = match self.pager.next()? {
            Ok(column) => column,
            Err(e) => return Some(Err(e)),
        };
        Some(codec::decode_edge(&self.meta, &column.name, &column.value, self.families.origin()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, EdgeOrigin, Id, MIN_SHARD};
    use crate::store::MemoryColumnStore;

    struct Fixture {
        store: Arc<MemoryColumnStore>,
        ser: ShardedEdgeSerialization,
        scope: ApplicationScope,
        source: Id,
    }

    fn make_fixture() -> Fixture {
        let store = Arc::new(MemoryColumnStore::new());
        let ser = ShardedEdgeSerialization::new(
            store.clone(),
            Arc::new(NodeShardApproximation::new()),
            3,
            ConsistencyLevel::One,
        );
        Fixture {
            store,
            ser,
            scope: ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap(),
            source: Id::generate_at("user", 1).unwrap(),
        }
    }

    fn make_test_edge(source: &Id, ts: u64) -> MarkedEdge {
        MarkedEdge::new(Edge::new(source.clone(), "likes", Id::generate_at("post", ts).unwrap(), ts), false)
    }

    fn write_all(f: &Fixture, families: &EdgeColumnFamilies, shards: &[Shard], timestamps: &[u64]) -> Vec<MarkedEdge> {
        let meta = DirectedEdgeMeta::from_source(f.source.clone(), "likes");
        let mut batch = MutationBatch::new();
        let edges: Vec<MarkedEdge> = timestamps.iter().map(|ts| make_test_edge(&f.source, *ts)).collect();
        for edge in &edges {
            f.ser.write_edge(&mut batch, families, &f.scope, &meta, shards, edge);
        }
        f.store.execute(batch).unwrap();
        edges
    }

    #[test]
    fn test_write_counts_only_storage() {
        let f = make_fixture();
        let meta = DirectedEdgeMeta::from_source(f.source.clone(), "likes");
        write_all(&f, &EdgeColumnFamilies::storage(), &[MIN_SHARD], &[1, 2, 3]);
        write_all(&f, &EdgeColumnFamilies::commit_log(None), &[MIN_SHARD], &[4]);
        assert_eq!(f.ser.approximation().get_count(&f.scope, &MIN_SHARD, &meta), 3);
    }

    #[test]
    fn test_span_and_resume_bounds() {
        let f = make_fixture();
        let families = EdgeColumnFamilies::storage();
        let edges = write_all(&f, &families, &[MIN_SHARD], &[1, 5, 10, 15, 20]);
        let meta = DirectedEdgeMeta::from_source(f.source.clone(), "likes");

        let range = f.ser.column_range(&meta, TimeSpan { lower: 5, upper: 15 }, Order::Descending, None);
        let found: Vec<u64> = f
            .ser
            .shard_edges(&families, &f.scope, &meta, &MIN_SHARD, range)
            .map(|e| e.unwrap().timestamp)
            .collect();
        assert_eq!(found, vec![15, 10, 5]);

        let range = f
            .ser
            .column_range(&meta, TimeSpan { lower: 0, upper: u64::MAX }, Order::Ascending, Some(&edges[2]));
        let found: Vec<u64> = f
            .ser
            .shard_edges(&families, &f.scope, &meta, &MIN_SHARD, range)
            .map(|e| e.unwrap().timestamp)
            .collect();
        assert_eq!(found, vec![15, 20]);
    }

    #[test]
    fn test_delete_removes_column_and_decrements() {
        let f = make_fixture();
        let families = EdgeColumnFamilies::commit_log(None);
        let edges = write_all(&f, &families, &[MIN_SHARD], &[7]);
        let meta = DirectedEdgeMeta::from_source(f.source.clone(), "likes");

        let scanned: Vec<MarkedEdge> = f
            .ser
            .scan_shard(&families, &f.scope, &meta, &MIN_SHARD)
            .map(|e| e.unwrap())
            .collect();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].origin, EdgeOrigin::CommitLog);

        let mut batch = MutationBatch::new();
        f.ser.delete_edge(&mut batch, &families, &f.scope, &meta, &[MIN_SHARD], &edges[0]);
        f.store.execute(batch).unwrap();
        assert_eq!(f.ser.scan_shard(&families, &f.scope, &meta, &MIN_SHARD).count(), 0);
    }
}
