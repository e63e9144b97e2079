//! Persisted shard lists
//!
//! One row per `(scope, meta)` in `Graph_Edge_Shards`, one column per shard
//! keyed by shard index. Writing a shard is an idempotent upsert, so two
//! processes allocating the same split point both succeed.

use std::sync::Arc;

use crate::error::Result;
use crate::iter::ColumnPager;
use crate::model::{ApplicationScope, DirectedEdgeMeta, Shard};
use crate::store::{codec, ColumnRange, ColumnStore, ConsistencyLevel, MutationBatch};

pub const EDGE_SHARDS_CF: &str = "Graph_Edge_Shards";

pub struct EdgeShardSerialization {
    store: Arc<dyn ColumnStore>,
    page_size: usize,
    consistency: ConsistencyLevel,
}

impl EdgeShardSerialization {
    pub fn new(store: Arc<dyn ColumnStore>, page_size: usize, consistency: ConsistencyLevel) -> Self {
        Self { store, page_size, consistency }
    }

    pub fn write_shard_meta(
        &self,
        scope: &ApplicationScope,
        shard: &Shard,
        meta: &DirectedEdgeMeta,
    ) -> Result<MutationBatch> {
        let mut batch = MutationBatch::new();
        batch
            .with_row(EDGE_SHARDS_CF, codec::shard_meta_row_key(scope, meta))
            .put_column(codec::shard_column(shard), codec::shard_value(shard)?, None);
        Ok(batch)
    }

    pub fn remove_shard_meta(&self, scope: &ApplicationScope, shard: &Shard, meta: &DirectedEdgeMeta) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch
            .with_row(EDGE_SHARDS_CF, codec::shard_meta_row_key(scope, meta))
            .delete_column(codec::shard_column(shard));
        batch
    }

    /// Every persisted shard, highest index first.
    pub fn get_shard_meta_data(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) -> Result<Vec<Shard>> {
        let pager = ColumnPager::new(
            self.store.clone(),
            EDGE_SHARDS_CF,
            codec::shard_meta_row_key(scope, meta),
            ColumnRange::all(self.page_size).reversed(true),
            self.consistency,
        );
        pager
            .map(|column| {
                let column = column?;
                codec::decode_shard(&column.name, &column.value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Id, MIN_SHARD};
    use crate::store::MemoryColumnStore;

    fn make_test_setup() -> (Arc<MemoryColumnStore>, EdgeShardSerialization, ApplicationScope, DirectedEdgeMeta) {
        let store = Arc::new(MemoryColumnStore::new());
        let ser = EdgeShardSerialization::new(store.clone(), 2, ConsistencyLevel::One);
        let scope = ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap();
        let meta = DirectedEdgeMeta::from_source(Id::generate_at("user", 1).unwrap(), "likes");
        (store, ser, scope, meta)
    }

    #[test]
    fn test_shards_read_back_descending() {
        let (store, ser, scope, meta) = make_test_setup();
        for shard in [MIN_SHARD, Shard::new(300, 3, false), Shard::new(100, 1, true)] {
            store.execute(ser.write_shard_meta(&scope, &shard, &meta).unwrap()).unwrap();
        }
        let shards = ser.get_shard_meta_data(&scope, &meta).unwrap();
        assert_eq!(shards, vec![Shard::new(300, 3, false), Shard::new(100, 1, true), MIN_SHARD]);
    }

    #[test]
    fn test_upsert_and_remove() {
        let (store, ser, scope, meta) = make_test_setup();
        let shard = Shard::new(50, 9, false);
        store.execute(ser.write_shard_meta(&scope, &shard, &meta).unwrap()).unwrap();
        store.execute(ser.write_shard_meta(&scope, &shard, &meta).unwrap()).unwrap();
        store
            .execute(ser.write_shard_meta(&scope, &shard.as_compacted(), &meta).unwrap())
            .unwrap();
        assert_eq!(ser.get_shard_meta_data(&scope, &meta).unwrap(), vec![shard.as_compacted()]);

        store.execute(ser.remove_shard_meta(&scope, &shard, &meta)).unwrap();
        assert!(ser.get_shard_meta_data(&scope, &meta).unwrap().is_empty());
    }
}
