//! Bucketed registries
//!
//! Each type column lands in one of `bucket_count` rows chosen by hashing
//! the row key together with the column, so a node with many types spreads
//! over several rows. Reads fan out over every bucket and merge.

use std::sync::Arc;

use crate::error::Result;
use crate::iter::BoxedIter;
use crate::model::{ApplicationScope, Edge, Id, SearchEdgeType, SearchIdType};
use crate::store::{codec, ColumnRange, ColumnStore, ConsistencyLevel, MutationBatch};

use super::{merge_types, read_types, type_range, Direction, EdgeMetadataSerialization, TypeFamilies};

const FAMILIES: TypeFamilies = TypeFamilies {
    source_edge_types: "Graph_Source_Edge_Types_V2",
    source_id_types: "Graph_Source_Edge_Id_Types_V2",
    target_edge_types: "Graph_Target_Edge_Types_V2",
    target_id_types: "Graph_Target_Edge_Id_Types_V2",
};

pub struct EdgeMetadataSerializationV2 {
    store: Arc<dyn ColumnStore>,
    page_size: usize,
    consistency: ConsistencyLevel,
    bucket_count: u32,
}

impl EdgeMetadataSerializationV2 {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        page_size: usize,
        consistency: ConsistencyLevel,
        bucket_count: u32,
    ) -> Self {
        Self { store, page_size, consistency, bucket_count: bucket_count.max(1) }
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    fn bucket(&self, row_key: &[u8], column: &[u8]) -> u32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(row_key);
        hasher.update(column);
        let hash = hasher.finalize();
        let mut head = [0u8; 4];
        head.copy_from_slice(&hash.as_bytes()[..4]);
        u32::from_be_bytes(head) % self.bucket_count
    }

    fn put(&self, batch: &mut MutationBatch, column_family: &str, row_key: Vec<u8>, column: &str, timestamp: u64) {
        let bucket = self.bucket(&row_key, column.as_bytes());
        batch
            .with_row(column_family, codec::with_bucket(row_key, bucket))
            .with_timestamp(timestamp)
            .put_column(column.as_bytes().to_vec(), Vec::new(), None);
    }

    fn remove(&self, column_family: &str, row_key: Vec<u8>, column: &str, version: u64) -> MutationBatch {
        let bucket = self.bucket(&row_key, column.as_bytes());
        let mut batch = MutationBatch::new();
        batch
            .with_row(column_family, codec::with_bucket(row_key, bucket))
            .with_timestamp(version)
            .delete_column(column.as_bytes().to_vec());
        batch
    }

    /// Adds an edge type to a node's registry with the given write timestamp.
    pub fn put_edge_type(
        &self,
        batch: &mut MutationBatch,
        direction: Direction,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        timestamp: u64,
    ) {
        self.put(batch, FAMILIES.edge_types(direction), codec::node_row_key(scope, node), edge_type, timestamp);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn put_id_type(
        &self,
        batch: &mut MutationBatch,
        direction: Direction,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        timestamp: u64,
    ) {
        self.put(
            batch,
            FAMILIES.id_types(direction),
            codec::node_type_row_key(scope, node, edge_type),
            id_type,
            timestamp,
        );
    }

    fn read_buckets(&self, column_family: &'static str, row_key: Vec<u8>, range: ColumnRange) -> BoxedIter<String> {
        let sources: Vec<BoxedIter<String>> = (0..self.bucket_count)
            .map(|bucket| {
                read_types(
                    &self.store,
                    column_family,
                    codec::with_bucket(row_key.clone(), bucket),
                    range.clone(),
                    self.consistency,
                )
            })
            .collect();
        merge_types(sources, (self.page_size / 2).max(1))
    }
}

impl EdgeMetadataSerialization for EdgeMetadataSerializationV2 {
    fn write_edge(&self, scope: &ApplicationScope, edge: &Edge) -> MutationBatch {
        let mut batch = MutationBatch::new();
        let ts = edge.timestamp;
        self.put_edge_type(&mut batch, Direction::Source, scope, &edge.source, &edge.edge_type, ts);
        self.put_id_type(
            &mut batch,
            Direction::Source,
            scope,
            &edge.source,
            &edge.edge_type,
            edge.target.id_type(),
            ts,
        );
        self.put_edge_type(&mut batch, Direction::Target, scope, &edge.target, &edge.edge_type, ts);
        self.put_id_type(
            &mut batch,
            Direction::Target,
            scope,
            &edge.target,
            &edge.edge_type,
            edge.source.id_type(),
            ts,
        );
        batch
    }

    fn remove_edge_type_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove(FAMILIES.source_edge_types, codec::node_row_key(scope, node), edge_type, version)
    }

    fn remove_edge_type_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove(FAMILIES.target_edge_types, codec::node_row_key(scope, node), edge_type, version)
    }

    fn remove_id_type_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove(FAMILIES.source_id_types, codec::node_type_row_key(scope, node, edge_type), id_type, version)
    }

    fn remove_id_type_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove(FAMILIES.target_id_types, codec::node_type_row_key(scope, node, edge_type), id_type, version)
    }

    fn get_edge_types_from_source(
        &self,
        scope: &ApplicationScope,
        search: &SearchEdgeType,
    ) -> Result<BoxedIter<String>> {
        let range = type_range(search.prefix.as_deref(), search.last.as_deref(), self.page_size);
        Ok(self.read_buckets(FAMILIES.source_edge_types, codec::node_row_key(scope, &search.node), range))
    }

    fn get_edge_types_to_target(&self, scope: &ApplicationScope, search: &SearchEdgeType) -> Result<BoxedIter<String>> {
        let range = type_range(search.prefix.as_deref(), search.last.as_deref(), self.page_size);
        Ok(self.read_buckets(FAMILIES.target_edge_types, codec::node_row_key(scope, &search.node), range))
    }

    fn get_id_types_from_source(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>> {
        let range = type_range(search.prefix.as_deref(), search.last.as_deref(), self.page_size);
        let row_key = codec::node_type_row_key(scope, &search.node, &search.edge_type);
        Ok(self.read_buckets(FAMILIES.source_id_types, row_key, range))
    }

    fn get_id_types_to_target(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>> {
        let range = type_range(search.prefix.as_deref(), search.last.as_deref(), self.page_size);
        let row_key = codec::node_type_row_key(scope, &search.node, &search.edge_type);
        Ok(self.read_buckets(FAMILIES.target_id_types, row_key, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryColumnStore;

    fn make_fixture(buckets: u32) -> (Arc<MemoryColumnStore>, EdgeMetadataSerializationV2, ApplicationScope) {
        let store = Arc::new(MemoryColumnStore::new());
        let meta = EdgeMetadataSerializationV2::new(store.clone(), 4, ConsistencyLevel::One, buckets);
        let scope = ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap();
        (store, meta, scope)
    }

    #[test]
    fn test_types_spread_over_buckets_read_back_sorted() {
        let (store, meta, scope) = make_fixture(4);
        let user = Id::generate_at("user", 1).unwrap();
        let mut expected = Vec::new();
        for i in 0..20 {
            let edge_type = format!("type_{:02}", i);
            let target = Id::generate_at("post", 1).unwrap();
            store.execute(meta.write_edge(&scope, &Edge::new(user.clone(), edge_type.clone(), target, i + 1))).unwrap();
            expected.push(edge_type);
        }

        let types: Vec<String> = meta
            .get_edge_types_from_source(&scope, &SearchEdgeType::new(user.clone()))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(types, expected);

        let filtered: Vec<String> = meta
            .get_edge_types_from_source(&scope, &SearchEdgeType::new(user).with_prefix("type_1"))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(filtered.len(), 10);
    }

    #[test]
    fn test_bucket_is_stable() {
        let (_store, meta, _scope) = make_fixture(8);
        let a = meta.bucket(b"row", b"likes");
        assert_eq!(a, meta.bucket(b"row", b"likes"));
        assert!(a < 8);
    }

    #[test]
    fn test_remove_hits_the_written_bucket() {
        let (store, meta, scope) = make_fixture(8);
        let user = Id::generate_at("user", 1).unwrap();
        let post = Id::generate_at("post", 1).unwrap();
        store.execute(meta.write_edge(&scope, &Edge::new(user.clone(), "likes", post.clone(), 5))).unwrap();
        store.execute(meta.remove_id_type_to_target(&scope, &post, "likes", "user", 5)).unwrap();

        let ids: Vec<String> = meta
            .get_id_types_to_target(&scope, &SearchIdType::new(post, "likes"))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert!(ids.is_empty());
    }
}
