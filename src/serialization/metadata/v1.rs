//! Unsharded registries: one row per node (or node + edge type)

use std::sync::Arc;

use crate::error::Result;
use crate::iter::{BoxedIter, ColumnPager};
use crate::model::{ApplicationScope, Edge, Id, SearchEdgeType, SearchIdType};
use crate::store::{codec, Column, ColumnRange, ColumnStore, ConsistencyLevel, MutationBatch};

use super::{read_types, type_range, Direction, EdgeMetadataSerialization, TypeFamilies};

const FAMILIES: TypeFamilies = TypeFamilies {
    source_edge_types: "Graph_Source_Edge_Types",
    source_id_types: "Graph_Source_Edge_Id_Types",
    target_edge_types: "Graph_Target_Edge_Types",
    target_id_types: "Graph_Target_Edge_Id_Types",
};

pub struct EdgeMetadataSerializationV1 {
    store: Arc<dyn ColumnStore>,
    page_size: usize,
    consistency: ConsistencyLevel,
}

impl EdgeMetadataSerializationV1 {
    pub fn new(store: Arc<dyn ColumnStore>, page_size: usize, consistency: ConsistencyLevel) -> Self {
        Self { store, page_size, consistency }
    }

    /// Raw edge type columns of a node, with their write timestamps.
    pub fn edge_type_columns(
        &self,
        scope: &ApplicationScope,
        direction: Direction,
        node: &Id,
    ) -> BoxedIter<Column> {
        Box::new(ColumnPager::new(
            self.store.clone(),
            FAMILIES.edge_types(direction),
            codec::node_row_key(scope, node),
            ColumnRange::all(self.page_size),
            self.consistency,
        ))
    }

    /// Raw id type columns of a node and edge type.
    pub fn id_type_columns(
        &self,
        scope: &ApplicationScope,
        direction: Direction,
        node: &Id,
        edge_type: &str,
    ) -> BoxedIter<Column> {
        Box::new(ColumnPager::new(
            self.store.clone(),
            FAMILIES.id_types(direction),
            codec::node_type_row_key(scope, node, edge_type),
            ColumnRange::all(self.page_size),
            self.consistency,
        ))
    }

    fn remove_edge_type(
        &self,
        direction: Direction,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        version: u64,
    ) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch
            .with_row(FAMILIES.edge_types(direction), codec::node_row_key(scope, node))
            .with_timestamp(version)
            .delete_column(edge_type.as_bytes().to_vec());
        batch
    }

    fn remove_id_type(
        &self,
        direction: Direction,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch
            .with_row(FAMILIES.id_types(direction), codec::node_type_row_key(scope, node, edge_type))
            .with_timestamp(version)
            .delete_column(id_type.as_bytes().to_vec());
        batch
    }

    fn edge_types(&self, direction: Direction, scope: &ApplicationScope, search: &SearchEdgeType) -> BoxedIter<String> {
        read_types(
            &self.store,
            FAMILIES.edge_types(direction),
            codec::node_row_key(scope, &search.node),
            type_range(search.prefix.as_deref(), search.last.as_deref(), self.page_size),
            self.consistency,
        )
    }

    fn id_types(&self, direction: Direction, scope: &ApplicationScope, search: &SearchIdType) -> BoxedIter<String> {
        read_types(
            &self.store,
            FAMILIES.id_types(direction),
            codec::node_type_row_key(scope, &search.node, &search.edge_type),
            type_range(search.prefix.as_deref(), search.last.as_deref(), self.page_size),
            self.consistency,
        )
    }
}

impl EdgeMetadataSerialization for EdgeMetadataSerializationV1 {
    fn write_edge(&self, scope: &ApplicationScope, edge: &Edge) -> MutationBatch {
        let mut batch = MutationBatch::new();
        let edge_type = edge.edge_type.as_bytes().to_vec();
        batch
            .with_row(FAMILIES.source_edge_types, codec::node_row_key(scope, &edge.source))
            .with_timestamp(edge.timestamp)
            .put_column(edge_type.clone(), Vec::new(), None);
        batch
            .with_row(FAMILIES.source_id_types, codec::node_type_row_key(scope, &edge.source, &edge.edge_type))
            .with_timestamp(edge.timestamp)
            .put_column(edge.target.id_type().as_bytes().to_vec(), Vec::new(), None);
        batch
            .with_row(FAMILIES.target_edge_types, codec::node_row_key(scope, &edge.target))
            .with_timestamp(edge.timestamp)
            .put_column(edge_type, Vec::new(), None);
        batch
            .with_row(FAMILIES.target_id_types, codec::node_type_row_key(scope, &edge.target, &edge.edge_type))
            .with_timestamp(edge.timestamp)
            .put_column(edge.source.id_type().as_bytes().to_vec(), Vec::new(), None);
        batch
    }

    fn remove_edge_type_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove_edge_type(Direction::Source, scope, node, edge_type, version)
    }

    fn remove_edge_type_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove_edge_type(Direction::Target, scope, node, edge_type, version)
    }

    fn remove_id_type_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove_id_type(Direction::Source, scope, node, edge_type, id_type, version)
    }

    fn remove_id_type_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch {
        self.remove_id_type(Direction::Target, scope, node, edge_type, id_type, version)
    }

    fn get_edge_types_from_source(
        &self,
        scope: &ApplicationScope,
        search: &SearchEdgeType,
    ) -> Result<BoxedIter<String>> {
        Ok(self.edge_types(Direction::Source, scope, search))
    }

    fn get_edge_types_to_target(&self, scope: &ApplicationScope, search: &SearchEdgeType) -> Result<BoxedIter<String>> {
        Ok(self.edge_types(Direction::Target, scope, search))
    }

    fn get_id_types_from_source(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>> {
        Ok(self.id_types(Direction::Source, scope, search))
    }

    fn get_id_types_to_target(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>> {
        Ok(self.id_types(Direction::Target, scope, search))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryColumnStore;

    fn make_fixture() -> (Arc<MemoryColumnStore>, EdgeMetadataSerializationV1, ApplicationScope) {
        let store = Arc::new(MemoryColumnStore::new());
        let meta = EdgeMetadataSerializationV1::new(store.clone(), 2, ConsistencyLevel::One);
        let scope = ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap();
        (store, meta, scope)
    }

    fn collect(iter: BoxedIter<String>) -> Vec<String> {
        iter.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_write_registers_both_endpoints() {
        let (store, meta, scope) = make_fixture();
        let user = Id::generate_at("user", 1).unwrap();
        let post = Id::generate_at("post", 1).unwrap();
        for (ty, ts) in [("likes", 1), ("authored", 2), ("likes", 3)] {
            store.execute(meta.write_edge(&scope, &Edge::new(user.clone(), ty, post.clone(), ts))).unwrap();
        }

        let types = collect(meta.get_edge_types_from_source(&scope, &SearchEdgeType::new(user.clone())).unwrap());
        assert_eq!(types, vec!["authored", "likes"]);
        let types = collect(meta.get_edge_types_to_target(&scope, &SearchEdgeType::new(post.clone())).unwrap());
        assert_eq!(types, vec!["authored", "likes"]);

        let ids = collect(meta.get_id_types_to_target(&scope, &SearchIdType::new(post, "likes")).unwrap());
        assert_eq!(ids, vec!["user"]);
    }

    #[test]
    fn test_remove_respects_version() {
        let (store, meta, scope) = make_fixture();
        let user = Id::generate_at("user", 1).unwrap();
        let post = Id::generate_at("post", 1).unwrap();
        store.execute(meta.write_edge(&scope, &Edge::new(user.clone(), "likes", post, 10))).unwrap();

        store.execute(meta.remove_edge_type_from_source(&scope, &user, "likes", 5)).unwrap();
        let types = meta.get_edge_types_from_source(&scope, &SearchEdgeType::new(user.clone())).unwrap();
        assert_eq!(collect(types).len(), 1);

        store.execute(meta.remove_edge_type_from_source(&scope, &user, "likes", 10)).unwrap();
        assert!(collect(meta.get_edge_types_from_source(&scope, &SearchEdgeType::new(user)).unwrap()).is_empty());
    }
}
