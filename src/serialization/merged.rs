//! Commit log ∪ storage reader
//!
//! Both edge sources are opened side by side and merged into one ordered
//! stream. The commit log is source 0, so on a comparator tie its copy is
//! emitted and the storage copy is collapsed by the distinct pass.

use std::sync::Arc;

use crate::error::Result;
use crate::iter::{BoxedIter, DistinctUntilChanged, OrderedMerge};
use crate::model::{
    ApplicationScope, DirectedEdgeMeta, MarkedEdge, Order, SearchByEdge, SearchByEdgeType, SearchByIdType,
};

use super::edge::{edge_comparator, edge_key, EdgeSerialization};

pub struct MergedEdgeReader {
    commit_log: Arc<EdgeSerialization>,
    storage: Arc<EdgeSerialization>,
    window: usize,
}

impl MergedEdgeReader {
    pub fn new(commit_log: Arc<EdgeSerialization>, storage: Arc<EdgeSerialization>, window: usize) -> Self {
        Self { commit_log, storage, window: window.max(1) }
    }

    pub fn commit_log(&self) -> &Arc<EdgeSerialization> {
        &self.commit_log
    }

    pub fn storage(&self) -> &Arc<EdgeSerialization> {
        &self.storage
    }

    /// Opens both sources concurrently and merges them in `order`.
    fn merge<F>(&self, meta: &DirectedEdgeMeta, order: Order, open: F) -> Result<BoxedIter<MarkedEdge>>
    where
        F: Fn(&EdgeSerialization) -> Result<BoxedIter<MarkedEdge>> + Sync,
    {
        let (commit_log, storage) = rayon::join(|| open(&self.commit_log), || open(&self.storage));
        let sources = vec![commit_log?, storage?];
        let merged = OrderedMerge::new(sources, self.window, edge_comparator(meta, order));
        Ok(Box::new(DistinctUntilChanged::new(Box::new(merged), edge_key)))
    }

    pub fn get_edge_versions(&self, scope: &ApplicationScope, search: &SearchByEdge) -> Result<BoxedIter<MarkedEdge>> {
        let meta =
            DirectedEdgeMeta::from_versions(search.source.clone(), search.edge_type.clone(), search.target.clone());
        self.merge(&meta, search.order, |edges| edges.get_edge_versions(scope, search))
    }

    pub fn get_edges_from_source(
        &self,
        scope: &ApplicationScope,
        search: &SearchByEdgeType,
    ) -> Result<BoxedIter<MarkedEdge>> {
        let meta = DirectedEdgeMeta::from_source(search.node.clone(), search.edge_type.clone());
        self.merge(&meta, search.order, |edges| edges.get_edges_from_source(scope, search))
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
        self.merge(&meta, base.order, |edges| edges.get_edges_from_source_by_target_type(scope, search))
    }

    pub fn get_edges_to_target(
        &self,
        scope: &ApplicationScope,
        search: &SearchByEdgeType,
    ) -> Result<BoxedIter<MarkedEdge>> {
        let meta = DirectedEdgeMeta::from_target(search.node.clone(), search.edge_type.clone());
        self.merge(&meta, search.order, |edges| edges.get_edges_to_target(scope, search))
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
        self.merge(&meta, base.order, |edges| edges.get_edges_to_target_by_source_type(scope, search))
    }
}
