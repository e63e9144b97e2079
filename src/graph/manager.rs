//! Per-scope graph manager
//!
//! Writes go to the commit log and to storage in one batch together with the
//! type registries. Reads merge both sources, then drop soft-deleted edges and
//! edges whose endpoint carries a tombstone at or after the edge version.
//! Pages end with a resume token when they are full.

use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::iter::BoxedIter;
use crate::model::{
    encode_token, ApplicationScope, Edge, Id, MarkedEdge, Page, SearchByEdge, SearchByEdgeType, SearchByIdType,
    SearchEdgeType, SearchIdType,
};
use crate::serialization::EdgeMetadataSerialization;

use super::{EdgeMetaRepair, GraphManager, GraphServices, NodeDeleteListener};

pub struct ScopedGraphManager {
    scope: ApplicationScope,
    services: Arc<GraphServices>,
    repair: EdgeMetaRepair,
    listener: NodeDeleteListener,
}

impl ScopedGraphManager {
    pub fn new(services: Arc<GraphServices>, scope: ApplicationScope) -> Result<Self> {
        scope.validate()?;
        Ok(Self {
            scope,
            repair: EdgeMetaRepair::new(services.clone()),
            listener: NodeDeleteListener::new(services.clone()),
            services,
        })
    }

    pub fn services(&self) -> &Arc<GraphServices> {
        &self.services
    }

    fn page_limit(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.services.config.scan_page_size)
    }

    /// Live edges only: not marked, no endpoint tombstoned at or after the edge version.
    fn filter_live(&self, edges: Vec<MarkedEdge>) -> Result<Vec<MarkedEdge>> {
        let edges: Vec<MarkedEdge> = edges.into_iter().filter(|e| !e.deleted).collect();
        if edges.is_empty() {
            return Ok(edges);
        }
        let tombstones = self.services.nodes.get_max_versions(&self.scope, &edges)?;
        if tombstones.is_empty() {
            return Ok(edges);
        }
        let hidden = |node: &Id, version: u64| tombstones.get(node).is_some_and(|deleted_at| *deleted_at >= version);
        Ok(edges
            .into_iter()
            .filter(|e| !hidden(&e.source, e.timestamp) && !hidden(&e.target, e.timestamp))
            .collect())
    }

    fn edge_page(
        &self,
        mut edges: BoxedIter<MarkedEdge>,
        limit: Option<usize>,
        filter: bool,
    ) -> Result<Page<MarkedEdge>> {
        let limit = self.page_limit(limit);
        let mut items: Vec<MarkedEdge> = Vec::new();
        while items.len() < limit {
            let wanted = limit - items.len();
            let chunk: Vec<MarkedEdge> = edges.by_ref().take(wanted).collect::<Result<_>>()?;
            let exhausted = chunk.len() < wanted;
            if filter {
                items.extend(self.filter_live(chunk)?);
            } else {
                items.extend(chunk);
            }
            if exhausted {
                break;
            }
        }
        let resume_token = if items.len() == limit { items.last().map(encode_token).transpose()? } else { None };
        Ok(Page { items, resume_token })
    }

    fn type_page(&self, types: BoxedIter<String>, limit: Option<usize>) -> Result<Page<String>> {
        let limit = self.page_limit(limit);
        let items: Vec<String> = types.take(limit).collect::<Result<_>>()?;
        let resume_token = if items.len() == limit { items.last().map(encode_token).transpose()? } else { None };
        Ok(Page { items, resume_token })
    }

    fn write(&self, edge: Edge, deleted: bool) -> Result<MarkedEdge> {
        edge.validate()?;
        let marked = MarkedEdge::new(edge, deleted);
        let mut batch = self.services.batch();
        self.services.write_edge_columns(&self.scope, &marked, &mut batch)?;
        if !deleted {
            batch.merge(self.services.metadata.write_edge(&self.scope, &marked.to_edge()));
        }
        self.services.store.execute(batch)?;
        tracing::trace!(edge = ?marked, "wrote edge");
        Ok(marked)
    }
}

impl GraphManager for ScopedGraphManager {
    fn scope(&self) -> &ApplicationScope {
        &self.scope
    }

    fn write_edge(&self, edge: Edge) -> Result<MarkedEdge> {
        self.write(edge, false)
    }

    fn mark_edge(&self, edge: Edge) -> Result<MarkedEdge> {
        self.write(edge, true)
    }

    fn delete_edge(&self, edge: Edge) -> Result<MarkedEdge> {
        edge.validate()?;
        let marked = MarkedEdge::new(edge, true);
        let mut batch = self.services.batch();
        self.services.delete_edge_columns(&self.scope, &marked, &mut batch)?;
        self.services.store.execute(batch)?;
        self.repair.repair(&self.scope, &marked)?;
        tracing::trace!(edge = ?marked, "deleted edge");
        Ok(marked)
    }

    fn mark_node(&self, node: &Id, version: u64) -> Result<()> {
        node.validate()?;
        if version == 0 {
            return Err(GraphError::Validation("node delete version must be > 0".into()));
        }
        let batch = self.services.nodes.mark(&self.scope, node, version);
        self.services.store.execute(batch.with_consistency(self.services.config.write_consistency))
    }

    fn delete_node(&self, node: &Id, version: u64) -> Result<usize> {
        node.validate()?;
        self.listener.receive(&self.scope, node, version)
    }

    fn get_edge_versions(&self, search: SearchByEdge) -> Result<Page<MarkedEdge>> {
        search.validate()?;
        let edges = self.services.merged.get_edge_versions(&self.scope, &search)?;
        self.edge_page(edges, search.limit, search.filter_marked)
    }

    fn get_edges_from_source(&self, search: SearchByEdgeType) -> Result<Page<MarkedEdge>> {
        search.validate()?;
        let edges = self.services.merged.get_edges_from_source(&self.scope, &search)?;
        self.edge_page(edges, search.limit, search.filter_marked)
    }

    fn get_edges_from_source_by_target_type(&self, search: SearchByIdType) -> Result<Page<MarkedEdge>> {
        search.validate()?;
        let edges = self.services.merged.get_edges_from_source_by_target_type(&self.scope, &search)?;
        self.edge_page(edges, search.base.limit, search.base.filter_marked)
    }

    fn get_edges_to_target(&self, search: SearchByEdgeType) -> Result<Page<MarkedEdge>> {
        search.validate()?;
        let edges = self.services.merged.get_edges_to_target(&self.scope, &search)?;
        self.edge_page(edges, search.limit, search.filter_marked)
    }

    fn get_edges_to_target_by_source_type(&self, search: SearchByIdType) -> Result<Page<MarkedEdge>> {
        search.validate()?;
        let edges = self.services.merged.get_edges_to_target_by_source_type(&self.scope, &search)?;
        self.edge_page(edges, search.base.limit, search.base.filter_marked)
    }

    fn get_edge_types_from_source(&self, search: SearchEdgeType) -> Result<Page<String>> {
        search.validate()?;
        let types = self.services.metadata.get_edge_types_from_source(&self.scope, &search)?;
        self.type_page(types, search.limit)
    }

    fn get_edge_types_to_target(&self, search: SearchEdgeType) -> Result<Page<String>> {
        search.validate()?;
        let types = self.services.metadata.get_edge_types_to_target(&self.scope, &search)?;
        self.type_page(types, search.limit)
    }

    fn get_id_types_from_source(&self, search: SearchIdType) -> Result<Page<String>> {
        search.validate()?;
        let types = self.services.metadata.get_id_types_from_source(&self.scope, &search)?;
        self.type_page(types, search.limit)
    }

    fn get_id_types_to_target(&self, search: SearchIdType) -> Result<Page<String>> {
        search.validate()?;
        let types = self.services.metadata.get_id_types_to_target(&self.scope, &search)?;
        self.type_page(types, search.limit)
    }
}
