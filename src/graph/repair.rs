//! Type registry repair after hard deletes
//!
//! A registry entry is dropped when no live edge of that type (or that far
//! id type) is left at or below the deleted version. The removal is written
//! at that version, so a concurrent newer write keeps its entry.

use std::sync::Arc;

use crate::error::Result;
use crate::iter::BoxedIter;
use crate::model::{ApplicationScope, MarkedEdge, Order, SearchByEdgeType, SearchByIdType};
use crate::serialization::EdgeMetadataSerialization;

use super::GraphServices;

fn has_live_edge(edges: BoxedIter<MarkedEdge>) -> Result<bool> {
    for edge in edges {
        if !edge?.deleted {
            return Ok(true);
        }
    }
    Ok(false)
}

pub struct EdgeMetaRepair {
    services: Arc<GraphServices>,
}

impl EdgeMetaRepair {
    pub fn new(services: Arc<GraphServices>) -> Self {
        Self { services }
    }

    /// Returns how many registry entries were removed.
    pub fn repair(&self, scope: &ApplicationScope, edge: &MarkedEdge) -> Result<usize> {
        let merged = &self.services.merged;
        let metadata = &self.services.metadata;
        let version = edge.timestamp;
        let edge_type = edge.edge_type.as_str();
        let mut batch = self.services.batch();
        let mut removed = 0;

        let from_source = SearchByEdgeType::new(edge.source.clone(), edge_type, version, Order::Descending);
        if !has_live_edge(merged.get_edges_from_source(scope, &from_source)?)? {
            batch.merge(metadata.remove_edge_type_from_source(scope, &edge.source, edge_type, version));
            removed += 1;
        }
        let target_type = edge.target.id_type();
        let by_target_type =
            SearchByIdType::new(edge.source.clone(), edge_type, version, Order::Descending, target_type);
        if !has_live_edge(merged.get_edges_from_source_by_target_type(scope, &by_target_type)?)? {
            batch.merge(metadata.remove_id_type_from_source(scope, &edge.source, edge_type, target_type, version));
            removed += 1;
        }

        let to_target = SearchByEdgeType::new(edge.target.clone(), edge_type, version, Order::Descending);
        if !has_live_edge(merged.get_edges_to_target(scope, &to_target)?)? {
            batch.merge(metadata.remove_edge_type_to_target(scope, &edge.target, edge_type, version));
            removed += 1;
        }
        let source_type = edge.source.id_type();
        let by_source_type =
            SearchByIdType::new(edge.target.clone(), edge_type, version, Order::Descending, source_type);
        if !has_live_edge(merged.get_edges_to_target_by_source_type(scope, &by_source_type)?)? {
            batch.merge(metadata.remove_id_type_to_target(scope, &edge.target, edge_type, source_type, version));
            removed += 1;
        }

        if !batch.is_empty() {
            self.services.store.execute(batch)?;
            tracing::debug!(?edge, removed, "repaired edge metadata");
        }
        Ok(removed)
    }
}
