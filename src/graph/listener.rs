//! Cleanup of deleted nodes
//!
//! Walks every edge type registered for the node in both directions and
//! hard-deletes each edge at or below the delete version (marked ones too),
//! a page at a time, repairing the registries after every page. The tombstone
//! goes last. Edges written after the version are left alone.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::iter::BoxedIter;
use crate::model::{ApplicationScope, Id, MarkedEdge, Order, SearchByEdgeType, SearchEdgeType};
use crate::serialization::EdgeMetadataSerialization;

use super::{EdgeMetaRepair, GraphServices};

pub struct NodeDeleteListener {
    services: Arc<GraphServices>,
    repair: EdgeMetaRepair,
}

impl NodeDeleteListener {
    pub fn new(services: Arc<GraphServices>) -> Self {
        Self { repair: EdgeMetaRepair::new(services.clone()), services }
    }

    /// Returns the number of edges removed.
    pub fn receive(&self, scope: &ApplicationScope, node: &Id, version: u64) -> Result<usize> {
        let merged = &self.services.merged;
        let metadata = &self.services.metadata;
        let mut removed = 0;

        let source_types: Vec<String> = metadata
            .get_edge_types_from_source(scope, &SearchEdgeType::new(node.clone()))?
            .collect::<Result<_>>()?;
        for edge_type in &source_types {
            removed += self.delete_all(scope, |last| {
                merged.get_edges_from_source(scope, &oldest_first(node, edge_type, version, last))
            })?;
        }

        let target_types: Vec<String> = metadata
            .get_edge_types_to_target(scope, &SearchEdgeType::new(node.clone()))?
            .collect::<Result<_>>()?;
        for edge_type in &target_types {
            removed += self.delete_all(scope, |last| {
                merged.get_edges_to_target(scope, &oldest_first(node, edge_type, version, last))
            })?;
        }

        self.services.store.execute(self.services.nodes.delete(scope, node, version))?;
        tracing::info!(?node, version, removed, "removed edges of deleted node");
        Ok(removed)
    }

    /// Deletes one page of `scan_page_size` edges at a time, oldest first.
    ///
    /// Each page is re-read after the last edge of the previous one. The
    /// registries are repaired at the newest version of each key in the page;
    /// older pages are gone by then, so the final repair of a key sees no live
    /// edge at or below its version.
    fn delete_all<F>(&self, scope: &ApplicationScope, read: F) -> Result<usize>
    where
        F: Fn(Option<MarkedEdge>) -> Result<BoxedIter<MarkedEdge>>,
    {
        let page_size = self.services.config.scan_page_size;
        let mut last: Option<MarkedEdge> = None;
        let mut removed = 0;

        loop {
            let page: Vec<MarkedEdge> = read(last.take())?.take(page_size).collect::<Result<_>>()?;
            if page.is_empty() {
                break;
            }

            let mut batch = self.services.batch();
            let mut newest: HashMap<(Id, String, Id), &MarkedEdge> = HashMap::new();
            for edge in &page {
                self.services.delete_edge_columns(scope, edge, &mut batch)?;
                newest.insert((edge.source.clone(), edge.edge_type.clone(), edge.target.clone()), edge);
            }
            self.services.store.execute(batch)?;
            for edge in newest.values() {
                self.repair.repair(scope, edge)?;
            }

            removed += page.len();
            if page.len() < page_size {
                break;
            }
            last = page.last().cloned();
        }
        Ok(removed)
    }
}

fn oldest_first(node: &Id, edge_type: &str, version: u64, last: Option<MarkedEdge>) -> SearchByEdgeType {
    let search = SearchByEdgeType::new(node.clone(), edge_type, version, Order::Ascending).include_marked();
    match last {
        Some(last) => search.with_last(last),
        None => search,
    }
}
