//! Graph facade: per-scope edge manager and its maintenance helpers

pub mod factory;
pub mod listener;
pub mod manager;
pub mod repair;
pub mod services;

pub use factory::GraphManagerFactory;
pub use listener::NodeDeleteListener;
pub use manager::ScopedGraphManager;
pub use repair::EdgeMetaRepair;
pub use services::GraphServices;

use crate::error::Result;
use crate::model::{
    ApplicationScope, Edge, Id, MarkedEdge, Page, SearchByEdge, SearchByEdgeType, SearchByIdType, SearchEdgeType,
    SearchIdType,
};

/// Edge operations of one application scope
pub trait GraphManager: Send + Sync {
    fn scope(&self) -> &ApplicationScope;

    // === EDGE WRITES ===

    /// Writes the edge and registers its types.
    fn write_edge(&self, edge: Edge) -> Result<MarkedEdge>;

    /// Soft delete: rewrites the edge with its deleted flag set.
    fn mark_edge(&self, edge: Edge) -> Result<MarkedEdge>;

    /// Hard delete of one edge version; type registries are repaired.
    fn delete_edge(&self, edge: Edge) -> Result<MarkedEdge>;

    // === NODES ===

    /// Records `node` as deleted at `version`. Reads hide its edges at or below that version.
    fn mark_node(&self, node: &Id, version: u64) -> Result<()>;

    /// Removes every edge of a marked node up to `version`, then the mark itself.
    fn delete_node(&self, node: &Id, version: u64) -> Result<usize>;

    // === EDGE READS ===

    fn get_edge_versions(&self, search: SearchByEdge) -> Result<Page<MarkedEdge>>;

    fn get_edges_from_source(&self, search: SearchByEdgeType) -> Result<Page<MarkedEdge>>;

    fn get_edges_from_source_by_target_type(&self, search: SearchByIdType) -> Result<Page<MarkedEdge>>;

    fn get_edges_to_target(&self, search: SearchByEdgeType) -> Result<Page<MarkedEdge>>;

    fn get_edges_to_target_by_source_type(&self, search: SearchByIdType) -> Result<Page<MarkedEdge>>;

    // === TYPE REGISTRIES ===

    fn get_edge_types_from_source(&self, search: SearchEdgeType) -> Result<Page<String>>;

    fn get_edge_types_to_target(&self, search: SearchEdgeType) -> Result<Page<String>>;

    fn get_id_types_from_source(&self, search: SearchIdType) -> Result<Page<String>>;

    fn get_id_types_to_target(&self, search: SearchIdType) -> Result<Page<String>>;
}
