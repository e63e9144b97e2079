//! Edge, node and metadata serialization over the column store

pub mod column_families;
pub mod edge;
pub mod merged;
pub mod metadata;
pub mod node;
pub mod sharded_edge;

pub use column_families::EdgeColumnFamilies;
pub use edge::{edge_comparator, edge_key, EdgeKey, EdgeSerialization, ShardMaintenance};
pub use merged::MergedEdgeReader;
pub use metadata::{
    Direction, EdgeMetadataSerialization, EdgeMetadataSerializationProxy, EdgeMetadataSerializationV1,
    EdgeMetadataSerializationV2, MetadataVersion, DATA_MIGRATION_CF,
};
pub use node::{NodeSerialization, MARKED_NODES_CF};
pub use sharded_edge::{ShardEdges, ShardedEdgeSerialization};
