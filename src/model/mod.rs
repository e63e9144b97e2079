//! Addressing model: identifiers, edges, shards and search criteria

pub mod edge;
pub mod id;
pub mod meta;
pub mod scope;
pub mod search;
pub mod shard;

pub use edge::{DirectedEdge, Edge, EdgeOrigin, MarkedEdge};
pub use id::Id;
pub use meta::{DirectedEdgeMeta, MetaType};
pub use scope::ApplicationScope;
pub use search::{
    decode_token, encode_token, Order, Page, SearchByEdge, SearchByEdgeType, SearchByIdType, SearchEdgeType,
    SearchIdType,
};
pub use shard::{group_shards, Shard, ShardEntryGroup, MIN_SHARD};
