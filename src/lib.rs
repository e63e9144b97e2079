//! shardgraph - sharded graph-edge storage over a wide-column store
//!
//! # Architecture
//!
//! - **Edge rows**: every edge is written under five row shapes (from source,
//!   from source by target type, to target, to target by source type, versions)
//! - **Shards**: each row is split over time into shards; a shard splits once
//!   its approximate edge count reaches `shard_size`
//! - **Shard groups**: shards in transition are read together until
//!   background compaction folds them into one
//! - **Two sources**: a TTL'd commit log and long-term storage, merged on read
//!   with an ordered k-way merge
//! - **Registries**: per-node edge types and id types, bucketed (v2) with a
//!   migration path from the unbucketed v1 layout
//!
//! # Usage example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shardgraph::graph::{GraphManager, GraphManagerFactory, GraphServices};
//! use shardgraph::model::{ApplicationScope, Edge, Id, Order, SearchByEdgeType};
//! use shardgraph::store::MemoryColumnStore;
//! use shardgraph::GraphConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let services = GraphServices::new(Arc::new(MemoryColumnStore::new()), GraphConfig::default())?;
//! let factory = GraphManagerFactory::new(services);
//! let manager = factory.create_edge_manager(&ApplicationScope::new(Id::generate("application")?)?)?;
//!
//! let user = Id::generate("user")?;
//! manager.write_edge(Edge::new(user.clone(), "likes", Id::generate("post")?, 1))?;
//!
//! let page = manager.get_edges_from_source(SearchByEdgeType::new(user, "likes", u64::MAX, Order::Descending))?;
//! println!("found {} edges", page.items.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod iter;
pub mod model;
pub mod serialization;
pub mod shard;
pub mod store;
pub mod time;

pub use config::GraphConfig;
pub use error::{GraphError, Result};
pub use graph::{GraphManager, GraphManagerFactory, GraphServices, ScopedGraphManager};
pub use model::{ApplicationScope, Edge, Id, MarkedEdge, Order, Page};
pub use store::{ColumnStore, MemoryColumnStore, SledColumnStore};
