//! Shard lifecycle: counting, allocation, caching, compaction, reclaiming

pub mod allocation;
pub mod approximation;
pub mod cache;
pub mod compaction;
pub mod deletion;
pub mod executor;
pub mod shard_serialization;

pub use allocation::NodeShardAllocation;
pub use approximation::NodeShardApproximation;
pub use cache::NodeShardCache;
pub use compaction::{
    AuditResult, CompactionResult, NoOpShardGroupCompaction, ShardGroupCompaction, ShardGroupCompactionImpl,
};
pub use deletion::{DeleteResult, ShardGroupDeletion};
pub use executor::{TaskExecutor, TaskHandle};
pub use shard_serialization::{EdgeShardSerialization, EDGE_SHARDS_CF};
