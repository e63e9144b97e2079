//! Pull-based iterators: paged column reads, ordered merge, shard-group walk
//!
//! Dropping an iterator cancels whatever reads it has not issued yet.

pub mod column;
pub mod merge;
pub mod shards;

pub use column::ColumnPager;
pub use merge::{BoxedIter, DistinctUntilChanged, OrderedMerge};
pub use shards::{group_spans, GroupSource, ShardsColumnIterator, TimeSpan};
