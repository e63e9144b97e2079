//! Edge column family sets
//!
//! Edges live twice: in the long-term storage families and in the commit log
//! families, which take the same row layout but expire by TTL. Only storage
//! writes feed the shard counters.

use crate::model::{EdgeOrigin, MetaType};

const STORAGE_NAMES: [&str; 5] = [
    "Graph_Source_Node_Edges",
    "Graph_Source_Node_Target_Type",
    "Graph_Target_Node_Edges",
    "Graph_Target_Node_Source_Type",
    "Graph_Edge_Versions",
];

const COMMIT_LOG_NAMES: [&str; 5] = [
    "Graph_Commit_Log_Source_Node_Edges",
    "Graph_Commit_Log_Source_Node_Target_Type",
    "Graph_Commit_Log_Target_Node_Edges",
    "Graph_Commit_Log_Target_Node_Source_Type",
    "Graph_Commit_Log_Edge_Versions",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeColumnFamilies {
    names: [&'static str; 5],
    origin: EdgeOrigin,
    ttl: Option<u32>,
}

impl EdgeColumnFamilies {
    pub fn storage() -> Self {
        Self { names: STORAGE_NAMES, origin: EdgeOrigin::Storage, ttl: None }
    }

    pub fn commit_log(ttl: Option<u32>) -> Self {
        Self { names: COMMIT_LOG_NAMES, origin: EdgeOrigin::CommitLog, ttl }
    }

    pub fn for_meta(&self, meta_type: MetaType) -> &'static str {
        self.names[meta_type.storage_value() as usize]
    }

    pub fn names(&self) -> &[&'static str; 5] {
        &self.names
    }

    pub fn origin(&self) -> EdgeOrigin {
        self.origin
    }

    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    pub fn counts_toward_shards(&self) -> bool {
        self.origin == EdgeOrigin::Storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_do_not_overlap() {
        let storage = EdgeColumnFamilies::storage();
        let commit = EdgeColumnFamilies::commit_log(Some(60));
        for name in storage.names() {
            assert!(!commit.names().contains(name));
        }
        assert_eq!(storage.for_meta(MetaType::Versions), "Graph_Edge_Versions");
        assert!(storage.counts_toward_shards());
        assert!(!commit.counts_toward_shards());
        assert_eq!(commit.ttl(), Some(60));
    }
}
