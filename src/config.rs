//! Engine configuration
//!
//! All knobs are plain serde fields with defaults, so a partial JSON file
//! is enough:
//!
//! ```json
//! { "shard_size": 100000, "shard_cache_timeout_ms": 15000 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::store::ConsistencyLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Columns fetched per store page; also the compaction batch size.
    pub scan_page_size: usize,
    /// Approximate edge count at which a shard is split.
    pub shard_size: u64,
    pub shard_cache_timeout_ms: u64,
    /// Minimum age of a shard before it may be split, compacted or reclaimed.
    pub shard_min_delta_ms: u64,
    pub shard_cache_size: usize,
    /// Probability in [0, 1] that a read observation schedules a shard audit.
    pub shard_repair_chance: f64,
    pub task_pool_threads: usize,
    pub task_pool_queue_size: usize,
    pub compaction_enabled: bool,
    pub metadata_bucket_count: u32,
    pub max_multiget_rows: usize,
    /// TTL of commit-log columns in seconds, 0 disables expiry.
    pub commit_log_ttl_secs: u32,
    pub read_consistency: ConsistencyLevel,
    pub write_consistency: ConsistencyLevel,
    pub graph_manager_cache_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            scan_page_size: 1000,
            shard_size: 500_000,
            shard_cache_timeout_ms: 30_000,
            shard_min_delta_ms: 60_000,
            shard_cache_size: 10_000,
            shard_repair_chance: 1.0,
            task_pool_threads: 4,
            task_pool_queue_size: 128,
            compaction_enabled: true,
            metadata_bucket_count: 8,
            max_multiget_rows: 256,
            commit_log_ttl_secs: 3600,
            read_consistency: ConsistencyLevel::Quorum,
            write_consistency: ConsistencyLevel::Quorum,
            graph_manager_cache_size: 100,
        }
    }
}

impl GraphConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: GraphConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Rejects settings the shard lifecycle cannot work with.
    ///
    /// A shard younger than two cache lifetimes may still be cached by some
    /// reader, so `shard_min_delta_ms` must cover that window.
    pub fn validate(&self) -> Result<()> {
        let Some(cache_window) = self.shard_cache_timeout_ms.checked_mul(2) else {
            return Err(GraphError::Config(format!(
                "shard_cache_timeout_ms ({}) is out of range",
                self.shard_cache_timeout_ms
            )));
        };
        if self.shard_min_delta_ms < cache_window {
            return Err(GraphError::Config(format!(
                "shard_min_delta_ms ({}) must be >= 2 x shard_cache_timeout_ms ({})",
                self.shard_min_delta_ms, self.shard_cache_timeout_ms
            )));
        }
        if self.shard_size == 0 {
            return Err(GraphError::Config("shard_size must be > 0".into()));
        }
        if self.scan_page_size == 0 {
            return Err(GraphError::Config("scan_page_size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.shard_repair_chance) {
            return Err(GraphError::Config(format!(
                "shard_repair_chance must be within [0, 1], got {}",
                self.shard_repair_chance
            )));
        }
        if self.task_pool_threads == 0 || self.task_pool_queue_size == 0 {
            return Err(GraphError::Config("task pool needs at least one thread and one queue slot".into()));
        }
        if self.metadata_bucket_count == 0 {
            return Err(GraphError::Config("metadata_bucket_count must be > 0".into()));
        }
        if self.max_multiget_rows == 0 {
            return Err(GraphError::Config("max_multiget_rows must be > 0".into()));
        }
        if self.shard_cache_size == 0 || self.graph_manager_cache_size == 0 {
            return Err(GraphError::Config("cache sizes must be > 0".into()));
        }
        Ok(())
    }

    /// Nodes created within this window cannot own persisted shards yet.
    pub fn new_node_window_ms(&self) -> u64 {
        self.shard_cache_timeout_ms.saturating_mul(2)
    }

    pub fn commit_log_ttl(&self) -> Option<u32> {
        if self.commit_log_ttl_secs == 0 {
            None
        } else {
            Some(self.commit_log_ttl_secs)
        }
    }

    /// Read-ahead window for ordered merges.
    pub fn merge_window(&self) -> usize {
        (self.scan_page_size / 2).max(1)
    }
}
