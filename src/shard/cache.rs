//! Shard group cache
//!
//! Bounded LRU of `(scope, meta) -> groups`, each entry living at most
//! `shard_cache_timeout_ms`. A miss reloads the whole ordered group set for
//! the key from the allocator; entries are never patched in place.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::model::{ApplicationScope, DirectedEdgeMeta, ShardEntryGroup};
use crate::time::TimeService;

use super::NodeShardAllocation;

type CacheKey = (ApplicationScope, DirectedEdgeMeta);

/// Groups keyed by the index of their lowest shard.
type ShardGroups = BTreeMap<u64, ShardEntryGroup>;

struct CacheEntry {
    groups: Arc<ShardGroups>,
    loaded_at: u64,
}

pub struct NodeShardCache {
    allocation: Arc<NodeShardAllocation>,
    time: Arc<dyn TimeService>,
    timeout_ms: u64,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl NodeShardCache {
    pub fn new(allocation: Arc<NodeShardAllocation>, time: Arc<dyn TimeService>, config: &GraphConfig) -> Self {
        let capacity = NonZeroUsize::new(config.shard_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            allocation,
            time,
            timeout_ms: config.shard_cache_timeout_ms,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn allocation(&self) -> &Arc<NodeShardAllocation> {
        &self.allocation
    }

    /// The one group that covers `timestamp`.
    pub fn get_write_shard_group(
        &self,
        scope: &ApplicationScope,
        timestamp: u64,
        meta: &DirectedEdgeMeta,
    ) -> Result<ShardEntryGroup> {
        let groups = self.groups(scope, meta)?;
        groups
            .range(..=timestamp)
            .next_back()
            .map(|(_, group)| group.clone())
            .ok_or_else(|| {
                GraphError::Invariant(format!("no shard group covers timestamp {} for {:?}", timestamp, meta))
            })
    }

    /// Groups starting at or before `max_timestamp`, newest first.
    pub fn get_read_shard_groups(
        &self,
        scope: &ApplicationScope,
        max_timestamp: u64,
        meta: &DirectedEdgeMeta,
    ) -> Result<Vec<ShardEntryGroup>> {
        let groups = self.groups(scope, meta)?;
        Ok(groups.range(..=max_timestamp).rev().map(|(_, g)| g.clone()).collect())
    }

    /// Drops the cached entry so the next call reloads it.
    pub fn invalidate(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) {
        self.entries.lock().pop(&(scope.clone(), meta.clone()));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn groups(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta) -> Result<Arc<ShardGroups>> {
        let key = (scope.clone(), meta.clone());
        let now = self.time.current_time_millis();
        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(&key) {
                if entry.loaded_at.saturating_add(self.timeout_ms) > now {
                    return Ok(entry.groups.clone());
                }
            }
        }

        // load outside the lock; concurrent loaders for one key both hit the store
        let loaded: ShardGroups = self
            .allocation
            .get_shards(scope, meta)?
            .into_iter()
            .map(|group| (group.min_shard().index(), group))
            .collect();
        let groups = Arc::new(loaded);
        tracing::trace!(?meta, groups = groups.len(), "loaded shard groups");

        self.entries
            .lock()
            .put(key, CacheEntry { groups: groups.clone(), loaded_at: now });
        Ok(groups)
    }
}
