//! Shards and shard entry groups
//!
//! A meta key's edges are partitioned by timestamp into shards. A shard with
//! index `i` holds edges with `timestamp >= i` up to the next shard's index.
//! [`MIN_SHARD`] (index 0) always exists and is always compacted.
//!
//! Shards are grouped newest to oldest. A group accepts shards while its
//! oldest member is uncompacted, so every group ends on a compacted
//! "bookend" shard:
//!
//! ```text
//! shards:  [300 new] [200 new] [100 compacted] [0 compacted]
//! groups:  {300, 200, 100}                      {0}
//! ```
//!
//! A group with more than one shard is in transition: reads fan out to every
//! member, writes go to the compaction target (the lowest uncompacted shard
//! above the bookend) and, while the split is young, to the bookend as well.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard {
    index: u64,
    created_time: u64,
    compacted: bool,
}

pub const MIN_SHARD: Shard = Shard { index: 0, created_time: 0, compacted: true };

impl Shard {
    pub const fn new(index: u64, created_time: u64, compacted: bool) -> Self {
        Self { index, created_time, compacted }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn created_time(&self) -> u64 {
        self.created_time
    }

    pub fn is_compacted(&self) -> bool {
        self.compacted
    }

    pub fn is_min_shard(&self) -> bool {
        self.index == MIN_SHARD.index
    }

    pub fn as_compacted(&self) -> Shard {
        Shard { compacted: true, ..*self }
    }
}

impl Ord for Shard {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then(self.created_time.cmp(&other.created_time))
            .then(self.compacted.cmp(&other.compacted))
    }
}

impl PartialOrd for Shard {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Shard({}, created={}, {})",
            self.index,
            self.created_time,
            if self.compacted { "compacted" } else { "open" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEntryGroup {
    /// Members in descending index order.
    shards: Vec<Shard>,
    delta: u64,
}

impl ShardEntryGroup {
    pub fn new(delta: u64) -> Self {
        Self { shards: Vec::new(), delta }
    }

    pub fn single(shard: Shard, delta: u64) -> Self {
        Self { shards: vec![shard], delta }
    }

    /// Offers the next older shard. Returns false when it belongs to the next group.
    pub fn add_shard(&mut self, shard: Shard) -> bool {
        match self.shards.last() {
            None => {
                self.shards.push(shard);
                true
            }
            Some(oldest) if !oldest.is_compacted() => {
                self.shards.push(shard);
                true
            }
            Some(_) => false,
        }
    }

    pub fn read_shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn delta(&self) -> u64 {
        self.delta
    }

    /// Lowest-index member; the group's starting point in timestamp space.
    pub fn min_shard(&self) -> Shard {
        self.shards.last().copied().unwrap_or(MIN_SHARD)
    }

    pub fn max_created_time(&self) -> u64 {
        self.shards.iter().map(Shard::created_time).max().unwrap_or(0)
    }

    pub fn is_compaction_pending(&self) -> bool {
        self.shards.len() > 1
    }

    pub fn compaction_target(&self) -> Option<Shard> {
        let min = self.min_shard();
        self.shards
            .iter()
            .filter(|s| !s.is_compacted() && s.index() > min.index())
            .min()
            .copied()
    }

    /// Compaction may run once the target is older than `delta`.
    pub fn should_compact(&self, now: u64) -> bool {
        match self.compaction_target() {
            Some(target) => target.created_time() < now.saturating_sub(self.delta),
            None => false,
        }
    }

    /// True while the newest member is younger than `delta`.
    pub fn is_new(&self, now: u64) -> bool {
        self.max_created_time().saturating_add(self.delta) > now
    }

    /// Shards that must receive an edge written at `timestamp`.
    pub fn write_shards(&self, timestamp: u64, now: u64) -> Vec<Shard> {
        let bookend = self.min_shard();
        if !self.is_compaction_pending() {
            return vec![bookend];
        }
        let target = match self.compaction_target() {
            Some(target) => target,
            None => return vec![bookend],
        };
        if timestamp < target.index() {
            vec![bookend]
        } else if self.should_compact(now) {
            vec![target]
        } else {
            vec![target, bookend]
        }
    }
}

/// Groups shards listed newest to oldest.
pub fn group_shards(shards: impl IntoIterator<Item = Shard>, delta: u64) -> Vec<ShardEntryGroup> {
    let mut groups = Vec::new();
    let mut current = ShardEntryGroup::new(delta);
    for shard in shards {
        if !current.add_shard(shard) {
            groups.push(std::mem::replace(&mut current, ShardEntryGroup::single(shard, delta)));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
