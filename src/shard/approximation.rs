//! Approximate per-shard edge counters
//!
//! Process-local and never persisted: a restart starts every shard at zero,
//! which only delays the next split.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{ApplicationScope, DirectedEdgeMeta, Shard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    scope: ApplicationScope,
    shard_index: u64,
    meta: DirectedEdgeMeta,
}

#[derive(Default)]
pub struct NodeShardApproximation {
    counters: RwLock<HashMap<CounterKey, Arc<AtomicI64>>>,
}

impl NodeShardApproximation {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, scope: &ApplicationScope, shard: &Shard, meta: &DirectedEdgeMeta) -> Arc<AtomicI64> {
        let key = CounterKey { scope: scope.clone(), shard_index: shard.index(), meta: meta.clone() };
        if let Some(counter) = self.counters.read().get(&key) {
            return counter.clone();
        }
        self.counters.write().entry(key).or_default().clone()
    }

    pub fn increment(&self, scope: &ApplicationScope, shard: &Shard, count: i64, meta: &DirectedEdgeMeta) {
        self.counter(scope, shard, meta).fetch_add(count, Ordering::Relaxed);
    }

    pub fn decrement(&self, scope: &ApplicationScope, shard: &Shard, count: i64, meta: &DirectedEdgeMeta) {
        self.counter(scope, shard, meta).fetch_sub(count, Ordering::Relaxed);
    }

    /// Current estimate, never below zero.
    pub fn get_count(&self, scope: &ApplicationScope, shard: &Shard, meta: &DirectedEdgeMeta) -> u64 {
        let key = CounterKey { scope: scope.clone(), shard_index: shard.index(), meta: meta.clone() };
        self.counters
            .read()
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed).max(0) as u64)
            .unwrap_or(0)
    }

    pub fn tracked_keys(&self) -> usize {
        self.counters.read().len()
    }
}
