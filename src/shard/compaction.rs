//! Shard group audit and compaction
//!
//! Reads report every shard group they drain to [`ShardGroupCompaction::evaluate_shard_group`].
//! With probability `shard_repair_chance` the group is audited in the
//! background:
//!
//! - steady group (one shard): ask the allocator whether it should split
//! - pending group older than `min_delta`: run one compaction pass
//!
//! A compaction pass moves every edge with `timestamp >= target.index` from
//! the other members into the target, one page per batch (write target, delete
//! source). Storage and commit-log rows are both moved. A pass that finds
//! nothing to move finishes the transition: drained uncompacted members are
//! removed and the target is persisted as compacted.
//!
//! The same `(scope, meta, group)` is never audited twice concurrently.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::model::{ApplicationScope, DirectedEdgeMeta, Shard, ShardEntryGroup};
use crate::serialization::{EdgeColumnFamilies, ShardedEdgeSerialization};
use crate::store::{codec, ColumnStore, MutationBatch};
use crate::time::TimeService;

use super::{EdgeShardSerialization, NodeShardCache, TaskExecutor, TaskHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditResult {
    /// Skipped: sampled out, already running, or the pool was full.
    NotChecked,
    CheckedNoOp,
    CheckedCreated,
    /// A compaction pass moved edges; the group is not finished yet.
    Compacting,
    Compacted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionResult {
    pub copied: u64,
    pub target: Option<Shard>,
    pub sources: Vec<Shard>,
    pub removed: Vec<Shard>,
    pub compacted: Option<Shard>,
}

pub trait ShardGroupCompaction: Send + Sync {
    /// Runs one compaction pass over a pending group in the background.
    fn compact(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        group: &ShardEntryGroup,
    ) -> TaskHandle<Result<CompactionResult>>;

    fn evaluate_shard_group(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        group: &ShardEntryGroup,
    ) -> TaskHandle<AuditResult>;
}

struct CompactionInner {
    store: Arc<dyn ColumnStore>,
    cache: Arc<NodeShardCache>,
    shard_serialization: Arc<EdgeShardSerialization>,
    sharded_edges: Arc<ShardedEdgeSerialization>,
    time: Arc<dyn TimeService>,
    config: Arc<GraphConfig>,
    running: Mutex<HashSet<[u8; 32]>>,
}

/// Releases a tracker slot when the task (or the rejected closure) is dropped.
struct TrackerGuard {
    inner: Arc<CompactionInner>,
    key: [u8; 32],
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.inner.running.lock().remove(&self.key);
    }
}

fn tracker_key(scope: &ApplicationScope, meta: &DirectedEdgeMeta, group: &ShardEntryGroup) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&codec::shard_meta_row_key(scope, meta));
    for shard in group.read_shards() {
        hasher.update(&shard.index().to_be_bytes());
    }
    *hasher.finalize().as_bytes()
}

impl CompactionInner {
    /// Moves the source's edges at or above the target index, one page per batch.
    fn move_edges(
        &self,
        families: &EdgeColumnFamilies,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        source: &Shard,
        target: &Shard,
    ) -> Result<u64> {
        let page_size = self.config.scan_page_size;
        let mut batch = MutationBatch::new().with_consistency(self.config.write_consistency);
        let mut in_batch = 0usize;
        let mut moved = 0u64;
        for edge in self
            .sharded_edges
            .scan_shard_from(families, scope, meta, source, target.index())
        {
            let edge = edge?;
            self.sharded_edges
                .write_edge(&mut batch, families, scope, meta, &[*target], &edge);
            self.sharded_edges
                .delete_edge(&mut batch, families, scope, meta, &[*source], &edge);
            in_batch += 1;
            moved += 1;
            if in_batch >= page_size {
                let full = std::mem::replace(
                    &mut batch,
                    MutationBatch::new().with_consistency(self.config.write_consistency),
                );
                self.store.execute(full)?;
                in_batch = 0;
            }
        }
        if !batch.is_empty() {
            self.store.execute(batch)?;
        }
        Ok(moved)
    }

    fn audit(&self, scope: &ApplicationScope, meta: &DirectedEdgeMeta, group: &ShardEntryGroup) -> AuditResult {
        if !group.is_compaction_pending() {
            return match self.cache.allocation().audit_shard(scope, group, meta) {
                Ok(true) => {
                    self.cache.invalidate(scope, meta);
                    AuditResult::CheckedCreated
                }
                Ok(false) => AuditResult::CheckedNoOp,
                Err(e) => {
                    tracing::error!(?meta, error = %e, "shard audit failed");
                    AuditResult::CheckedNoOp
                }
            };
        }

        let now = self.time.current_time_millis();
        if !group.should_compact(now) {
            return AuditResult::CheckedNoOp;
        }
        match self.compact_group(scope, meta, group) {
            Ok(result) if result.compacted.is_some() => AuditResult::Compacted,
            Ok(_) => AuditResult::Compacting,
            Err(e) => {
                tracing::error!(?meta, error = %e, "shard compaction failed");
                AuditResult::CheckedNoOp
            }
        }
    }

    fn compact_group(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        group: &ShardEntryGroup,
    ) -> Result<CompactionResult> {
        let Some(target) = group.compaction_target() else {
            return Ok(CompactionResult::default());
        };
        let sources: Vec<Shard> = group.read_shards().iter().copied().filter(|s| *s != target).collect();
        let families = [EdgeColumnFamilies::storage(), EdgeColumnFamilies::commit_log(self.config.commit_log_ttl())];

        let mut copied = 0u64;
        for families in &families {
            for source in &sources {
                copied += self.move_edges(families, scope, meta, source, &target)?;
            }
        }

        let mut result = CompactionResult {
            copied,
            target: Some(target),
            sources: sources.clone(),
            ..Default::default()
        };
        if copied > 0 {
            tracing::info!(?meta, ?target, copied, "moved edges into compaction target");
            return Ok(result);
        }

        let removed: Vec<Shard> = sources.into_iter().filter(|s| !s.is_compacted()).collect();
        let compacted = target.as_compacted();
        let mut batch = self
            .shard_serialization
            .write_shard_meta(scope, &compacted, meta)?
            .with_consistency(self.config.write_consistency);
        for shard in &removed {
            batch.merge(self.shard_serialization.remove_shard_meta(scope, shard, meta));
        }
        self.store.execute(batch)?;
        self.cache.invalidate(scope, meta);

        tracing::info!(?meta, ?compacted, removed = removed.len(), "shard group compacted");
        result.removed = removed;
        result.compacted = Some(compacted);
        Ok(result)
    }
}

pub struct ShardGroupCompactionImpl {
    inner: Arc<CompactionInner>,
    executor: Arc<TaskExecutor>,
}

impl ShardGroupCompactionImpl {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        cache: Arc<NodeShardCache>,
        shard_serialization: Arc<EdgeShardSerialization>,
        sharded_edges: Arc<ShardedEdgeSerialization>,
        executor: Arc<TaskExecutor>,
        time: Arc<dyn TimeService>,
        config: Arc<GraphConfig>,
    ) -> Self {
        Self {
            inner: Arc::new(CompactionInner {
                store,
                cache,
                shard_serialization,
                sharded_edges,
                time,
                config,
                running: Mutex::new(HashSet::new()),
            }),
            executor,
        }
    }

    fn sampled_out(&self) -> bool {
        rand::thread_rng().gen::<f64>() >= self.inner.config.shard_repair_chance
    }

    fn track(&self, key: [u8; 32]) -> Option<TrackerGuard> {
        if self.inner.running.lock().insert(key) {
            Some(TrackerGuard { inner: self.inner.clone(), key })
        } else {
            None
        }
    }
}

impl ShardGroupCompaction for ShardGroupCompactionImpl {
    fn compact(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        group: &ShardEntryGroup,
    ) -> TaskHandle<Result<CompactionResult>> {
        let now = self.inner.time.current_time_millis();
        if !group.is_compaction_pending() {
            tracing::warn!(?meta, "compaction requested for a group with nothing pending");
            return TaskHandle::ready(Err(GraphError::Validation("shard group has no pending compaction".into())));
        }
        if !group.should_compact(now) {
            tracing::warn!(?meta, "compaction requested before the group is old enough");
            return TaskHandle::ready(Err(GraphError::Validation("shard group is too new to compact".into())));
        }

        let inner = self.inner.clone();
        let (scope, meta, group) = (scope.clone(), meta.clone(), group.clone());
        match self.executor.submit(move || inner.compact_group(&scope, &meta, &group)) {
            Ok(handle) => handle,
            Err(e) => TaskHandle::ready(Err(e)),
        }
    }

    fn evaluate_shard_group(
        &self,
        scope: &ApplicationScope,
        meta: &DirectedEdgeMeta,
        group: &ShardEntryGroup,
    ) -> TaskHandle<AuditResult> {
        if self.sampled_out() {
            return TaskHandle::ready(AuditResult::NotChecked);
        }
        let Some(guard) = self.track(tracker_key(scope, meta, group)) else {
            tracing::trace!(?meta, "shard group audit already running");
            return TaskHandle::ready(AuditResult::NotChecked);
        };

        let inner = self.inner.clone();
        let (scope, meta, group) = (scope.clone(), meta.clone(), group.clone());
        let submitted = self.executor.submit(move || {
            let _guard = guard;
            inner.audit(&scope, &meta, &group)
        });
        match submitted {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "shard audit rejected");
                TaskHandle::ready(AuditResult::NotChecked)
            }
        }
    }
}

/// Compactor for deployments that disable background shard maintenance.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpShardGroupCompaction;

impl ShardGroupCompaction for NoOpShardGroupCompaction {
    fn compact(
        &self,
        _scope: &ApplicationScope,
        _meta: &DirectedEdgeMeta,
        _group: &ShardEntryGroup,
    ) -> TaskHandle<Result<CompactionResult>> {
        TaskHandle::ready(Ok(CompactionResult::default()))
    }

    fn evaluate_shard_group(
        &self,
        _scope: &ApplicationScope,
        _meta: &DirectedEdgeMeta,
        _group: &ShardEntryGroup,
    ) -> TaskHandle<AuditResult> {
        TaskHandle::ready(AuditResult::NotChecked)
    }
}
