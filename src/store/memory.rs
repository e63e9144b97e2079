//! In-memory column store
//!
//! Same semantics as a real wide-column store: ordered columns per row,
//! last-write-wins by timestamp with deletes kept as tombstones, TTL expiry.
//! Counts reads and writes and can be switched offline, which tests use to
//! observe store traffic and connection failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Column, ColumnRange, ColumnStore, ConsistencyLevel, MutationBatch, MutationOp};
use crate::error::{GraphError, Result};
use crate::time::{next_write_timestamp, SystemTimeService, TimeService};

#[derive(Debug, Clone)]
struct Cell {
    /// `None` marks a tombstone.
    value: Option<Vec<u8>>,
    timestamp: u64,
    expires_at: Option<u64>,
}

impl Cell {
    fn live_value(&self, now: u64) -> Option<&Vec<u8>> {
        match self.expires_at {
            Some(expiry) if expiry <= now => None,
            _ => self.value.as_ref(),
        }
    }
}

type Row = BTreeMap<Vec<u8>, Cell>;

/// Whether a write at `timestamp` replaces a cell written at `existing`.
///
/// `existing` is `(timestamp, is_tombstone)`. On equal timestamps a delete wins.
pub(crate) fn supersedes(existing: Option<(u64, bool)>, timestamp: u64, is_delete: bool) -> bool {
    match existing {
        None => true,
        Some((old, _)) if timestamp > old => true,
        Some((old, _)) if timestamp < old => false,
        Some((_, old_tombstone)) => is_delete || !old_tombstone,
    }
}

pub struct MemoryColumnStore {
    families: RwLock<HashMap<String, HashMap<Vec<u8>, Row>>>,
    clock: Arc<dyn TimeService>,
    reads: AtomicU64,
    writes: AtomicU64,
    available: AtomicBool,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemTimeService))
    }

    /// Store whose TTL expiry follows `clock`.
    pub fn with_clock(clock: Arc<dyn TimeService>) -> Self {
        Self {
            families: RwLock::new(HashMap::new()),
            clock,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Simulates losing (or regaining) the connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Live column count across every row of a column family.
    pub fn live_column_count(&self, column_family: &str) -> usize {
        let now = self.clock.current_time_millis();
        let families = self.families.read();
        families
            .get(column_family)
            .map(|rows| {
                rows.values()
                    .map(|row| row.values().filter(|c| c.live_value(now).is_some()).count())
                    .sum()
            })
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GraphError::Connection("memory store is offline".into()))
        }
    }
}

impl Default for MemoryColumnStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnStore for MemoryColumnStore {
    fn execute(&self, batch: MutationBatch) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        if batch.is_empty() {
            return Ok(());
        }

        let default_ts = batch.timestamp().unwrap_or_else(next_write_timestamp);
        let now = self.clock.current_time_millis();
        let mut families = self.families.write();

        for mutation in batch.mutations() {
            let timestamp = mutation.timestamp.unwrap_or(default_ts);
            let row = families
                .entry(mutation.column_family.clone())
                .or_default()
                .entry(mutation.row_key.clone())
                .or_default();

            let existing = row
                .get(&mutation.column)
                .filter(|c| c.expires_at.map_or(true, |e| e > now))
                .map(|c| (c.timestamp, c.value.is_none()));
            let is_delete = mutation.op == MutationOp::Delete;
            if !supersedes(existing, timestamp, is_delete) {
                continue;
            }

            let cell = match &mutation.op {
                MutationOp::Put { value, ttl } => Cell {
                    value: Some(value.clone()),
                    timestamp,
                    expires_at: ttl.map(|secs| now + secs as u64 * 1000),
                },
                MutationOp::Delete => Cell { value: None, timestamp, expires_at: None },
            };
            row.insert(mutation.column.clone(), cell);
        }
        Ok(())
    }

    fn get_range(
        &self,
        column_family: &str,
        row_key: &[u8],
        range: &ColumnRange,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<Column>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(column_family, ?consistency, "memory get_range");

        if range.is_empty() || range.limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.current_time_millis();
        let families = self.families.read();
        let row = match families.get(column_family).and_then(|rows| rows.get(row_key)) {
            Some(row) => row,
            None => return Ok(Vec::new()),
        };

        let slice = row.range((range.lower.clone(), range.upper.clone()));
        let live = |(name, cell): (&Vec<u8>, &Cell)| {
            cell.live_value(now).map(|value| Column {
                name: name.clone(),
                value: value.clone(),
                timestamp: cell.timestamp,
            })
        };
        let columns = if range.reversed {
            slice.rev().filter_map(live).take(range.limit).collect()
        } else {
            slice.filter_map(live).take(range.limit).collect()
        };
        Ok(columns)
    }

    fn multi_get(
        &self,
        column_family: &str,
        row_keys: &[Vec<u8>],
        columns: &[Vec<u8>],
        consistency: ConsistencyLevel,
    ) -> Result<Vec<(Vec<u8>, Vec<Column>)>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(column_family, rows = row_keys.len(), ?consistency, "memory multi_get");

        let now = self.clock.current_time_millis();
        let families = self.families.read();
        let rows = match families.get(column_family) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        let mut result = Vec::new();
        for key in row_keys {
            let Some(row) = rows.get(key) else { continue };
            let found: Vec<Column> = columns
                .iter()
                .filter_map(|name| {
                    let cell = row.get(name)?;
                    cell.live_value(now).map(|value| Column {
                        name: name.clone(),
                        value: value.clone(),
                        timestamp: cell.timestamp,
                    })
                })
                .collect();
            if !found.is_empty() {
                result.push((key.clone(), found));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeService;
    use std::ops::Bound;

    fn put(store: &MemoryColumnStore, column: &[u8], value: u8, ts: u64) {
        let mut batch = MutationBatch::new().with_timestamp(ts);
        batch.with_row("cf", b"row".to_vec()).put_column(column.to_vec(), vec![value], None);
        store.execute(batch).unwrap();
    }

    fn delete(store: &MemoryColumnStore, column: &[u8], ts: u64) {
        let mut batch = MutationBatch::new().with_timestamp(ts);
        batch.with_row("cf", b"row".to_vec()).delete_column(column.to_vec());
        store.execute(batch).unwrap();
    }

    fn read_all(store: &MemoryColumnStore) -> Vec<Column> {
        store
            .get_range("cf", b"row", &ColumnRange::all(100), ConsistencyLevel::One)
            .unwrap()
    }

    #[test]
    fn test_last_write_wins() {
        let store = MemoryColumnStore::new();
        put(&store, b"a", 1, 10);
        put(&store, b"a", 2, 5);
        assert_eq!(read_all(&store)[0].value, vec![1]);

        put(&store, b"a", 3, 11);
        assert_eq!(read_all(&store)[0].value, vec![3]);
    }

    #[test]
    fn test_delete_wins_timestamp_tie() {
        let store = MemoryColumnStore::new();
        put(&store, b"a", 1, 10);
        delete(&store, b"a", 10);
        assert!(read_all(&store).is_empty());

        put(&store, b"a", 1, 10);
        assert!(read_all(&store).is_empty());

        delete(&store, b"a", 9);
        put(&store, b"a", 1, 11);
        assert_eq!(read_all(&store).len(), 1);
    }

    #[test]
    fn test_range_bounds_and_reverse() {
        let store = MemoryColumnStore::new();
        for (i, col) in [b"a", b"b", b"c", b"d"].iter().enumerate() {
            put(&store, *col, i as u8, 1);
        }
        let range = ColumnRange::new(Bound::Excluded(b"a".to_vec()), Bound::Included(b"c".to_vec()), true, 10);
        let names: Vec<Vec<u8>> = store
            .get_range("cf", b"row", &range, ConsistencyLevel::One)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec![b"c".to_vec(), b"b".to_vec()]);

        let limited = ColumnRange::all(2);
        assert_eq!(store.get_range("cf", b"row", &limited, ConsistencyLevel::One).unwrap().len(), 2);
    }

    #[test]
    fn test_ttl_expiry() {
        let clock = Arc::new(ManualTimeService::new(1_000));
        let store = MemoryColumnStore::with_clock(clock.clone());
        let mut batch = MutationBatch::new();
        batch.with_row("cf", b"row".to_vec()).put_column(b"a".to_vec(), vec![1], Some(2));
        store.execute(batch).unwrap();

        assert_eq!(read_all(&store).len(), 1);
        clock.advance(2_000);
        assert!(read_all(&store).is_empty());
    }

    #[test]
    fn test_offline_store_fails_with_connection_error() {
        let store = MemoryColumnStore::new();
        store.set_available(false);
        let err = store
            .get_range("cf", b"row", &ColumnRange::all(1), ConsistencyLevel::One)
            .unwrap_err();
        assert_eq!(err.code(), "CONNECTION");
        assert!(store.execute(MutationBatch::new()).is_err());
    }

    #[test]
    fn test_multi_get_and_counters() {
        let store = MemoryColumnStore::new();
        put(&store, b"a", 1, 1);
        let rows = store
            .multi_get(
                "cf",
                &[b"row".to_vec(), b"missing".to_vec()],
                &[b"a".to_vec(), b"z".to_vec()],
                ConsistencyLevel::One,
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.len(), 1);
        assert_eq!(store.read_count(), 1);
        assert_eq!(store.write_count(), 1);
    }
}
