//! Durable column store on sled
//!
//! One sled tree per column family. Keys are `row_len(u32 BE) | row | column`
//! so a row's columns are contiguous and ordered by column bytes. Values are
//! bincode-encoded cells carrying the write timestamp, tombstone flag and
//! expiry, resolved last-write-wins like the in-memory store.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::Db;

use super::memory::supersedes;
use super::{prefix_successor, Column, ColumnRange, ColumnStore, ConsistencyLevel, MutationBatch, MutationOp};
use crate::error::{GraphError, Result};
use crate::time::{next_write_timestamp, SystemTimeService, TimeService};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCell {
    value: Option<Vec<u8>>,
    timestamp: u64,
    expires_at: Option<u64>,
}

impl StoredCell {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |e| e > now)
    }
}

pub struct SledColumnStore {
    db: Db,
    clock: Arc<dyn TimeService>,
}

impl SledColumnStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemTimeService))
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn TimeService>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| GraphError::Index(format!("Failed to open sled: {}", e)))?;
        Ok(Self { db, clock })
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| GraphError::Index(format!("Failed to flush sled: {}", e)))?;
        Ok(())
    }

    fn tree(&self, column_family: &str) -> Result<sled::Tree> {
        self.db
            .open_tree(column_family)
            .map_err(|e| GraphError::Index(format!("Failed to open tree {}: {}", column_family, e)))
    }
}

fn row_prefix(row_key: &[u8]) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(4 + row_key.len());
    prefix.extend_from_slice(&(row_key.len() as u32).to_be_bytes());
    prefix.extend_from_slice(row_key);
    prefix
}

fn cell_key(prefix: &[u8], column: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + column.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(column);
    key
}

fn key_bounds(prefix: &[u8], range: &ColumnRange) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let lower = match &range.lower {
        Bound::Included(c) => Bound::Included(cell_key(prefix, c)),
        Bound::Excluded(c) => Bound::Excluded(cell_key(prefix, c)),
        Bound::Unbounded => Bound::Included(prefix.to_vec()),
    };
    let upper = match &range.upper {
        Bound::Included(c) => Bound::Included(cell_key(prefix, c)),
        Bound::Excluded(c) => Bound::Excluded(cell_key(prefix, c)),
        Bound::Unbounded => match prefix_successor(prefix) {
            Some(next) => Bound::Excluded(next),
            None => Bound::Unbounded,
        },
    };
    (lower, upper)
}

impl ColumnStore for SledColumnStore {
    fn execute(&self, batch: MutationBatch) -> Result<()> {
        let default_ts = batch.timestamp().unwrap_or_else(next_write_timestamp);
        let now = self.clock.current_time_millis();

        for mutation in batch.mutations() {
            let tree = self.tree(&mutation.column_family)?;
            let timestamp = mutation.timestamp.unwrap_or(default_ts);
            let is_delete = mutation.op == MutationOp::Delete;
            let cell = match &mutation.op {
                MutationOp::Put { value, ttl } => StoredCell {
                    value: Some(value.clone()),
                    timestamp,
                    expires_at: ttl.map(|secs| now + secs as u64 * 1000),
                },
                MutationOp::Delete => StoredCell { value: None, timestamp, expires_at: None },
            };
            let encoded = bincode::serialize(&cell)?;
            let key = cell_key(&row_prefix(&mutation.row_key), &mutation.column);

            tree.update_and_fetch(key, |old: Option<&[u8]>| {
                let existing = old
                    .and_then(|bytes| bincode::deserialize::<StoredCell>(bytes).ok())
                    .filter(|c| c.is_live(now))
                    .map(|c| (c.timestamp, c.value.is_none()));
                if supersedes(existing, timestamp, is_delete) {
                    Some(encoded.clone())
                } else {
                    old.map(|bytes| bytes.to_vec())
                }
            })?;
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
        tracing::trace!(column_family, ?consistency, "sled get_range");
        if range.is_empty() || range.limit == 0 {
            return Ok(Vec::new());
        }
        let tree = self.tree(column_family)?;
        let prefix = row_prefix(row_key);
        let now = self.clock.current_time_millis();
        let iter = tree.range(key_bounds(&prefix, range));
        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            if range.reversed { Box::new(iter.rev()) } else { Box::new(iter) };

        let mut columns = Vec::new();
        for item in iter {
            let (key, value) = item?;
            let cell: StoredCell = bincode::deserialize(&value)?;
            if !cell.is_live(now) {
                continue;
            }
            if let Some(value) = cell.value {
                columns.push(Column {
                    name: key[prefix.len()..].to_vec(),
                    value,
                    timestamp: cell.timestamp,
                });
                if columns.len() >= range.limit {
                    break;
                }
            }
        }
        Ok(columns)
    }

    fn multi_get(
        &self,
        column_family: &str,
        row_keys: &[Vec<u8>],
        columns: &[Vec<u8>],
        consistency: ConsistencyLevel,
    ) -> Result<Vec<(Vec<u8>, Vec<Column>)>> {
        tracing::trace!(column_family, rows = row_keys.len(), ?consistency, "sled multi_get");
        let tree = self.tree(column_family)?;
        let now = self.clock.current_time_millis();

        let mut result = Vec::new();
        for row_key in row_keys {
            let prefix = row_prefix(row_key);
            let mut found = Vec::new();
            for name in columns {
                let Some(raw) = tree.get(cell_key(&prefix, name))? else { continue };
                let cell: StoredCell = bincode::deserialize(&raw)?;
                if !cell.is_live(now) {
                    continue;
                }
                if let Some(value) = cell.value {
                    found.push(Column { name: name.clone(), value, timestamp: cell.timestamp });
                }
            }
            if !found.is_empty() {
                result.push((row_key.clone(), found));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sled_rows_do_not_bleed() {
        let dir = tempdir().unwrap();
        let store = SledColumnStore::open(dir.path().join("db")).unwrap();

        let mut batch = MutationBatch::new();
        batch.with_row("cf", b"ab".to_vec()).put_column(b"x".to_vec(), vec![1], None);
        batch.with_row("cf", b"a".to_vec()).put_column(b"bx".to_vec(), vec![2], None);
        store.execute(batch).unwrap();

        let cols = store
            .get_range("cf", b"a", &ColumnRange::all(10), ConsistencyLevel::One)
            .unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name, b"bx".to_vec());
    }

    #[test]
    fn test_sled_lww_and_reverse() {
        let dir = tempdir().unwrap();
        let store = SledColumnStore::open(dir.path().join("db")).unwrap();

        let mut batch = MutationBatch::new().with_timestamp(10);
        batch
            .with_row("cf", b"r".to_vec())
            .put_column(b"1".to_vec(), vec![1], None)
            .put_column(b"2".to_vec(), vec![2], None)
            .put_column(b"3".to_vec(), vec![3], None);
        store.execute(batch).unwrap();

        let mut stale = MutationBatch::new().with_timestamp(5);
        stale.with_row("cf", b"r".to_vec()).delete_column(b"2".to_vec());
        store.execute(stale).unwrap();

        let range = ColumnRange::all(10).reversed(true);
        let names: Vec<Vec<u8>> = store
            .get_range("cf", b"r", &range, ConsistencyLevel::One)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec![b"3".to_vec(), b"2".to_vec(), b"1".to_vec()]);

        let mut delete = MutationBatch::new().with_timestamp(10);
        delete.with_row("cf", b"r".to_vec()).delete_column(b"2".to_vec());
        store.execute(delete).unwrap();
        assert_eq!(store.get_range("cf", b"r", &range, ConsistencyLevel::One).unwrap().len(), 2);
    }

    #[test]
    fn test_sled_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        {
            let store = SledColumnStore::open(&path).unwrap();
            let mut batch = MutationBatch::new();
            batch.with_row("cf", b"r".to_vec()).put_column(b"c".to_vec(), vec![9], None);
            store.execute(batch).unwrap();
            store.flush().unwrap();
        }
        let store = SledColumnStore::open(&path).unwrap();
        let rows = store
            .multi_get("cf", &[b"r".to_vec()], &[b"c".to_vec()], ConsistencyLevel::One)
            .unwrap();
        assert_eq!(rows[0].1[0].value, vec![9]);
    }
}
