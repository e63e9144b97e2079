//! Column-family store
//!
//! The engine only needs a keyed range-scan store: rows of byte columns kept
//! in byte order, batched puts/deletes (atomic per row), range reads in either
//! direction, and multi-row gets. Conflicting writes to one column resolve by
//! write timestamp, last writer wins, a delete wins a tie.

pub mod codec;
pub mod memory;
pub mod sled_store;

use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemoryColumnStore;
pub use sled_store::SledColumnStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    One,
    LocalQuorum,
    #[default]
    Quorum,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: u64,
}

/// Column slice of one row. Bounds are on column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
    /// Return columns from `upper` downwards.
    pub reversed: bool,
    pub limit: usize,
}

impl ColumnRange {
    pub fn all(limit: usize) -> Self {
        Self { lower: Bound::Unbounded, upper: Bound::Unbounded, reversed: false, limit }
    }

    pub fn new(lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>, reversed: bool, limit: usize) -> Self {
        Self { lower, upper, reversed, limit }
    }

    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn contains(&self, column: &[u8]) -> bool {
        let above = match &self.lower {
            Bound::Included(b) => column >= b.as_slice(),
            Bound::Excluded(b) => column > b.as_slice(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(b) => column <= b.as_slice(),
            Bound::Excluded(b) => column < b.as_slice(),
            Bound::Unbounded => true,
        };
        above && below
    }

    /// True when no column can fall inside the range.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }
}

/// Tighter of two lower bounds.
pub fn max_lower(a: Bound<Vec<u8>>, b: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (a, b) => {
            let (ka, kb) = (bound_key(&a), bound_key(&b));
            if ka > kb || (ka == kb && matches!(a, Bound::Excluded(_))) {
                a
            } else {
                b
            }
        }
    }
}

/// Tighter of two upper bounds.
pub fn min_upper(a: Bound<Vec<u8>>, b: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (a, b) => {
            let (ka, kb) = (bound_key(&a), bound_key(&b));
            if ka < kb || (ka == kb && matches!(a, Bound::Excluded(_))) {
                a
            } else {
                b
            }
        }
    }
}

fn bound_key(bound: &Bound<Vec<u8>>) -> &[u8] {
    match bound {
        Bound::Included(k) | Bound::Excluded(k) => k,
        Bound::Unbounded => &[],
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last < u8::MAX {
            next.push(last + 1);
            return Some(next);
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOp {
    Put { value: Vec<u8>, ttl: Option<u32> },
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub column_family: String,
    pub row_key: Vec<u8>,
    pub column: Vec<u8>,
    pub op: MutationOp,
    /// Overrides the batch timestamp for this column.
    pub timestamp: Option<u64>,
}

/// Batched puts and deletes submitted in one round trip.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
    timestamp: Option<u64>,
    consistency: ConsistencyLevel,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn set_consistency(&mut self, consistency: ConsistencyLevel) {
        self.consistency = consistency;
    }

    pub fn with_row(&mut self, column_family: &str, row_key: Vec<u8>) -> RowMutation<'_> {
        RowMutation {
            batch: self,
            column_family: column_family.to_string(),
            row_key,
            timestamp: None,
        }
    }

    /// Appends another batch, pinning its batch timestamp onto its columns.
    pub fn merge(&mut self, other: MutationBatch) {
        let pinned = other.timestamp;
        self.mutations.extend(other.mutations.into_iter().map(|mut m| {
            if m.timestamp.is_none() {
                m.timestamp = pinned;
            }
            m
        }));
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

pub struct RowMutation<'a> {
    batch: &'a mut MutationBatch,
    column_family: String,
    row_key: Vec<u8>,
    timestamp: Option<u64>,
}

impl<'a> RowMutation<'a> {
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn put_column(&mut self, name: Vec<u8>, value: Vec<u8>, ttl: Option<u32>) -> &mut Self {
        self.push(name, MutationOp::Put { value, ttl });
        self
    }

    pub fn delete_column(&mut self, name: Vec<u8>) -> &mut Self {
        self.push(name, MutationOp::Delete);
        self
    }

    fn push(&mut self, column: Vec<u8>, op: MutationOp) {
        self.batch.mutations.push(Mutation {
            column_family: self.column_family.clone(),
            row_key: self.row_key.clone(),
            column,
            op,
            timestamp: self.timestamp,
        });
    }
}

/// Minimal contract of the wide-column store.
pub trait ColumnStore: Send + Sync {
    /// Applies a batch. Connectivity failures surface as `GraphError::Connection`.
    fn execute(&self, batch: MutationBatch) -> Result<()>;

    fn get_range(
        &self,
        column_family: &str,
        row_key: &[u8],
        range: &ColumnRange,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<Column>>;

    /// Reads `columns` of every row in `row_keys`. Rows without any of them are omitted.
    fn multi_get(
        &self,
        column_family: &str,
        row_keys: &[Vec<u8>],
        columns: &[Vec<u8>],
        consistency: ConsistencyLevel,
    ) -> Result<Vec<(Vec<u8>, Vec<Column>)>>;
}
