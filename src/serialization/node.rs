//! Node tombstones
//!
//! One column per node recording the version it was deleted at. The column
//! is written with the version as its timestamp, so an older mark or unmark
//! never overrides a newer one.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::Result;
use crate::model::{ApplicationScope, Id, MarkedEdge};
use crate::store::{codec, Column, ColumnStore, ConsistencyLevel, MutationBatch};

pub const MARKED_NODES_CF: &str = "Graph_Marked_Nodes";

const DELETED_COLUMN: &[u8] = b"deleted";

pub struct NodeSerialization {
    store: Arc<dyn ColumnStore>,
    max_multiget_rows: usize,
    consistency: ConsistencyLevel,
}

impl NodeSerialization {
    pub fn new(store: Arc<dyn ColumnStore>, max_multiget_rows: usize, consistency: ConsistencyLevel) -> Self {
        Self { store, max_multiget_rows: max_multiget_rows.max(1), consistency }
    }

    /// Marks `node` deleted as of `version`.
    pub fn mark(&self, scope: &ApplicationScope, node: &Id, version: u64) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch
            .with_row(MARKED_NODES_CF, codec::node_row_key(scope, node))
            .with_timestamp(version)
            .put_column(DELETED_COLUMN.to_vec(), codec::u64_value(version), None);
        batch
    }

    /// Removes the mark left at `version`; a newer mark survives.
    pub fn delete(&self, scope: &ApplicationScope, node: &Id, version: u64) -> MutationBatch {
        let mut batch = MutationBatch::new();
        batch
            .with_row(MARKED_NODES_CF, codec::node_row_key(scope, node))
            .with_timestamp(version)
            .delete_column(DELETED_COLUMN.to_vec());
        batch
    }

    pub fn get_max_version(&self, scope: &ApplicationScope, node: &Id) -> Result<Option<u64>> {
        let rows = self.store.multi_get(
            MARKED_NODES_CF,
            &[codec::node_row_key(scope, node)],
            &[DELETED_COLUMN.to_vec()],
            self.consistency,
        )?;
        match rows.first().and_then(|(_, columns)| columns.first()) {
            Some(column) => Ok(Some(codec::decode_u64_value(&column.value)?)),
            None => Ok(None),
        }
    }

    /// Tombstone versions of both endpoints of every edge. Unmarked nodes are absent.
    pub fn get_max_versions(&self, scope: &ApplicationScope, edges: &[MarkedEdge]) -> Result<HashMap<Id, u64>> {
        let mut by_row: HashMap<Vec<u8>, Id> = HashMap::with_capacity(edges.len() * 2);
        for edge in edges {
            for node in [&edge.source, &edge.target] {
                by_row.entry(codec::node_row_key(scope, node)).or_insert_with(|| node.clone());
            }
        }
        let row_keys: Vec<Vec<u8>> = by_row.keys().cloned().collect();
        tracing::trace!(rows = row_keys.len(), chunk = self.max_multiget_rows, "tombstone multi-get");

        let chunks: Vec<Vec<(Vec<u8>, Vec<Column>)>> = row_keys
            .par_chunks(self.max_multiget_rows)
            .map(|chunk| self.store.multi_get(MARKED_NODES_CF, chunk, &[DELETED_COLUMN.to_vec()], self.consistency))
            .collect::<Result<_>>()?;

        let mut versions = HashMap::new();
        for (row_key, columns) in chunks.into_iter().flatten() {
            let (Some(node), Some(column)) = (by_row.get(&row_key), columns.first()) else {
                continue;
            };
            versions.insert(node.clone(), codec::decode_u64_value(&column.value)?);
        }
        Ok(versions)
    }
}
