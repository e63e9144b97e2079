//! Edge type and id type registries
//!
//! For every node the index remembers which edge types it has (per
//! direction) and, per edge type, the id types of the far endpoints. Columns
//! are the type names themselves, so reads come back in lexical order and a
//! prefix search is a plain column range.
//!
//! Two generations coexist: `v1` keeps one row per node, `v2` spreads the
//! same columns over hash buckets. `proxy` picks between them from the
//! persisted migration state.

pub mod proxy;
pub mod v1;
pub mod v2;

use std::ops::Bound;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::iter::{BoxedIter, ColumnPager, DistinctUntilChanged, OrderedMerge};
use crate::model::{ApplicationScope, Edge, Id, SearchEdgeType, SearchIdType};
use crate::store::{max_lower, prefix_successor, Column, ColumnRange, ColumnStore, ConsistencyLevel, MutationBatch};

pub use proxy::{EdgeMetadataSerializationProxy, MetadataVersion, DATA_MIGRATION_CF};
pub use v1::EdgeMetadataSerializationV1;
pub use v2::EdgeMetadataSerializationV2;

pub trait EdgeMetadataSerialization: Send + Sync {
    /// Registers the edge's type and endpoint id types for both endpoints.
    fn write_edge(&self, scope: &ApplicationScope, edge: &Edge) -> MutationBatch;

    fn remove_edge_type_from_source(&self, scope: &ApplicationScope, node: &Id, edge_type: &str, version: u64)
        -> MutationBatch;

    fn remove_edge_type_to_target(&self, scope: &ApplicationScope, node: &Id, edge_type: &str, version: u64)
        -> MutationBatch;

    fn remove_id_type_from_source(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch;

    fn remove_id_type_to_target(
        &self,
        scope: &ApplicationScope,
        node: &Id,
        edge_type: &str,
        id_type: &str,
        version: u64,
    ) -> MutationBatch;

    fn get_edge_types_from_source(
        &self,
        scope: &ApplicationScope,
        search: &SearchEdgeType,
    ) -> Result<BoxedIter<String>>;

    fn get_edge_types_to_target(&self, scope: &ApplicationScope, search: &SearchEdgeType) -> Result<BoxedIter<String>>;

    fn get_id_types_from_source(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>>;

    fn get_id_types_to_target(&self, scope: &ApplicationScope, search: &SearchIdType) -> Result<BoxedIter<String>>;
}

/// Which endpoint a registry row is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Source,
    Target,
}

/// Column family names of one index generation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeFamilies {
    pub source_edge_types: &'static str,
    pub source_id_types: &'static str,
    pub target_edge_types: &'static str,
    pub target_id_types: &'static str,
}

impl TypeFamilies {
    pub fn edge_types(&self, direction: Direction) -> &'static str {
        match direction {
            Direction::Source => self.source_edge_types,
            Direction::Target => self.target_edge_types,
        }
    }

    pub fn id_types(&self, direction: Direction) -> &'static str {
        match direction {
            Direction::Source => self.source_id_types,
            Direction::Target => self.target_id_types,
        }
    }
}

/// Column range for a type search: optional prefix, resuming after `last`.
pub(crate) fn type_range(prefix: Option<&str>, last: Option<&str>, page_size: usize) -> ColumnRange {
    let (mut lower, upper) = match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => (
            Bound::Included(prefix.as_bytes().to_vec()),
            prefix_successor(prefix.as_bytes()).map_or(Bound::Unbounded, Bound::Excluded),
        ),
        None => (Bound::Unbounded, Bound::Unbounded),
    };
    if let Some(last) = last {
        lower = max_lower(lower, Bound::Excluded(last.as_bytes().to_vec()));
    }
    ColumnRange::new(lower, upper, false, page_size)
}

fn decode_type(column: Result<Column>) -> Result<String> {
    let column = column?;
    String::from_utf8(column.name).map_err(|e| GraphError::InvalidFormat(format!("type column is not utf-8: {}", e)))
}

/// Type names stored in one row.
pub(crate) fn read_types(
    store: &Arc<dyn ColumnStore>,
    column_family: &str,
    row_key: Vec<u8>,
    range: ColumnRange,
    consistency: ConsistencyLevel,
) -> BoxedIter<String> {
    let pager = ColumnPager::new(store.clone(), column_family, row_key, range, consistency);
    Box::new(pager.map(decode_type))
}

/// Lexically merged, de-duplicated union of sorted type streams.
pub(crate) fn merge_types(mut sources: Vec<BoxedIter<String>>, window: usize) -> BoxedIter<String> {
    if sources.len() == 1 {
        if let Some(single) = sources.pop() {
            return single;
        }
    }
    let merged = OrderedMerge::new(sources, window, |a: &String, b: &String| a.cmp(b));
    Box::new(DistinctUntilChanged::new(Box::new(merged), |s: &String| s.clone()))
}
