//! Paged column iterator over one row

use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::store::{Column, ColumnRange, ColumnStore, ConsistencyLevel};

/// Walks a column range page by page, moving the range bound past the last
/// column of each page.
pub struct ColumnPager {
    store: Arc<dyn ColumnStore>,
    column_family: String,
    row_key: Vec<u8>,
    range: ColumnRange,
    consistency: ConsistencyLevel,
    buffer: VecDeque<Column>,
    done: bool,
    error: Option<GraphError>,
}

impl ColumnPager {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        column_family: impl Into<String>,
        row_key: Vec<u8>,
        range: ColumnRange,
        consistency: ConsistencyLevel,
    ) -> Self {
        let done = range.is_empty();
        Self {
            store,
            column_family: column_family.into(),
            row_key,
            range,
            consistency,
            buffer: VecDeque::new(),
            done,
            error: None,
        }
    }

    /// Loads the first page ahead of iteration. Errors are kept for `next`.
    pub fn prefetch(&mut self) {
        if self.buffer.is_empty() && !self.done && self.error.is_none() {
            if let Err(e) = self.fetch_page() {
                self.error = Some(e);
            }
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .store
            .get_range(&self.column_family, &self.row_key, &self.range, self.consistency)?;
        if page.len() < self.range.limit {
            self.done = true;
        }
        if let Some(last) = page.last() {
            let after = Bound::Excluded(last.name.clone());
            if self.range.reversed {
                self.range.upper = after;
            } else {
                self.range.lower = after;
            }
        } else {
            self.done = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for ColumnPager {
    type Item = Result<Column>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.error.take() {
            self.done = true;
            return Some(Err(e));
        }
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
