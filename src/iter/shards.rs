//! Iteration across the shard groups of one meta key
//!
//! Groups are read one after another in the requested order; each group is
//! opened lazily, only once the previous one is drained. When a group runs
//! out, the source is told how many items it produced so it can schedule
//! shard maintenance.

use std::collections::VecDeque;

use super::merge::BoxedIter;
use crate::error::Result;
use crate::model::ShardEntryGroup;

/// Inclusive timestamp span owned by one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub lower: u64,
    pub upper: u64,
}

impl TimeSpan {
    pub fn is_empty(&self) -> bool {
        self.lower > self.upper
    }
}

/// Splits `[0, max_timestamp]` between groups listed newest-first.
///
/// A group owns timestamps from its lowest shard index up to just below the
/// next newer group's start.
pub fn group_spans(groups_newest_first: &[ShardEntryGroup], max_timestamp: u64) -> Vec<TimeSpan> {
    let mut spans = Vec::with_capacity(groups_newest_first.len());
    let mut upper = max_timestamp;
    for (i, group) in groups_newest_first.iter().enumerate() {
        let lower = group.min_shard().index();
        if i > 0 {
            let newer_start = groups_newest_first[i - 1].min_shard().index();
            upper = upper.min(newer_start.saturating_sub(1));
            if newer_start == 0 {
                // nothing can sit below a group starting at zero
                spans.push(TimeSpan { lower: 1, upper: 0 });
                continue;
            }
        }
        spans.push(TimeSpan { lower, upper });
    }
    spans
}

pub trait GroupSource: Send {
    type Item;

    fn open(&self, group: &ShardEntryGroup, span: TimeSpan) -> Result<BoxedIter<Self::Item>>;

    /// Called once a group has been read to the end.
    fn finished(&self, group: &ShardEntryGroup, emitted: usize);
}

pub struct ShardsColumnIterator<S: GroupSource> {
    source: S,
    pending: VecDeque<(ShardEntryGroup, TimeSpan)>,
    current: Option<(ShardEntryGroup, BoxedIter<S::Item>, usize)>,
}

impl<S: GroupSource> ShardsColumnIterator<S> {
    /// `groups` are visited in the given order; empty spans are skipped.
    pub fn new(source: S, groups: Vec<(ShardEntryGroup, TimeSpan)>) -> Self {
        Self {
            source,
            pending: groups.into_iter().filter(|(_, span)| !span.is_empty()).collect(),
            current: None,
        }
    }
}

impl<S: GroupSource> Iterator for ShardsColumnIterator<S> {
    type Item = Result<S::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((group, iter, emitted)) = self.current.as_mut() {
                match iter.next() {
                    Some(Ok(item)) => {
                        *emitted += 1;
                        return Some(Ok(item));
                    }
                    Some(Err(e)) => {
                        self.current = None;
                        self.pending.clear();
                        return Some(Err(e));
                    }
                    None => {
                        self.source.finished(group, *emitted);
                        self.current = None;
                    }
                }
            }

            let (group, span) = self.pending.pop_front()?;
            match self.source.open(&group, span) {
                Ok(iter) => self.current = Some((group, iter, 0)),
                Err(e) => {
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
