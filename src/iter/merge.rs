//! Ordered k-way merge
//!
//! Each source is already sorted by the merge comparator. The merge keeps a
//! small read-ahead buffer per source (refilled up to `window` items when it
//! runs dry) and repeatedly emits the smallest head, so memory stays bounded
//! by `k * window` no matter how long the inputs are.
//!
//! Ties go to the source with the lower index. Callers place the preferred
//! source first.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::error::Result;

pub type BoxedIter<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

struct MergeSource<T> {
    iter: BoxedIter<T>,
    buffer: VecDeque<T>,
    exhausted: bool,
}

impl<T> MergeSource<T> {
    fn fill(&mut self, window: usize) -> Result<()> {
        while !self.exhausted && self.buffer.len() < window {
            match self.iter.next() {
                Some(Ok(item)) => self.buffer.push_back(item),
                Some(Err(e)) => return Err(e),
                None => self.exhausted = true,
            }
        }
        Ok(())
    }
}

pub struct OrderedMerge<T, F> {
    sources: Vec<MergeSource<T>>,
    cmp: F,
    window: usize,
    failed: bool,
}

impl<T, F> OrderedMerge<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(sources: Vec<BoxedIter<T>>, window: usize, cmp: F) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|iter| MergeSource { iter, buffer: VecDeque::new(), exhausted: false })
                .collect(),
            cmp,
            window: window.max(1),
            failed: false,
        }
    }
}

impl<T, F> Iterator for OrderedMerge<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for source in self.sources.iter_mut() {
            if source.buffer.is_empty() {
                if let Err(e) = source.fill(self.window) {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        let mut best: Option<usize> = None;
        for (i, source) in self.sources.iter().enumerate() {
            let Some(head) = source.buffer.front() else { continue };
            best = match best {
                Some(b) => match self.sources[b].buffer.front() {
                    Some(current) if (self.cmp)(head, current) == Ordering::Less => Some(i),
                    _ => Some(b),
                },
                None => Some(i),
            };
        }

        best.and_then(|i| self.sources[i].buffer.pop_front()).map(Ok)
    }
}

/// Collapses consecutive items with equal keys, keeping the first.
pub struct DistinctUntilChanged<T, K, F> {
    inner: BoxedIter<T>,
    key: F,
    last: Option<K>,
}

impl<T, K, F> DistinctUntilChanged<T, K, F>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    pub fn new(inner: BoxedIter<T>, key: F) -> Self {
        Self { inner, key, last: None }
    }
}

impl<T, K, F> Iterator for DistinctUntilChanged<T, K, F>
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(item) => {
                    let key = (self.key)(&item);
                    if self.last.as_ref() == Some(&key) {
                        continue;
                    }
                    self.last = Some(key);
                    return Some(Ok(item));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    fn source(items: Vec<(u64, &'static str)>) -> BoxedIter<(u64, &'static str)> {
        Box::new(items.into_iter().map(Ok))
    }

    fn descending(a: &(u64, &'static str), b: &(u64, &'static str)) -> Ordering {
        b.0.cmp(&a.0)
    }

    #[test]
    fn test_merge_interleaves_descending() {
        let merged: Vec<u64> = OrderedMerge::new(
            vec![source(vec![(9, "a"), (5, "a"), (1, "a")]), source(vec![(8, "b"), (7, "b"), (2, "b")])],
            2,
            descending,
        )
        .map(|r| r.unwrap().0)
        .collect();
        assert_eq!(merged, vec![9, 8, 7, 5, 2, 1]);
    }

    #[test]
    fn test_ties_prefer_first_source() {
        let merged: Vec<(u64, &str)> = OrderedMerge::new(
            vec![source(vec![(5, "commit")]), source(vec![(5, "storage")])],
            4,
            descending,
        )
        .map(|r| r.unwrap())
        .collect();
        assert_eq!(merged, vec![(5, "commit"), (5, "storage")]);
    }

    #[test]
    fn test_distinct_keeps_first_of_run() {
        let merged = OrderedMerge::new(
            vec![source(vec![(5, "commit"), (3, "commit")]), source(vec![(5, "storage"), (4, "storage")])],
            1,
            descending,
        );
        let distinct: Vec<(u64, &str)> = DistinctUntilChanged::new(Box::new(merged), |item: &(u64, &str)| item.0)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(distinct, vec![(5, "commit"), (4, "storage"), (3, "commit")]);
    }

    #[test]
    fn test_error_stops_merge() {
        let failing: BoxedIter<(u64, &'static str)> =
            Box::new(vec![Err(GraphError::Connection("down".into()))].into_iter());
        let mut merged = OrderedMerge::new(vec![source(vec![(1, "a")]), failing], 2, descending);
        assert!(merged.next().unwrap().is_err());
        assert!(merged.next().is_none());
    }
}
