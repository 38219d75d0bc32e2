//! Bounded forward iteration over a [`BPlusTree`].
//!
//! Cursors re-seek by key between leaf-sized batches instead of pinning
//! pages.

use crate::btree::BPlusTree;
use crate::error::CoreResult;
use crate::key::CompositeKey;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::Bound;
use std::sync::Arc;

/// Lazy forward scan over a shared tree.
///
/// The cursor fetches one leaf's worth of entries at a time under the tree
/// lock and resumes after the last key it yielded, so it never holds the
/// lock between calls to `next` and never observes a half-finished split.
/// Entries inserted behind the cursor are not revisited; entries inserted
/// ahead of it may be.
pub struct TreeCursor {
    tree: Arc<Mutex<BPlusTree>>,
    lower: Bound<CompositeKey>,
    upper: Bound<CompositeKey>,
    buffer: VecDeque<(CompositeKey, Vec<u8>)>,
    exhausted: bool,
}

impl TreeCursor {
    /// Creates a cursor over `[lower, upper]` of `tree`.
    pub fn new(
        tree: Arc<Mutex<BPlusTree>>,
        lower: Bound<CompositeKey>,
        upper: Bound<CompositeKey>,
    ) -> Self {
        Self {
            tree,
            lower,
            upper,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn refill(&mut self) -> CoreResult<()> {
        let (batch, limit) = {
            let tree = self.tree.lock();
            let limit = tree.leaf_capacity().max(1);
            (
                tree.scan_batch(self.lower.as_ref(), self.upper.as_ref(), limit)?,
                limit,
            )
        };
        if batch.len() < limit {
            self.exhausted = true;
        }
        if let Some((last, _)) = batch.last() {
            self.lower = Bound::Excluded(last.clone());
        }
        self.buffer.extend(batch);
        Ok(())
    }
}

impl Iterator for TreeCursor {
    type Item = CoreResult<(CompositeKey, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use ridgedb_storage::InMemoryPageStore;

    fn shared_tree(n: i64) -> Arc<Mutex<BPlusTree>> {
        let mut tree = BPlusTree::create(
            "t",
            Box::new(InMemoryPageStore::new(512)),
            &IndexConfig::new().page_size(512).capacity(4),
        )
        .unwrap();
        for i in 0..n {
            tree.insert(CompositeKey::from(i), Vec::new()).unwrap();
        }
        Arc::new(Mutex::new(tree))
    }

    fn collect(cursor: TreeCursor) -> Vec<i64> {
        cursor
            .map(|e| e.unwrap().0.values()[0].as_integer().unwrap())
            .collect()
    }

    #[test]
    fn scans_across_batches() {
        let tree = shared_tree(50);
        let all = TreeCursor::new(tree, Bound::Unbounded, Bound::Unbounded);
        assert_eq!(collect(all), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn respects_bounds() {
        let tree = shared_tree(50);
        let cursor = TreeCursor::new(
            tree,
            Bound::Excluded(CompositeKey::from(10)),
            Bound::Excluded(CompositeKey::from(20)),
        );
        assert_eq!(collect(cursor), (11..20).collect::<Vec<_>>());
    }

    #[test]
    fn sees_inserts_ahead_of_position() {
        let tree = shared_tree(10);
        let mut cursor = TreeCursor::new(tree.clone(), Bound::Unbounded, Bound::Unbounded);
        assert!(cursor.next().is_some());
        tree.lock().insert(CompositeKey::from(100), Vec::new()).unwrap();
        let rest: Vec<_> = cursor.map(|e| e.unwrap().0).collect();
        assert_eq!(rest.last(), Some(&CompositeKey::from(100)));
    }

    #[test]
    fn empty_range() {
        let tree = shared_tree(10);
        let cursor = TreeCursor::new(
            tree,
            Bound::Included(CompositeKey::from(50)),
            Bound::Unbounded,
        );
        assert_eq!(collect(cursor).len(), 0);
    }
}
