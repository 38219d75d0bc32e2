//! Page-organized B+Tree.
//!
//! [`BPlusTree`] keeps an arena of decoded pages keyed by [`PageId`] and
//! writes every modified page through to its [`PageStore`]. Page 0 is the
//! meta page; every other page is a leaf, an internal node, or free.
//!
//! Insertion descends recursively; a child that overflows splits and hands
//! `(separator, new_page)` back to its parent, which absorbs it or splits in
//! turn. A split that reaches the root grows the tree by one level.
//!
//! Deletion merges an underflowing page into a sibling under the same parent
//! when the two fit in one page, otherwise a leaf borrows one entry from a
//! sibling. An internal root left without keys is collapsed into its only
//! child.

use crate::btree::page::BTreePage;
use crate::config::IndexConfig;
use crate::error::{CoreError, CoreResult};
use crate::key::CompositeKey;
use crate::layout::{self, PageHeader, PageKind, PageReader, HEADER_SIZE};
use crate::types::RowLocator;
use bytes::BufMut;
use ridgedb_storage::{PageId, PageStore};
use std::collections::HashMap;
use std::fmt;
use std::ops::Bound;
use tracing::{debug, trace};

const META_PAGE: PageId = PageId(0);
const META_MAGIC: u32 = 0x5244_4254;

/// Leaf entry overhead: key length and value length prefixes.
const ENTRY_OVERHEAD: usize = 6;

/// Structural counters of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of entries.
    pub entries: u64,
    /// Levels, counting the leaf level.
    pub height: u32,
    /// Pages in the store, including the meta page and free pages.
    pub page_count: u32,
    /// Pages on the free list.
    pub free_pages: usize,
    /// Page splits since the tree was opened, root splits included.
    pub splits: u64,
    /// Splits that grew the tree by a level.
    pub root_splits: u64,
    /// Page merges since the tree was opened.
    pub merges: u64,
    /// Entries moved between sibling leaves to fix underflow.
    pub borrows: u64,
}

/// A B+Tree over [`CompositeKey`]s with opaque byte payloads.
pub struct BPlusTree {
    name: String,
    store: Box<dyn PageStore>,
    page_size: usize,
    leaf_capacity: usize,
    internal_capacity: usize,
    pages: HashMap<PageId, BTreePage>,
    free: Vec<PageId>,
    root: PageId,
    first_leaf: PageId,
    height: u32,
    len: u64,
    stats: TreeStats,
}

impl BPlusTree {
    /// Creates a new tree in an empty store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the store already holds pages or a
    /// capacity is below 2, and a storage error if pages cannot be written.
    pub fn create(
        name: impl Into<String>,
        mut store: Box<dyn PageStore>,
        config: &IndexConfig,
    ) -> CoreResult<Self> {
        let name = name.into();
        if store.page_count() != 0 {
            return Err(CoreError::invalid_operation(format!(
                "store for index '{name}' is not empty"
            )));
        }
        if config.leaf_capacity < 2 || config.internal_capacity < 2 {
            return Err(CoreError::invalid_operation(format!(
                "index '{name}' needs a page capacity of at least 2"
            )));
        }

        let meta = store.allocate_page()?;
        debug_assert_eq!(meta.id(), META_PAGE);
        let root = store.allocate_page()?.id();

        let mut tree = Self {
            name,
            page_size: store.page_size(),
            store,
            leaf_capacity: config.leaf_capacity,
            internal_capacity: config.internal_capacity,
            pages: HashMap::new(),
            free: Vec::new(),
            root,
            first_leaf: root,
            height: 1,
            len: 0,
            stats: TreeStats::default(),
        };
        tree.pages
            .insert(root, BTreePage::new_leaf(root, tree.leaf_capacity));
        tree.persist(root)?;
        tree.write_meta()?;
        debug!(index = %tree.name, page_size = tree.page_size, "created B-Tree");
        Ok(tree)
    }

    /// Reattaches to a tree previously written to `store`.
    ///
    /// Capacities are read from the meta page. Free pages are collected into
    /// the free list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the meta page or any node is malformed.
    pub fn open(name: impl Into<String>, store: Box<dyn PageStore>) -> CoreResult<Self> {
        let name = name.into();
        let meta = store.read_page(META_PAGE)?;
        let (header, body) = layout::read_page(&meta)?;
        if header.kind != PageKind::TreeMeta {
            return Err(CoreError::invalid_format(format!(
                "index '{name}' has no B-Tree meta page"
            )));
        }
        let mut reader = PageReader::new(body);
        if reader.u32()? != META_MAGIC {
            return Err(CoreError::invalid_format(format!(
                "index '{name}' has a bad meta page magic"
            )));
        }
        let root = PageId::new(reader.u32()?);
        let first_leaf = PageId::new(reader.u32()?);
        let height = reader.u32()?;
        let len = reader.u64()?;
        let leaf_capacity = reader.u32()? as usize;
        let internal_capacity = reader.u32()? as usize;

        let mut pages = HashMap::new();
        let mut free = Vec::new();
        for raw in 1..store.page_count() {
            let id = PageId::new(raw);
            let page = store.read_page(id)?;
            let (header, _) = layout::read_page(&page)?;
            if header.kind == PageKind::Free {
                free.push(id);
            } else {
                pages.insert(id, BTreePage::decode(&page, leaf_capacity, internal_capacity)?);
            }
        }

        let tree = Self {
            name,
            page_size: store.page_size(),
            store,
            leaf_capacity,
            internal_capacity,
            pages,
            free,
            root,
            first_leaf,
            height,
            len,
            stats: TreeStats::default(),
        };
        tree.node(root)?;
        debug!(index = %tree.name, entries = len, height, "opened B-Tree");
        Ok(tree)
    }

    /// Opens the tree in `store`, creating it if the store is empty.
    ///
    /// # Errors
    ///
    /// See [`BPlusTree::create`] and [`BPlusTree::open`].
    pub fn open_or_create(
        name: impl Into<String>,
        store: Box<dyn PageStore>,
        config: &IndexConfig,
    ) -> CoreResult<Self> {
        if store.page_count() == 0 {
            Self::create(name, store, config)
        } else {
            Self::open(name, store)
        }
    }

    /// Returns the index name used in errors and log events.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of levels; a lone root leaf has height 1.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the root page id.
    #[must_use]
    pub fn root(&self) -> PageId {
        self.root
    }

    /// Returns the leftmost leaf.
    #[must_use]
    pub fn first_leaf(&self) -> PageId {
        self.first_leaf
    }

    /// Returns the leaf capacity.
    #[must_use]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Returns a decoded page.
    #[must_use]
    pub fn page(&self, id: PageId) -> Option<&BTreePage> {
        self.pages.get(&id)
    }

    /// Returns the structural counters.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        TreeStats {
            entries: self.len,
            height: self.height,
            page_count: self.store.page_count(),
            free_pages: self.free.len(),
            ..self.stats.clone()
        }
    }

    /// Flushes the underlying store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the flush fails.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.store.flush()?;
        Ok(())
    }

    /// Largest encoded key plus payload a single entry may have.
    #[must_use]
    pub fn max_entry_size(&self) -> usize {
        (self.page_size - HEADER_SIZE) / 4
    }

    pub(crate) fn check_entry(&self, key_len: usize, value_len: usize) -> CoreResult<()> {
        let size = ENTRY_OVERHEAD + key_len + value_len;
        let limit = self.max_entry_size();
        if size > limit || key_len > usize::from(u16::MAX) {
            return Err(CoreError::RecordTooLarge {
                index: self.name.clone(),
                size,
                limit,
            });
        }
        Ok(())
    }

    fn corrupted(&self, id: PageId, message: impl Into<String>) -> CoreError {
        CoreError::page_corrupted(self.name.clone(), id, message)
    }

    fn node(&self, id: PageId) -> CoreResult<&BTreePage> {
        self.pages
            .get(&id)
            .ok_or_else(|| self.corrupted(id, "page is not a live B-Tree node"))
    }

    fn node_mut(&mut self, id: PageId) -> CoreResult<&mut BTreePage> {
        match self.pages.get_mut(&id) {
            Some(page) => Ok(page),
            None => Err(CoreError::page_corrupted(
                self.name.clone(),
                id,
                "page is not a live B-Tree node",
            )),
        }
    }

    fn persist(&mut self, id: PageId) -> CoreResult<()> {
        let page = self.node(id)?.encode(self.page_size)?;
        self.store.write_page(&page)?;
        Ok(())
    }

    fn write_meta(&mut self) -> CoreResult<()> {
        let mut body = Vec::with_capacity(32);
        body.put_u32(META_MAGIC);
        body.put_u32(self.root.as_u32());
        body.put_u32(self.first_leaf.as_u32());
        body.put_u32(self.height);
        body.put_u64(self.len);
        body.put_u32(self.leaf_capacity as u32);
        body.put_u32(self.internal_capacity as u32);
        let page = layout::write_page(
            PageHeader::new(META_PAGE, PageKind::TreeMeta),
            &body,
            self.page_size,
        )?;
        self.store.write_page(&page)?;
        Ok(())
    }

    fn allocate(&mut self) -> CoreResult<PageId> {
        if let Some(id) = self.free.pop() {
            return Ok(id);
        }
        Ok(self.store.allocate_page()?.id())
    }

    fn release(&mut self, id: PageId) -> CoreResult<()> {
        self.pages.remove(&id);
        let page = layout::write_page(PageHeader::new(id, PageKind::Free), &[], self.page_size)?;
        self.store.write_page(&page)?;
        self.free.push(id);
        Ok(())
    }

    fn find_leaf(&self, key: &CompositeKey) -> CoreResult<PageId> {
        let mut id = self.root;
        loop {
            let node = self.node(id)?;
            if node.is_leaf() {
                return Ok(id);
            }
            id = node.find_child(key);
        }
    }

    /// Returns the payload stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the descent reaches a missing page.
    pub fn get(&self, key: &CompositeKey) -> CoreResult<Option<Vec<u8>>> {
        let leaf = self.find_leaf(key)?;
        Ok(self.node(leaf)?.search(key).map(<[u8]>::to_vec))
    }

    /// Returns true if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the descent reaches a missing page.
    pub fn contains(&self, key: &CompositeKey) -> CoreResult<bool> {
        let leaf = self.find_leaf(key)?;
        Ok(self.node(leaf)?.slot_of(key).is_some())
    }

    /// Returns the leaf page and slot currently holding `key`.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the descent reaches a missing page.
    pub fn locate(&self, key: &CompositeKey) -> CoreResult<Option<RowLocator>> {
        let leaf = self.find_leaf(key)?;
        Ok(self
            .node(leaf)?
            .slot_of(key)
            .map(|slot| RowLocator::new(leaf, slot as u16)))
    }

    /// Inserts a new entry.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if `key` is already present (the tree
    /// is left unchanged) and `RecordTooLarge` if the entry can never fit in
    /// a page.
    pub fn insert(&mut self, key: CompositeKey, value: Vec<u8>) -> CoreResult<()> {
        self.check_entry(key.to_bytes().len(), value.len())?;

        let root = self.root;
        if let Some((separator, right)) = self.insert_at(root, key, value)? {
            self.grow_root(separator, right)?;
        }
        self.len += 1;
        self.write_meta()
    }

    fn insert_at(
        &mut self,
        page_id: PageId,
        key: CompositeKey,
        value: Vec<u8>,
    ) -> CoreResult<Option<(CompositeKey, PageId)>> {
        let page_size = self.page_size;
        let node = self.node(page_id)?;

        if node.is_leaf() {
            if node.slot_of(&key).is_some() {
                return Err(CoreError::constraint_violation(
                    self.name.clone(),
                    key.to_string(),
                ));
            }
            let node = self.node_mut(page_id)?;
            node.insert_unchecked(key, value);
            if node.is_overflow(page_size) {
                return self.split(page_id).map(Some);
            }
            self.persist(page_id)?;
            return Ok(None);
        }

        let child = node.find_child(&key);
        let Some((separator, right)) = self.insert_at(child, key, value)? else {
            return Ok(None);
        };

        let node = self.node_mut(page_id)?;
        node.insert_child_unchecked(separator, right);
        if node.is_overflow(page_size) {
            return self.split(page_id).map(Some);
        }
        self.persist(page_id)?;
        Ok(None)
    }

    fn split(&mut self, page_id: PageId) -> CoreResult<(CompositeKey, PageId)> {
        let new_id = self.allocate()?;
        let page_size = self.page_size;
        let (separator, right) = self.node_mut(page_id)?.split(new_id, page_size);

        let leaf = right.is_leaf();
        let next = right.next();
        let moved: Vec<PageId> = if leaf {
            Vec::new()
        } else {
            right.children().to_vec()
        };
        self.pages.insert(new_id, right);

        if leaf && next.is_valid() {
            self.node_mut(next)?.prev = new_id;
            self.persist(next)?;
        }
        for child in moved {
            self.node_mut(child)?.parent = new_id;
            self.persist(child)?;
        }
        self.persist(page_id)?;
        self.persist(new_id)?;

        self.stats.splits += 1;
        debug!(
            index = %self.name,
            page_id = %page_id,
            new_page_id = %new_id,
            leaf,
            separator = %separator,
            "split page"
        );
        Ok((separator, new_id))
    }

    fn grow_root(&mut self, separator: CompositeKey, right: PageId) -> CoreResult<()> {
        let old_root = self.root;
        let new_root = self.allocate()?;
        let mut root = BTreePage::new_internal(new_root, self.internal_capacity, old_root);
        root.insert_child_unchecked(separator, right);
        self.pages.insert(new_root, root);

        for child in [old_root, right] {
            self.node_mut(child)?.parent = new_root;
            self.persist(child)?;
        }
        self.persist(new_root)?;

        self.root = new_root;
        self.height += 1;
        self.stats.root_splits += 1;
        debug!(index = %self.name, root = %new_root, height = self.height, "split root");
        Ok(())
    }

    /// Replaces the payload stored under `key`.
    ///
    /// The payload is rewritten in its current slot when it still fits the
    /// page; otherwise the entry is deleted and reinserted. Returns false if
    /// `key` is absent.
    ///
    /// # Errors
    ///
    /// Returns `RecordTooLarge` if the new entry can never fit in a page.
    pub fn update(&mut self, key: &CompositeKey, value: Vec<u8>) -> CoreResult<bool> {
        self.check_entry(key.to_bytes().len(), value.len())?;
        let leaf_id = self.find_leaf(key)?;
        let node = self.node(leaf_id)?;
        let Some(old_len) = node.search(key).map(<[u8]>::len) else {
            return Ok(false);
        };

        if node.encoded_len() - old_len + value.len() <= self.page_size {
            self.node_mut(leaf_id)?.replace_value(key, value);
            self.persist(leaf_id)?;
            trace!(index = %self.name, key = %key, "updated entry in place");
        } else {
            self.delete(key)?;
            self.insert(key.clone(), value)?;
        }
        Ok(true)
    }

    /// Removes `key` and returns its payload.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` or a storage error if rebalancing fails.
    pub fn delete(&mut self, key: &CompositeKey) -> CoreResult<Option<Vec<u8>>> {
        let leaf_id = self.find_leaf(key)?;
        let Some(value) = self.node_mut(leaf_id)?.delete(key) else {
            return Ok(None);
        };
        self.len -= 1;
        self.rebalance(leaf_id)?;
        self.write_meta()?;
        Ok(Some(value))
    }

    fn rebalance(&mut self, page_id: PageId) -> CoreResult<()> {
        if page_id == self.root {
            self.persist(page_id)?;
            return self.collapse_root();
        }

        let node = self.node(page_id)?;
        if !node.is_underflow() {
            return self.persist(page_id);
        }
        let leaf = node.is_leaf();
        let parent_id = node.parent();
        let parent = self.node(parent_id)?;
        let index = parent
            .position_of_child(page_id)
            .ok_or_else(|| self.corrupted(parent_id, format!("does not list child {page_id}")))?;
        let right = parent.children().get(index + 1).copied();
        let left = index.checked_sub(1).map(|i| parent.children()[i]);

        if let Some(right) = right {
            if self.try_merge(parent_id, index, page_id, right)? {
                return self.rebalance(parent_id);
            }
        }
        if let Some(left) = left {
            if self.try_merge(parent_id, index - 1, left, page_id)? {
                return self.rebalance(parent_id);
            }
        }
        if leaf {
            if let Some(right) = right {
                if self.try_borrow(parent_id, index, page_id, right, true)? {
                    return Ok(());
                }
            }
            if let Some(left) = left {
                if self.try_borrow(parent_id, index - 1, left, page_id, false)? {
                    return Ok(());
                }
            }
        }
        self.persist(page_id)
    }

    /// Merges `right_id` into `left_id`, both children of `parent_id`
    /// separated by key `sep_index`. The parent is modified but not written.
    fn try_merge(
        &mut self,
        parent_id: PageId,
        sep_index: usize,
        left_id: PageId,
        right_id: PageId,
    ) -> CoreResult<bool> {
        let separator = self.node(parent_id)?.keys()[sep_index].clone();
        let left = self.node(left_id)?;
        let right = self.node(right_id)?;
        if !left.can_merge(right, separator.to_bytes().len(), self.page_size) {
            return Ok(false);
        }

        let right = self
            .pages
            .remove(&right_id)
            .ok_or_else(|| self.corrupted(right_id, "vanished during merge"))?;
        let leaf = right.is_leaf();
        let next = right.next();
        let moved: Vec<PageId> = if leaf {
            Vec::new()
        } else {
            right.children().to_vec()
        };

        self.node_mut(parent_id)?.remove_child_at(sep_index);
        self.node_mut(left_id)?.merge_with(right, separator);
        if leaf && next.is_valid() {
            self.node_mut(next)?.prev = left_id;
            self.persist(next)?;
        }
        for child in moved {
            self.node_mut(child)?.parent = left_id;
            self.persist(child)?;
        }
        self.persist(left_id)?;
        self.release(right_id)?;

        self.stats.merges += 1;
        debug!(index = %self.name, page_id = %left_id, merged = %right_id, leaf, "merged pages");
        Ok(true)
    }

    fn try_borrow(
        &mut self,
        parent_id: PageId,
        sep_index: usize,
        left_id: PageId,
        right_id: PageId,
        into_left: bool,
    ) -> CoreResult<bool> {
        let mut left = self.node(left_id)?.clone();
        let mut right = self.node(right_id)?.clone();
        let separator = if into_left {
            left.borrow_from_right(&mut right)
        } else {
            right.borrow_from_left(&mut left)
        };
        let Some(separator) = separator else {
            return Ok(false);
        };
        let mut parent = self.node(parent_id)?.clone();
        parent.set_separator(sep_index, separator);
        if !left.fits(self.page_size) || !right.fits(self.page_size) || !parent.fits(self.page_size)
        {
            return Ok(false);
        }

        self.pages.insert(left_id, left);
        self.pages.insert(right_id, right);
        self.pages.insert(parent_id, parent);
        self.persist(left_id)?;
        self.persist(right_id)?;
        self.persist(parent_id)?;
        self.stats.borrows += 1;
        trace!(index = %self.name, left = %left_id, right = %right_id, "borrowed entry");
        Ok(true)
    }

    fn collapse_root(&mut self) -> CoreResult<()> {
        loop {
            let root = self.node(self.root)?;
            if root.is_leaf() || !root.is_empty() {
                return Ok(());
            }
            let child = root.children()[0];
            let old_root = self.root;
            self.node_mut(child)?.parent = PageId::INVALID;
            self.persist(child)?;
            self.root = child;
            self.height -= 1;
            self.release(old_root)?;
            debug!(index = %self.name, root = %child, height = self.height, "collapsed root");
        }
    }

    /// Collects up to `limit` entries within the bounds, in key order.
    ///
    /// The scan descends once to the lower bound and then follows the leaf
    /// sibling chain. An included upper bound is prefix-inclusive: `(7)`
    /// admits `(7, 1)` and `(7, 2)`.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the chain reaches a missing page.
    pub fn scan_batch(
        &self,
        lower: Bound<&CompositeKey>,
        upper: Bound<&CompositeKey>,
        limit: usize,
    ) -> CoreResult<Vec<(CompositeKey, Vec<u8>)>> {
        let (mut leaf_id, mut slot) = match lower {
            Bound::Unbounded => (self.first_leaf, 0),
            Bound::Included(key) => {
                let id = self.find_leaf(key)?;
                (id, self.node(id)?.lower_bound(key))
            }
            Bound::Excluded(key) => {
                let id = self.find_leaf(key)?;
                (id, self.node(id)?.upper_bound(key))
            }
        };

        let mut out = Vec::new();
        while leaf_id.is_valid() && out.len() < limit {
            let leaf = self.node(leaf_id)?;
            while out.len() < limit {
                let Some((key, value)) = leaf.entry(slot) else {
                    break;
                };
                if !below_upper(key, upper) {
                    return Ok(out);
                }
                out.push((key.clone(), value.to_vec()));
                slot += 1;
            }
            leaf_id = leaf.next();
            slot = 0;
        }
        Ok(out)
    }

    /// Returns the greatest key below `key` and the smallest key above it.
    ///
    /// These bound the gap a next-key lock on `key` covers.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the chain reaches a missing page.
    pub fn neighbors(
        &self,
        key: &CompositeKey,
    ) -> CoreResult<(Option<CompositeKey>, Option<CompositeKey>)> {
        let leaf_id = self.find_leaf(key)?;
        let leaf = self.node(leaf_id)?;

        let lower = leaf.lower_bound(key);
        let prev = if lower > 0 {
            Some(leaf.keys()[lower - 1].clone())
        } else {
            let mut id = leaf.prev();
            let mut found = None;
            while id.is_valid() {
                let page = self.node(id)?;
                if let Some(last) = page.keys().last() {
                    found = Some(last.clone());
                    break;
                }
                id = page.prev();
            }
            found
        };

        let upper = leaf.upper_bound(key);
        let next = if upper < leaf.len() {
            Some(leaf.keys()[upper].clone())
        } else {
            let mut id = leaf.next();
            let mut found = None;
            while id.is_valid() {
                let page = self.node(id)?;
                if let Some(first) = page.keys().first() {
                    found = Some(first.clone());
                    break;
                }
                id = page.next();
            }
            found
        };
        Ok((prev, next))
    }

    /// Returns every key by walking the leaf sibling chain.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the chain reaches a missing page.
    pub fn leaf_keys(&self) -> CoreResult<Vec<CompositeKey>> {
        let mut keys = Vec::with_capacity(self.len as usize);
        let mut id = self.first_leaf;
        while id.is_valid() {
            let leaf = self.node(id)?;
            keys.extend(leaf.keys().iter().cloned());
            id = leaf.next();
        }
        Ok(keys)
    }

    /// Checks every structural invariant of the tree.
    ///
    /// Verified: key order within pages, separator bounds, parent pointers,
    /// child counts, capacities, uniform leaf depth, the doubly-linked leaf
    /// chain, and the entry count.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` describing the first violation found.
    pub fn validate(&self) -> CoreResult<()> {
        let root = self.node(self.root)?;
        if root.parent().is_valid() {
            return Err(self.corrupted(self.root, "root has a parent"));
        }

        let mut leaves = Vec::new();
        self.validate_node(self.root, None, None, 1, &mut leaves)?;

        if leaves.first() != Some(&self.first_leaf) {
            return Err(self.corrupted(self.first_leaf, "first leaf is not the leftmost leaf"));
        }
        let mut prev = PageId::INVALID;
        let mut count = 0u64;
        for (i, &id) in leaves.iter().enumerate() {
            let leaf = self.node(id)?;
            let expected_next = leaves.get(i + 1).copied().unwrap_or(PageId::INVALID);
            if leaf.prev() != prev || leaf.next() != expected_next {
                return Err(self.corrupted(id, "broken leaf sibling chain"));
            }
            if let (Some(last), Some(next_id)) = (leaf.keys().last(), leaves.get(i + 1)) {
                if let Some(first) = self.node(*next_id)?.keys().first() {
                    if last >= first {
                        return Err(self.corrupted(id, "leaf keys overlap the next leaf"));
                    }
                }
            }
            count += leaf.len() as u64;
            prev = id;
        }
        if count != self.len {
            return Err(self.corrupted(
                self.root,
                format!("tree counts {} entries but leaves hold {count}", self.len),
            ));
        }
        Ok(())
    }

    fn validate_node(
        &self,
        id: PageId,
        lower: Option<&CompositeKey>,
        upper: Option<&CompositeKey>,
        depth: u32,
        leaves: &mut Vec<PageId>,
    ) -> CoreResult<()> {
        let node = self.node(id)?;
        if !node.fits(self.page_size) {
            return Err(self.corrupted(id, "page exceeds the page size"));
        }
        if node.len() > node.capacity() {
            return Err(self.corrupted(id, "page exceeds its capacity"));
        }
        if node.keys().windows(2).any(|w| w[0] >= w[1]) {
            return Err(self.corrupted(id, "keys are not strictly ascending"));
        }
        for key in node.keys() {
            if lower.is_some_and(|l| key < l) || upper.is_some_and(|u| key >= u) {
                return Err(self.corrupted(id, format!("key {key} is outside its separators")));
            }
        }

        if node.is_leaf() {
            if depth != self.height {
                return Err(self.corrupted(id, format!("leaf at depth {depth}, height {}", self.height)));
            }
            leaves.push(id);
            return Ok(());
        }

        if node.children().len() != node.len() + 1 {
            return Err(self.corrupted(id, "child count is not key count plus one"));
        }
        for (i, &child) in node.children().iter().enumerate() {
            if self.node(child)?.parent() != id {
                return Err(self.corrupted(child, format!("parent pointer does not name {id}")));
            }
            let child_lower = if i == 0 { lower } else { Some(&node.keys()[i - 1]) };
            let child_upper = node.keys().get(i).or(upper);
            self.validate_node(child, child_lower, child_upper, depth + 1, leaves)?;
        }
        Ok(())
    }
}

/// An included upper bound also admits every key it is a prefix of, so a
/// bound on the leading columns covers all longer keys sharing them.
fn below_upper(key: &CompositeKey, upper: Bound<&CompositeKey>) -> bool {
    match upper {
        Bound::Unbounded => true,
        Bound::Included(bound) => key <= bound || key.starts_with(bound),
        Bound::Excluded(bound) => key < bound,
    }
}

impl fmt::Debug for BPlusTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BPlusTree")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("height", &self.height)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ridgedb_storage::InMemoryPageStore;
    use std::collections::BTreeSet;

    fn k(n: i64) -> CompositeKey {
        CompositeKey::from(n)
    }

    fn tree(capacity: usize) -> BPlusTree {
        BPlusTree::create(
            "t",
            Box::new(InMemoryPageStore::new(512)),
            &IndexConfig::new().page_size(512).capacity(capacity),
        )
        .unwrap()
    }

    fn keys_of(tree: &BPlusTree) -> Vec<i64> {
        tree.leaf_keys()
            .unwrap()
            .iter()
            .map(|key| key.values()[0].as_integer().unwrap())
            .collect()
    }

    #[test]
    fn empty_tree() {
        let t = tree(4);
        assert!(t.is_empty());
        assert_eq!(t.height(), 1);
        assert_eq!(t.get(&k(1)).unwrap(), None);
        t.validate().unwrap();
    }

    #[test]
    fn insert_and_get() {
        let mut t = tree(4);
        for n in [5, 3, 8, 1] {
            t.insert(k(n), vec![n as u8]).unwrap();
        }
        assert_eq!(t.get(&k(3)).unwrap(), Some(vec![3]));
        assert_eq!(t.get(&k(4)).unwrap(), None);
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn duplicate_insert_leaves_tree_unchanged() {
        let mut t = tree(4);
        for n in 1..=10 {
            t.insert(k(n), vec![1]).unwrap();
        }
        let before = t.stats();
        let err = t.insert(k(5), vec![2]).unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(t.get(&k(5)).unwrap(), Some(vec![1]));
        assert_eq!(t.stats(), before);
        t.validate().unwrap();
    }

    #[test]
    fn sequential_inserts_split_root() {
        let mut t = tree(4);
        for n in 1..=10 {
            t.insert(k(n), Vec::new()).unwrap();
        }
        let stats = t.stats();
        assert!(stats.root_splits >= 1);
        assert!(t.height() >= 2);
        assert_eq!(keys_of(&t), (1..=10).collect::<Vec<_>>());
        t.validate().unwrap();
    }

    #[test]
    fn range_batch_follows_sibling_chain() {
        let mut t = tree(4);
        for n in 1..=10 {
            t.insert(k(n), Vec::new()).unwrap();
        }
        let batch = t
            .scan_batch(Bound::Included(&k(3)), Bound::Included(&k(7)), usize::MAX)
            .unwrap();
        let got: Vec<_> = batch.into_iter().map(|(key, _)| key).collect();
        assert_eq!(got, (3..=7).map(k).collect::<Vec<_>>());

        let tail = t
            .scan_batch(Bound::Excluded(&k(8)), Bound::Unbounded, usize::MAX)
            .unwrap();
        assert_eq!(tail.len(), 2);

        let limited = t.scan_batch(Bound::Unbounded, Bound::Unbounded, 3).unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[test]
    fn update_in_place_and_relocating() {
        let mut t = tree(4);
        for n in 1..=6 {
            t.insert(k(n), vec![0]).unwrap();
        }
        assert!(t.update(&k(2), vec![9, 9]).unwrap());
        assert_eq!(t.get(&k(2)).unwrap(), Some(vec![9, 9]));
        assert!(!t.update(&k(42), vec![1]).unwrap());
        assert_eq!(t.len(), 6);
        t.validate().unwrap();
    }

    #[test]
    fn oversized_entry_rejected() {
        let mut t = tree(4);
        let err = t.insert(k(1), vec![0; 400]).unwrap_err();
        assert!(matches!(err, CoreError::RecordTooLarge { .. }));
        assert!(t.is_empty());
    }

    #[test]
    fn large_entries_split_by_bytes() {
        let mut t = tree(64);
        let payload = vec![7u8; t.max_entry_size() - 20];
        for n in 0..20 {
            t.insert(k(n), payload.clone()).unwrap();
        }
        assert!(t.height() > 1);
        assert_eq!(t.len(), 20);
        t.validate().unwrap();
    }

    #[test]
    fn delete_merges_and_collapses() {
        let mut t = tree(4);
        for n in 1..=40 {
            t.insert(k(n), Vec::new()).unwrap();
        }
        let tall = t.height();
        for n in 1..=40 {
            assert_eq!(t.delete(&k(n)).unwrap(), Some(Vec::new()));
            t.validate().unwrap();
        }
        assert!(t.is_empty());
        assert!(t.height() < tall);
        assert!(t.stats().merges > 0);
        assert_eq!(t.delete(&k(1)).unwrap(), None);
    }

    #[test]
    fn freed_pages_are_reused() {
        let mut t = tree(4);
        for n in 1..=30 {
            t.insert(k(n), Vec::new()).unwrap();
        }
        for n in 1..=30 {
            t.delete(&k(n)).unwrap();
        }
        let pages = t.stats().page_count;
        assert!(t.stats().free_pages > 0);
        for n in 1..=30 {
            t.insert(k(n), Vec::new()).unwrap();
        }
        assert_eq!(t.stats().page_count, pages);
        t.validate().unwrap();
    }

    #[test]
    fn neighbors_span_leaves() {
        let mut t = tree(4);
        for n in (10..=100).step_by(10) {
            t.insert(k(n), Vec::new()).unwrap();
        }
        assert_eq!(t.neighbors(&k(50)).unwrap(), (Some(k(40)), Some(k(60))));
        assert_eq!(t.neighbors(&k(55)).unwrap(), (Some(k(50)), Some(k(60))));
        assert_eq!(t.neighbors(&k(5)).unwrap(), (None, Some(k(10))));
        assert_eq!(t.neighbors(&k(100)).unwrap(), (Some(k(90)), None));
    }

    #[test]
    fn locate_names_leaf_and_slot() {
        let mut t = tree(4);
        for n in 1..=10 {
            t.insert(k(n), Vec::new()).unwrap();
        }
        let loc = t.locate(&k(7)).unwrap().unwrap();
        let leaf = t.page(loc.page_id).unwrap();
        assert!(leaf.is_leaf());
        assert_eq!(leaf.entry(usize::from(loc.slot)).unwrap().0, &k(7));
        assert!(t.locate(&k(70)).unwrap().is_none());
    }

    #[test]
    fn reopen_sees_same_entries() {
        let store = InMemoryPageStore::new(512);
        let mut t = BPlusTree::create(
            "t",
            Box::new(store),
            &IndexConfig::new().page_size(512).capacity(4),
        )
        .unwrap();
        for n in 1..=25 {
            t.insert(k(n), vec![n as u8]).unwrap();
        }
        for n in 1..=5 {
            t.delete(&k(n)).unwrap();
        }
        let snapshot = t.store_snapshot();

        let reopened = BPlusTree::open(
            "t",
            Box::new(InMemoryPageStore::with_pages(512, snapshot).unwrap()),
        )
        .unwrap();
        assert_eq!(reopened.len(), 20);
        assert_eq!(keys_of(&reopened), (6..=25).collect::<Vec<_>>());
        assert_eq!(reopened.get(&k(9)).unwrap(), Some(vec![9]));
        reopened.validate().unwrap();
    }

    #[test]
    fn open_rejects_foreign_store() {
        let mut store = InMemoryPageStore::new(512);
        store.allocate_page().unwrap();
        assert!(BPlusTree::open("t", Box::new(store)).is_err());
    }

    #[test]
    fn create_rejects_tiny_capacity() {
        let result = BPlusTree::create(
            "t",
            Box::new(InMemoryPageStore::new(512)),
            &IndexConfig::new().capacity(1),
        );
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    impl BPlusTree {
        fn store_snapshot(&self) -> Vec<Vec<u8>> {
            (0..self.store.page_count())
                .map(|id| self.store.read_page(PageId::new(id)).unwrap().into_bytes())
                .collect()
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn leaf_chain_is_sorted(keys in prop::collection::vec(-500i64..500, 0..200)) {
            let mut t = tree(4);
            let mut expected = BTreeSet::new();
            for n in keys {
                let result = t.insert(k(n), Vec::new());
                prop_assert_eq!(result.is_ok(), expected.insert(n));
            }
            prop_assert_eq!(keys_of(&t), expected.into_iter().collect::<Vec<_>>());
            t.validate().unwrap();
        }

        #[test]
        fn mixed_inserts_and_deletes(ops in prop::collection::vec((any::<bool>(), 0i64..64), 0..300)) {
            let mut t = tree(4);
            let mut expected = BTreeSet::new();
            for (insert, n) in ops {
                if insert {
                    let _ = t.insert(k(n), Vec::new());
                    expected.insert(n);
                } else {
                    let removed = t.delete(&k(n)).unwrap().is_some();
                    prop_assert_eq!(removed, expected.remove(&n));
                }
            }
            t.validate().unwrap();
            prop_assert_eq!(keys_of(&t), expected.into_iter().collect::<Vec<_>>());
        }
    }
}
