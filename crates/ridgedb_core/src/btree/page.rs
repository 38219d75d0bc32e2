//! B-Tree pages.
//!
//! A [`BTreePage`] is the decoded form of one leaf or internal page. Leaves
//! map keys to opaque payloads and are chained to their siblings; internal
//! pages hold `n` separator keys bracketed by `n + 1` child ids.
//!
//! Body layouts (after the common header):
//!
//! ```text
//! leaf:      (key_len u16, key, value_len u32, value)*
//! internal:  child0 u32, (key_len u16, key, child u32)*
//! ```

use crate::error::{CoreError, CoreResult};
use crate::key::CompositeKey;
use crate::layout::{self, PageHeader, PageKind, PageReader, HEADER_SIZE};
use bytes::BufMut;
use ridgedb_storage::{Page, PageId};

const LEAF_ENTRY_OVERHEAD: usize = 2 + 4;
const INTERNAL_ENTRY_OVERHEAD: usize = 2 + 4;
const INTERNAL_BODY_BASE: usize = 4;

/// Outcome of inserting into a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInsert {
    /// The entry was added.
    Inserted,
    /// The page is at capacity; nothing was changed.
    Full,
}

/// A decoded B-Tree leaf or internal page.
#[derive(Debug, Clone)]
pub struct BTreePage {
    id: PageId,
    leaf: bool,
    capacity: usize,
    pub(crate) parent: PageId,
    pub(crate) prev: PageId,
    pub(crate) next: PageId,
    keys: Vec<CompositeKey>,
    values: Vec<Vec<u8>>,
    children: Vec<PageId>,
    body_len: usize,
}

impl BTreePage {
    /// Creates an empty leaf.
    #[must_use]
    pub fn new_leaf(id: PageId, capacity: usize) -> Self {
        Self {
            id,
            leaf: true,
            capacity,
            parent: PageId::INVALID,
            prev: PageId::INVALID,
            next: PageId::INVALID,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            body_len: 0,
        }
    }

    /// Creates an internal page with a single child and no keys.
    #[must_use]
    pub fn new_internal(id: PageId, capacity: usize, first_child: PageId) -> Self {
        Self {
            id,
            leaf: false,
            capacity,
            parent: PageId::INVALID,
            prev: PageId::INVALID,
            next: PageId::INVALID,
            keys: Vec::new(),
            values: Vec::new(),
            children: vec![first_child],
            body_len: INTERNAL_BODY_BASE,
        }
    }

    /// Returns the page id.
    #[must_use]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Returns true for leaf pages.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the page holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the configured entry capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the parent page id, or `PageId::INVALID` for the root.
    #[must_use]
    pub fn parent(&self) -> PageId {
        self.parent
    }

    /// Returns the previous leaf in key order.
    #[must_use]
    pub fn prev(&self) -> PageId {
        self.prev
    }

    /// Returns the next leaf in key order.
    #[must_use]
    pub fn next(&self) -> PageId {
        self.next
    }

    /// Returns the keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> &[CompositeKey] {
        &self.keys
    }

    /// Returns the child ids of an internal page.
    #[must_use]
    pub fn children(&self) -> &[PageId] {
        &self.children
    }

    /// Returns the key and payload at `slot` of a leaf.
    #[must_use]
    pub fn entry(&self, slot: usize) -> Option<(&CompositeKey, &[u8])> {
        Some((self.keys.get(slot)?, self.values.get(slot)?.as_slice()))
    }

    /// Returns the encoded size of header plus body.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body_len
    }

    /// Returns true if the page encodes into `page_size` bytes.
    #[must_use]
    pub fn fits(&self, page_size: usize) -> bool {
        self.encoded_len() <= page_size
    }

    /// Returns true if the page holds more entries than its capacity or does
    /// not fit in `page_size` bytes.
    #[must_use]
    pub fn is_overflow(&self, page_size: usize) -> bool {
        self.keys.len() > self.capacity || !self.fits(page_size)
    }

    /// Returns true if the page is below half its capacity.
    #[must_use]
    pub fn is_underflow(&self) -> bool {
        self.keys.len() * 2 < self.capacity
    }

    /// Returns the slot holding `key`.
    #[must_use]
    pub fn slot_of(&self, key: &CompositeKey) -> Option<usize> {
        self.keys.binary_search(key).ok()
    }

    /// Returns the first slot whose key is not less than `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &CompositeKey) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    /// Returns the first slot whose key is strictly greater than `key`.
    #[must_use]
    pub fn upper_bound(&self, key: &CompositeKey) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Looks up the payload stored under `key` in a leaf.
    #[must_use]
    pub fn search(&self, key: &CompositeKey) -> Option<&[u8]> {
        self.slot_of(key).map(|slot| self.values[slot].as_slice())
    }

    /// Returns the position in `children` of the subtree that may hold `key`.
    #[must_use]
    pub fn child_index(&self, key: &CompositeKey) -> usize {
        self.upper_bound(key)
    }

    /// Returns the child that may hold `key`.
    #[must_use]
    pub fn find_child(&self, key: &CompositeKey) -> PageId {
        self.children[self.child_index(key)]
    }

    /// Returns the position of `child` in `children`.
    #[must_use]
    pub fn position_of_child(&self, child: PageId) -> Option<usize> {
        self.children.iter().position(|c| *c == child)
    }

    /// Inserts a leaf entry if there is room by count and by bytes.
    pub fn insert(&mut self, key: CompositeKey, value: Vec<u8>, page_size: usize) -> PageInsert {
        let size = LEAF_ENTRY_OVERHEAD + key.to_bytes().len() + value.len();
        if self.keys.len() >= self.capacity || self.encoded_len() + size > page_size {
            return PageInsert::Full;
        }
        self.insert_unchecked(key, value);
        PageInsert::Inserted
    }

    /// Inserts a leaf entry regardless of capacity, keeping key order.
    ///
    /// The new entry goes after any equal keys. Used right before a split.
    pub fn insert_unchecked(&mut self, key: CompositeKey, value: Vec<u8>) {
        let pos = self.upper_bound(&key);
        self.body_len += LEAF_ENTRY_OVERHEAD + key.to_bytes().len() + value.len();
        self.keys.insert(pos, key);
        self.values.insert(pos, value);
    }

    /// Adds a separator and the child to its right if there is room.
    pub fn insert_child(
        &mut self,
        separator: CompositeKey,
        right: PageId,
        page_size: usize,
    ) -> PageInsert {
        let size = INTERNAL_ENTRY_OVERHEAD + separator.to_bytes().len();
        if self.keys.len() >= self.capacity || self.encoded_len() + size > page_size {
            return PageInsert::Full;
        }
        self.insert_child_unchecked(separator, right);
        PageInsert::Inserted
    }

    /// Adds a separator and right child regardless of capacity.
    pub fn insert_child_unchecked(&mut self, separator: CompositeKey, right: PageId) {
        let pos = self.upper_bound(&separator);
        self.body_len += INTERNAL_ENTRY_OVERHEAD + separator.to_bytes().len();
        self.keys.insert(pos, separator);
        self.children.insert(pos + 1, right);
    }

    /// Replaces the payload of an existing leaf entry, returning the old one.
    pub fn replace_value(&mut self, key: &CompositeKey, value: Vec<u8>) -> Option<Vec<u8>> {
        let slot = self.slot_of(key)?;
        self.body_len = self.body_len + value.len() - self.values[slot].len();
        Some(std::mem::replace(&mut self.values[slot], value))
    }

    /// Removes a leaf entry and returns its payload.
    pub fn delete(&mut self, key: &CompositeKey) -> Option<Vec<u8>> {
        let slot = self.slot_of(key)?;
        let key = self.keys.remove(slot);
        let value = self.values.remove(slot);
        self.body_len -= LEAF_ENTRY_OVERHEAD + key.to_bytes().len() + value.len();
        Some(value)
    }

    /// Removes separator `index` and the child to its right.
    pub fn remove_child_at(&mut self, index: usize) -> (CompositeKey, PageId) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        self.body_len -= INTERNAL_ENTRY_OVERHEAD + key.to_bytes().len();
        (key, child)
    }

    /// Replaces separator `index`.
    pub fn set_separator(&mut self, index: usize, key: CompositeKey) {
        let old = std::mem::replace(&mut self.keys[index], key);
        self.body_len = self.body_len + self.keys[index].to_bytes().len() - old.to_bytes().len();
    }

    /// Splits the page, keeping the lower half and returning the separator
    /// and a new page `new_id` holding the upper half.
    ///
    /// The cut is at the midpoint by count. For leaves the separator is the
    /// first key of the upper half and stays in it; for internal pages the
    /// middle key moves up and appears in neither half. If a midpoint cut
    /// would leave a half larger than `page_size`, the cut moves to the byte
    /// midpoint instead. The caller links the new leaf's successor back to it.
    pub fn split(&mut self, new_id: PageId, page_size: usize) -> (CompositeKey, BTreePage) {
        let mid = self.split_point(page_size);
        let mut right = if self.leaf {
            let mut right = BTreePage::new_leaf(new_id, self.capacity);
            right.keys = self.keys.split_off(mid);
            right.values = self.values.split_off(mid);
            right.prev = self.id;
            right.next = self.next;
            self.next = new_id;
            right
        } else {
            let mut right = BTreePage::new_internal(new_id, self.capacity, PageId::INVALID);
            right.keys = self.keys.split_off(mid + 1);
            right.children = self.children.split_off(mid + 1);
            right
        };
        right.parent = self.parent;

        let separator = if self.leaf {
            right.keys[0].clone()
        } else {
            // The middle key moves up.
            self.keys.pop().unwrap_or_default()
        };

        self.recompute_body_len();
        right.recompute_body_len();
        (separator, right)
    }

    fn split_point(&self, page_size: usize) -> usize {
        let n = self.keys.len();
        let mid = n / 2;
        let sizes = self.entry_sizes();
        let base = if self.leaf { 0 } else { INTERNAL_BODY_BASE };
        let limit = page_size.saturating_sub(HEADER_SIZE);

        let half_fits = |cut: usize| {
            let (lower, upper) = if self.leaf {
                (&sizes[..cut], &sizes[cut..])
            } else {
                (&sizes[..cut], &sizes[(cut + 1).min(n)..])
            };
            base + lower.iter().sum::<usize>() <= limit
                && base + upper.iter().sum::<usize>() <= limit
        };
        if half_fits(mid) {
            return mid;
        }

        let total: usize = sizes.iter().sum();
        let mut acc = 0;
        let mut cut = 1;
        for (i, size) in sizes.iter().enumerate() {
            acc += size;
            if acc * 2 >= total {
                cut = i + 1;
                break;
            }
        }
        let max_cut = if self.leaf { n - 1 } else { n.saturating_sub(2) };
        cut.clamp(1, max_cut.max(1))
    }

    fn entry_sizes(&self) -> Vec<usize> {
        if self.leaf {
            self.keys
                .iter()
                .zip(&self.values)
                .map(|(k, v)| LEAF_ENTRY_OVERHEAD + k.to_bytes().len() + v.len())
                .collect()
        } else {
            self.keys
                .iter()
                .map(|k| INTERNAL_ENTRY_OVERHEAD + k.to_bytes().len())
                .collect()
        }
    }

    fn recompute_body_len(&mut self) {
        let base = if self.leaf { 0 } else { INTERNAL_BODY_BASE };
        self.body_len = base + self.entry_sizes().iter().sum::<usize>();
    }

    /// Returns true if `right` could be merged into this page.
    ///
    /// `separator_len` is the encoded length of the parent separator, which
    /// an internal merge pulls down.
    #[must_use]
    pub fn can_merge(&self, right: &BTreePage, separator_len: usize, page_size: usize) -> bool {
        if self.leaf {
            self.keys.len() + right.keys.len() <= self.capacity
                && self.encoded_len() + right.body_len <= page_size
        } else {
            self.keys.len() + right.keys.len() < self.capacity
                && self.encoded_len() + right.body_len - INTERNAL_BODY_BASE
                    + INTERNAL_ENTRY_OVERHEAD
                    + separator_len
                    <= page_size
        }
    }

    /// Appends every entry of `right`, its right sibling, into this page.
    ///
    /// For internal pages `separator` is the parent key between the two
    /// pages; it is pulled down between the two key runs. For leaves it is
    /// ignored and the sibling chain skips `right`.
    pub fn merge_with(&mut self, right: BTreePage, separator: CompositeKey) {
        if self.leaf {
            self.next = right.next;
            self.keys.extend(right.keys);
            self.values.extend(right.values);
        } else {
            self.keys.push(separator);
            self.keys.extend(right.keys);
            self.children.extend(right.children);
        }
        self.recompute_body_len();
    }

    /// Moves the first entry of leaf `right` to the end of this leaf and
    /// returns the new separator between them.
    pub fn borrow_from_right(&mut self, right: &mut BTreePage) -> Option<CompositeKey> {
        if right.keys.len() <= 1 {
            return None;
        }
        let key = right.keys.remove(0);
        let value = right.values.remove(0);
        right.recompute_body_len();
        self.insert_unchecked(key, value);
        right.keys.first().cloned()
    }

    /// Moves the last entry of leaf `left` to the front of this leaf and
    /// returns the new separator between them.
    pub fn borrow_from_left(&mut self, left: &mut BTreePage) -> Option<CompositeKey> {
        if left.keys.len() <= 1 {
            return None;
        }
        let key = left.keys.pop()?;
        let value = left.values.pop()?;
        left.recompute_body_len();
        let separator = key.clone();
        self.insert_unchecked(key, value);
        Some(separator)
    }

    /// Serializes the page.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the page does not fit in `page_size` bytes.
    pub fn encode(&self, page_size: usize) -> CoreResult<Page> {
        let mut body = Vec::with_capacity(self.body_len);
        if self.leaf {
            for (key, value) in self.keys.iter().zip(&self.values) {
                let key = key.to_bytes();
                body.put_u16(key.len() as u16);
                body.put_slice(&key);
                body.put_u32(value.len() as u32);
                body.put_slice(value);
            }
        } else {
            body.put_u32(self.children[0].as_u32());
            for (key, child) in self.keys.iter().zip(&self.children[1..]) {
                let key = key.to_bytes();
                body.put_u16(key.len() as u16);
                body.put_slice(&key);
                body.put_u32(child.as_u32());
            }
        }

        let mut header = PageHeader::new(
            self.id,
            if self.leaf { PageKind::Leaf } else { PageKind::Internal },
        );
        header.entry_count = self.keys.len() as u16;
        header.parent = self.parent;
        header.prev = self.prev;
        header.next = self.next;
        layout::write_page(header, &body, page_size)
    }

    /// Deserializes a leaf or internal page.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for any other page kind or malformed body.
    pub fn decode(page: &Page, leaf_capacity: usize, internal_capacity: usize) -> CoreResult<Self> {
        let (header, body) = layout::read_page(page)?;
        let mut reader = PageReader::new(body);
        let count = usize::from(header.entry_count);

        let mut result = match header.kind {
            PageKind::Leaf => {
                let mut leaf = BTreePage::new_leaf(header.page_id, leaf_capacity);
                for _ in 0..count {
                    let key_len = usize::from(reader.u16()?);
                    let key = CompositeKey::from_bytes(reader.bytes(key_len)?)?;
                    let value_len = reader.u32()? as usize;
                    leaf.keys.push(key);
                    leaf.values.push(reader.bytes(value_len)?.to_vec());
                }
                leaf
            }
            PageKind::Internal => {
                let first = PageId::new(reader.u32()?);
                let mut internal = BTreePage::new_internal(header.page_id, internal_capacity, first);
                for _ in 0..count {
                    let key_len = usize::from(reader.u16()?);
                    internal.keys.push(CompositeKey::from_bytes(reader.bytes(key_len)?)?);
                    internal.children.push(PageId::new(reader.u32()?));
                }
                internal
            }
            other => {
                return Err(CoreError::invalid_format(format!(
                    "{} is a {other:?} page, expected a B-Tree node",
                    page.id()
                )));
            }
        };
        if reader.remaining() != 0 {
            return Err(CoreError::invalid_format(format!(
                "{} has {} trailing body bytes",
                page.id(),
                reader.remaining()
            )));
        }

        result.parent = header.parent;
        result.prev = header.prev;
        result.next = header.next;
        result.body_len = body.len();
        Ok(result)
    }
}
