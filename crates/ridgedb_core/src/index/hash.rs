//! Extendible hash index.
//!
//! A directory of `2^global_depth` slots maps the low-order bits of
//! [`CompositeKey::hash_code`] to bucket pages. A full bucket whose local
//! depth is below the global depth splits on its next hash bit; a full
//! bucket already at the global depth first doubles the directory. Entries
//! that no split can separate (equal keys, permuted composite keys, or a
//! directory at its maximum depth) stay in their bucket, which then spills
//! into chained overflow pages. Buckets never merge.
//!
//! Store layout:
//!
//! - page 0: meta (`magic, global_depth, max_depth, bucket_capacity, len,
//!   directory page count, directory page ids..`)
//! - directory pages: `slot u32*`
//! - bucket pages: `local_depth u8, (key_len u16, key, value_len u32, value)*`,
//!   with the header's `next` link naming the bucket's next overflow page
//!
//! The directory can only grow as far as the meta page can list directory
//! pages; the configured maximum depth is lowered to fit.

use crate::config::IndexConfig;
use crate::error::{CoreError, CoreResult};
use crate::index::descriptor::IndexDescriptor;
use crate::index::secondary::KeyScan;
use crate::index::traits::RowIndex;
use crate::key::CompositeKey;
use crate::layout::{self, PageHeader, PageKind, PageReader, HEADER_SIZE};
use crate::schema::Row;
use bytes::BufMut;
use parking_lot::Mutex;
use ridgedb_storage::{Page, PageId, PageStore};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const META_PAGE: PageId = PageId(0);
const META_MAGIC: u32 = 0x5244_4848;

/// Fixed part of the meta body before the directory page ids.
const META_FIXED: usize = 28;

/// Bucket entry overhead: key length and value length prefixes.
const ENTRY_OVERHEAD: usize = 6;

/// Hard ceiling on the directory depth regardless of page size.
const DEPTH_CEILING: u8 = 30;

fn low_bits(depth: u8) -> u64 {
    (1u64 << depth) - 1
}

/// Counters of a hash table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashStats {
    /// Number of entries.
    pub entries: u64,
    /// Current directory depth.
    pub global_depth: u8,
    /// Number of distinct bucket pages.
    pub buckets: usize,
    /// Bucket splits since open.
    pub splits: u64,
    /// Directory doublings since open.
    pub doublings: u64,
    /// Inserts that grew a bucket past its capacity.
    pub overflows: u64,
    /// Overflow pages chained behind bucket head pages.
    pub overflow_pages: usize,
}

struct HashEntry {
    hash: u64,
    key: CompositeKey,
    key_bytes: Vec<u8>,
    value: Vec<u8>,
}

impl HashEntry {
    fn new(key: CompositeKey, value: Vec<u8>) -> Self {
        Self {
            hash: key.hash_code(),
            key_bytes: key.to_bytes(),
            key,
            value,
        }
    }

    fn encoded_len(&self) -> usize {
        ENTRY_OVERHEAD + self.key_bytes.len() + self.value.len()
    }
}

/// One logical bucket: a head page plus any overflow pages chained behind
/// it. Entries are packed across the chain in order.
struct Bucket {
    id: PageId,
    overflow: Vec<PageId>,
    local_depth: u8,
    entries: Vec<HashEntry>,
}

impl Bucket {
    fn new(id: PageId, local_depth: u8) -> Self {
        Self {
            id,
            overflow: Vec::new(),
            local_depth,
            entries: Vec::new(),
        }
    }

    fn pages(&self) -> impl Iterator<Item = PageId> + '_ {
        std::iter::once(self.id).chain(self.overflow.iter().copied())
    }

    fn page_count(&self) -> usize {
        1 + self.overflow.len()
    }

    /// Splits the entries into runs that each fit one page body.
    fn spans(&self, page_size: usize) -> Vec<Range<usize>> {
        let room = page_size - HEADER_SIZE - 1;
        let mut spans = Vec::new();
        let mut start = 0;
        let mut used = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            let len = entry.encoded_len();
            if used + len > room && i > start {
                spans.push(start..i);
                start = i;
                used = 0;
            }
            used += len;
        }
        spans.push(start..self.entries.len());
        spans
    }

    /// Encodes the chain. Pages past the last run are written empty and stay
    /// linked for later growth.
    fn encode(&self, page_size: usize) -> CoreResult<Vec<Page>> {
        let spans = self.spans(page_size);
        if spans.len() > self.page_count() {
            return Err(CoreError::invalid_format(format!(
                "bucket {} needs {} pages but chains {}",
                self.id,
                spans.len(),
                self.page_count()
            )));
        }
        let ids: Vec<PageId> = self.pages().collect();
        let mut pages = Vec::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            let run = spans.get(i).map_or(&self.entries[..0], |r| &self.entries[r.clone()]);
            let mut body = Vec::new();
            body.put_u8(self.local_depth);
            for e in run {
                body.put_u16(e.key_bytes.len() as u16);
                body.put_slice(&e.key_bytes);
                body.put_u32(e.value.len() as u32);
                body.put_slice(&e.value);
            }
            let mut header = PageHeader::new(id, PageKind::Bucket);
            header.next = ids.get(i + 1).copied().unwrap_or(PageId::INVALID);
            header.entry_count = u16::try_from(run.len())
                .map_err(|_| CoreError::invalid_format(format!("{id} holds too many entries")))?;
            pages.push(layout::write_page(header, &body, page_size)?);
        }
        Ok(pages)
    }

    /// Reads the chain starting at `head`.
    fn load(store: &dyn PageStore, head: PageId) -> CoreResult<Self> {
        let mut bucket: Option<Self> = None;
        let mut next = head;
        while next != PageId::INVALID {
            let page = store.read_page(next)?;
            let (header, body) = layout::read_page(&page)?;
            if header.kind != PageKind::Bucket {
                return Err(CoreError::invalid_format(format!(
                    "{} is a {:?} page, expected a hash bucket",
                    page.id(),
                    header.kind
                )));
            }
            let mut reader = PageReader::new(body);
            let local_depth = reader.u8()?;
            let current = match bucket.take() {
                None => Self::new(header.page_id, local_depth),
                Some(mut b) => {
                    if b.local_depth != local_depth || b.pages().any(|id| id == header.page_id) {
                        return Err(CoreError::invalid_format(format!(
                            "overflow {} does not continue bucket {}",
                            header.page_id, b.id
                        )));
                    }
                    b.overflow.push(header.page_id);
                    b
                }
            };
            let bucket = bucket.insert(current);
            for _ in 0..header.entry_count {
                let key_len = usize::from(reader.u16()?);
                let key = CompositeKey::from_bytes(reader.bytes(key_len)?)?;
                let value_len = reader.u32()? as usize;
                let value = reader.bytes(value_len)?.to_vec();
                bucket.entries.push(HashEntry::new(key, value));
            }
            if reader.remaining() != 0 {
                return Err(CoreError::invalid_format(format!(
                    "{} has {} trailing bytes",
                    page.id(),
                    reader.remaining()
                )));
            }
            next = header.next;
        }
        bucket.ok_or_else(|| CoreError::invalid_format(format!("bucket {head} is missing")))
    }
}

/// Paged extendible hash table from keys to byte payloads.
///
/// The same key may be stored with several payloads; an identical
/// `(key, payload)` pair is rejected.
pub struct ExtendibleHash {
    name: String,
    store: Box<dyn PageStore>,
    page_size: usize,
    bucket_capacity: usize,
    max_depth: u8,
    global_depth: u8,
    directory: Vec<PageId>,
    directory_pages: Vec<PageId>,
    buckets: HashMap<PageId, Bucket>,
    len: u64,
    stats: HashStats,
}

impl ExtendibleHash {
    /// Creates an empty table in an empty store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the store already holds pages or the
    /// bucket capacity is zero.
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
        if config.bucket_capacity == 0 {
            return Err(CoreError::invalid_operation(format!(
                "index '{name}' needs a bucket capacity of at least 1"
            )));
        }

        let page_size = store.page_size();
        let meta = store.allocate_page()?;
        debug_assert_eq!(meta.id(), META_PAGE);
        let directory_page = store.allocate_page()?.id();
        let bucket = store.allocate_page()?.id();

        let mut table = Self {
            name,
            store,
            page_size,
            bucket_capacity: config.bucket_capacity,
            max_depth: depth_limit(page_size, config.max_global_depth),
            global_depth: 0,
            directory: vec![bucket],
            directory_pages: vec![directory_page],
            buckets: HashMap::new(),
            len: 0,
            stats: HashStats::default(),
        };
        table.buckets.insert(bucket, Bucket::new(bucket, 0));
        table.persist_bucket(bucket)?;
        table.persist_directory()?;
        table.write_meta()?;
        debug!(index = %table.name, max_depth = table.max_depth, "created hash table");
        Ok(table)
    }

    /// Reattaches to a table previously written to `store`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the meta, directory or bucket pages are
    /// malformed.
    pub fn open(name: impl Into<String>, store: Box<dyn PageStore>) -> CoreResult<Self> {
        let name = name.into();
        let meta = store.read_page(META_PAGE)?;
        let (header, body) = layout::read_page(&meta)?;
        if header.kind != PageKind::HashMeta {
            return Err(CoreError::invalid_format(format!(
                "index '{name}' has no hash meta page"
            )));
        }
        let mut reader = PageReader::new(body);
        if reader.u32()? != META_MAGIC {
            return Err(CoreError::invalid_format(format!(
                "index '{name}' has a bad meta page magic"
            )));
        }
        let global_depth = reader.u32()? as u8;
        let max_depth = reader.u32()? as u8;
        let bucket_capacity = reader.u32()? as usize;
        let len = reader.u64()?;
        let page_count = reader.u32()?;
        let mut directory_pages = Vec::with_capacity(page_count as usize);
        for _ in 0..page_count {
            directory_pages.push(PageId::new(reader.u32()?));
        }
        if global_depth > max_depth {
            return Err(CoreError::invalid_format(format!(
                "index '{name}' has global depth {global_depth} above its maximum {max_depth}"
            )));
        }

        let slots = 1usize << global_depth;
        let mut directory = Vec::with_capacity(slots);
        for &id in &directory_pages {
            let page = store.read_page(id)?;
            let (header, body) = layout::read_page(&page)?;
            if header.kind != PageKind::Directory {
                return Err(CoreError::invalid_format(format!(
                    "{id} of index '{name}' is not a directory page"
                )));
            }
            let mut reader = PageReader::new(body);
            for _ in 0..header.entry_count {
                directory.push(PageId::new(reader.u32()?));
            }
        }
        if directory.len() != slots {
            return Err(CoreError::invalid_format(format!(
                "index '{name}' directory has {} slots, expected {slots}",
                directory.len()
            )));
        }

        let mut buckets = HashMap::new();
        for &id in &directory {
            if !buckets.contains_key(&id) {
                buckets.insert(id, Bucket::load(store.as_ref(), id)?);
            }
        }

        let table = Self {
            name,
            page_size: store.page_size(),
            store,
            bucket_capacity,
            max_depth,
            global_depth,
            directory,
            directory_pages,
            buckets,
            len,
            stats: HashStats::default(),
        };
        debug!(index = %table.name, entries = len, global_depth, "opened hash table");
        Ok(table)
    }

    /// Opens the table in `store`, creating it if the store is empty.
    ///
    /// # Errors
    ///
    /// See [`ExtendibleHash::create`] and [`ExtendibleHash::open`].
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

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of hash bits the directory resolves.
    #[must_use]
    pub fn global_depth(&self) -> u8 {
        self.global_depth
    }

    /// Returns the deepest the directory may grow.
    #[must_use]
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Returns the local depth of the bucket behind directory `slot`.
    #[must_use]
    pub fn local_depth(&self, slot: usize) -> Option<u8> {
        let id = self.directory.get(slot)?;
        self.buckets.get(id).map(|b| b.local_depth)
    }

    /// Returns the table counters.
    #[must_use]
    pub fn stats(&self) -> HashStats {
        HashStats {
            entries: self.len,
            global_depth: self.global_depth,
            buckets: self.buckets.len(),
            overflow_pages: self.buckets.values().map(|b| b.overflow.len()).sum(),
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

    fn slot_of(&self, hash: u64) -> usize {
        (hash & low_bits(self.global_depth)) as usize
    }

    fn bucket(&self, id: PageId) -> CoreResult<&Bucket> {
        self.buckets.get(&id).ok_or_else(|| {
            CoreError::page_corrupted(self.name.clone(), id, "directory points at a missing bucket")
        })
    }

    fn bucket_mut(&mut self, id: PageId) -> CoreResult<&mut Bucket> {
        match self.buckets.get_mut(&id) {
            Some(bucket) => Ok(bucket),
            None => Err(CoreError::page_corrupted(
                self.name.clone(),
                id,
                "directory points at a missing bucket",
            )),
        }
    }

    fn bucket_for(&self, hash: u64) -> CoreResult<&Bucket> {
        self.bucket(self.directory[self.slot_of(hash)])
    }

    fn persist_bucket(&mut self, id: PageId) -> CoreResult<()> {
        let needed = self.bucket(id)?.spans(self.page_size).len();
        while self.bucket(id)?.page_count() < needed {
            let page = self.store.allocate_page()?.id();
            self.bucket_mut(id)?.overflow.push(page);
            warn!(index = %self.name, bucket = %id, overflow = %page, "chained hash overflow page");
        }
        for page in self.bucket(id)?.encode(self.page_size)? {
            self.store.write_page(&page)?;
        }
        Ok(())
    }

    fn persist_directory(&mut self) -> CoreResult<()> {
        let per_page = (self.page_size - HEADER_SIZE) / 4;
        let needed = self.directory.len().div_ceil(per_page);
        while self.directory_pages.len() < needed {
            let id = self.store.allocate_page()?.id();
            self.directory_pages.push(id);
        }
        for (chunk, &id) in self.directory.chunks(per_page).zip(&self.directory_pages) {
            let mut body = Vec::with_capacity(chunk.len() * 4);
            for slot in chunk {
                body.put_u32(slot.as_u32());
            }
            let mut header = PageHeader::new(id, PageKind::Directory);
            header.entry_count = chunk.len() as u16;
            let page = layout::write_page(header, &body, self.page_size)?;
            self.store.write_page(&page)?;
        }
        Ok(())
    }

    fn write_meta(&mut self) -> CoreResult<()> {
        let mut body = Vec::with_capacity(META_FIXED + self.directory_pages.len() * 4);
        body.put_u32(META_MAGIC);
        body.put_u32(u32::from(self.global_depth));
        body.put_u32(u32::from(self.max_depth));
        body.put_u32(self.bucket_capacity as u32);
        body.put_u64(self.len);
        body.put_u32(self.directory_pages.len() as u32);
        for id in &self.directory_pages {
            body.put_u32(id.as_u32());
        }
        let page = layout::write_page(
            PageHeader::new(META_PAGE, PageKind::HashMeta),
            &body,
            self.page_size,
        )?;
        self.store.write_page(&page)?;
        Ok(())
    }

    fn check_entry(&self, entry: &HashEntry) -> CoreResult<()> {
        let size = entry.encoded_len();
        let limit = (self.page_size - HEADER_SIZE - 1) / 4;
        if size > limit || entry.key_bytes.len() > usize::from(u16::MAX) {
            return Err(CoreError::RecordTooLarge {
                index: self.name.clone(),
                size,
                limit,
            });
        }
        Ok(())
    }

    /// Adds `(key, value)`, splitting buckets and doubling the directory as
    /// needed. A full bucket that cannot be split any further takes the
    /// entry anyway and grows its overflow chain.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the exact pair is already stored and
    /// `RecordTooLarge` for an entry larger than a quarter of a page.
    pub fn insert(&mut self, key: CompositeKey, value: Vec<u8>) -> CoreResult<()> {
        let entry = HashEntry::new(key, value);
        self.check_entry(&entry)?;
        let max_mask = low_bits(self.max_depth);

        loop {
            let bucket = self.bucket_for(entry.hash)?;
            if bucket
                .entries
                .iter()
                .any(|e| e.key == entry.key && e.value == entry.value)
            {
                return Err(CoreError::constraint_violation(
                    self.name.clone(),
                    entry.key.to_string(),
                ));
            }
            let id = bucket.id;
            let count = bucket.entries.len();
            if count < self.bucket_capacity {
                return self.push(id, entry);
            }

            let separable = bucket
                .entries
                .iter()
                .any(|e| (e.hash ^ entry.hash) & max_mask != 0);
            if separable {
                if bucket.local_depth < self.global_depth {
                    self.split_bucket(id)?;
                    continue;
                }
                if self.global_depth < self.max_depth {
                    self.double_directory()?;
                    continue;
                }
            }

            trace!(
                index = %self.name,
                bucket = %id,
                entries = count + 1,
                capacity = self.bucket_capacity,
                "hash bucket over capacity"
            );
            self.stats.overflows += 1;
            return self.push(id, entry);
        }
    }

    fn push(&mut self, id: PageId, entry: HashEntry) -> CoreResult<()> {
        self.bucket_mut(id)?.entries.push(entry);
        self.persist_bucket(id)?;
        self.len += 1;
        self.write_meta()
    }

    fn split_bucket(&mut self, id: PageId) -> CoreResult<()> {
        let sibling = self.store.allocate_page()?.id();
        let Some(old) = self.buckets.remove(&id) else {
            return Err(CoreError::page_corrupted(
                self.name.clone(),
                id,
                "directory points at a missing bucket",
            ));
        };

        let depth = old.local_depth + 1;
        let bit = 1u64 << (depth - 1);
        let mut low = Bucket::new(id, depth);
        low.overflow = old.overflow;
        let mut high = Bucket::new(sibling, depth);
        for entry in old.entries {
            if entry.hash & bit == 0 {
                low.entries.push(entry);
            } else {
                high.entries.push(entry);
            }
        }
        for (slot, target) in self.directory.iter_mut().enumerate() {
            if *target == id && (slot as u64) & bit != 0 {
                *target = sibling;
            }
        }
        debug!(
            index = %self.name,
            bucket = %id,
            sibling = %sibling,
            local_depth = depth,
            kept = low.entries.len(),
            moved = high.entries.len(),
            "split hash bucket"
        );

        self.buckets.insert(id, low);
        self.buckets.insert(sibling, high);
        self.persist_bucket(id)?;
        self.persist_bucket(sibling)?;
        self.persist_directory()?;
        self.stats.splits += 1;
        self.write_meta()
    }

    fn double_directory(&mut self) -> CoreResult<()> {
        let slots = self.directory.len();
        self.directory.extend_from_within(..slots);
        self.global_depth += 1;
        self.persist_directory()?;
        self.write_meta()?;
        self.stats.doublings += 1;
        debug!(
            index = %self.name,
            global_depth = self.global_depth,
            slots = self.directory.len(),
            "doubled hash directory"
        );
        Ok(())
    }

    /// Removes `(key, value)`. Returns false if the pair was not stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the bucket cannot be written.
    pub fn delete(&mut self, key: &CompositeKey, value: &[u8]) -> CoreResult<bool> {
        let bucket = self.bucket_for(key.hash_code())?;
        let id = bucket.id;
        let Some(slot) = bucket
            .entries
            .iter()
            .position(|e| e.key == *key && e.value == value)
        else {
            return Ok(false);
        };
        self.bucket_mut(id)?.entries.remove(slot);
        self.persist_bucket(id)?;
        self.len -= 1;
        self.write_meta()?;
        Ok(true)
    }

    /// Returns every payload stored under `key`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the directory points at a missing bucket.
    pub fn lookup(&self, key: &CompositeKey) -> CoreResult<Vec<Vec<u8>>> {
        Ok(self
            .bucket_for(key.hash_code())?
            .entries
            .iter()
            .filter(|e| e.key == *key)
            .map(|e| e.value.clone())
            .collect())
    }

    /// Returns true if any payload is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the directory points at a missing bucket.
    pub fn contains_key(&self, key: &CompositeKey) -> CoreResult<bool> {
        Ok(self
            .bucket_for(key.hash_code())?
            .entries
            .iter()
            .any(|e| e.key == *key))
    }

    /// Returns every entry, bucket by bucket in directory order.
    ///
    /// There is no key order.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` if the directory points at a missing bucket.
    pub fn scan_all(&self) -> CoreResult<Vec<(CompositeKey, Vec<u8>)>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.len as usize);
        for &id in &self.directory {
            if seen.insert(id) {
                out.extend(
                    self.bucket(id)?
                        .entries
                        .iter()
                        .map(|e| (e.key.clone(), e.value.clone())),
                );
            }
        }
        Ok(out)
    }

    /// Checks directory and bucket invariants.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` describing the first violation.
    pub fn validate(&self) -> CoreResult<()> {
        let corrupted =
            |id: PageId, msg: String| CoreError::page_corrupted(self.name.clone(), id, msg);

        let mut references: HashMap<PageId, usize> = HashMap::new();
        for (slot, &id) in self.directory.iter().enumerate() {
            let bucket = self.bucket(id)?;
            if bucket.local_depth > self.global_depth {
                return Err(corrupted(
                    id,
                    format!(
                        "local depth {} exceeds global depth {}",
                        bucket.local_depth, self.global_depth
                    ),
                ));
            }
            let mask = low_bits(bucket.local_depth);
            if let Some(e) = bucket
                .entries
                .iter()
                .find(|e| (e.hash & mask) != (slot as u64 & mask))
            {
                return Err(corrupted(id, format!("key {} is reachable from the wrong slot", e.key)));
            }
            *references.entry(id).or_default() += 1;
        }

        let mut total = 0u64;
        let mut chained: HashSet<PageId> = self.directory_pages.iter().copied().collect();
        chained.insert(META_PAGE);
        for (id, count) in references {
            let bucket = self.bucket(id)?;
            let expected = 1usize << (self.global_depth - bucket.local_depth);
            if count != expected {
                return Err(corrupted(
                    id,
                    format!("referenced by {count} slots, expected {expected}"),
                ));
            }
            if let Some(page) = bucket.pages().find(|&page| !chained.insert(page)) {
                return Err(corrupted(id, format!("chains {page}, which is already in use")));
            }
            if bucket.spans(self.page_size).len() > bucket.page_count() {
                return Err(corrupted(id, "entries overrun the overflow chain".to_string()));
            }
            total += bucket.entries.len() as u64;
        }
        if total != self.len {
            return Err(corrupted(
                META_PAGE,
                format!("meta records {} entries, buckets hold {total}", self.len),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ExtendibleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendibleHash")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("global_depth", &self.global_depth)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

fn depth_limit(page_size: usize, configured: u8) -> u8 {
    let per_page = (page_size - HEADER_SIZE) / 4;
    let listable = (page_size - HEADER_SIZE - META_FIXED) / 4;
    let slots = (per_page * listable).max(1);
    let fit = (usize::BITS - 1 - slots.leading_zeros()) as u8;
    configured.min(fit).min(DEPTH_CEILING)
}

/// Equality-only index over an [`ExtendibleHash`].
///
/// Payloads are the serialized primary keys of the indexed rows.
pub struct HashIndex {
    descriptor: Arc<IndexDescriptor>,
    table: Mutex<ExtendibleHash>,
}

impl HashIndex {
    /// Opens the index in `store`, creating it if the store is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store holds something other than a hash table.
    pub fn open(
        descriptor: Arc<IndexDescriptor>,
        store: Box<dyn PageStore>,
        config: &IndexConfig,
    ) -> CoreResult<Self> {
        let table = ExtendibleHash::open_or_create(descriptor.qualified_name(), store, config)?;
        Ok(Self {
            descriptor,
            table: Mutex::new(table),
        })
    }

    /// Returns a shared handle to the index descriptor.
    #[must_use]
    pub fn shared_descriptor(&self) -> Arc<IndexDescriptor> {
        Arc::clone(&self.descriptor)
    }

    /// Returns the directory depth.
    #[must_use]
    pub fn global_depth(&self) -> u8 {
        self.table.lock().global_depth()
    }

    /// Returns the table counters.
    #[must_use]
    pub fn stats(&self) -> HashStats {
        self.table.lock().stats()
    }

    /// Checks directory and bucket invariants.
    ///
    /// # Errors
    ///
    /// Returns `PageCorrupted` describing the first violation.
    pub fn validate(&self) -> CoreResult<()> {
        self.table.lock().validate()
    }
}

impl RowIndex for HashIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn insert_row(&self, row: &Row) -> CoreResult<()> {
        let key = self.descriptor.key_of(row);
        let pk = self.descriptor.primary_key_of(row);
        let mut table = self.table.lock();
        if self.descriptor.is_unique() && !key.has_null() && table.contains_key(&key)? {
            return Err(CoreError::constraint_violation(
                self.descriptor.qualified_name(),
                key.to_string(),
            ));
        }
        table.insert(key, pk.to_bytes())
    }

    fn delete_row(&self, row: &Row) -> CoreResult<bool> {
        let key = self.descriptor.key_of(row);
        let pk = self.descriptor.primary_key_of(row);
        self.table.lock().delete(&key, &pk.to_bytes())
    }

    fn lookup(&self, key: &CompositeKey) -> CoreResult<Vec<CompositeKey>> {
        self.table
            .lock()
            .lookup(key)?
            .iter()
            .map(|bytes| CompositeKey::from_bytes(bytes))
            .collect()
    }

    fn range_scan(
        &self,
        _start: Option<&CompositeKey>,
        _end: Option<&CompositeKey>,
    ) -> CoreResult<KeyScan> {
        Err(CoreError::invalid_operation(format!(
            "hash index '{}' does not support range scans",
            self.descriptor.qualified_name()
        )))
    }

    fn len(&self) -> u64 {
        self.table.lock().len()
    }

    fn flush(&self) -> CoreResult<()> {
        self.table.lock().flush()
    }
}

impl fmt::Debug for HashIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashIndex")
            .field("index", &self.descriptor.qualified_name())
            .finish_non_exhaustive()
    }
}
