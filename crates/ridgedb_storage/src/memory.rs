//! In-memory page store for testing.

use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageId, MIN_PAGE_SIZE};
use crate::store::PageStore;
use parking_lot::RwLock;

/// An in-memory page store.
///
/// This store keeps every page in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Indexes on temporary tables
///
/// # Example
///
/// ```rust
/// use ridgedb_storage::{InMemoryPageStore, PageStore};
///
/// let mut store = InMemoryPageStore::new(1024);
/// let page = store.allocate_page().unwrap();
/// assert_eq!(page.id().as_u32(), 0);
/// assert_eq!(store.page_count(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryPageStore {
    page_size: usize,
    pages: RwLock<Vec<Vec<u8>>>,
}

impl InMemoryPageStore {
    /// Creates a new empty store.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is below [`MIN_PAGE_SIZE`].
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        assert!(
            page_size >= MIN_PAGE_SIZE,
            "page size {page_size} below minimum {MIN_PAGE_SIZE}"
        );
        Self {
            page_size,
            pages: RwLock::new(Vec::new()),
        }
    }

    /// Returns a copy of every page buffer.
    ///
    /// Useful for testing reopen scenarios.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.pages.read().clone()
    }

    /// Creates a store pre-loaded with page buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if any buffer has the wrong size.
    pub fn with_pages(page_size: usize, pages: Vec<Vec<u8>>) -> StorageResult<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(StorageError::InvalidPageSize(page_size));
        }
        if let Some(bad) = pages.iter().find(|p| p.len() != page_size) {
            return Err(StorageError::PageSizeMismatch {
                expected: page_size,
                actual: bad.len(),
            });
        }
        Ok(Self {
            page_size,
            pages: RwLock::new(pages),
        })
    }
}

impl PageStore for InMemoryPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate_page(&mut self) -> StorageResult<Page> {
        let mut pages = self.pages.write();
        let id = PageId::new(pages.len() as u32);
        pages.push(vec![0u8; self.page_size]);
        Ok(Page::new(id, self.page_size))
    }

    fn read_page(&self, id: PageId) -> StorageResult<Page> {
        let pages = self.pages.read();
        match pages.get(id.as_u32() as usize) {
            Some(data) if id.is_valid() => Ok(Page::from_bytes(id, data.clone())),
            _ => Err(StorageError::PageNotFound {
                page_id: id,
                page_count: pages.len() as u32,
            }),
        }
    }

    fn write_page(&mut self, page: &Page) -> StorageResult<()> {
        if page.size() != self.page_size {
            return Err(StorageError::PageSizeMismatch {
                expected: self.page_size,
                actual: page.size(),
            });
        }
        let mut pages = self.pages.write();
        let page_count = pages.len() as u32;
        match pages.get_mut(page.id().as_u32() as usize) {
            Some(slot) if page.id().is_valid() => {
                slot.copy_from_slice(page.data());
                Ok(())
            }
            _ => Err(StorageError::PageNotFound {
                page_id: page.id(),
                page_count,
            }),
        }
    }

    fn page_count(&self) -> u32 {
        self.pages.read().len() as u32
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Nothing buffered outside the page vector
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryPageStore::new(512);
        assert_eq!(store.page_count(), 0);
        assert_eq!(store.page_size(), 512);
    }

    #[test]
    fn memory_allocate_assigns_dense_ids() {
        let mut store = InMemoryPageStore::new(512);
        assert_eq!(store.allocate_page().unwrap().id(), PageId::new(0));
        assert_eq!(store.allocate_page().unwrap().id(), PageId::new(1));
        assert_eq!(store.page_count(), 2);
    }

    #[test]
    fn memory_write_then_read() {
        let mut store = InMemoryPageStore::new(512);
        let mut page = store.allocate_page().unwrap();
        page.data_mut()[10] = 0xAB;
        store.write_page(&page).unwrap();

        let read = store.read_page(page.id()).unwrap();
        assert_eq!(read.data()[10], 0xAB);
    }

    #[test]
    fn memory_read_unallocated_fails() {
        let store = InMemoryPageStore::new(512);
        let result = store.read_page(PageId::new(3));
        assert!(matches!(result, Err(StorageError::PageNotFound { .. })));
    }

    #[test]
    fn memory_read_invalid_id_fails() {
        let store = InMemoryPageStore::new(512);
        assert!(store.read_page(PageId::INVALID).is_err());
    }

    #[test]
    fn memory_write_wrong_size_fails() {
        let mut store = InMemoryPageStore::new(512);
        store.allocate_page().unwrap();
        let page = Page::new(PageId::new(0), 256);
        let result = store.write_page(&page);
        assert!(matches!(result, Err(StorageError::PageSizeMismatch { .. })));
    }

    #[test]
    fn memory_write_unallocated_fails() {
        let mut store = InMemoryPageStore::new(512);
        let page = Page::new(PageId::new(0), 512);
        assert!(store.write_page(&page).is_err());
    }

    #[test]
    fn memory_snapshot_restores() {
        let mut store = InMemoryPageStore::new(512);
        let mut page = store.allocate_page().unwrap();
        page.data_mut()[0] = 9;
        store.write_page(&page).unwrap();

        let restored = InMemoryPageStore::with_pages(512, store.snapshot()).unwrap();
        assert_eq!(restored.read_page(PageId::new(0)).unwrap().data()[0], 9);
    }

    #[test]
    fn memory_with_pages_rejects_mismatched_buffers() {
        let result = InMemoryPageStore::with_pages(512, vec![vec![0u8; 100]]);
        assert!(result.is_err());
    }
}
