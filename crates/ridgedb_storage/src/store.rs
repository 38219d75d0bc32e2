//! Page store trait definition.

use crate::error::StorageResult;
use crate::page::{Page, PageId};

/// A fixed-size page store.
///
/// Page stores are **opaque page arrays**. They allocate, read, and write
/// pages by id; the index that owns a store decides what the bytes mean.
///
/// # Invariants
///
/// - `allocate_page` returns a zeroed page whose id equals the previous
///   `page_count`
/// - `read_page` returns exactly the bytes last written for that id
/// - every page handed out or accepted has exactly `page_size` bytes
/// - `flush` makes all written pages durable
///
/// # Implementors
///
/// - [`super::InMemoryPageStore`] - For testing
/// - [`super::FilePageStore`] - For persistent storage
pub trait PageStore: Send + Sync {
    /// Returns the size of every page in bytes.
    fn page_size(&self) -> usize;

    /// Allocates a new zero-filled page at the end of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be reserved.
    fn allocate_page(&mut self) -> StorageResult<Page>;

    /// Reads the page with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::PageNotFound`] for ids that were never
    /// allocated, or an I/O error.
    fn read_page(&self, id: PageId) -> StorageResult<Page>;

    /// Writes a page back to its slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the page was never allocated, has the wrong
    /// size, or the write fails.
    fn write_page(&mut self, page: &Page) -> StorageResult<()>;

    /// Returns the number of allocated pages.
    fn page_count(&self) -> u32;

    /// Flushes all written pages to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;
}
