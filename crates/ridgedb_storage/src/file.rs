//! File-based page store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageId, MIN_PAGE_SIZE};
use crate::store::PageStore;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based page store.
///
/// Page `n` lives at byte offset `n * page_size`. The file length is always
/// a whole number of pages.
///
/// # Durability
///
/// - `write_page` hands the page to the OS
/// - `flush` calls `File::sync_all()` so written pages reach the disk
///
/// # Exclusivity
///
/// The file is locked with an advisory exclusive lock for the lifetime of
/// the store; a second open of the same file fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use ridgedb_storage::{FilePageStore, PageStore};
/// use std::path::Path;
///
/// let mut store = FilePageStore::open(Path::new("orders.idx"), 16 * 1024).unwrap();
/// let page = store.allocate_page().unwrap();
/// store.write_page(&page).unwrap();
/// store.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FilePageStore {
    path: PathBuf,
    page_size: usize,
    file: Mutex<File>,
    page_count: u32,
}

impl FilePageStore {
    /// Opens or creates a page file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// process, or its length is not a multiple of `page_size`.
    pub fn open(path: &Path, page_size: usize) -> StorageResult<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(StorageError::InvalidPageSize(page_size));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file length {len} is not a multiple of page size {page_size}"
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            page_size,
            file: Mutex::new(file),
            page_count: (len / page_size as u64) as u32,
        })
    }

    /// Opens or creates a page file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path, page_size: usize) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, page_size)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset_of(&self, id: PageId) -> u64 {
        u64::from(id.as_u32()) * self.page_size as u64
    }

    fn check_allocated(&self, id: PageId) -> StorageResult<()> {
        if !id.is_valid() || id.as_u32() >= self.page_count {
            return Err(StorageError::PageNotFound {
                page_id: id,
                page_count: self.page_count,
            });
        }
        Ok(())
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate_page(&mut self) -> StorageResult<Page> {
        let id = PageId::new(self.page_count);
        let page = Page::new(id, self.page_size);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.offset_of(id)))?;
        file.write_all(page.data())?;
        self.page_count += 1;

        Ok(page)
    }

    fn read_page(&self, id: PageId) -> StorageResult<Page> {
        self.check_allocated(id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.offset_of(id)))?;
        let mut buffer = vec![0u8; self.page_size];
        file.read_exact(&mut buffer)?;

        Ok(Page::from_bytes(id, buffer))
    }

    fn write_page(&mut self, page: &Page) -> StorageResult<()> {
        self.check_allocated(page.id())?;
        if page.size() != self.page_size {
            return Err(StorageError::PageSizeMismatch {
                expected: self.page_size,
                actual: page.size(),
            });
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.offset_of(page.id())))?;
        file.write_all(page.data())?;
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}
