//! # RidgeDB Storage
//!
//! Fixed-size page stores for RidgeDB index structures.
//!
//! Every index owns exactly one page store. A store only knows how to hand
//! out, read, and write fixed-size pages addressed by [`PageId`]; the layout
//! of the bytes inside a page belongs entirely to the index that owns it.
//!
//! ## Available Stores
//!
//! - [`InMemoryPageStore`] - For testing and ephemeral indexes
//! - [`FilePageStore`] - Pages laid out back to back in one file
//!
//! ## Example
//!
//! ```rust
//! use ridgedb_storage::{InMemoryPageStore, PageStore};
//!
//! let mut store = InMemoryPageStore::new(4096);
//! let mut page = store.allocate_page().unwrap();
//! page.data_mut()[..5].copy_from_slice(b"hello");
//! store.write_page(&page).unwrap();
//!
//! let read = store.read_page(page.id()).unwrap();
//! assert_eq!(&read.data()[..5], b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod page;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FilePageStore;
pub use memory::InMemoryPageStore;
pub use page::{Page, PageId, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
pub use store::PageStore;
