//! Page-organized B+Tree shared by the clustered and secondary indexes.
//!
//! - [`BTreePage`]: one decoded leaf or internal page
//! - [`BPlusTree`]: the tree over a [`ridgedb_storage::PageStore`]
//! - [`TreeCursor`]: a lazy, bounded, forward scan over a shared tree

mod cursor;
mod page;
mod tree;

pub use cursor::TreeCursor;
pub use page::{BTreePage, PageInsert};
pub use tree::{BPlusTree, TreeStats};
