//! Index structures built on the B-Tree and hash page formats.
//!
//! Every table has exactly one [`ClusteredIndex`] holding its rows. Derived
//! indexes map a projection of each row back to its primary key:
//!
//! - [`SecondaryIndex`]: ordered, B-Tree over `index key ++ primary key`
//! - [`HashIndex`]: equality only, extendible hashing
//! - [`FullTextIndex`]: token search over text columns
//!
//! The [`IndexManager`] keeps a table's indexes consistent by fanning every
//! row mutation out to all of them.

mod clustered;
mod descriptor;
mod fulltext;
mod hash;
mod manager;
mod secondary;
mod storage;
mod traits;

pub use clustered::{ClusteredIndex, RowScan, VisibleRowScan};
pub use descriptor::{IndexDescriptor, IndexKind, PRIMARY_INDEX};
pub use fulltext::{FullTextIndex, TokenizerConfig};
pub use hash::{ExtendibleHash, HashIndex, HashStats};
pub use manager::{DerivedIndex, IndexDefinition, IndexManager, IndexScan, TableIndexes};
pub use secondary::{KeyScan, SecondaryIndex};
pub use storage::{discard_store, index_path, open_store, INDEX_FILE_EXTENSION};
pub use traits::RowIndex;
