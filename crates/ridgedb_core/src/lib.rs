//! # RidgeDB Core
//!
//! Indexed storage core for RidgeDB.
//!
//! This crate provides:
//! - A page-organized B+Tree keyed by [`CompositeKey`]
//! - Clustered, secondary, extendible-hash and full-text indexes
//! - An [`IndexManager`] that keeps every index of a table consistent
//! - Record, gap and next-key row locks
//! - A read-view boundary for MVCC-filtered scans
//!
//! ## Example
//!
//! ```rust
//! use ridgedb_codec::{DataType, DataValue};
//! use ridgedb_core::{ColumnDef, CompositeKey, Config, IndexDefinition, IndexManager, Row, TableSchema};
//!
//! let manager = IndexManager::new(Config::new());
//! let schema = TableSchema::new(
//!     "users",
//!     vec![
//!         ColumnDef::new("id", DataType::Integer),
//!         ColumnDef::new("city", DataType::Text),
//!     ],
//!     &["id"],
//! )
//! .unwrap();
//! manager.create_table("app", schema).unwrap();
//! manager
//!     .create_index("app", "users", &IndexDefinition::secondary("by_city", &["city"]))
//!     .unwrap();
//!
//! let row = Row::new(vec![DataValue::Integer(1), DataValue::from("oslo")]);
//! manager.insert_row("app", "users", &row).unwrap();
//!
//! let found = manager
//!     .lookup("app", "users", "by_city", &CompositeKey::from(DataValue::from("oslo")))
//!     .unwrap();
//! assert_eq!(found, vec![row]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod btree;
mod config;
mod error;
pub mod index;
mod key;
pub(crate) mod layout;
pub mod lock;
mod mvcc;
mod schema;
mod types;

pub use config::{Config, IndexConfig, LockConfig, StorageConfig};
pub use error::{CoreError, CoreResult};
pub use index::{
    ClusteredIndex, DerivedIndex, HashIndex, IndexDefinition, IndexDescriptor, IndexKind,
    IndexManager, RowIndex, SecondaryIndex, TableIndexes, PRIMARY_INDEX,
};
pub use key::CompositeKey;
pub use lock::{
    Gap, GapLockManager, LockMode, LockOutcome, LockState, NextKeyLockManager, RecordKey,
    RecordLockManager,
};
pub use mvcc::{LatestVersion, ReadView, VersionResolver};
pub use schema::{ColumnDef, Row, TableSchema};
pub use types::{RowLocator, TransactionId};
