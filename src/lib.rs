//! Catalog and storage layer of the scrolldb document database.
//!
//! The crate centers on the collection-rename subsystem: atomically rebind a
//! target namespace to the contents and identity of a source collection,
//! under concurrent writers, background index builds, sharding and
//! replication invariants. The surrounding catalog, lock manager, storage,
//! and replication pieces are the minimal substrate that subsystem runs on.

pub mod background;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod failpoint;
pub mod lock;
pub mod namespace;
pub mod repl;
pub mod sharding;
pub mod storage;

pub use catalog::rename::{
    RenameOptions, rename_collection, rename_collection_for_apply_ops,
    rename_collection_for_rollback, rename_collection_if_unchanged,
    validate_and_run_rename_collection,
};
pub use config::ScrollConfig;
pub use context::{OperationContext, ServiceContext};
pub use error::{ScrollError, ScrollErrorCode};
pub use namespace::Namespace;
