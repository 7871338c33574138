//! Metastore
//!
//! Resolves the logical tiles/points tables to physical table names, either
//! statically or by watching a coordination document.

pub mod fixed;
pub mod types;
pub mod watched;

pub use fixed::StaticMetastore;
pub use types::{MetaError, TableNames};
pub use watched::{HttpMetaSource, MetaSource, WatchedMetastore};

/// Non-blocking view of the current table mapping
pub trait Metastore: Send + Sync {
    /// The last known table mapping
    fn tables(&self) -> Result<TableNames, MetaError>;
}
