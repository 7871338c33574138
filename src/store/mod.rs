//! Partitioned key-value store adapter
//!
//! Maps `(table, mapKey, z, x, y)` onto salted row keys and issues parallel
//! lookups across every salt bucket.

pub mod client;
pub mod points;
pub mod row_key;
pub mod tiles;
pub mod types;

pub use client::{KvClient, RestKvClient};
pub use tiles::{RetryPolicy, SaltedTileStore};
pub use types::{OccurrencePoint, StoreError};
