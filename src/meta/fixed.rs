//! Static metastore

use super::types::{MetaError, TableNames};
use super::Metastore;

/// A constant table mapping, for deployments without a coordination service
pub struct StaticMetastore {
    tables: TableNames,
}

impl StaticMetastore {
    pub fn new(tables: TableNames) -> Self {
        Self { tables }
    }
}

impl Metastore for StaticMetastore {
    fn tables(&self) -> Result<TableNames, MetaError> {
        Ok(self.tables.clone())
    }
}
