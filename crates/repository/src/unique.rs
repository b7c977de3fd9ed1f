//! Uniqueness registry
//!
//! Claims a value (a user name, an email address) exactly once per
//! namespace, using insert-if-absent on a dedicated table. The namespace is
//! the partition key and the claimed value the row key, so the backend's
//! insert collision check is the whole protocol.

use crate::config::StoreConfig;
use std::sync::Arc;
use tablekeep_core::{ConditionalStore, Result, Row, RowAddress, Timestamp};
use tracing::debug;

/// Table holding uniqueness claims
pub const UNIQUENESS_TABLE: &str = "uniqueness";

/// Registry of claimed (namespace, value) pairs
pub struct UniquenessRegistry<S: ConditionalStore + ?Sized> {
    store: Arc<S>,
    table: String,
}

impl<S: ConditionalStore + ?Sized> UniquenessRegistry<S> {
    /// Registry in the default table
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            table: UNIQUENESS_TABLE.to_string(),
        }
    }

    /// Apply the table prefix from `config`
    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.table = config.table_name(UNIQUENESS_TABLE);
        self
    }

    /// Table name in use
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Claim `unique_id` in `namespace`
    ///
    /// Returns true if this call made the claim, false if it was already
    /// claimed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either part is empty, or any backend error
    /// other than the insert collision.
    pub fn try_register(&self, namespace: &str, unique_id: &str) -> Result<bool> {
        let address = RowAddress::parse(namespace, unique_id)?;
        self.store.ensure_table(&self.table)?;

        let claim = Row::new(address).with("RegisteredAt", Timestamp::now());
        match self.store.insert(&self.table, &claim) {
            Ok(_) => {
                debug!(namespace, unique_id, "Registered unique value");
                Ok(true)
            }
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check whether `unique_id` is claimed in `namespace`
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either part is empty.
    pub fn is_registered(&self, namespace: &str, unique_id: &str) -> Result<bool> {
        let address = RowAddress::parse(namespace, unique_id)?;
        Ok(self
            .store
            .get(&self.table, &address.partition_key, &address.row_key)?
            .is_some())
    }

    /// Give up a claim
    ///
    /// Returns false if it was not claimed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either part is empty.
    pub fn release(&self, namespace: &str, unique_id: &str) -> Result<bool> {
        let address = RowAddress::parse(namespace, unique_id)?;
        self.store
            .delete(&self.table, &address.partition_key, &address.row_key)
    }
}
