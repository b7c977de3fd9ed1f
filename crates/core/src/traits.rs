//! Backend abstraction
//!
//! [`ConditionalStore`] is the contract this crate family consumes from a
//! partitioned key-value table service. Any service offering per-row
//! conditional replace by version token and partition-scoped scans can
//! implement it; `tablekeep-storage` ships an in-memory implementation.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use crate::error::Result;
use crate::keys::{PartitionKey, RowKey};
use crate::row::{Row, WriteReceipt};

/// Lazy sequence of rows returned by scans
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + Send + 'a>;

/// Row predicate for partition scans
pub type RowPredicate<'p> = &'p (dyn Fn(&Row) -> bool + Sync);

/// Partitioned table storage with conditional writes
pub trait ConditionalStore: Send + Sync {
    /// Create the table if it does not exist
    ///
    /// Idempotent and safe under concurrent first-time callers: a table that
    /// raced into existence counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn ensure_table(&self, table: &str) -> Result<()>;

    /// Check whether a table exists
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Insert a new row
    ///
    /// Returns the version token and timestamp assigned to the row. Stamping
    /// `row` with the receipt yields a copy equal to the stored one.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the (partition key, row key) pair is occupied
    /// - `TableNotFound` if the table does not exist
    fn insert(&self, table: &str, row: &Row) -> Result<WriteReceipt>;

    /// Fetch a row by key
    ///
    /// Returns `None` if the row (or its table) does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, table: &str, partition_key: &PartitionKey, row_key: &RowKey)
        -> Result<Option<Row>>;

    /// Replace a row only if it is unchanged since it was read
    ///
    /// The stored row's version token must equal `row.version()`. On success
    /// the backend assigns a new token and timestamp and returns both.
    ///
    /// # Errors
    ///
    /// - `PreconditionFailed` on token mismatch, or if `row` carries no token
    /// - `NotFound` if the row no longer exists
    fn conditional_replace(&self, table: &str, row: &Row) -> Result<WriteReceipt>;

    /// Delete a row
    ///
    /// Returns true if a row was removed, false if none existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete(&self, table: &str, partition_key: &PartitionKey, row_key: &RowKey) -> Result<bool>;

    /// Lazily scan every row of a table
    ///
    /// Rows are yielded in (partition key, row key) order. Writes made while
    /// the scan is in progress may or may not be observed.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    fn scan_all<'a>(&'a self, table: &str) -> Result<RowIter<'a>>;

    /// Lazily scan the rows of one partition that satisfy `predicate`
    ///
    /// The predicate is evaluated as the iterator advances, so it must live
    /// as long as the returned iterator.
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` if the table does not exist.
    fn scan_partition<'a>(
        &'a self,
        table: &str,
        partition_key: &PartitionKey,
        predicate: RowPredicate<'a>,
    ) -> Result<RowIter<'a>>;
}

impl<S: ConditionalStore + ?Sized> ConditionalStore for std::sync::Arc<S> {
    fn ensure_table(&self, table: &str) -> Result<()> {
        (**self).ensure_table(table)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        (**self).table_exists(table)
    }

    fn insert(&self, table: &str, row: &Row) -> Result<WriteReceipt> {
        (**self).insert(table, row)
    }

    fn get(
        &self,
        table: &str,
        partition_key: &PartitionKey,
        row_key: &RowKey,
    ) -> Result<Option<Row>> {
        (**self).get(table, partition_key, row_key)
    }

    fn conditional_replace(&self, table: &str, row: &Row) -> Result<WriteReceipt> {
        (**self).conditional_replace(table, row)
    }

    fn delete(&self, table: &str, partition_key: &PartitionKey, row_key: &RowKey) -> Result<bool> {
        (**self).delete(table, partition_key, row_key)
    }

    fn scan_all<'a>(&'a self, table: &str) -> Result<RowIter<'a>> {
        (**self).scan_all(table)
    }

    fn scan_partition<'a>(
        &'a self,
        table: &str,
        partition_key: &PartitionKey,
        predicate: RowPredicate<'a>,
    ) -> Result<RowIter<'a>> {
        (**self).scan_partition(table, partition_key, predicate)
    }
}
