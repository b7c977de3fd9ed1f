//! In-memory table store
//!
//! Reference implementation of [`ConditionalStore`] with the same observable
//! semantics as a partitioned table service: insert fails on an occupied
//! key, replace is conditional on the version token, and every successful
//! write assigns a fresh token and timestamp.
//!
//! # Design
//!
//! - DashMap: table name → table, so different tables never contend
//! - Per-table RwLock over `partition key → (row key → row)` BTreeMaps, giving
//!   scans the (partition, row) ordering a table service returns
//! - AtomicU64: store-wide token counter, so tokens never repeat
//! - Scans walk the maps in batches, each under its own read lock, resuming
//!   after the last address visited. Rows written mid-scan ahead of that
//!   address are seen; rows behind it are not.
//!
//! # Thread Safety
//!
//! All operations are thread-safe. A conditional replace checks and writes
//! under the table's write lock, so concurrent writers to one row linearize
//! and exactly one of them wins per version.
//!
//! # Example
//!
//! ```
//! use tablekeep_core::{ConditionalStore, Row, RowAddress};
//! use tablekeep_storage::InMemoryTableStore;
//!
//! let store = InMemoryTableStore::new();
//! store.ensure_table("kvp").unwrap();
//! let row = Row::new(RowAddress::parse("container-A", "key-1").unwrap()).with("Value", "v1");
//! store.insert("kvp", &row).unwrap();
//! assert!(store.insert("kvp", &row).unwrap_err().is_already_exists());
//! ```

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tablekeep_core::{
    ConditionalStore, Error, PartitionKey, Result, Row, RowAddress, RowIter, RowKey,
    RowPredicate, Timestamp, VersionToken, WriteReceipt,
};
use tracing::{info, trace};

type Partition = BTreeMap<RowKey, Row>;

/// Rows visited per read lock while scanning
const SCAN_BATCH: usize = 64;

/// One table: partitions in key order
#[derive(Debug, Default)]
pub struct Table {
    partitions: RwLock<BTreeMap<PartitionKey, Partition>>,
}

impl Table {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all partitions
    pub fn len(&self) -> usize {
        self.partitions.read().values().map(BTreeMap::len).sum()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-empty partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }
}

/// In-memory partitioned table storage
pub struct InMemoryTableStore {
    tables: DashMap<String, Arc<Table>>,
    version: AtomicU64,
}

impl InMemoryTableStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Number of tables
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of rows in a table (0 if the table does not exist)
    pub fn row_count(&self, table: &str) -> usize {
        self.table(table).map(|t| t.len()).unwrap_or(0)
    }

    /// Names of all tables, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn table(&self, table: &str) -> Option<Arc<Table>> {
        self.tables.get(table).map(|entry| Arc::clone(entry.value()))
    }

    fn existing_table(&self, table: &str) -> Result<Arc<Table>> {
        self.table(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    fn next_token(&self) -> VersionToken {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        VersionToken::new(format!("W/\"{:016x}\"", version))
    }

    fn stamped(&self, row: &Row) -> (Row, WriteReceipt) {
        let receipt = WriteReceipt {
            version: self.next_token(),
            timestamp: Timestamp::now(),
        };
        let mut stored = row.clone();
        stored.apply_receipt(&receipt);
        (stored, receipt)
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionalStore for InMemoryTableStore {
    fn ensure_table(&self, table: &str) -> Result<()> {
        if table.trim().is_empty() {
            return Err(Error::InvalidKey("table name is empty".to_string()));
        }
        let mut created = false;
        self.tables.entry(table.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(Table::new())
        });
        if created {
            info!(table = %table, "Created table");
        }
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.tables.contains_key(table))
    }

    fn insert(&self, table: &str, row: &Row) -> Result<WriteReceipt> {
        let shard = self.existing_table(table)?;
        let mut partitions = shard.partitions.write();
        let partition = partitions.entry(row.partition_key().clone()).or_default();

        if partition.contains_key(row.row_key()) {
            return Err(Error::AlreadyExists(row.location(table)));
        }

        let (stored, receipt) = self.stamped(row);
        partition.insert(row.row_key().clone(), stored);
        trace!(table = %table, address = %row.address(), version = %receipt.version, "Inserted row");
        Ok(receipt)
    }

    fn get(
        &self,
        table: &str,
        partition_key: &PartitionKey,
        row_key: &RowKey,
    ) -> Result<Option<Row>> {
        let Some(shard) = self.table(table) else {
            return Ok(None);
        };
        let partitions = shard.partitions.read();
        let row = partitions
            .get(partition_key)
            .and_then(|partition| partition.get(row_key))
            .cloned();
        trace!(
            table = %table,
            partition_key = %partition_key,
            row_key = %row_key,
            found = row.is_some(),
            "Read row"
        );
        Ok(row)
    }

    fn conditional_replace(&self, table: &str, row: &Row) -> Result<WriteReceipt> {
        let shard = self.existing_table(table)?;
        let mut partitions = shard.partitions.write();

        let current = partitions
            .get_mut(row.partition_key())
            .and_then(|partition| partition.get_mut(row.row_key()))
            .ok_or_else(|| Error::NotFound(row.location(table)))?;

        if row.version().is_none() || current.version() != row.version() {
            trace!(
                table = %table,
                address = %row.address(),
                expected = ?row.version(),
                actual = ?current.version(),
                "Version token mismatch"
            );
            return Err(Error::PreconditionFailed(row.location(table)));
        }

        let (stored, receipt) = self.stamped(row);
        *current = stored;
        trace!(table = %table, address = %row.address(), version = %receipt.version, "Replaced row");
        Ok(receipt)
    }

    fn delete(&self, table: &str, partition_key: &PartitionKey, row_key: &RowKey) -> Result<bool> {
        let Some(shard) = self.table(table) else {
            return Ok(false);
        };
        let mut partitions = shard.partitions.write();
        let Some(partition) = partitions.get_mut(partition_key) else {
            return Ok(false);
        };
        let removed = partition.remove(row_key).is_some();
        if partition.is_empty() {
            partitions.remove(partition_key);
        }
        if removed {
            trace!(table = %table, partition_key = %partition_key, row_key = %row_key, "Deleted row");
        }
        Ok(removed)
    }

    fn scan_all<'a>(&'a self, table: &str) -> Result<RowIter<'a>> {
        let shard = self.existing_table(table)?;
        Ok(Box::new(Scan::new(shard, None, None)))
    }

    fn scan_partition<'a>(
        &'a self,
        table: &str,
        partition_key: &PartitionKey,
        predicate: RowPredicate<'a>,
    ) -> Result<RowIter<'a>> {
        let shard = self.existing_table(table)?;
        Ok(Box::new(Scan::new(
            shard,
            Some(partition_key.clone()),
            Some(predicate),
        )))
    }
}

/// Batched scan over one table
///
/// Each batch visits at most [`SCAN_BATCH`] rows under a fresh read lock and
/// copies only those that match. The next batch resumes after the last
/// visited address, so a scan never holds the lock between batches and never
/// copies more than one batch ahead of the caller.
struct Scan<'a> {
    table: Arc<Table>,
    partition: Option<PartitionKey>,
    predicate: Option<RowPredicate<'a>>,
    resume_after: Option<RowAddress>,
    batch: std::vec::IntoIter<Row>,
    exhausted: bool,
}

impl<'a> Scan<'a> {
    fn new(
        table: Arc<Table>,
        partition: Option<PartitionKey>,
        predicate: Option<RowPredicate<'a>>,
    ) -> Self {
        Self {
            table,
            partition,
            predicate,
            resume_after: None,
            batch: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    fn fill(&mut self) {
        let partitions = self.table.partitions.read();
        let lower = match (&self.resume_after, &self.partition) {
            (Some(last), _) => Bound::Included(last.partition_key.clone()),
            (None, Some(pk)) => Bound::Included(pk.clone()),
            (None, None) => Bound::Unbounded,
        };
        let upper = match &self.partition {
            Some(pk) => Bound::Included(pk.clone()),
            None => Bound::Unbounded,
        };

        let mut rows = Vec::new();
        let mut visited = 0;
        'partitions: for (pk, partition) in partitions.range((lower, upper)) {
            let from = match &self.resume_after {
                Some(last) if last.partition_key == *pk => Bound::Excluded(last.row_key.clone()),
                _ => Bound::Unbounded,
            };
            for (rk, row) in partition.range((from, Bound::Unbounded)) {
                if visited == SCAN_BATCH {
                    break 'partitions;
                }
                visited += 1;
                self.resume_after = Some(RowAddress {
                    partition_key: pk.clone(),
                    row_key: rk.clone(),
                });
                if self.predicate.map_or(true, |matches| matches(row)) {
                    rows.push(row.clone());
                }
            }
        }

        self.exhausted = visited < SCAN_BATCH;
        self.batch = rows.into_iter();
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.batch.next() {
                return Some(Ok(row));
            }
            if self.exhausted {
                return None;
            }
            self.fill();
        }
    }
}
