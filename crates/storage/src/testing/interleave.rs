//! Deterministic race injection
//!
//! [`InterleavingStore`] wraps a backend and lets a test slip another
//! writer's work in between a caller's read and its conditional write, which
//! is exactly the window optimistic concurrency has to survive. It also
//! counts operations and conflicts, and can fail the next call of a chosen
//! operation with an arbitrary error.
//!
//! # Example
//!
//! ```
//! use tablekeep_core::{ConditionalStore, PartitionKey, Row, RowAddress, RowKey};
//! use tablekeep_storage::testing::InterleavingStore;
//! use tablekeep_storage::InMemoryTableStore;
//!
//! let store = InterleavingStore::new(InMemoryTableStore::new());
//! store.ensure_table("kvp").unwrap();
//! let address = RowAddress::parse("container-A", "key-1").unwrap();
//! store.insert("kvp", &Row::new(address.clone()).with("Value", "v1")).unwrap();
//!
//! // Another writer updates the row right after our next read.
//! store.after_next_get(|inner: &InMemoryTableStore| {
//!     let pk = PartitionKey::new("container-A").unwrap();
//!     let rk = RowKey::new("key-1").unwrap();
//!     let mut row = inner.get("kvp", &pk, &rk).unwrap().unwrap();
//!     row.set("Value", "v2");
//!     inner.conditional_replace("kvp", &row).unwrap();
//! });
//!
//! let mut stale = store.get("kvp", &address.partition_key, &address.row_key).unwrap().unwrap();
//! stale.set("Value", "v3");
//! assert!(store.conditional_replace("kvp", &stale).unwrap_err().is_precondition_failed());
//! assert_eq!(store.conflict_count(), 1);
//! ```

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tablekeep_core::{
    ConditionalStore, Error, PartitionKey, Result, Row, RowIter, RowKey, RowPredicate,
    WriteReceipt,
};

type Hook<S> = Box<dyn FnOnce(&S) + Send>;

/// Store operation that a fault can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `ensure_table`
    EnsureTable,
    /// `insert`
    Insert,
    /// `get`
    Get,
    /// `conditional_replace`
    Replace,
    /// `delete`
    Delete,
}

/// Backend wrapper that injects interleavings and faults
pub struct InterleavingStore<S> {
    inner: S,
    after_get: Mutex<VecDeque<Hook<S>>>,
    faults: Mutex<HashMap<Operation, VecDeque<Error>>>,
    gets: AtomicUsize,
    inserts: AtomicUsize,
    replaces: AtomicUsize,
    conflicts: AtomicUsize,
}

impl<S: ConditionalStore> InterleavingStore<S> {
    /// Wrap a backend
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            after_get: Mutex::new(VecDeque::new()),
            faults: Mutex::new(HashMap::new()),
            gets: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    /// The wrapped backend, bypassing all hooks
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Run `hook` against the wrapped backend right after the next `get`
    ///
    /// Hooks queue up: each `get` consumes at most one.
    pub fn after_next_get(&self, hook: impl FnOnce(&S) + Send + 'static) {
        self.after_get.lock().push_back(Box::new(hook));
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: Error) {
        self.faults
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Number of `get` calls seen
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `insert` calls seen
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of `conditional_replace` calls seen
    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    /// Number of writes rejected with `PreconditionFailed` or `AlreadyExists`
    pub fn conflict_count(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    fn injected(&self, operation: Operation) -> Result<()> {
        match self
            .faults
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_conflict() {
                self.conflicts.fetch_add(1, Ordering::SeqCst);
            }
        }
        result
    }
}

impl<S: ConditionalStore> ConditionalStore for InterleavingStore<S> {
    fn ensure_table(&self, table: &str) -> Result<()> {
        self.injected(Operation::EnsureTable)?;
        self.inner.ensure_table(table)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        self.inner.table_exists(table)
    }

    fn insert(&self, table: &str, row: &Row) -> Result<WriteReceipt> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.injected(Operation::Insert)?;
        self.observe(self.inner.insert(table, row))
    }

    fn get(
        &self,
        table: &str,
        partition_key: &PartitionKey,
        row_key: &RowKey,
    ) -> Result<Option<Row>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.injected(Operation::Get)?;
        let row = self.inner.get(table, partition_key, row_key)?;
        // Pop before running so the hook may itself call back into this store.
        let hook = self.after_get.lock().pop_front();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        Ok(row)
    }

    fn conditional_replace(&self, table: &str, row: &Row) -> Result<WriteReceipt> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.injected(Operation::Replace)?;
        self.observe(self.inner.conditional_replace(table, row))
    }

    fn delete(&self, table: &str, partition_key: &PartitionKey, row_key: &RowKey) -> Result<bool> {
        self.injected(Operation::Delete)?;
        self.inner.delete(table, partition_key, row_key)
    }

    fn scan_all<'a>(&'a self, table: &str) -> Result<RowIter<'a>> {
        self.inner.scan_all(table)
    }

    fn scan_partition<'a>(
        &'a self,
        table: &str,
        partition_key: &PartitionKey,
        predicate: RowPredicate<'a>,
    ) -> Result<RowIter<'a>> {
        self.inner.scan_partition(table, partition_key, predicate)
    }
}
