//! Auto-increment allocator
//!
//! A counter is one row whose `Value` property holds the next integer to
//! hand out. [`AutoIncrement::allocate`] reads it and bumps it with a
//! conditional replace. The first caller for a counter that does not exist
//! yet inserts it with `Value = 2` and takes 1, saving a second round trip.
//!
//! Losing either race (the insert against another first caller, or the
//! replace against another incrementer) restarts the whole decision from the
//! read. Under the backend's conditional-write guarantee no value is handed
//! out twice. Values can be skipped, e.g. if a process dies after inserting.

use crate::retry::{self, CancellationToken, Outcome, RetryPolicy};
use std::sync::Arc;
use tablekeep_core::{
    ConditionalStore, Error, PartitionKey, Result, Row, RowAddress, RowKey, RowLocation,
};
use tracing::trace;

/// Property holding the next value of a counter row
pub const COUNTER_PROPERTY: &str = "Value";

/// Allocator of unique increasing integers
pub struct AutoIncrement<S: ConditionalStore + ?Sized> {
    store: Arc<S>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: ConditionalStore + ?Sized> AutoIncrement<S> {
    /// Create an allocator with the default retry policy
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::default(),
        }
    }

    /// Use `policy` to bound retries
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop retrying once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Allocate the next value of the counter at (`table`, `partition_key`, `row_key`)
    ///
    /// Creates the table and the counter row on first use.
    ///
    /// # Errors
    ///
    /// - `PropertyType` if the counter row holds no integer `Value`
    /// - `ContentionExhausted` / `Cancelled` per the retry policy
    /// - any other backend error, unchanged
    pub fn allocate(
        &self,
        table: &str,
        partition_key: &PartitionKey,
        row_key: &RowKey,
    ) -> Result<i64> {
        let location = RowLocation::new(table, partition_key.as_str(), row_key.as_str());

        retry::run(&self.policy, &self.cancel, &location, |_| {
            match self.store.get(table, partition_key, row_key)? {
                None => self.initialize(table, partition_key, row_key),
                Some(row) => self.increment(table, row, &location),
            }
        })
    }

    fn initialize(
        &self,
        table: &str,
        partition_key: &PartitionKey,
        row_key: &RowKey,
    ) -> Result<Outcome<i64>> {
        self.store.ensure_table(table)?;
        let row = Row::new(RowAddress::new(partition_key.clone(), row_key.clone()))
            .with(COUNTER_PROPERTY, 2i64);

        match self.store.insert(table, &row) {
            Ok(_) => {
                trace!(table = %table, address = %row.address(), "Initialized counter");
                Ok(Outcome::Done(1))
            }
            Err(e) if e.is_already_exists() => Ok(Outcome::Conflict),
            Err(e) => Err(e),
        }
    }

    fn increment(&self, table: &str, mut row: Row, location: &RowLocation) -> Result<Outcome<i64>> {
        let value: i64 = row.get_as(COUNTER_PROPERTY)?;
        let next = value.checked_add(1).ok_or_else(|| Error::PropertyType {
            name: COUNTER_PROPERTY.to_string(),
            expected: "Int below i64::MAX",
        })?;
        row.set(COUNTER_PROPERTY, next);

        match self.store.conditional_replace(table, &row) {
            Ok(_) => {
                trace!(row = %location, value, "Allocated counter value");
                Ok(Outcome::Done(value))
            }
            // Deleted since the read: start over and recreate it.
            Err(e) if e.is_precondition_failed() || e.is_not_found() => Ok(Outcome::Conflict),
            Err(e) => Err(e),
        }
    }
}
