//! Optimistic entity handle
//!
//! An [`OptimisticEntity`] owns a possibly stale copy of one row plus
//! everything needed to mutate it safely: the backend, the table, and the
//! row's address. Mutations never trust the cached copy.
//!
//! ## Atomic modification
//!
//! [`atomic_modify`](OptimisticEntity::atomic_modify) runs a read-modify-write
//! cycle under optimistic concurrency:
//!
//! 1. Re-read the row from the backend
//! 2. If `condition(row)` is false, stop and return `false` (nothing written)
//! 3. Apply `mutate(row)`, keeping the version token from step 1
//! 4. Conditionally replace; on `PreconditionFailed` go back to step 1
//! 5. On success refresh the cached copy and return `true`
//!
//! No lock is held at any point. The number of cycles is bounded by the
//! entity's [`RetryPolicy`]; a bound hit under contention surfaces as
//! `ContentionExhausted`, a cancelled token as `Cancelled`.
//!
//! ## Compare-and-swap
//!
//! [`compare_and_swap`](OptimisticEntity::compare_and_swap) specializes the
//! above to a single field selected by a [`FieldLens`]:
//!
//! ```
//! use std::sync::Arc;
//! use tablekeep_concurrency::{OptimisticEntity, Property};
//! use tablekeep_core::{ConditionalStore, Row, RowAddress};
//! use tablekeep_storage::InMemoryTableStore;
//!
//! let store = Arc::new(InMemoryTableStore::new());
//! store.ensure_table("jobs").unwrap();
//! let address = RowAddress::parse("queue", "job-1").unwrap();
//! store.insert("jobs", &Row::new(address.clone()).with("Status", "queued")).unwrap();
//!
//! let mut job = OptimisticEntity::at(store, "jobs", address);
//! let status = Property::<String>::new("Status");
//!
//! let won = job.compare_and_swap(&"queued".to_string(), "running".to_string(), &status).unwrap();
//! assert!(won.swapped);
//!
//! let lost = job.compare_and_swap(&"queued".to_string(), "running".to_string(), &status).unwrap();
//! assert!(!lost.swapped);
//! assert_eq!(lost.current, "running");
//! ```

use crate::lens::FieldLens;
use crate::retry::{self, CancellationToken, Outcome, RetryPolicy};
use std::sync::Arc;
use tablekeep_core::{
    ConditionalStore, EntityReference, Error, Locator, ObjectId, Result, Row, RowAddress,
    RowLocation, Timestamp,
};
use tracing::trace;

/// Result of a compare-and-swap
#[derive(Debug, Clone, PartialEq)]
pub struct CasOutcome<T> {
    /// Whether the field was swapped
    pub swapped: bool,
    /// Field value after the operation: `desired` if swapped, otherwise the
    /// value that did not match
    pub current: T,
}

/// Handle to one stored row with optimistic mutation
pub struct OptimisticEntity<S: ConditionalStore + ?Sized> {
    store: Arc<S>,
    table: String,
    address: RowAddress,
    cached: Option<Row>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: ConditionalStore + ?Sized> OptimisticEntity<S> {
    /// Handle to the row at `address` in `table`
    ///
    /// Nothing is read until the row is first needed.
    pub fn at(store: Arc<S>, table: impl Into<String>, address: RowAddress) -> Self {
        Self {
            store,
            table: table.into(),
            address,
            cached: None,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::default(),
        }
    }

    /// Handle to the row whose keys derive from `id`
    pub fn for_id(store: Arc<S>, table: impl Into<String>, id: ObjectId) -> Self {
        Self::at(store, table, RowAddress::for_id(id))
    }

    /// Handle seeded with an already-fetched row
    pub fn from_row(store: Arc<S>, table: impl Into<String>, row: Row) -> Self {
        let mut entity = Self::at(store, table, row.address().clone());
        entity.cached = Some(row);
        entity
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

    /// Table holding the row
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Row address
    pub fn address(&self) -> &RowAddress {
        &self.address
    }

    /// Backend
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Retry bound in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Object id, if the row key was derived from one
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the row key is not an encoded id.
    pub fn object_id(&self) -> Result<ObjectId> {
        ObjectId::from_row_key(&self.address.row_key)
    }

    /// Reference to this row, for embedding in another row
    pub fn reference(&self) -> EntityReference {
        EntityReference::to(self.table.as_str(), &self.address)
    }

    /// External locator of this row: `urn:<nid>:<host>:<pk>:<rk>`
    ///
    /// # Errors
    ///
    /// Returns `InvalidLocator` if a part cannot appear in a URN.
    pub fn locator(&self, namespace_id: &str, host: &str) -> Result<Locator> {
        Locator::build(namespace_id, host, &self.address)
    }

    /// Cached copy of the row, without touching the backend
    pub fn cached(&self) -> Option<&Row> {
        self.cached.as_ref()
    }

    /// The row, loading it on first use
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the row does not exist.
    pub fn row(&mut self) -> Result<&Row> {
        if self.cached.is_none() {
            self.cached = Some(self.fetch()?);
        }
        self.cached
            .as_ref()
            .ok_or_else(|| Error::NotFound(self.location()))
    }

    /// Reload the row from the backend
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the row does not exist.
    pub fn refresh(&mut self) -> Result<&Row> {
        self.cached = None;
        self.row()
    }

    /// Time of the last write, as of the cached copy
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the row does not exist.
    pub fn last_modified(&mut self) -> Result<Timestamp> {
        Ok(self.row()?.timestamp())
    }

    /// Delete the row
    ///
    /// Returns false if there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn delete(&mut self) -> Result<bool> {
        self.cached = None;
        if self
            .store
            .get(&self.table, &self.address.partition_key, &self.address.row_key)?
            .is_none()
        {
            return Ok(false);
        }
        self.store
            .delete(&self.table, &self.address.partition_key, &self.address.row_key)
    }

    /// Atomically apply `mutate` if `condition` holds
    ///
    /// Returns false, without writing, when `condition` is false on the
    /// freshly read row. Both closures may run several times: once per
    /// optimistic cycle.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the row does not exist
    /// - `ContentionExhausted` if every cycle lost a race
    /// - `Cancelled` if the cancellation token fired
    /// - any other backend error, unchanged
    pub fn atomic_modify<C, M>(&mut self, mut condition: C, mut mutate: M) -> Result<bool>
    where
        C: FnMut(&Row) -> bool,
        M: FnMut(&mut Row),
    {
        let cycle = self.modify_cycle(|row| {
            if !condition(row) {
                return Ok(Step::Skip(()));
            }
            mutate(row);
            Ok(Step::Write(()))
        })?;
        self.cached = Some(cycle.row);
        Ok(cycle.written)
    }

    /// [`atomic_modify`](Self::atomic_modify), then run `on_success` on the
    /// written row if it applied
    ///
    /// # Errors
    ///
    /// Same as [`atomic_modify`](Self::atomic_modify).
    pub fn atomic_modify_then<C, M, F>(
        &mut self,
        condition: C,
        mutate: M,
        on_success: F,
    ) -> Result<bool>
    where
        C: FnMut(&Row) -> bool,
        M: FnMut(&mut Row),
        F: FnOnce(&Row),
    {
        let applied = self.atomic_modify(condition, mutate)?;
        if applied {
            if let Some(row) = &self.cached {
                on_success(row);
            }
        }
        Ok(applied)
    }

    /// Set the field selected by `lens` to `desired` if it equals `expected`
    ///
    /// # Errors
    ///
    /// Same as [`atomic_modify`](Self::atomic_modify), plus `PropertyType`
    /// if the lens cannot read the field.
    pub fn compare_and_swap<T, L>(
        &mut self,
        expected: &T,
        desired: T,
        lens: &L,
    ) -> Result<CasOutcome<T>>
    where
        T: PartialEq + Clone,
        L: FieldLens<T> + ?Sized,
    {
        let cycle = self.modify_cycle(|row| {
            let current = lens.get(row)?;
            if current != *expected {
                return Ok(Step::Skip(current));
            }
            lens.set(row, desired.clone());
            Ok(Step::Write(desired.clone()))
        })?;
        self.cached = Some(cycle.row);
        Ok(CasOutcome {
            swapped: cycle.written,
            current: cycle.value,
        })
    }

    fn modify_cycle<T, F>(&self, mut step: F) -> Result<Cycle<T>>
    where
        F: FnMut(&mut Row) -> Result<Step<T>>,
    {
        let location = self.location();
        retry::run(&self.policy, &self.cancel, &location, |_| {
            let mut row = self.fetch()?;
            let value = match step(&mut row)? {
                Step::Skip(value) => {
                    return Ok(Outcome::Done(Cycle {
                        written: false,
                        value,
                        row,
                    }))
                }
                Step::Write(value) => value,
            };

            match self.store.conditional_replace(&self.table, &row) {
                Ok(receipt) => {
                    trace!(row = %location, version = %receipt.version, "Atomic modification applied");
                    row.apply_receipt(&receipt);
                    Ok(Outcome::Done(Cycle {
                        written: true,
                        value,
                        row,
                    }))
                }
                Err(e) if e.is_precondition_failed() => Ok(Outcome::Conflict),
                Err(e) => Err(e),
            }
        })
    }

    fn fetch(&self) -> Result<Row> {
        self.store
            .get(&self.table, &self.address.partition_key, &self.address.row_key)?
            .ok_or_else(|| Error::NotFound(self.location()))
    }

    fn location(&self) -> RowLocation {
        RowLocation::new(
            self.table.as_str(),
            self.address.partition_key.as_str(),
            self.address.row_key.as_str(),
        )
    }
}

/// What one optimistic cycle decided to do with the fresh row
enum Step<T> {
    Skip(T),
    Write(T),
}

struct Cycle<T> {
    written: bool,
    value: T,
    row: Row,
}
