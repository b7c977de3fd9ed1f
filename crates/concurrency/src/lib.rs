//! Concurrency layer for tablekeep
//!
//! This crate implements optimistic concurrency control (OCC) over a
//! `ConditionalStore` with:
//! - OptimisticEntity: read-modify-write cycles retried on version conflict
//! - Compare-and-swap over a typed field lens
//! - AutoIncrement: unique integer allocation from a counter row
//! - RetryPolicy / CancellationToken: bounded, cancellable retry
//!
//! No lock is ever taken. Concurrent writers to one row linearize at the
//! backend's conditional replace; losers re-read and try again.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counter;
pub mod entity;
pub mod lens;
pub mod retry;

pub use counter::{AutoIncrement, COUNTER_PROPERTY};
pub use entity::{CasOutcome, OptimisticEntity};
pub use lens::{lens, FieldLens, FnLens, Property};
pub use retry::{CancellationToken, RetryPolicy};
