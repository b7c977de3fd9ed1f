//! Testing utilities for optimistic concurrency
//!
//! This module provides tools for exercising code that sits on top of a
//! [`ConditionalStore`](tablekeep_core::ConditionalStore):
//!
//! - **Interleaving**: inject another writer's work between a read and the
//!   conditional write that follows it
//! - **Fault injection**: fail the next call of a chosen operation
//! - **Counters**: observe how many reads, writes and conflicts a caller caused
//!
//! # Example
//!
//! ```ignore
//! use tablekeep_storage::testing::{InterleavingStore, Operation};
//!
//! let store = InterleavingStore::new(InMemoryTableStore::new());
//! store.after_next_get(|inner| { /* concurrent writer */ });
//! store.fail_next(Operation::Replace, Error::Backend { status: Some(503), message: "busy".into() });
//! ```

mod interleave;

pub use interleave::{InterleavingStore, Operation};
