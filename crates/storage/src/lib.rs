//! Storage layer for tablekeep
//!
//! This crate implements the backends behind the `ConditionalStore` contract:
//! - InMemoryTableStore: DashMap of tables, each a BTreeMap of partitions
//!   behind a RwLock
//! - Version tokens issued from an AtomicU64
//! - Lazy scans read in batches, one read lock per batch
//!
//! The `testing` module wraps any backend to inject interleavings and faults.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod testing;

pub use memory::{InMemoryTableStore, Table};
