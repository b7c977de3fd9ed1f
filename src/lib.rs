//! Tablekeep - optimistic-concurrency persistence over partitioned tables
//!
//! Tablekeep stores application objects as rows in a partitioned key-value
//! table store and keeps concurrent writers honest with version tokens:
//! every read-modify-write is a conditional replace, retried from a fresh
//! read when another writer got there first.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tablekeep::{AutoIncrement, InMemoryTableStore, KvpStore, PartitionKey, RowKey};
//!
//! let store = Arc::new(InMemoryTableStore::new());
//!
//! // Key-value pairs with lost-update-free modification
//! let kvps = KvpStore::new(Arc::clone(&store));
//! let mut pair = kvps.create("container-A", "key-1", "v1")?;
//! pair.set_value(|_| "v2".to_string())?;
//! assert_eq!(kvps.get("container-A", "key-1")?.as_deref(), Some("v2"));
//!
//! // Unique integers from a counter row
//! let ids = AutoIncrement::new(store);
//! let counter = (PartitionKey::new("ids")?, RowKey::new("orders")?);
//! assert_eq!(ids.allocate("counters", &counter.0, &counter.1)?, 1);
//! assert_eq!(ids.allocate("counters", &counter.0, &counter.1)?, 2);
//! # Ok::<(), tablekeep::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `tablekeep-core`: keys, rows, values, references, locators, errors and
//!   the [`ConditionalStore`] trait
//! - `tablekeep-storage`: the in-memory [`InMemoryTableStore`] backend and
//!   test doubles
//! - `tablekeep-concurrency`: [`OptimisticEntity`], [`AutoIncrement`] and
//!   retry policy
//! - `tablekeep-repository`: [`EntityRepository`], [`KvpStore`],
//!   [`UniquenessRegistry`] and [`StoreConfig`]

pub use tablekeep_concurrency::{
    lens, AutoIncrement, CancellationToken, CasOutcome, FieldLens, OptimisticEntity, Property,
    RetryPolicy,
};
pub use tablekeep_core::{
    reference, ConditionalStore, EntityReference, Error, KeyScheme, Locator, ObjectId,
    PartitionKey, PropertyValue, Result, Row, RowAddress, RowKey, RowLocation, Timestamp, Value,
    VersionToken, WriteReceipt,
};
pub use tablekeep_repository::{
    ConnectionString, EntityFactory, EntityRepository, Kvp, KvpStore, StoreConfig,
    UniquenessRegistry,
};
pub use tablekeep_storage::InMemoryTableStore;
