//! Core types and traits for tablekeep
//!
//! This crate defines the foundational types used throughout the system:
//! - ObjectId, RowKey, PartitionKey, RowAddress: identity and key derivation
//! - KeyScheme: the versioned partition hash (part of the wire contract)
//! - Value / Properties: property values carried by rows
//! - Row / VersionToken: the stored unit and its opaque version
//! - WriteReceipt: version and time a backend assigns on a write
//! - EntityReference: encodable pointer from one row to another
//! - Locator: URN addressing of rows from outside
//! - Error: error type hierarchy
//! - ConditionalStore: the backend contract

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keys;
pub mod locator;
pub mod reference;
pub mod row;
pub mod timestamp;
pub mod traits;
pub mod value;

pub use error::{Error, Result, RowLocation};
pub use keys::{KeyScheme, ObjectId, PartitionKey, RowAddress, RowKey, PARTITION_BUCKETS};
pub use locator::Locator;
pub use reference::EntityReference;
pub use row::{Row, VersionToken, WriteReceipt};
pub use timestamp::Timestamp;
pub use traits::{ConditionalStore, RowIter, RowPredicate};
pub use value::{Properties, PropertyValue, Value};
