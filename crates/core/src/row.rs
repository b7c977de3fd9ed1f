//! Stored rows and version tokens
//!
//! A [`Row`] is the unit of storage: a two-part address, a bag of properties,
//! and the opaque [`VersionToken`] the backend assigned on its last write.
//!
//! ## Invariants
//!
//! - The address is fixed at construction. Mutation closures receive
//!   `&mut Row` but can only touch properties.
//! - A row read from the backend always carries a version token. A row built
//!   locally for insertion has none until the backend assigns one.
//! - Tokens are compared by equality only, never ordered.

use crate::error::{Error, Result, RowLocation};
use crate::keys::{PartitionKey, RowAddress, RowKey};
use crate::timestamp::Timestamp;
use crate::value::{Properties, PropertyValue, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque backend-assigned version of a row (ETag equivalent)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wrap a backend token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata the backend assigns on a successful write
///
/// Returned by `insert` and `conditional_replace` so callers can bring a
/// cached row in line with the stored one without a second read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// New version token of the row
    pub version: VersionToken,
    /// Backend time of the write
    pub timestamp: Timestamp,
}

/// One stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    address: RowAddress,
    properties: Properties,
    version: Option<VersionToken>,
    timestamp: Timestamp,
}

impl Row {
    /// Create an empty row at an address, not yet stored
    pub fn new(address: RowAddress) -> Self {
        Self {
            address,
            properties: Properties::new(),
            version: None,
            timestamp: Timestamp::EPOCH,
        }
    }

    /// Create a row with initial properties
    pub fn with_properties(address: RowAddress, properties: Properties) -> Self {
        Self {
            properties,
            ..Self::new(address)
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Address of this row
    pub fn address(&self) -> &RowAddress {
        &self.address
    }

    /// Partition key
    pub fn partition_key(&self) -> &PartitionKey {
        &self.address.partition_key
    }

    /// Row key
    pub fn row_key(&self) -> &RowKey {
        &self.address.row_key
    }

    /// Location of this row in a table, for error reporting
    pub fn location(&self, table: &str) -> RowLocation {
        RowLocation::new(
            table,
            self.address.partition_key.as_str(),
            self.address.row_key.as_str(),
        )
    }

    /// Version token from the last read, `None` if never stored
    pub fn version(&self) -> Option<&VersionToken> {
        self.version.as_ref()
    }

    /// Time of the last successful write
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Record backend-assigned metadata after a successful write
    ///
    /// Only backends should call this.
    pub fn stamp(&mut self, version: VersionToken, timestamp: Timestamp) {
        self.version = Some(version);
        self.timestamp = timestamp;
    }

    /// Adopt the metadata of a write this row was sent with
    pub fn apply_receipt(&mut self, receipt: &WriteReceipt) {
        self.stamp(receipt.version.clone(), receipt.timestamp);
    }

    /// All properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Mutable access to all properties
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    /// Get a property
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Get a property as a string slice
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Get a typed property
    ///
    /// # Errors
    ///
    /// Returns `PropertyType` if the property is missing (and `T` has no
    /// missing value) or holds another type.
    pub fn get_as<T: PropertyValue>(&self, name: &str) -> Result<T> {
        let found = match self.properties.get(name) {
            Some(value) => T::from_value(value),
            None => T::missing(),
        };
        found.ok_or_else(|| Error::PropertyType {
            name: name.to_string(),
            expected: T::TYPE_NAME,
        })
    }

    /// Set a property, returning the previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.into(), value.into())
    }

    /// Remove a property
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }
}
