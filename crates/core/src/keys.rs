//! Identity and key derivation
//!
//! Every stored object gets an [`ObjectId`] at creation time. Its row key is
//! the id rendered as 32 lowercase hex digits, and its partition key is a
//! bucket number derived from the row key by [`KeyScheme`].
//!
//! ## Wire contract
//!
//! The partition key is never stored independently of the row key: every
//! caller recomputes it. The hash is therefore part of the on-disk contract
//! and must produce identical output in every process and every
//! implementation. [`KeyScheme::V1`] uses XXH3-64 (seed 0) over the UTF-8
//! bytes of the row key, reduced modulo [`PARTITION_BUCKETS`]. Changing it
//! requires a new scheme variant and a migration of existing rows.
//!
//! ```
//! use tablekeep_core::keys::{ObjectId, RowAddress};
//!
//! let id = ObjectId::new();
//! let address = RowAddress::for_id(id);
//! assert_eq!(address.row_key.as_str().len(), 32);
//! assert_eq!(address, RowAddress::for_id(id));
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

/// Number of partition buckets used by [`KeyScheme::V1`]
pub const PARTITION_BUCKETS: u64 = 13;

/// Unique, immutable identifier of a stored object
///
/// A 128-bit UUID assigned when the object is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Create a new random ObjectId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create an ObjectId from raw bytes
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Recover the id a row key was derived from
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the row key is not a UUID.
    pub fn from_row_key(row_key: &RowKey) -> Result<Self> {
        Uuid::parse_str(row_key.as_str())
            .map(Self)
            .map_err(|e| Error::InvalidKey(format!("row key '{}' is not an object id: {}", row_key, e)))
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Row key: unique within a partition, never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RowKey(String);

impl RowKey {
    /// Create a row key from an arbitrary string
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the string is empty or whitespace.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("row key is empty".to_string()));
        }
        Ok(Self(key))
    }

    /// Derive the row key of an object: lowercase hex, no separators
    pub fn from_id(id: ObjectId) -> Self {
        Self(id.0.simple().to_string())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RowKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RowKey {
    type Error = Error;

    fn try_from(key: String) -> Result<Self> {
        Self::new(key)
    }
}

impl From<RowKey> for String {
    fn from(key: RowKey) -> Self {
        key.0
    }
}

/// Partition key: groups rows for locality and scans, never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Create a partition key from an arbitrary string
    ///
    /// Used by models that choose their own partitioning (e.g. a container
    /// name). Object rows should use [`PartitionKey::for_row_key`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the string is empty or whitespace.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("partition key is empty".to_string()));
        }
        Ok(Self(key))
    }

    /// Derive the partition key for a row key with the current scheme
    pub fn for_row_key(row_key: &RowKey) -> Self {
        KeyScheme::CURRENT.partition_key(row_key)
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = Error;

    fn try_from(key: String) -> Result<Self> {
        Self::new(key)
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.0
    }
}

/// Partition key derivation scheme
///
/// Versioned so that a future change of hash can coexist with rows written
/// under the old one during a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScheme {
    /// XXH3-64 (seed 0) of the row key's UTF-8 bytes, modulo 13, in decimal
    V1,
}

impl KeyScheme {
    /// Scheme used for all new rows
    pub const CURRENT: KeyScheme = KeyScheme::V1;

    /// Number of buckets this scheme reduces into
    pub const fn bucket_count(&self) -> u64 {
        match self {
            KeyScheme::V1 => PARTITION_BUCKETS,
        }
    }

    /// Bucket number for a row key
    pub fn bucket(&self, row_key: &RowKey) -> u64 {
        self.bucket_of(row_key.as_str().as_bytes())
    }

    /// Bucket number for raw key bytes
    pub fn bucket_of(&self, bytes: &[u8]) -> u64 {
        match self {
            KeyScheme::V1 => xxh3_64(bytes) % self.bucket_count(),
        }
    }

    /// Partition key for a row key
    pub fn partition_key(&self, row_key: &RowKey) -> PartitionKey {
        PartitionKey(self.bucket(row_key).to_string())
    }
}

/// Two-part address of a row within a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowAddress {
    /// Partition key
    pub partition_key: PartitionKey,
    /// Row key
    pub row_key: RowKey,
}

impl RowAddress {
    /// Create an address from explicit keys
    pub fn new(partition_key: PartitionKey, row_key: RowKey) -> Self {
        Self {
            partition_key,
            row_key,
        }
    }

    /// Address of the row for an object id
    pub fn for_id(id: ObjectId) -> Self {
        Self::for_row_key(RowKey::from_id(id))
    }

    /// Address of a row whose partition key is hashed from its row key
    pub fn for_row_key(row_key: RowKey) -> Self {
        let partition_key = PartitionKey::for_row_key(&row_key);
        Self {
            partition_key,
            row_key,
        }
    }

    /// Parse an address from raw strings
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either key is empty.
    pub fn parse(partition_key: &str, row_key: &str) -> Result<Self> {
        Ok(Self::new(PartitionKey::new(partition_key)?, RowKey::new(row_key)?))
    }
}

impl fmt::Display for RowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.row_key)
    }
}
