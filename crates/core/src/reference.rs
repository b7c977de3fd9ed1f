//! Cross-entity references
//!
//! An [`EntityReference`] addresses a row in (possibly) another table. It is
//! never stored on its own: it exists only to be encoded into a string
//! property of the referencing row and decoded again on read.
//!
//! ## Wire format
//!
//! A compact JSON object with one-letter field names:
//!
//! ```text
//! {"k":"<row key>","p":"<partition key>","t":"<table name>"}
//! ```
//!
//! The zero-value reference (every field empty) encodes to the empty string,
//! which is the "no reference" sentinel. Decoding an empty or whitespace-only
//! string yields the zero value.
//!
//! ```
//! use tablekeep_core::reference::{decode, encode, EntityReference};
//!
//! let r = EntityReference::new("0a1b", "7", "users");
//! assert_eq!(decode(&encode(&r)).unwrap(), r);
//! assert_eq!(encode(&EntityReference::default()), "");
//! assert!(decode("  ").unwrap().is_empty());
//! ```

use crate::error::{Error, Result};
use crate::keys::RowAddress;
use serde::{Deserialize, Serialize};

/// Address of a row in a named table
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityReference {
    /// Row key of the referenced row
    #[serde(rename = "k")]
    pub row_key: String,
    /// Partition key of the referenced row
    #[serde(rename = "p")]
    pub partition_key: String,
    /// Table holding the referenced row
    #[serde(rename = "t")]
    pub table_name: String,
}

impl EntityReference {
    /// Create a reference from raw parts
    pub fn new(
        row_key: impl Into<String>,
        partition_key: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            row_key: row_key.into(),
            partition_key: partition_key.into(),
            table_name: table_name.into(),
        }
    }

    /// Reference to the row at `address` in `table`
    pub fn to(table: impl Into<String>, address: &RowAddress) -> Self {
        Self::new(
            address.row_key.as_str(),
            address.partition_key.as_str(),
            table,
        )
    }

    /// True for the zero-value ("no reference") sentinel
    pub fn is_empty(&self) -> bool {
        self.row_key.is_empty() && self.partition_key.is_empty() && self.table_name.is_empty()
    }

    /// Address of the referenced row
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if either key is empty.
    pub fn address(&self) -> Result<RowAddress> {
        RowAddress::parse(&self.partition_key, &self.row_key)
    }

    /// Encode to the wire format
    pub fn encode(&self) -> String {
        encode(self)
    }
}

/// Encode a reference into its opaque string form
pub fn encode(reference: &EntityReference) -> String {
    if reference.is_empty() {
        return String::new();
    }
    // Three string fields cannot fail to serialize.
    serde_json::to_string(reference).unwrap_or_default()
}

/// Decode a reference from its opaque string form
///
/// # Errors
///
/// Returns `Decode` if a non-blank string is not a valid encoded reference.
pub fn decode(encoded: &str) -> Result<EntityReference> {
    if encoded.trim().is_empty() {
        return Ok(EntityReference::default());
    }
    serde_json::from_str(encoded)
        .map_err(|e| Error::Decode(format!("malformed entity reference '{}': {}", encoded, e)))
}
