//! External locators (URNs) for stored objects
//!
//! Objects can be addressed from outside by a URN whose namespace-specific
//! part ends with `<ignored>:<partition key>:<row key>`:
//!
//! ```text
//! urn:<nid>:<host>:<partition key>:<row key>
//! ```
//!
//! Only the last three segments matter when parsing, so locators with longer
//! prefixes resolve the same way.
//!
//! ```
//! use tablekeep_core::locator::Locator;
//!
//! let locator: Locator = "urn:kvp:account.example:container-A:key-1".parse().unwrap();
//! assert_eq!(locator.address().partition_key.as_str(), "container-A");
//! assert_eq!(locator.address().row_key.as_str(), "key-1");
//! ```

use crate::error::{Error, Result};
use crate::keys::RowAddress;
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "urn";
const SEPARATOR: char = ':';

/// Parsed URN locator of a row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    namespace_id: String,
    prefix: Vec<String>,
    address: RowAddress,
}

impl Locator {
    /// Build the locator for a row: `urn:<nid>:<host>:<pk>:<rk>`
    ///
    /// # Errors
    ///
    /// Returns `InvalidLocator` if any part is empty or contains `:`.
    pub fn build(namespace_id: &str, host: &str, address: &RowAddress) -> Result<Self> {
        for part in [
            namespace_id,
            host,
            address.partition_key.as_str(),
            address.row_key.as_str(),
        ] {
            if part.is_empty() || part.contains(SEPARATOR) {
                return Err(Error::InvalidLocator(format!(
                    "segment '{}' cannot appear in a locator",
                    part
                )));
            }
        }
        Ok(Self {
            namespace_id: namespace_id.to_string(),
            prefix: vec![host.to_string()],
            address: address.clone(),
        })
    }

    /// Parse a locator string
    ///
    /// # Errors
    ///
    /// Returns `InvalidLocator` if the string is not a URN or has fewer than
    /// three namespace segments, or `InvalidKey` if a key segment is empty.
    pub fn parse(locator: &str) -> Result<Self> {
        let mut parts = locator.trim().split(SEPARATOR);

        match parts.next() {
            Some(scheme) if scheme.eq_ignore_ascii_case(SCHEME) => {}
            _ => {
                return Err(Error::InvalidLocator(format!(
                    "'{}' is not a urn",
                    locator
                )))
            }
        }

        let namespace_id = match parts.next() {
            Some(nid) if !nid.is_empty() => nid.to_string(),
            _ => {
                return Err(Error::InvalidLocator(format!(
                    "'{}' has no namespace identifier",
                    locator
                )))
            }
        };

        let mut segments: Vec<String> = parts.map(str::to_string).collect();
        if segments.len() < 3 {
            return Err(Error::InvalidLocator(format!(
                "'{}' needs at least three namespace segments, found {}",
                locator,
                segments.len()
            )));
        }

        let row_key = segments.pop().unwrap_or_default();
        let partition_key = segments.pop().unwrap_or_default();
        let address = RowAddress::parse(&partition_key, &row_key)?;

        Ok(Self {
            namespace_id,
            prefix: segments,
            address,
        })
    }

    /// URN namespace identifier
    pub fn namespace_id(&self) -> &str {
        &self.namespace_id
    }

    /// Segments before the partition key (the host, when built here)
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Address of the located row
    pub fn address(&self) -> &RowAddress {
        &self.address
    }

    /// Consume into the address
    pub fn into_address(self) -> RowAddress {
        self.address
    }
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Locator::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", SCHEME, self.namespace_id)?;
        for segment in &self.prefix {
            write!(f, ":{}", segment)?;
        }
        write!(
            f,
            ":{}:{}",
            self.address.partition_key, self.address.row_key
        )
    }
}
