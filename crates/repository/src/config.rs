//! Store configuration via `tablekeep.toml`
//!
//! Configuration is an explicit value handed to constructors at startup.
//! Nothing is looked up from process-global state. A default, commented
//! `tablekeep.toml` can be written next to the application; edit it and
//! restart to change settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tablekeep_concurrency::RetryPolicy;
use tablekeep_core::{Error, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tablekeep.toml";

const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEVELOPMENT_ACCOUNT: &str = "devstoreaccount1";
const DEVELOPMENT_TABLE_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

// ============================================================================
// StoreConfig
// ============================================================================

/// Store configuration loaded from `tablekeep.toml`.
///
/// # Example
///
/// ```toml
/// connection_string = "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=..."
/// table_prefix = "staging"
///
/// [retry]
/// max_attempts = 100
/// base_delay_ms = 1
/// max_delay_ms = 50
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage account connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    /// Prepended to every table name (ASCII alphanumeric, may be empty)
    #[serde(default)]
    pub table_prefix: String,
    /// Bound on optimistic retries
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# tablekeep configuration
#
# Storage account connection string (Key=Value pairs separated by ';').
# Leave unset to run against the in-memory store.
# connection_string = "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=..."
# connection_string = "UseDevelopmentStorage=true"

# Prefix prepended to every table name, e.g. "staging" turns "kvp" into
# "stagingkvp". ASCII letters and digits only.
table_prefix = ""

# Optimistic concurrency retry bound.
# A read-modify-write cycle that loses a race is retried from a fresh read,
# at most max_attempts times, sleeping base_delay_ms * 2^n (capped at
# max_delay_ms) in between.
[retry]
max_attempts = 100
base_delay_ms = 1
max_delay_ms = 50
"#
    }

    /// Parse and validate config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the text does not parse or a value is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every value eagerly
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !self.table_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!(
                "Invalid table_prefix '{}'. Expected ASCII letters and digits only.",
                self.table_prefix
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        self.connection()?;
        Ok(())
    }

    /// Full name of the table called `name` under this config
    pub fn table_name(&self, name: &str) -> String {
        format!("{}{}", self.table_prefix, name)
    }

    /// Parsed connection string, if one is configured
    ///
    /// # Errors
    ///
    /// Returns `Config` if the connection string is malformed.
    pub fn connection(&self) -> Result<Option<ConnectionString>> {
        self.connection_string
            .as_deref()
            .map(ConnectionString::parse)
            .transpose()
    }
}

// ============================================================================
// ConnectionString
// ============================================================================

/// Storage account connection string
///
/// Parsed from `Key=Value;Key=Value` form. Recognized keys:
/// `DefaultEndpointsProtocol`, `AccountName`, `AccountKey`, `TableEndpoint`,
/// `EndpointSuffix`, and `UseDevelopmentStorage=true`. Unknown keys are
/// ignored. The account key never appears in `Debug` output.
///
/// ```
/// use tablekeep_repository::ConnectionString;
///
/// let conn = ConnectionString::parse(
///     "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=c2VjcmV0==",
/// ).unwrap();
/// assert_eq!(conn.table_endpoint(), "https://acme.table.core.windows.net");
/// assert_eq!(conn.host(), "acme.table.core.windows.net");
/// assert!(!format!("{conn:?}").contains("c2VjcmV0"));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    protocol: String,
    account_name: String,
    account_key: Option<String>,
    table_endpoint: Option<String>,
    endpoint_suffix: String,
}

impl ConnectionString {
    /// Parse a connection string
    ///
    /// # Errors
    ///
    /// Returns `Config` if a pair has no `=`, or if neither `AccountName` nor
    /// `TableEndpoint` is given.
    pub fn parse(s: &str) -> Result<Self> {
        let mut protocol = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut table_endpoint = None;
        let mut endpoint_suffix = None;
        let mut development = false;

        for pair in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Account keys are base64 and may themselves contain '='.
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!("connection string segment '{}' has no '='", redact(pair)))
            })?;
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "defaultendpointsprotocol" => protocol = Some(value),
                "accountname" => account_name = Some(value),
                "accountkey" => account_key = Some(value),
                "tableendpoint" => table_endpoint = Some(value.trim_end_matches('/').to_string()),
                "endpointsuffix" => endpoint_suffix = Some(value),
                "usedevelopmentstorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            account_name.get_or_insert_with(|| DEVELOPMENT_ACCOUNT.to_string());
            table_endpoint.get_or_insert_with(|| DEVELOPMENT_TABLE_ENDPOINT.to_string());
            protocol.get_or_insert_with(|| "http".to_string());
        }

        let account_name = match (account_name, &table_endpoint) {
            (Some(name), _) if !name.is_empty() => name,
            (_, Some(endpoint)) => endpoint_host(endpoint)
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string(),
            _ => {
                return Err(Error::Config(
                    "connection string needs AccountName or TableEndpoint".to_string(),
                ))
            }
        };

        Ok(Self {
            protocol: protocol.unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            account_name,
            account_key,
            table_endpoint,
            endpoint_suffix: endpoint_suffix.unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
        })
    }

    /// Storage account name
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Account key, if present
    pub fn account_key(&self) -> Option<&str> {
        self.account_key.as_deref()
    }

    /// Table service endpoint, explicit or derived from the account name
    pub fn table_endpoint(&self) -> String {
        match &self.table_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "{}://{}.table.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            ),
        }
    }

    /// Host part of the table endpoint, used in locators
    pub fn host(&self) -> String {
        endpoint_host(&self.table_endpoint()).to_string()
    }
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ConnectionString::parse(s)
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("protocol", &self.protocol)
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("table_endpoint", &self.table_endpoint)
            .field("endpoint_suffix", &self.endpoint_suffix)
            .finish()
    }
}

fn endpoint_host(endpoint: &str) -> &str {
    let rest = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority.split(':').next().unwrap_or(authority)
}

fn redact(segment: &str) -> &str {
    if segment.to_ascii_lowercase().starts_with("accountkey") {
        "AccountKey"
    } else {
        segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_no_connection() {
        let config = StoreConfig::default();
        assert!(config.connection().unwrap().is_none());
        assert_eq!(config.table_name("kvp"), "kvp");
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn default_toml_parses_correctly() {
        let config = StoreConfig::from_toml_str(StoreConfig::default_toml()).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn parse_prefix_and_retry() {
        let config = StoreConfig::from_toml_str(
            "table_prefix = \"staging\"\n[retry]\nmax_attempts = 5\n",
        )
        .unwrap();
        assert_eq!(config.table_name("kvp"), "stagingkvp");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_delay_ms, RetryPolicy::default().max_delay_ms);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for bad in [
            "table_prefix = \"has-dash\"",
            "[retry]\nmax_attempts = 0",
            "[retry]\nbase_delay_ms = 100\nmax_delay_ms = 10",
            "connection_string = \"AccountKey=abc\"",
            "table_prefix = 7",
        ] {
            assert!(
                matches!(StoreConfig::from_toml_str(bad), Err(Error::Config(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        StoreConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.table_prefix, "");
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "table_prefix = \"custom\"\n").unwrap();
        StoreConfig::write_default_if_missing(&path).unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.table_prefix, "custom");
    }

    #[test]
    fn config_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = StoreConfig {
            connection_string: Some("UseDevelopmentStorage=true".to_string()),
            table_prefix: "test".to_string(),
            retry: RetryPolicy::new().with_max_attempts(9),
        };

        config.write_to_file(&path).unwrap();
        assert_eq!(StoreConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = StoreConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn connection_string_derives_endpoint() {
        let conn = ConnectionString::parse(
            "DefaultEndpointsProtocol=http;AccountName=acme;AccountKey=a2V5==;EndpointSuffix=example.net",
        )
        .unwrap();
        assert_eq!(conn.account_name(), "acme");
        assert_eq!(conn.account_key(), Some("a2V5=="));
        assert_eq!(conn.table_endpoint(), "http://acme.table.example.net");
        assert_eq!(conn.host(), "acme.table.example.net");
    }

    #[test]
    fn connection_string_explicit_endpoint() {
        let conn: ConnectionString =
            "TableEndpoint=https://acme.table.example.net:8443/;".parse().unwrap();
        assert_eq!(conn.account_name(), "acme");
        assert_eq!(conn.table_endpoint(), "https://acme.table.example.net:8443");
        assert_eq!(conn.host(), "acme.table.example.net");
    }

    #[test]
    fn connection_string_development_storage() {
        let conn = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(conn.account_name(), DEVELOPMENT_ACCOUNT);
        assert_eq!(conn.host(), "127.0.0.1");
    }

    #[test]
    fn connection_string_errors_never_leak_key() {
        let err = ConnectionString::parse("AccountName=acme;AccountKeyc2VjcmV0").unwrap_err();
        assert!(!err.to_string().contains("c2VjcmV0"));
        assert!(ConnectionString::parse("AccountKey=abc").is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let conn = ConnectionString::parse("AccountName=acme;AccountKey=c2VjcmV0").unwrap();
        let debug = format!("{conn:?}");
        assert!(debug.contains("acme"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("c2VjcmV0"));
    }
}
