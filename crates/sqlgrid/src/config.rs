//! Service settings.
//!
//! Settings come from an optional JSON file; command-line flags override
//! individual values.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Key that carries the provider name inside a repository connection string.
pub const PROVIDER_NAME_KEY: &str = "ProviderName";

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Settings repository, as `ProviderName=<name>;<connection string>`.
    pub repository: String,
    /// Timeout for a single statement, in seconds.
    pub command_timeout_secs: u64,
    /// Age after which a kept transaction is rolled back, in seconds.
    pub transaction_ttl_secs: u64,
    /// Interval of the idle-transaction sweep, in seconds.
    pub sweep_interval_secs: u64,
    /// Rows returned by a query when the request does not say.
    pub default_rows: usize,
    /// User recorded as creator/modifier of repository items.
    pub user: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repository: String::from("ProviderName=sqlite;Data Source=sqlgrid.db"),
            command_timeout_secs: 600,
            transaction_ttl_secs: 30,
            sweep_interval_secs: 1,
            default_rows: 100,
            user: String::from("sqlgrid"),
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub const fn transaction_ttl(&self) -> Duration {
        Duration::from_secs(self.transaction_ttl_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Splits `ProviderName=<name>;<rest>` into the provider name and the
/// provider's own connection string. The key may appear anywhere.
///
/// # Errors
///
/// Returns [`ServiceError::Config`] when the key is missing or empty.
pub fn split_provider(connection_string: &str) -> Result<(String, String)> {
    let mut provider = None;
    let mut rest = Vec::new();
    for token in connection_string.split(';') {
        match token.split_once('=') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case(PROVIDER_NAME_KEY) => {
                provider = Some(value.trim().to_string());
            }
            _ => rest.push(token),
        }
    }
    match provider {
        Some(name) if !name.is_empty() => Ok((name, rest.join(";"))),
        _ => Err(ServiceError::Config(format!(
            "connection string has no {PROVIDER_NAME_KEY}: {connection_string}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_provider() {
        let (name, rest) = split_provider("ProviderName=sqlite;Data Source=:memory:").unwrap();
        assert_eq!(name, "sqlite");
        assert_eq!(rest, "Data Source=:memory:");

        let (name, rest) = split_provider("Host=db;providername=postgres;Database=app").unwrap();
        assert_eq!(name, "postgres");
        assert_eq!(rest, "Host=db;Database=app");

        assert!(split_provider("Data Source=x.db").is_err());
        assert!(split_provider("ProviderName=;Data Source=x.db").is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlgrid.json");
        std::fs::write(&path, r#"{"transactionTtlSecs": 5, "defaultRows": 10}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.transaction_ttl(), Duration::from_secs(5));
        assert_eq!(settings.default_rows, 10);
        assert_eq!(settings.command_timeout_secs, 600);
    }
}
