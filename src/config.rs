//! Engine configuration, built from environment variables.

use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Dispatch engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the libSQL database file.
    pub db_path: String,
    /// Public base URL tracking links point at (no trailing slash).
    pub base_url: String,
    /// Bind address for the tracking/redirect HTTP server.
    pub bind_addr: String,
    /// Maximum queue items fetched per dispatch pass.
    pub batch_size: usize,
    /// Cron expression controlling dispatch pass cadence.
    pub dispatch_cron: String,
    /// Base64-encoded 32-byte AES key for the credential vault.
    pub vault_key: SecretString,
}

impl EngineConfig {
    /// Build config from environment variables.
    ///
    /// `DRIPMAIL_VAULT_KEY` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vault_key = std::env::var("DRIPMAIL_VAULT_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("DRIPMAIL_VAULT_KEY".into()))?;

        let db_path =
            std::env::var("DRIPMAIL_DB_PATH").unwrap_or_else(|_| "./data/dripmail.db".to_string());

        let base_url = std::env::var("DRIPMAIL_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let bind_addr =
            std::env::var("DRIPMAIL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let batch_size: usize = match std::env::var("DRIPMAIL_BATCH_SIZE") {
            Ok(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DRIPMAIL_BATCH_SIZE".into(),
                message: format!("not a positive integer: {s}"),
            })?,
            Err(_) => 200,
        };

        let dispatch_cron = std::env::var("DRIPMAIL_DISPATCH_CRON")
            .unwrap_or_else(|_| "0 * * * * *".to_string());
        cron::Schedule::from_str(&dispatch_cron).map_err(|e| ConfigError::InvalidValue {
            key: "DRIPMAIL_DISPATCH_CRON".into(),
            message: format!("invalid cron expression: {e}"),
        })?;

        Ok(Self {
            db_path,
            base_url,
            bind_addr,
            batch_size,
            dispatch_cron,
            vault_key: SecretString::from(vault_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cron_is_valid() {
        assert!(cron::Schedule::from_str("0 * * * * *").is_ok());
    }

    #[test]
    fn from_env_requires_vault_key() {
        // SAFETY: tests in this module are the only readers of this variable.
        unsafe { std::env::remove_var("DRIPMAIL_VAULT_KEY") };
        assert!(matches!(
            EngineConfig::from_env(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }
}
