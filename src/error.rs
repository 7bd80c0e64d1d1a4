//! Error types for the dispatch engine.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Credential vault errors.
///
/// Decryption fails closed: any malformed or tampered input maps to
/// `Crypto` without detail, so callers cannot distinguish a bad tag
/// from a truncated blob.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Vault key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid base64 in vault data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Vault cryptographic operation failed")]
    Crypto,
}

/// SMTP relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid mailbox address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error for {host}: {reason}")]
    Transport { host: String, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
