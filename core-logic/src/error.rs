//! # Core Error Types
//!
//! Centralized error definitions for the core-logic crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Unified error type for core-logic operations.
///
/// This enum wraps all specific error types and provides a unified
/// error interface for the application layer.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(ConfigError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error(transparent)]
    Wallet(WalletError),

    #[error(transparent)]
    Network(NetworkError),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        CoreError::Storage(e)
    }
}

impl From<WalletError> for CoreError {
    fn from(e: WalletError) -> Self {
        CoreError::Wallet(e)
    }
}

impl From<NetworkError> for CoreError {
    fn from(e: NetworkError) -> Self {
        CoreError::Network(e)
    }
}

/// Configuration-related errors. Only raised at startup.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid range for '{field}': min {min} > max {max}")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error("Unknown time zone: '{zone}'")]
    UnknownTimeZone { zone: String },

    #[error("No valid identities: {reason}")]
    NoIdentities { reason: String },
}

/// Identity (private key) errors
#[derive(Error, Debug, Clone)]
pub enum WalletError {
    #[error("Invalid private key format: expected 0x-prefixed hex string")]
    InvalidKeyFormat,

    #[error("Private key has wrong length: expected 64 hex chars, got {length}")]
    InvalidKeyLength { length: usize },

    #[error("I/O error reading {path}: {msg}")]
    IoError { path: String, msg: String },
}

/// Stats / snapshot file errors. Propagated to the caller, never retried.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt document {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Network and RPC-related errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("No receipt for {tx_hash} after {attempts} polls")]
    ReceiptTimeout { tx_hash: String, attempts: u32 },

    #[error("Transaction {tx_hash} execution reverted")]
    Reverted { tx_hash: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}
