//! Error types for intelsync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Firewall error: {0}")]
    Firewall(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl SyncError {
    /// Errors the scheduler retries after the normal interval.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Http { .. } | SyncError::Parse(_)
        )
    }

    /// Build a storage error that keeps the full anyhow context chain.
    pub fn storage(what: impl std::fmt::Display, err: anyhow::Error) -> Self {
        SyncError::Storage(format!("{}: {:#}", what, err))
    }
}
