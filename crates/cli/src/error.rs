use connectors::{ConnectorError, DbError};
use engine_core::error::{ConfigError, MigrationError, QueryError};
use planner::keyset::KeysetError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid settings: {0}")]
    Settings(#[from] ConfigError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Failed to connect: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Migration failed: {0}")]
    Migration(#[from] MigrationError),

    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    #[error("Invalid page request: {0}")]
    Keyset(#[from] KeysetError),

    #[error("Migrated schema differs from a fresh setup in {0} object(s)")]
    Inconsistent(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shutdown requested")]
    ShutdownRequested,
}

impl CliError {
    /// The command stopped because it was asked to, not because it failed.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            CliError::ShutdownRequested | CliError::Migration(MigrationError::Cancelled)
        )
    }
}
