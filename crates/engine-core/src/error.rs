use connectors::{ConnectorError, DbError};
use model::migration::version::SchemaVersion;
use planner::{keyset::KeysetError, migration::CatalogError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting `{0}`")]
    Missing(&'static str),

    #[error("Invalid value `{value}` for `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Keyset(#[from] KeysetError),

    #[error("Keyset query failed: {0}")]
    Database(#[from] DbError),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    /// Another process kept the version lock for the whole wait budget.
    #[error("Timed out waiting for a concurrent migration after {attempts} attempts")]
    Timeout { attempts: usize },

    /// The process holding the version lock reported a failed migration.
    #[error("A concurrent migration failed")]
    PeerFailed,

    #[error("App db version {local} too low for installed db version {remote}")]
    SchemaAhead {
        local: SchemaVersion,
        remote: SchemaVersion,
    },

    #[error("Migration script {file} failed at version {version}: {source}\nStatement: {statement}")]
    Script {
        file: String,
        version: SchemaVersion,
        statement: String,
        #[source]
        source: DbError,
    },

    #[error("Migration catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Version store error: {0}")]
    Database(#[from] DbError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrationError {
    /// A script failed only because what it creates is already there.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, MigrationError::Script { source, .. } if source.is_already_exists())
    }
}

impl From<tokio_postgres::Error> for MigrationError {
    fn from(err: tokio_postgres::Error) -> Self {
        MigrationError::Database(DbError::from(err))
    }
}
