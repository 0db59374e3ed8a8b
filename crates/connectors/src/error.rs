use thiserror::Error;
use tokio_postgres::error::{ErrorPosition, SqlState};

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any SQL driver error.
    #[error("SQL error: {0}")]
    Sql(#[from] tokio_postgres::Error),

    /// A query that must return rows returned none.
    #[error("No rows found\nSQL: {query}")]
    NoRowsFound { query: String },

    /// A column value could not be converted into a `Value`.
    #[error("Failed to decode column `{column}` of type {type_name}: {reason}")]
    Decode {
        column: String,
        type_name: String,
        reason: String,
    },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DbError {
    /// SQLSTATE reported by the server, if this is a server error.
    pub fn code(&self) -> Option<&SqlState> {
        match self {
            DbError::Sql(err) => err.code(),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(&SqlState::UNIQUE_VIOLATION)
    }

    /// The object a DDL statement tried to create is already there.
    pub fn is_already_exists(&self) -> bool {
        let duplicate = self.code().is_some_and(|code| {
            [
                SqlState::DUPLICATE_TABLE,
                SqlState::DUPLICATE_SCHEMA,
                SqlState::DUPLICATE_OBJECT,
                SqlState::DUPLICATE_FUNCTION,
                SqlState::DUPLICATE_COLUMN,
                SqlState::DUPLICATE_ALIAS,
            ]
            .contains(code)
        });
        duplicate || self.message().contains("already exists")
    }

    /// 1-based character offset of the error inside the submitted SQL.
    pub fn position(&self) -> Option<usize> {
        let DbError::Sql(err) = self else {
            return None;
        };
        match err.as_db_error()?.position()? {
            ErrorPosition::Original(position) => Some(*position as usize),
            ErrorPosition::Internal { .. } => None,
        }
    }

    /// Server message without the driver's prefix.
    pub fn message(&self) -> String {
        match self {
            DbError::Sql(err) => err
                .as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| err.to_string()),
            other => other.to_string(),
        }
    }
}

/// Errors happening during connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("Postgres connection failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Database bootstrap failed: {0}")]
    Bootstrap(#[from] DbError),
}
