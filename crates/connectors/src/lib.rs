pub mod error;
pub mod sql;

pub use error::{ConnectorError, DbError};
pub use sql::postgres::{database::PgDatabase, listener::PgListener};
