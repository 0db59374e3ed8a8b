use crate::{
    error::{ConnectorError, DbError},
    sql::postgres::{
        listener::PgListener,
        params::PgParamStore,
        row::DbRow,
        utils::{connect_client, parse_config},
    },
};
use model::{core::value::Value, records::row::RowData};
use planner::query::dialect::{Dialect, Postgres};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard, broadcast};
use tokio_postgres::{Client, Config};
use tracing::{debug, info, warn};

const NOTIFICATION_BUFFER: usize = 64;

/// A PostgreSQL session bound to one schema.
///
/// On connect the schema is created if needed and becomes the head of the
/// session's `search_path`, followed by `public`.
#[derive(Clone)]
pub struct PgDatabase {
    client: Arc<RwLock<Client>>,
    config: Config,
    schema: String,
}

impl PgDatabase {
    pub async fn connect(url: &str, schema: &str) -> Result<Self, ConnectorError> {
        let config = parse_config(url)?;
        let client = connect_client(&config, None).await?;
        let db = PgDatabase {
            client: Arc::new(RwLock::new(client)),
            config,
            schema: schema.to_string(),
        };
        db.bootstrap().await?;
        Ok(db)
    }

    async fn bootstrap(&self) -> Result<(), DbError> {
        let schema = Postgres.quote_identifier(&self.schema);

        // Similarity search needs pg_trgm; lacking it only breaks search.
        if let Err(err) = self
            .batch_execute("CREATE EXTENSION IF NOT EXISTS pg_trgm SCHEMA public")
            .await
        {
            warn!(error = %err.message(), "Could not enable pg_trgm");
        }

        match self.batch_execute(&format!("CREATE SCHEMA {schema}")).await {
            Ok(()) => info!(schema = %self.schema, "Created schema"),
            Err(err) if err.is_already_exists() => {
                info!(schema = %self.schema, "Schema already exists")
            }
            Err(err) => return Err(err),
        }

        self.batch_execute(&format!(
            "SET search_path TO {schema}, public; SET TIME ZONE 'UTC'"
        ))
        .await
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Exclusive access to the session, e.g. to run a transaction.
    pub async fn lock_client(&self) -> RwLockWriteGuard<'_, Client> {
        self.client.write().await
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), DbError> {
        let client = self.client.read().await;
        client.batch_execute(sql).await?;
        Ok(())
    }

    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, DbError> {
        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        Ok(client.execute(sql, &bindings.as_refs()).await?)
    }

    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        let rows = client.query(sql, &bindings.as_refs()).await?;
        rows.iter()
            .map(|row| DbRow(row).to_row_data(""))
            .collect()
    }

    /// Like [`query`](Self::query), but an empty result is an error.
    pub async fn find(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        let rows = self.query(sql, params).await?;
        if rows.is_empty() {
            return Err(DbError::NoRowsFound {
                query: sql.to_string(),
            });
        }
        Ok(rows)
    }

    /// First row of [`find`](Self::find).
    pub async fn one(&self, sql: &str, params: Vec<Value>) -> Result<RowData, DbError> {
        let mut rows = self.find(sql, params).await?;
        Ok(rows.swap_remove(0))
    }

    /// Opens a dedicated session that receives `NOTIFY` messages sent on
    /// `channel`.
    pub async fn listen(&self, channel: &str) -> Result<PgListener, ConnectorError> {
        let (sender, receiver) = broadcast::channel(NOTIFICATION_BUFFER);
        let client = connect_client(&self.config, Some(sender)).await?;
        client
            .batch_execute(&format!("LISTEN {}", Postgres.quote_identifier(channel)))
            .await?;
        debug!(channel, "Listening for notifications");
        Ok(PgListener::new(client, receiver, channel))
    }

    pub async fn drop_schema(&self) -> Result<(), DbError> {
        info!(schema = %self.schema, "Dropping schema");
        self.batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE",
            Postgres.quote_identifier(&self.schema)
        ))
        .await
    }
}
