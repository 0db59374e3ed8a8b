use crate::{
    config::DbSettings,
    error::MigrationError,
    keyset::engine::KeysetQueryEngine,
    migration::{
        coordinator::{MigrationCoordinator, SyncOutcome},
        postgres::{PgScriptRunner, PgVersionStore},
    },
    retry::{RetryDisposition, RetryError, RetryPolicy},
};
use connectors::{ConnectorError, PgDatabase};
use planner::migration::catalog::MigrationCatalog;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Connects to the configured schema, retrying transient failures.
pub async fn connect(settings: &DbSettings) -> Result<PgDatabase, ConnectorError> {
    RetryPolicy::for_database()
        .run(
            || PgDatabase::connect(&settings.database_url, &settings.schema),
            |err| match err {
                ConnectorError::Postgres(err) if err.as_db_error().is_none() => {
                    warn!(error = %err, "Database unreachable, retrying");
                    RetryDisposition::Retry
                }
                _ => RetryDisposition::Stop,
            },
        )
        .await
        .map_err(RetryError::into_inner)
}

/// One schema opened for an application: its connection, version ledger
/// and migration coordinator.
pub struct SchemaSession {
    settings: DbSettings,
    db: PgDatabase,
    store: Arc<PgVersionStore>,
    coordinator: MigrationCoordinator,
}

impl SchemaSession {
    pub async fn open(settings: DbSettings, cancel: CancellationToken) -> Result<Self, MigrationError> {
        let catalog = MigrationCatalog::load(&settings.sql_dir)?;
        let db = connect(&settings).await?;
        info!(schema = db.schema(), files = catalog.files().len(), "Opened schema");

        let store = Arc::new(PgVersionStore::new(db.clone(), settings.channel()));
        let runner = Arc::new(PgScriptRunner::new(db.clone()));
        let coordinator = MigrationCoordinator::new(store.clone(), runner, catalog)
            .with_environment(settings.environment)
            .with_lock_wait(settings.lock_wait.clone())
            .with_cancel_token(cancel);

        Ok(Self {
            settings,
            db,
            store,
            coordinator,
        })
    }

    /// Brings the schema to the configured target version.
    pub async fn migrate(&self) -> Result<SyncOutcome, MigrationError> {
        self.coordinator
            .migrate_to(self.settings.target_version)
            .await
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    pub fn database(&self) -> &PgDatabase {
        &self.db
    }

    pub fn store(&self) -> &PgVersionStore {
        &self.store
    }

    pub fn coordinator(&self) -> &MigrationCoordinator {
        &self.coordinator
    }

    pub fn keyset(&self) -> KeysetQueryEngine {
        KeysetQueryEngine::new(self.db.clone())
    }

    /// Development and test schemas are dropped, production ones are kept.
    pub async fn close(self) -> Result<(), MigrationError> {
        if self.settings.drops_schema_on_close() {
            self.db.drop_schema().await?;
        }
        info!(schema = self.db.schema(), "Closed schema");
        Ok(())
    }
}
