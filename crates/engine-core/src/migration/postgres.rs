use crate::{
    error::MigrationError,
    migration::{
        runner::{ScriptRunner, script_error},
        signal::{MigrationSignal, SignalSubscription},
        store::VersionStore,
    },
};
use async_trait::async_trait;
use connectors::{DbError, PgDatabase, sql::postgres::params::PgParamStore};
use model::{
    core::value::Value,
    migration::{
        script::AnnotatedSqlFile,
        version::{SchemaVersion, VersionRecord},
    },
    records::row::RowData,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CREATE_VERSION_TABLE: &str = "CREATE TABLE version (
    version numeric(10,5) UNIQUE,
    deploy_start timestamptz DEFAULT current_timestamp,
    deployed_ts timestamptz,
    payload jsonb
)";

const CURRENT_VERSION: &str = "SELECT version FROM version \
    WHERE deployed_ts IS NOT NULL ORDER BY deployed_ts DESC LIMIT 1";

const IN_PROGRESS: &str = "SELECT version, deploy_start, deployed_ts, payload FROM version \
    WHERE deployed_ts IS NULL";

const CLAIM: &str = "INSERT INTO version (version) VALUES ($1)";
const COMPLETE: &str =
    "UPDATE version SET deployed_ts = current_timestamp, payload = $2 WHERE version = $1";
const RELEASE: &str = "DELETE FROM version WHERE version = $1";
const NOTIFY: &str = "SELECT pg_notify($1, $2)";

const SIGNAL_BUFFER: usize = 8;

/// Version ledger kept in the `version` table of the connected schema.
#[derive(Clone)]
pub struct PgVersionStore {
    db: PgDatabase,
    channel: String,
}

impl PgVersionStore {
    pub fn new(db: PgDatabase, channel: impl Into<String>) -> Self {
        Self {
            db,
            channel: channel.into(),
        }
    }

    /// Runs the ledger change and the announcement in one transaction, so
    /// waiters never see the signal before the row changed.
    async fn finish(
        &self,
        statement: &str,
        params: Vec<Value>,
        signal: MigrationSignal,
    ) -> Result<(), MigrationError> {
        let mut client = self.db.lock_client().await;
        let tx = client.transaction().await?;

        let bindings = PgParamStore::from_values(params);
        tx.execute(statement, &bindings.as_refs()).await?;

        let notify = PgParamStore::from_values(vec![
            Value::String(self.channel.clone()),
            Value::String(signal.payload().to_string()),
        ]);
        tx.execute(NOTIFY, &notify.as_refs()).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn ensure_table(&self) -> Result<bool, MigrationError> {
        match self.db.batch_execute(CREATE_VERSION_TABLE).await {
            Ok(()) => {
                info!(schema = self.db.schema(), "Created version table");
                Ok(true)
            }
            // Concurrent creators may also trip the catalog's unique index.
            Err(err) if err.is_already_exists() || err.is_unique_violation() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn current_version(&self) -> Result<Option<SchemaVersion>, MigrationError> {
        let rows = self.db.query(CURRENT_VERSION, Vec::new()).await?;
        rows.first().map(version_of).transpose()
    }

    async fn in_progress(&self) -> Result<Vec<VersionRecord>, MigrationError> {
        let rows = self.db.query(IN_PROGRESS, Vec::new()).await?;
        rows.iter().map(record_of).collect()
    }

    async fn claim(&self, version: SchemaVersion) -> Result<bool, MigrationError> {
        match self
            .db
            .execute(CLAIM, vec![Value::Decimal(version.to_decimal())])
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_unique_violation() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn complete(
        &self,
        version: SchemaVersion,
        payload: serde_json::Value,
    ) -> Result<(), MigrationError> {
        self.finish(
            COMPLETE,
            vec![Value::Decimal(version.to_decimal()), Value::Json(payload)],
            MigrationSignal::Success,
        )
        .await
    }

    async fn release(&self, version: SchemaVersion) -> Result<(), MigrationError> {
        self.finish(
            RELEASE,
            vec![Value::Decimal(version.to_decimal())],
            MigrationSignal::Failure,
        )
        .await
    }

    async fn subscribe(&self) -> Result<SignalSubscription, MigrationError> {
        let mut listener = self.db.listen(&self.channel).await?;
        let (sender, receiver) = broadcast::channel(SIGNAL_BUFFER);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    notification = listener.recv() => {
                        let Some(notification) = notification else {
                            break;
                        };
                        match MigrationSignal::from_payload(notification.payload()) {
                            Some(signal) => {
                                let _ = sender.send(signal);
                            }
                            None => debug!(
                                payload = notification.payload(),
                                "Ignoring unknown migration notification"
                            ),
                        }
                    }
                }
            }
        });

        Ok(SignalSubscription::new(receiver, token))
    }
}

fn version_of(row: &RowData) -> Result<SchemaVersion, MigrationError> {
    let invalid = |reason: String| {
        MigrationError::Database(DbError::Decode {
            column: "version".to_string(),
            type_name: "numeric".to_string(),
            reason,
        })
    };
    let decimal = row
        .value_of("version")
        .and_then(Value::as_decimal)
        .ok_or_else(|| invalid("missing version".to_string()))?;
    SchemaVersion::from_decimal(decimal).map_err(|e| invalid(e.to_string()))
}

fn record_of(row: &RowData) -> Result<VersionRecord, MigrationError> {
    let deploy_start = row
        .value_of("deploy_start")
        .and_then(Value::as_timestamp)
        .ok_or_else(|| {
            MigrationError::Database(DbError::Decode {
                column: "deploy_start".to_string(),
                type_name: "timestamptz".to_string(),
                reason: "missing deploy start".to_string(),
            })
        })?;
    Ok(VersionRecord {
        version: version_of(row)?,
        deploy_start,
        deployed_at: row.value_of("deployed_ts").and_then(Value::as_timestamp),
        payload: match row.value_of("payload") {
            Some(Value::Json(payload)) => Some(payload.clone()),
            _ => None,
        },
    })
}

/// Applies scripts on the schema's own session.
#[derive(Clone)]
pub struct PgScriptRunner {
    db: PgDatabase,
}

impl PgScriptRunner {
    pub fn new(db: PgDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScriptRunner for PgScriptRunner {
    async fn apply(
        &self,
        version: SchemaVersion,
        file: &AnnotatedSqlFile,
    ) -> Result<(), MigrationError> {
        debug!(file = %file.filename, %version, "Applying script");
        self.db
            .batch_execute(&file.contents)
            .await
            .map_err(|err| script_error(version, file, err))
    }

    async fn apply_all(
        &self,
        version: SchemaVersion,
        files: &[&AnnotatedSqlFile],
    ) -> Result<(), MigrationError> {
        if files.is_empty() {
            return Ok(());
        }

        let mut client = self.db.lock_client().await;
        let tx = client.transaction().await?;

        for file in files {
            debug!(file = %file.filename, %version, "Applying script in transaction");
            if let Err(err) = tx.batch_execute(&file.contents).await {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Failed to roll back migration transaction");
                }
                return Err(script_error(version, file, DbError::from(err)));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
