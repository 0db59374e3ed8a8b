use crate::{
    config::Environment,
    error::MigrationError,
    migration::{
        events::MigrationEvent,
        runner::ScriptRunner,
        signal::MigrationSignal,
        store::VersionStore,
    },
    retry::RetryPolicy,
};
use model::migration::{script::MigrationsInfo, version::SchemaVersion};
use planner::migration::{catalog::MigrationCatalog, plan::MigrationPlan};
use std::sync::Arc;
use tokio::{sync::broadcast, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 32;

/// What a coordinator run did to the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A fresh schema was set up directly at the target.
    Created,
    /// The schema was stepped forward from `from`.
    Migrated { from: SchemaVersion },
    UpToDate,
    /// Another process claimed the same version and finished it.
    Deferred,
}

/// Where the deployed schema stands relative to the version this process
/// runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaState {
    Unknown,
    Behind(SchemaVersion),
    AtTarget,
    Ahead(SchemaVersion),
}

impl SchemaState {
    fn of(current: Option<SchemaVersion>, target: SchemaVersion) -> Self {
        match current {
            None => SchemaState::Unknown,
            Some(current) if current < target => SchemaState::Behind(current),
            Some(current) if current > target => SchemaState::Ahead(current),
            Some(_) => SchemaState::AtTarget,
        }
    }
}

/// Brings one schema to a target version exactly once across every process
/// sharing it.
pub struct MigrationCoordinator {
    store: Arc<dyn VersionStore>,
    runner: Arc<dyn ScriptRunner>,
    catalog: MigrationCatalog,
    environment: Environment,
    lock_wait: RetryPolicy,
    events: broadcast::Sender<MigrationEvent>,
    cancel: CancellationToken,
}

impl MigrationCoordinator {
    pub fn new(
        store: Arc<dyn VersionStore>,
        runner: Arc<dyn ScriptRunner>,
        catalog: MigrationCatalog,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store,
            runner,
            catalog,
            environment: Environment::default(),
            lock_wait: RetryPolicy::for_migration_lock(),
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_lock_wait(mut self, lock_wait: RetryPolicy) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.events.subscribe()
    }

    pub fn catalog(&self) -> &MigrationCatalog {
        &self.catalog
    }

    pub async fn current_version(&self) -> Result<Option<SchemaVersion>, MigrationError> {
        self.store.current_version().await
    }

    /// What reaching `target` from the deployed version would apply.
    pub async fn plan(&self, target: SchemaVersion) -> Result<MigrationPlan, MigrationError> {
        self.store.ensure_table().await?;
        let current = self.store.current_version().await?;
        Ok(self.catalog.plan(current, target)?)
    }

    /// Brings the schema to `target`.
    pub async fn migrate_to(&self, target: SchemaVersion) -> Result<SyncOutcome, MigrationError> {
        if self.store.ensure_table().await? {
            debug!("Version table was missing");
        }
        self.await_lock_free().await?;

        let current = self.store.current_version().await?;
        match SchemaState::of(current, target) {
            SchemaState::AtTarget => {
                info!(version = %target, "Schema is up to date");
                Ok(SyncOutcome::UpToDate)
            }
            SchemaState::Ahead(remote) => Err(MigrationError::SchemaAhead {
                local: target,
                remote,
            }),
            SchemaState::Unknown | SchemaState::Behind(_) => {
                let plan = self.catalog.plan(current, target)?;
                self.run_claimed(plan).await
            }
        }
    }

    async fn run_claimed(&self, plan: MigrationPlan) -> Result<SyncOutcome, MigrationError> {
        let target = plan.to;
        if !self.store.claim(target).await? {
            info!(version = %target, "Migration already in progress elsewhere, deferring");
            self.await_lock_free().await?;
            return Ok(SyncOutcome::Deferred);
        }

        match plan.from {
            Some(from) => info!(%from, to = %target, "Migrating schema"),
            None => info!(version = %target, "Setting up new schema"),
        }
        let _ = self.events.send(MigrationEvent::Started {
            from: plan.from,
            to: target,
        });

        let result = match self.apply(&plan).await {
            Ok(()) => self.store.complete(target, plan.summary()).await,
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            error!(version = %target, error = %err, "Migration failed, releasing version lock");
            if let Err(release) = self.store.release(target).await {
                error!(error = %release, "Failed to release version lock");
            }
            let _ = self.events.send(MigrationEvent::Finished {
                to: target,
                success: false,
            });
            return Err(err);
        }

        info!(version = %target, "Schema migrated");
        let _ = self.events.send(MigrationEvent::Finished {
            to: target,
            success: true,
        });
        Ok(match plan.from {
            Some(from) => SyncOutcome::Migrated { from },
            None => SyncOutcome::Created,
        })
    }

    async fn apply(&self, plan: &MigrationPlan) -> Result<(), MigrationError> {
        for step in &plan.steps {
            self.apply_step(step).await?;
            let _ = self.events.send(MigrationEvent::StepApplied {
                version: step.version,
            });
        }
        Ok(())
    }

    /// Pre migrations and post migrations each run in one transaction.
    /// Idempotents and snapshots in between run one by one.
    async fn apply_step(&self, step: &MigrationsInfo) -> Result<(), MigrationError> {
        let version = step.version;

        self.check_cancelled()?;
        let pre: Vec<_> = step.pre_migrations.iter().collect();
        if !pre.is_empty() {
            info!(%version, count = pre.len(), "Running pre migrations");
            self.runner.apply_all(version, &pre).await?;
        }

        for file in step.reapplied() {
            self.check_cancelled()?;
            match self.runner.apply(version, file).await {
                Ok(()) => debug!(file = %file.filename, %version, "Applied script"),
                Err(err) if err.is_already_exists() => self.warn_already_applied(&file.filename, &err),
                Err(err) => return Err(err),
            }
        }

        self.check_cancelled()?;
        let post: Vec<_> = step.post_migrations.iter().collect();
        if !post.is_empty() {
            info!(%version, count = post.len(), "Running post migrations");
            self.runner.apply_all(version, &post).await?;
        }
        Ok(())
    }

    fn warn_already_applied(&self, file: &str, err: &MigrationError) {
        if self.environment == Environment::Production {
            warn!(file, "Script failed with an already-exists error, assumed already applied");
        } else {
            let message = match err {
                MigrationError::Script { source, .. } => source.message(),
                other => other.to_string(),
            };
            warn!(file, "{message}");
        }
    }

    /// Waits until no version row is in flight. Each attempt waits up to
    /// one lock-wait window for the holder's signal.
    async fn await_lock_free(&self) -> Result<(), MigrationError> {
        if self.store.in_progress().await?.is_empty() {
            return Ok(());
        }
        let mut signals = self.store.subscribe().await?;

        for attempt in 0..self.lock_wait.max_attempts {
            self.check_cancelled()?;

            // Re-checked after subscribing, the holder may already be done.
            let pending = self.store.in_progress().await?;
            if pending.is_empty() {
                return Ok(());
            }
            let versions: Vec<_> = pending.iter().map(|r| r.version.to_string()).collect();
            info!(attempt = attempt + 1, versions = ?versions, "Waiting for concurrent migration");

            let window = self.lock_wait.backoff_delay(attempt);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(MigrationError::Cancelled),
                signal = timeout(window, signals.next()) => match signal {
                    Ok(Some(MigrationSignal::Success)) => debug!("Concurrent migration finished"),
                    Ok(Some(MigrationSignal::Failure)) => return Err(MigrationError::PeerFailed),
                    Ok(None) => signals = self.store.subscribe().await?,
                    Err(_) => debug!("No migration signal within the wait window"),
                },
            }
        }

        if self.store.in_progress().await?.is_empty() {
            return Ok(());
        }
        warn!(
            attempts = self.lock_wait.max_attempts,
            "Gave up waiting for concurrent migration"
        );
        Err(MigrationError::Timeout {
            attempts: self.lock_wait.max_attempts,
        })
    }

    fn check_cancelled(&self) -> Result<(), MigrationError> {
        if self.cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        Ok(())
    }
}
