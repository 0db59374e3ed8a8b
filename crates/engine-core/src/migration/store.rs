use crate::{error::MigrationError, migration::signal::SignalSubscription};
use async_trait::async_trait;
use model::migration::version::{SchemaVersion, VersionRecord};

/// The persisted version ledger plus the channel migrating processes use to
/// announce their outcome.
///
/// A row without a deploy timestamp is an in-flight migration and acts as the
/// lock. Claiming relies on the ledger rejecting a second row for the same
/// version.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Creates the ledger if missing. Returns whether it was created.
    async fn ensure_table(&self) -> Result<bool, MigrationError>;

    /// Most recently deployed version, `None` for a fresh schema.
    async fn current_version(&self) -> Result<Option<SchemaVersion>, MigrationError>;

    async fn in_progress(&self) -> Result<Vec<VersionRecord>, MigrationError>;

    /// Inserts the lock row for `version`. `false` when another process
    /// already holds it.
    async fn claim(&self, version: SchemaVersion) -> Result<bool, MigrationError>;

    /// Marks `version` deployed and announces success.
    async fn complete(
        &self,
        version: SchemaVersion,
        payload: serde_json::Value,
    ) -> Result<(), MigrationError>;

    /// Removes the lock row for `version` and announces failure.
    async fn release(&self, version: SchemaVersion) -> Result<(), MigrationError>;

    async fn subscribe(&self) -> Result<SignalSubscription, MigrationError>;
}
