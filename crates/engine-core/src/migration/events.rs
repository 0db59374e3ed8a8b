use model::migration::version::SchemaVersion;

/// Lifecycle notifications published by the coordinator of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationEvent {
    /// This process claimed `to` and is about to apply scripts.
    Started {
        from: Option<SchemaVersion>,
        to: SchemaVersion,
    },
    /// All scripts of one version step were applied.
    StepApplied { version: SchemaVersion },
    Finished { to: SchemaVersion, success: bool },
}
