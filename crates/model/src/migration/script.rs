use crate::migration::version::SchemaVersion;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// Safe to re-run; applied at the target version unless a snapshot supersedes it.
    Idempotent,
    Pre,
    Post,
    Snap,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptKind::Idempotent => "idempotent",
            ScriptKind::Pre => "pre",
            ScriptKind::Post => "post",
            ScriptKind::Snap => "snap",
        };
        f.write_str(s)
    }
}

/// A SQL file from the migration tree, annotated from its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedSqlFile {
    /// Path relative to the scanned root.
    pub filename: String,
    /// Object the script defines, e.g. `test_table` for `test_table.v0.2.snap.sql`.
    pub base_name: String,
    pub contents: String,
    /// `None` for idempotent scripts.
    pub version: Option<SchemaVersion>,
    pub kind: ScriptKind,
}

/// Scripts that matter when moving the schema to `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationsInfo {
    pub version: SchemaVersion,
    pub idempotents: Vec<AnnotatedSqlFile>,
    pub pre_migrations: Vec<AnnotatedSqlFile>,
    pub post_migrations: Vec<AnnotatedSqlFile>,
    pub snapshots: Vec<AnnotatedSqlFile>,
}

impl MigrationsInfo {
    pub fn new(version: SchemaVersion) -> Self {
        MigrationsInfo {
            version,
            idempotents: Vec::new(),
            pre_migrations: Vec::new(),
            post_migrations: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.idempotents.is_empty()
            && self.pre_migrations.is_empty()
            && self.post_migrations.is_empty()
            && self.snapshots.is_empty()
    }

    /// Narrows the set for a step that starts at `from`: snapshots at or
    /// below `from` were already applied and are dropped.
    pub fn for_step(mut self, from: SchemaVersion) -> Self {
        self.snapshots
            .retain(|file| file.version.is_some_and(|v| v > from));
        self
    }

    /// Idempotents and snapshots together, ordered by base name. These are
    /// applied one by one, outside any transaction.
    pub fn reapplied(&self) -> Vec<&AnnotatedSqlFile> {
        let mut files: Vec<_> = self.idempotents.iter().chain(self.snapshots.iter()).collect();
        files.sort_by(|a, b| a.base_name.cmp(&b.base_name));
        files
    }

    /// Files in application order: pre, idempotents and snapshots, post.
    pub fn files(&self) -> Vec<&AnnotatedSqlFile> {
        let mut files: Vec<_> = self.pre_migrations.iter().collect();
        files.extend(self.reapplied());
        files.extend(self.post_migrations.iter());
        files
    }
}
