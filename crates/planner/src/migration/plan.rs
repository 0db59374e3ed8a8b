use model::migration::{script::MigrationsInfo, version::SchemaVersion};
use serde::{Deserialize, Serialize};

/// The ordered steps a migration from `from` to `to` runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// `None` when the schema does not exist yet.
    pub from: Option<SchemaVersion>,
    pub to: SchemaVersion,
    pub steps: Vec<MigrationsInfo>,
}

impl MigrationPlan {
    pub fn is_noop(&self) -> bool {
        self.steps.iter().all(MigrationsInfo::is_empty)
    }

    /// Digest of every file name and body the plan applies, in order. Two
    /// processes with the same digest run exactly the same SQL.
    pub fn hash(&self) -> String {
        let mut buf = Vec::new();
        for step in &self.steps {
            buf.extend_from_slice(step.version.to_string().as_bytes());
            for file in step.files() {
                buf.push(0);
                buf.extend_from_slice(file.filename.as_bytes());
                buf.push(0);
                buf.extend_from_slice(file.contents.as_bytes());
            }
        }
        format!("{:x}", md5::compute(buf))
    }

    /// Compact summary stored alongside the version row.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "from": self.from.map(|v| v.to_string()),
            "to": self.to.to_string(),
            "hash": self.hash(),
            "files": self
                .steps
                .iter()
                .flat_map(|s| s.files())
                .map(|f| f.filename.clone())
                .collect::<Vec<_>>(),
        })
    }
}
