use crate::{
    config::{DbSettings, Environment},
    error::MigrationError,
    session::SchemaSession,
};
use connectors::PgDatabase;
use model::{core::value::Value, migration::version::SchemaVersion, records::row::RowData};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const COLUMNS: &str = "SELECT table_name::text AS table_name, column_name::text AS column_name, \
    data_type::text AS data_type, udt_name::text AS udt_name, is_nullable::text AS is_nullable, \
    column_default::text AS column_default \
    FROM information_schema.columns WHERE table_schema::text = $1";

const INDEXES: &str = "SELECT tablename::text AS table_name, indexname::text AS index_name, indexdef \
    FROM pg_indexes WHERE schemaname::text = $1";

const USER_TYPES: &str = "SELECT t.typname::text AS type_name, t.typtype::text AS kind, \
    coalesce(string_agg(e.enumlabel::text, ',' ORDER BY e.enumsortorder), '') AS labels \
    FROM pg_type t \
    JOIN pg_namespace n ON n.oid = t.typnamespace \
    LEFT JOIN pg_enum e ON e.enumtypid = t.oid \
    WHERE n.nspname::text = $1 AND t.typtype IN ('e', 'd') \
    GROUP BY t.typname, t.typtype";

/// Tables, columns, indexes and user types of one schema, as sorted
/// description lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaShape {
    pub tables: BTreeMap<String, Vec<String>>,
    pub user_types: Vec<String>,
}

/// One table (or the user type list) that differs between the two schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub object: String,
    /// Lines only the stepped-up schema has.
    pub migrated_only: Vec<String>,
    /// Lines only the freshly created schema has.
    pub created_only: Vec<String>,
}

pub const USER_TYPES_OBJECT: &str = "user types";

impl SchemaShape {
    /// Reads the shape of the schema `db` is connected to.
    pub async fn describe(db: &PgDatabase) -> Result<Self, MigrationError> {
        let schema = db.schema().to_string();
        let params = || vec![Value::String(schema.clone())];
        let (columns, indexes, types) = futures::try_join!(
            db.query(COLUMNS, params()),
            db.query(INDEXES, params()),
            db.query(USER_TYPES, params()),
        )?;

        let mut shape = SchemaShape::default();
        for row in &columns {
            shape.add_line(
                text(row, "table_name"),
                format!(
                    "column {} {} ({}) nullable={} default={}",
                    text(row, "column_name"),
                    text(row, "data_type"),
                    text(row, "udt_name"),
                    text(row, "is_nullable"),
                    text(row, "column_default"),
                ),
            );
        }
        // Index definitions name their table with the schema, which differs
        // between otherwise identical schemas.
        let qualifier = format!("{schema}.");
        for row in &indexes {
            shape.add_line(
                text(row, "table_name"),
                format!(
                    "index {} {}",
                    text(row, "index_name"),
                    text(row, "indexdef").replace(&qualifier, "")
                ),
            );
        }
        shape.user_types = types
            .iter()
            .map(|row| {
                format!(
                    "{} {} {}",
                    text(row, "type_name"),
                    text(row, "kind"),
                    text(row, "labels")
                )
            })
            .collect();
        shape.user_types.sort();
        for lines in shape.tables.values_mut() {
            lines.sort();
        }
        Ok(shape)
    }

    pub fn add_line(&mut self, table: String, line: String) {
        self.tables.entry(table).or_default().push(line);
    }

    /// Every table or type list whose lines differ. A table missing on one
    /// side shows all of its lines on the other.
    pub fn compare(&self, created: &SchemaShape) -> Vec<ShapeMismatch> {
        let names: BTreeSet<&String> = self.tables.keys().chain(created.tables.keys()).collect();
        let empty = Vec::new();

        let mut mismatches: Vec<_> = names
            .into_iter()
            .filter_map(|name| {
                mismatch(
                    name,
                    self.tables.get(name).unwrap_or(&empty),
                    created.tables.get(name).unwrap_or(&empty),
                )
            })
            .collect();
        mismatches.extend(mismatch(
            USER_TYPES_OBJECT,
            &self.user_types,
            &created.user_types,
        ));
        mismatches
    }
}

fn mismatch(object: &str, migrated: &[String], created: &[String]) -> Option<ShapeMismatch> {
    let migrated_set: BTreeSet<_> = migrated.iter().collect();
    let created_set: BTreeSet<_> = created.iter().collect();
    let migrated_only: Vec<String> = migrated_set
        .difference(&created_set)
        .map(|s| s.to_string())
        .collect();
    let created_only: Vec<String> = created_set
        .difference(&migrated_set)
        .map(|s| s.to_string())
        .collect();
    if migrated_only.is_empty() && created_only.is_empty() {
        return None;
    }
    Some(ShapeMismatch {
        object: object.to_string(),
        migrated_only,
        created_only,
    })
}

fn text(row: &RowData, column: &str) -> String {
    row.value_of(column)
        .and_then(Value::as_text)
        .unwrap_or_default()
}

/// Outcome of [`MigrationTester::run`].
#[derive(Debug, Clone)]
pub struct MigrationTestReport {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub migrated: SchemaShape,
    pub created: SchemaShape,
    pub mismatches: Vec<ShapeMismatch>,
}

impl MigrationTestReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Checks that stepping a schema from one version to another ends in the
/// same shape as setting a schema up directly at the later version, i.e.
/// that snapshots agree with their pre and post migrations.
///
/// Both scratch schemas are dropped afterwards.
pub struct MigrationTester {
    settings: DbSettings,
    from: SchemaVersion,
    to: SchemaVersion,
    migrated_base: String,
    created_base: String,
}

impl MigrationTester {
    /// Connection, sql directory and lock wait are taken from `settings`.
    pub fn new(settings: &DbSettings, from: SchemaVersion, to: SchemaVersion) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..8];
        Self {
            settings: settings.clone(),
            from,
            to,
            migrated_base: format!("{}_migrated_{suffix}", settings.schema_base),
            created_base: format!("{}_created_{suffix}", settings.schema_base),
        }
    }

    pub fn with_schema_bases(
        mut self,
        migrated: impl Into<String>,
        created: impl Into<String>,
    ) -> Self {
        self.migrated_base = migrated.into();
        self.created_base = created.into();
        self
    }

    fn scratch_settings(&self, base: &str, version: SchemaVersion) -> DbSettings {
        let mut settings = DbSettings::new(
            self.settings.database_url.clone(),
            base,
            version,
            Environment::Test,
            true,
        );
        settings.sql_dir = self.settings.sql_dir.clone();
        settings.lock_wait = self.settings.lock_wait.clone();
        settings
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationTestReport, MigrationError> {
        info!(from = %self.from, to = %self.to, "Testing migration against a fresh setup");
        let migrated = SchemaSession::open(
            self.scratch_settings(&self.migrated_base, self.from),
            cancel.clone(),
        )
        .await?;
        let created = match SchemaSession::open(
            self.scratch_settings(&self.created_base, self.to),
            cancel,
        )
        .await
        {
            Ok(created) => created,
            Err(err) => {
                drop_scratch(&migrated).await;
                return Err(err);
            }
        };

        let report = self.compare(&migrated, &created).await;
        drop_scratch(&migrated).await;
        drop_scratch(&created).await;

        let report = report?;
        if report.is_consistent() {
            info!(from = %self.from, to = %self.to, "Migrated schema matches fresh setup");
        } else {
            warn!(
                mismatches = report.mismatches.len(),
                "Migrated schema differs from fresh setup"
            );
        }
        Ok(report)
    }

    async fn compare(
        &self,
        migrated: &SchemaSession,
        created: &SchemaSession,
    ) -> Result<MigrationTestReport, MigrationError> {
        futures::try_join!(migrated.migrate(), created.migrate())?;
        migrated.coordinator().migrate_to(self.to).await?;

        let (migrated_shape, created_shape) = futures::try_join!(
            SchemaShape::describe(migrated.database()),
            SchemaShape::describe(created.database()),
        )?;
        let mismatches = migrated_shape.compare(&created_shape);
        Ok(MigrationTestReport {
            from: self.from,
            to: self.to,
            migrated: migrated_shape,
            created: created_shape,
            mismatches,
        })
    }
}

async fn drop_scratch(session: &SchemaSession) {
    if let Err(err) = session.database().drop_schema().await {
        warn!(schema = session.database().schema(), error = %err, "Failed to drop scratch schema");
    }
}
