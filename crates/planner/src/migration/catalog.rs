use crate::migration::{CatalogError, filename, plan::MigrationPlan};
use model::migration::{
    script::{AnnotatedSqlFile, MigrationsInfo, ScriptKind},
    version::SchemaVersion,
};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

/// Every SQL script found under a directory, annotated from its file name.
#[derive(Debug, Clone, Default)]
pub struct MigrationCatalog {
    files: Vec<AnnotatedSqlFile>,
}

impl MigrationCatalog {
    /// Recursively reads every `*.sql` file under `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        collect_sql_files(dir, Path::new(""), &mut paths).map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        paths.sort();

        let mut sources = Vec::with_capacity(paths.len());
        for relative in paths {
            let path = dir.join(&relative);
            let contents = fs::read_to_string(&path)
                .map_err(|source| CatalogError::Io { path, source })?;
            sources.push((relative.to_string_lossy().replace('\\', "/"), contents));
        }
        Self::from_sources(sources)
    }

    /// Builds a catalog from `(relative file name, contents)` pairs.
    pub fn from_sources<I, N, C>(sources: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        let files = sources
            .into_iter()
            .map(|(name, contents)| {
                let filename = name.into();
                let parsed = filename::parse(&filename)?;
                Ok(AnnotatedSqlFile {
                    filename,
                    base_name: parsed.base_name,
                    contents: contents.into(),
                    version: parsed.version,
                    kind: parsed.kind,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;
        Ok(MigrationCatalog { files })
    }

    pub fn files(&self) -> &[AnnotatedSqlFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every version the catalog knows about, plus `target`, ascending.
    /// Idempotent scripts count as belonging to `target`.
    pub fn versions(&self, target: SchemaVersion) -> Vec<SchemaVersion> {
        let mut versions: BTreeSet<_> = self.files.iter().filter_map(|f| f.version).collect();
        versions.insert(target);
        versions.into_iter().collect()
    }

    /// What has to be applied at each known version when `target` is the
    /// version this process runs against.
    pub fn migrations_info(&self, target: SchemaVersion) -> Vec<MigrationsInfo> {
        self.versions(target)
            .into_iter()
            .map(|version| self.info_at(version, target))
            .collect()
    }

    /// Scripts that set up a fresh schema directly at `target`. Only
    /// idempotents and snapshots take part; there is nothing to migrate.
    pub fn setup(&self, target: SchemaVersion) -> Result<MigrationsInfo, CatalogError> {
        if self.files.is_empty() {
            return Err(CatalogError::NoScripts);
        }
        let mut info = self.info_at(target, target);
        info.pre_migrations.clear();
        info.post_migrations.clear();
        Ok(info)
    }

    /// Versions strictly above `current` and up to `target`, each narrowed to
    /// what the previous step has not applied yet.
    pub fn steps(&self, current: SchemaVersion, target: SchemaVersion) -> Vec<MigrationsInfo> {
        let mut from = current;
        let mut steps = Vec::new();
        for version in self.versions(target) {
            if version <= current || version > target {
                continue;
            }
            steps.push(self.info_at(version, target).for_step(from));
            from = version;
        }
        steps
    }

    /// Describes what moving from `current` (`None` for a fresh schema) to
    /// `target` would run, without touching any database.
    pub fn plan(
        &self,
        current: Option<SchemaVersion>,
        target: SchemaVersion,
    ) -> Result<MigrationPlan, CatalogError> {
        let steps = match current {
            None => vec![self.setup(target)?],
            Some(current) if current < target => self.steps(current, target),
            Some(_) => Vec::new(),
        };
        Ok(MigrationPlan {
            from: current,
            to: target,
            steps,
        })
    }

    fn info_at(&self, version: SchemaVersion, target: SchemaVersion) -> MigrationsInfo {
        let mut info = MigrationsInfo::new(version);
        for file in &self.files {
            if !self.applies_at(file, version, target) {
                continue;
            }
            let bucket = match file.kind {
                ScriptKind::Idempotent => &mut info.idempotents,
                ScriptKind::Pre => &mut info.pre_migrations,
                ScriptKind::Post => &mut info.post_migrations,
                ScriptKind::Snap => &mut info.snapshots,
            };
            bucket.push(file.clone());
        }
        for bucket in [
            &mut info.idempotents,
            &mut info.pre_migrations,
            &mut info.post_migrations,
            &mut info.snapshots,
        ] {
            bucket.sort_by(|a, b| a.base_name.cmp(&b.base_name));
        }
        info
    }

    fn applies_at(&self, file: &AnnotatedSqlFile, version: SchemaVersion, target: SchemaVersion) -> bool {
        match (file.kind, file.version) {
            // At the target only a snapshot taken exactly there replaces the
            // idempotent definition; below it any earlier snapshot does.
            (ScriptKind::Idempotent, _) if version == target => {
                !self.has_snapshot(&file.base_name, |v| v == version)
            }
            (ScriptKind::Idempotent, _) => {
                !self.has_snapshot(&file.base_name, |v| v <= version)
                    && self.is_most_recent(&file.base_name, version, version)
            }
            (ScriptKind::Snap, Some(file_version)) => {
                self.is_most_recent(&file.base_name, file_version, version)
            }
            (_, file_version) => file_version == Some(version),
        }
    }

    fn has_snapshot(&self, base_name: &str, at: impl Fn(SchemaVersion) -> bool) -> bool {
        self.files.iter().any(|f| {
            f.kind == ScriptKind::Snap
                && f.base_name == base_name
                && f.version.is_some_and(&at)
        })
    }

    /// False when another snapshot or idempotent of the same base lies
    /// strictly after `file_version` and at or before `version`. Idempotents
    /// count as belonging to `version`.
    fn is_most_recent(&self, base_name: &str, file_version: SchemaVersion, version: SchemaVersion) -> bool {
        if file_version > version {
            return false;
        }
        !self.files.iter().any(|f| {
            matches!(f.kind, ScriptKind::Snap | ScriptKind::Idempotent)
                && f.base_name == base_name
                && {
                    let effective = f.version.unwrap_or(version);
                    effective <= version && effective > file_version
                }
        })
    }
}

/// Collects `*.sql` paths under `dir`, relative to the catalog root.
fn collect_sql_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(root.join(dir))? {
        let relative = dir.join(entry?.file_name());
        if root.join(&relative).is_dir() {
            collect_sql_files(root, &relative, out)?;
        } else if relative.extension().is_some_and(|ext| ext == "sql") {
            out.push(relative);
        }
    }
    Ok(())
}
