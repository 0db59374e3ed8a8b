use crate::error::MigrationError;
use async_trait::async_trait;
use connectors::DbError;
use model::migration::{script::AnnotatedSqlFile, version::SchemaVersion};

/// Executes migration scripts.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs one script on its own.
    async fn apply(
        &self,
        version: SchemaVersion,
        file: &AnnotatedSqlFile,
    ) -> Result<(), MigrationError>;

    /// Runs `files` in order inside one transaction, rolled back on failure.
    async fn apply_all(
        &self,
        version: SchemaVersion,
        files: &[&AnnotatedSqlFile],
    ) -> Result<(), MigrationError>;
}

pub(crate) fn script_error(
    version: SchemaVersion,
    file: &AnnotatedSqlFile,
    source: DbError,
) -> MigrationError {
    MigrationError::Script {
        file: file.filename.clone(),
        version,
        statement: failing_statement(&file.contents, source.position()),
        source,
    }
}

/// The `;`-delimited statement containing the 1-based character `position`,
/// or the whole script when the position is unknown or out of range.
pub fn failing_statement(sql: &str, position: Option<usize>) -> String {
    let Some(position) = position else {
        return sql.trim().to_string();
    };
    let Some((offset, _)) = sql.char_indices().nth(position.saturating_sub(1)) else {
        return sql.trim().to_string();
    };

    let start = sql[..offset].rfind(';').map_or(0, |i| i + 1);
    let end = sql[offset..].find(';').map_or(sql.len(), |i| offset + i);
    sql[start..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQL: &str = "create table a (id int);\ninsert into b values (1);\nselect 1;";

    #[test]
    fn picks_the_statement_around_the_error() {
        let position = SQL.find("into b").unwrap() + 1;
        assert_eq!(
            failing_statement(SQL, Some(position)),
            "insert into b values (1)"
        );
        assert_eq!(failing_statement(SQL, Some(1)), "create table a (id int)");
    }

    #[test]
    fn falls_back_to_the_whole_script() {
        assert_eq!(failing_statement(SQL, None), SQL);
        assert_eq!(failing_statement(SQL, Some(10_000)), SQL);
    }
}
