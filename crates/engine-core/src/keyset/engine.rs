use crate::error::QueryError;
use connectors::{
    DbError, PgDatabase,
    sql::postgres::row::DbRow,
};
use model::{
    pagination::{
        page::{KeysetConnection, PageInfo},
        params::SeekDirection,
    },
    records::row::RowData,
};
use planner::keyset::Keyset;
use tokio_postgres::Transaction;
use tracing::{debug, warn};

/// Runs keyset pages against a database.
#[derive(Clone)]
pub struct KeysetQueryEngine {
    db: PgDatabase,
}

impl KeysetQueryEngine {
    pub fn new(db: PgDatabase) -> Self {
        Self { db }
    }

    /// Fetches one page and its page info inside a single transaction.
    ///
    /// The total count and both boundary probes are pipelined on the
    /// transaction once the page rows are known.
    pub async fn query(&self, keyset: &Keyset) -> Result<KeysetConnection, QueryError> {
        let mut client = self.db.lock_client().await;
        let tx = client.transaction().await.map_err(DbError::from)?;

        match fetch_page(&tx, keyset).await {
            Ok(page) => {
                tx.commit().await.map_err(DbError::from)?;
                Ok(page)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Failed to roll back keyset query");
                }
                Err(err)
            }
        }
    }
}

async fn fetch_page(tx: &Transaction<'_>, keyset: &Keyset) -> Result<KeysetConnection, QueryError> {
    let sql = keyset.to_sql();
    debug!(%sql, "Running keyset page query");

    let mut rows = fetch_rows(tx, &sql, keyset.table()).await?;
    // Backward pages are read towards the cursor.
    if keyset.direction() == SeekDirection::Before {
        rows.reverse();
    }

    let next_probe = rows.last().and_then(|row| keyset.next_probe(row));
    let prev_probe = rows.first().and_then(|row| keyset.prev_probe(row));
    let count_sql = keyset.total_count_sql();

    let (total_count, has_next_page, has_prev_page) = futures::try_join!(
        count(tx, &count_sql),
        has_rows(tx, next_probe.as_deref()),
        has_rows(tx, prev_probe.as_deref()),
    )?;

    Ok(KeysetConnection {
        edges: keyset.edges(rows)?,
        page_info: PageInfo {
            total_count,
            has_next_page,
            has_prev_page,
        },
    })
}

async fn fetch_rows(tx: &Transaction<'_>, sql: &str, table: &str) -> Result<Vec<RowData>, DbError> {
    let rows = tx.query(sql, &[]).await?;
    rows.iter().map(|row| DbRow(row).to_row_data(table)).collect()
}

async fn count(tx: &Transaction<'_>, sql: &str) -> Result<i64, DbError> {
    let row = tx.query_one(sql, &[]).await?;
    let total: i32 = row.try_get(0)?;
    Ok(i64::from(total))
}

/// Probes are skipped when the boundary row has no seek value.
async fn has_rows(tx: &Transaction<'_>, probe: Option<&str>) -> Result<bool, DbError> {
    let Some(sql) = probe else {
        return Ok(false);
    };
    debug!(%sql, "Running keyset probe");
    Ok(!tx.query(sql, &[]).await?.is_empty())
}
