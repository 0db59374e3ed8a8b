//! Keyset (seek) pagination: a declarative parameter set that renders into a
//! deterministic SQL statement and an opaque resumable cursor.

use crate::{
    keyset::conditions::{ConditionBuilder, SIMILARITY_COLUMN, SqlConditions},
    query::dialect::{Dialect, Postgres},
};
use model::{
    core::value::Value,
    pagination::{
        cursor::{self, CursorDecodeError, CursorEncodeError},
        page::Edge,
        params::{
            KeysetParam, NullParam, SeekDirection, SeekParam, SliceParam, WhereParam, grouped,
        },
    },
    records::row::RowData,
};
use thiserror::Error;

pub mod conditions;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum KeysetError {
    #[error("invalid keyset query: cannot specify both `{0}` and `{1}`")]
    InvalidQuery(&'static str, &'static str),

    #[error(transparent)]
    CursorDecode(#[from] CursorDecodeError),

    #[error(transparent)]
    CursorEncode(#[from] CursorEncodeError),
}

/// Arguments of [`Keyset::start`].
#[derive(Debug, Clone, Default)]
pub struct StartQuery {
    pub field: String,
    pub search_query: Option<String>,
    /// Explicit sort direction; when `None` it is derived from `first`/`last`.
    pub desc: Option<bool>,
    pub first: Option<usize>,
    pub last: Option<usize>,
    /// With neither `first` nor `last`, behave as `last` instead of `first`.
    pub default_last: bool,
}

impl StartQuery {
    pub fn new(field: impl Into<String>) -> Self {
        StartQuery {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    pub fn last(mut self, n: usize) -> Self {
        self.last = Some(n);
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    pub fn desc(mut self, desc: bool) -> Self {
        self.desc = Some(desc);
        self
    }

    pub fn default_last(mut self, default_last: bool) -> Self {
        self.default_last = default_last;
        self
    }
}

/// Arguments of [`Keyset::continue_from`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueQuery {
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

impl ContinueQuery {
    pub fn next(n: usize) -> Self {
        ContinueQuery {
            next: Some(n),
            prev: None,
        }
    }

    pub fn prev(n: usize) -> Self {
        ContinueQuery {
            next: None,
            prev: Some(n),
        }
    }
}

/// Caller supplied SQL snippets. These are trusted input and never travel
/// inside a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RawClauses {
    select: Vec<String>,
    where_: Vec<String>,
    order: Vec<String>,
    joins: Vec<String>,
    group_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyset {
    table: String,
    params: Vec<KeysetParam>,
    raw: RawClauses,
    direction: SeekDirection,
    limit: usize,
}

impl Keyset {
    pub fn new(table: impl Into<String>) -> Self {
        Keyset {
            table: table.into(),
            params: Vec::new(),
            raw: RawClauses::default(),
            direction: SeekDirection::After,
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn params(&self) -> &[KeysetParam] {
        &self.params
    }

    pub fn direction(&self) -> SeekDirection {
        self.direction
    }

    pub fn page_size(&self) -> usize {
        self.limit
    }

    pub fn seek_params(&self) -> impl Iterator<Item = &SeekParam> {
        self.params.iter().filter_map(KeysetParam::as_seek)
    }

    /// The seek that decides whether a row has neighbours.
    pub fn primary_seek(&self) -> Option<&SeekParam> {
        self.seek_params().next()
    }

    pub fn seek(mut self, param: SeekParam) -> Self {
        self.params.push(KeysetParam::Seek(param));
        self
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push(KeysetParam::Where(WhereParam {
            field: field.into(),
            value: value.into(),
        }));
        self
    }

    pub fn in_values(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.params.push(KeysetParam::In(SliceParam {
            field: field.into(),
            values,
        }));
        self
    }

    pub fn intersect(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.params.push(KeysetParam::Intersect(SliceParam {
            field: field.into(),
            values,
        }));
        self
    }

    pub fn is_null(mut self, field: impl Into<String>) -> Self {
        self.params.push(KeysetParam::Null(NullParam {
            field: field.into(),
            is_null: true,
        }));
        self
    }

    pub fn not_null(mut self, field: impl Into<String>) -> Self {
        self.params.push(KeysetParam::Null(NullParam {
            field: field.into(),
            is_null: false,
        }));
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw.select.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn raw_where(mut self, condition: impl Into<String>) -> Self {
        self.raw.where_.push(condition.into());
        self
    }

    pub fn raw_order(mut self, condition: impl Into<String>) -> Self {
        self.raw.order.push(condition.into());
        self
    }

    /// Appends a full join clause, e.g. `join other on other.id = test.other_id`.
    pub fn raw_join(mut self, join: impl Into<String>) -> Self {
        self.raw.joins.push(join.into());
        self
    }

    pub fn raw_group_by(mut self, group_by: impl Into<String>) -> Self {
        self.raw.group_by = Some(group_by.into());
        self
    }

    pub fn after(mut self) -> Self {
        self.direction = SeekDirection::After;
        self
    }

    pub fn before(mut self) -> Self {
        self.direction = SeekDirection::Before;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets up a first page ordered by `query.field`.
    pub fn start(self, query: StartQuery) -> Result<Self, KeysetError> {
        let (first, last) = match (query.first, query.last) {
            (Some(_), Some(_)) => return Err(KeysetError::InvalidQuery("first", "last")),
            (None, None) if query.default_last => (None, Some(DEFAULT_PAGE_SIZE)),
            (None, None) => (Some(DEFAULT_PAGE_SIZE), None),
            other => other,
        };
        let limit = first.or(last).unwrap_or(DEFAULT_PAGE_SIZE);

        let search = query.search_query.filter(|q| !q.is_empty());
        // Search results default to most relevant first, plain listings to
        // most recent first when reading from the end.
        let desc = query.desc.unwrap_or(if search.is_some() {
            first.is_some()
        } else {
            last.is_some()
        });

        let mut seek = SeekParam::new(query.field).desc(desc);
        seek.search_query = search;
        Ok(self.limit(limit).seek(seek))
    }

    /// Resumes from `cursor`, reading `next` rows after it or `prev` rows
    /// before it.
    pub fn continue_from(self, cursor: &str, query: ContinueQuery) -> Result<Self, KeysetError> {
        let keyset = self.with_cursor(cursor)?;
        match (query.next, query.prev) {
            (Some(_), Some(_)) => Err(KeysetError::InvalidQuery("next", "prev")),
            (None, Some(prev)) => Ok(keyset.limit(prev).before()),
            (next, None) => Ok(keyset.limit(next.unwrap_or(DEFAULT_PAGE_SIZE)).after()),
        }
    }

    /// Replaces the parameter lists with the ones encoded in `cursor`. Raw
    /// clauses, direction and limit are kept.
    pub fn with_cursor(mut self, cursor: &str) -> Result<Self, KeysetError> {
        self.params = cursor::decode(cursor)?;
        Ok(self)
    }

    pub fn to_cursor(&self) -> Result<String, KeysetError> {
        Ok(cursor::encode(&self.params)?)
    }

    /// Derives the keyset positioned at `row`: every seek takes its value
    /// from the row (the similarity score for search-ranked seeks).
    pub fn from_row(&self, row: &RowData) -> Keyset {
        let mut next = self.clone();
        for param in next.params.iter_mut() {
            if let KeysetParam::Seek(seek) = param {
                let column = match &seek.search_query {
                    Some(_) => SIMILARITY_COLUMN,
                    None => column_name(&seek.field),
                };
                seek.value = row.value_of(column).cloned();
            }
        }
        next
    }

    /// Pairs every row with the cursor pointing at it.
    pub fn edges(&self, rows: Vec<RowData>) -> Result<Vec<Edge>, KeysetError> {
        rows.into_iter()
            .map(|row| {
                let cursor = self.from_row(&row).to_cursor()?;
                Ok(Edge { node: row, cursor })
            })
            .collect()
    }

    /// One-row query checking whether anything follows `row`. `None` when
    /// the row carries no seek value to probe from.
    pub fn next_probe(&self, row: &RowData) -> Option<String> {
        self.probe(row, SeekDirection::After)
    }

    /// One-row query checking whether anything precedes `row`.
    pub fn prev_probe(&self, row: &RowData) -> Option<String> {
        self.probe(row, SeekDirection::Before)
    }

    fn probe(&self, row: &RowData, direction: SeekDirection) -> Option<String> {
        let mut probe = self.from_row(row);
        if !probe.primary_seek().is_some_and(SeekParam::has_value) {
            return None;
        }
        probe.direction = direction;
        probe.limit = 1;
        Some(probe.to_sql())
    }

    /// Raw clauses first, then seeks, then the remaining filters.
    fn collect_conditions(&self, with_seeks: bool) -> SqlConditions {
        let builder = ConditionBuilder::new(&self.table, self.direction);
        let mut terms = SqlConditions {
            select: self.raw.select.clone(),
            where_: self.raw.where_.clone(),
            order: self.raw.order.clone(),
        };
        for param in grouped(&self.params) {
            if with_seeks || param.as_seek().is_none() {
                terms.extend(builder.build(param));
            }
        }
        terms
    }

    fn from_sql(&self) -> String {
        let mut from = format!("FROM {}", Postgres.quote_identifier(&self.table));
        for join in &self.raw.joins {
            from.push(' ');
            from.push_str(join);
        }
        from
    }

    /// Renders the page query.
    ///
    /// The ORDER BY list is the reverse of the generated order terms, so the
    /// most recently added seek is the primary sort key and raw orders come
    /// last.
    pub fn to_sql(&self) -> String {
        let mut terms = self.collect_conditions(true);

        let mut select = Vec::new();
        if self.raw.select.is_empty() {
            select.push(format!("{}.*", Postgres.quote_identifier(&self.table)));
        }
        select.append(&mut terms.select);

        let mut parts = vec![format!("SELECT {}", select.join(", ")), self.from_sql()];
        if !terms.where_.is_empty() {
            parts.push(format!("WHERE {}", terms.where_.join(" AND ")));
        }
        if let Some(group_by) = &self.raw.group_by {
            parts.push(format!("GROUP BY {group_by}"));
        }
        if !terms.order.is_empty() {
            terms.order.reverse();
            parts.push(format!("ORDER BY {}", terms.order.join(", ")));
        }
        parts.push(format!("LIMIT {}", self.limit));
        parts.join(" ")
    }

    /// Counts every row matching the filters, ignoring the seek position.
    pub fn total_count_sql(&self) -> String {
        let terms = self.collect_conditions(false);
        let mut sql = format!("SELECT count(*)::int {}", self.from_sql());
        if !terms.where_.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&terms.where_.join(" AND "));
        }
        sql
    }
}

/// Column part of a possibly table-qualified field.
fn column_name(field: &str) -> &str {
    field.rsplit_once('.').map_or(field, |(_, column)| column)
}
