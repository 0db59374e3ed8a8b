//! Translates keyset parameters into SQL fragments.

use crate::query::dialect::{Dialect, Postgres};
use model::{
    core::value::Value,
    pagination::params::{KeysetParam, NullParam, SeekDirection, SeekParam, SliceParam, WhereParam},
};

/// Output column that carries the similarity score of a search-ranked seek.
pub const SIMILARITY_COLUMN: &str = "sml";

/// SELECT, WHERE and ORDER BY fragments, in generation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlConditions {
    pub select: Vec<String>,
    pub where_: Vec<String>,
    pub order: Vec<String>,
}

impl SqlConditions {
    pub fn extend(&mut self, other: SqlConditions) {
        self.select.extend(other.select);
        self.where_.extend(other.where_);
        self.order.extend(other.order);
    }

    fn filter(condition: String) -> Self {
        SqlConditions {
            where_: vec![condition],
            ..Default::default()
        }
    }
}

/// Minimum trigram similarity a row must reach to match a search query of
/// the given length. Short queries match loosely.
pub fn min_similarity(search_query: &str) -> f64 {
    match search_query.chars().count() {
        1 => 0.01,
        2 => 0.05,
        3 => 0.1,
        _ => 0.2,
    }
}

pub struct ConditionBuilder<'a> {
    table: &'a str,
    direction: SeekDirection,
    dialect: Postgres,
}

impl<'a> ConditionBuilder<'a> {
    pub fn new(table: &'a str, direction: SeekDirection) -> Self {
        ConditionBuilder {
            table,
            direction,
            dialect: Postgres,
        }
    }

    pub fn build(&self, param: &KeysetParam) -> SqlConditions {
        match param {
            KeysetParam::Seek(p) => self.seek(p),
            KeysetParam::In(p) => self.in_values(p),
            KeysetParam::Where(p) => self.where_eq(p),
            KeysetParam::Intersect(p) => self.intersect(p),
            KeysetParam::Null(p) => self.null_test(p),
        }
    }

    pub fn seek(&self, param: &SeekParam) -> SqlConditions {
        let field = self.dialect.qualify(self.table, &param.field);
        let op = match (self.direction, param.desc) {
            (SeekDirection::After, false) | (SeekDirection::Before, true) => ">",
            (SeekDirection::After, true) | (SeekDirection::Before, false) => "<",
        };
        // Backward pages read towards the cursor, so the ordering is flipped
        // and the rows are put back in order after fetching.
        let descending = param.desc != (self.direction == SeekDirection::Before);
        let sort = if descending { "DESC" } else { "ASC" };

        let mut out = SqlConditions::default();

        if let Some(maybe_equal) = &param.maybe_equal {
            let matches_cursor = match &param.value {
                None => true,
                Some(value) => value.same_text(maybe_equal),
            };
            if matches_cursor {
                out.where_.push(format!(
                    "({field} = {} or {field} is null)",
                    self.dialect.quote_literal(maybe_equal)
                ));
            } else {
                out.where_.push(format!("{field} is null"));
            }
            out.order.push(format!("{field} {sort}"));
            return out;
        }

        out.where_.push(format!("{field} is not null"));

        match &param.search_query {
            Some(search) => {
                let floor = Value::from(min_similarity(search));
                let similarity = format!(
                    "similarity({field}, {})",
                    self.dialect.quote_literal(&search.as_str().into())
                );
                out.where_.push(format!(
                    "{similarity} > {}",
                    self.dialect.quote_literal(&floor)
                ));
                if let Some(value) = &param.value {
                    out.where_.push(format!(
                        "{similarity} {op} {}",
                        self.dialect.quote_literal(value)
                    ));
                }
                out.order.push(format!("{similarity} {sort}"));
                out.select
                    .push(format!("{similarity} as {SIMILARITY_COLUMN}"));
            }
            None => {
                out.order.push(format!("{field} {sort}"));
                if let Some(value) = &param.value {
                    out.where_.push(format!(
                        "{field} {op} {}",
                        self.dialect.quote_literal(value)
                    ));
                }
            }
        }
        out
    }

    pub fn where_eq(&self, param: &WhereParam) -> SqlConditions {
        let field = self.dialect.qualify(self.table, &param.field);
        SqlConditions::filter(format!(
            "{field} = {}",
            self.dialect.quote_literal(&param.value)
        ))
    }

    pub fn in_values(&self, param: &SliceParam) -> SqlConditions {
        if param.values.is_empty() {
            return SqlConditions::filter("FALSE".into());
        }
        SqlConditions::filter(format!(
            "{} IN ({})",
            self.column(&param.field),
            self.dialect.literal_list(&param.values)
        ))
    }

    /// Array overlap: rows whose array column shares an element with `values`.
    pub fn intersect(&self, param: &SliceParam) -> SqlConditions {
        if param.values.is_empty() {
            return SqlConditions::filter("FALSE".into());
        }
        SqlConditions::filter(format!(
            "{} && ARRAY[{}]",
            self.column(&param.field),
            self.dialect.literal_list(&param.values)
        ))
    }

    pub fn null_test(&self, param: &NullParam) -> SqlConditions {
        let field = self.dialect.qualify(self.table, &param.field);
        let test = if param.is_null { "IS NULL" } else { "IS NOT NULL" };
        SqlConditions::filter(format!("{field} {test}"))
    }

    // Unqualified unless the field names its own table.
    fn column(&self, field: &str) -> String {
        if field.contains('.') {
            self.dialect.qualify(self.table, field)
        } else {
            self.dialect.quote_identifier(field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn after() -> ConditionBuilder<'static> {
        ConditionBuilder::new("test", SeekDirection::After)
    }

    #[test]
    fn operator_follows_direction_and_sort() {
        let asc = SeekParam::new("id").value(5);
        let desc = SeekParam::new("id").value(5).desc(true);
        let before = ConditionBuilder::new("test", SeekDirection::Before);

        assert_eq!(after().seek(&asc).where_[1], r#""test"."id" > '5'"#);
        assert_eq!(after().seek(&desc).where_[1], r#""test"."id" < '5'"#);
        assert_eq!(before.seek(&asc).where_[1], r#""test"."id" < '5'"#);
        assert_eq!(before.seek(&desc).where_[1], r#""test"."id" > '5'"#);
    }

    #[test]
    fn first_page_still_orders() {
        let out = after().seek(&SeekParam::new("id"));
        assert_eq!(out.where_, vec![r#""test"."id" is not null"#]);
        assert_eq!(out.order, vec![r#""test"."id" ASC"#]);
    }

    #[test]
    fn backward_pages_flip_the_ordering() {
        let before = ConditionBuilder::new("test", SeekDirection::Before);
        let out = before.seek(&SeekParam::new("id").value(5).desc(true));
        assert_eq!(out.order, vec![r#""test"."id" ASC"#]);
    }

    #[test]
    fn search_selects_and_orders_by_similarity() {
        let out = after().seek(&SeekParam::new("message").search("abcd").value(0.5).desc(true));
        let sim = r#"similarity("test"."message", 'abcd')"#;
        assert_eq!(
            out.where_,
            vec![
                r#""test"."message" is not null"#.to_string(),
                format!("{sim} > '0.2'"),
                format!("{sim} < '0.5'"),
            ]
        );
        assert_eq!(out.order, vec![format!("{sim} DESC")]);
        assert_eq!(out.select, vec![format!("{sim} as sml")]);
    }

    #[test]
    fn similarity_floor_is_tiered_by_length() {
        assert_eq!(min_similarity("a"), 0.01);
        assert_eq!(min_similarity("ab"), 0.05);
        assert_eq!(min_similarity("abc"), 0.1);
        assert_eq!(min_similarity("abcdef"), 0.2);
    }

    #[test]
    fn maybe_equal_groups_matching_rows_with_nulls() {
        let field = r#""test"."group_id""#;
        let fresh = after().seek(&SeekParam::new("group_id").maybe_equal(3));
        assert_eq!(fresh.where_, vec![format!("({field} = '3' or {field} is null)")]);

        let moved_on = after().seek(&SeekParam::new("group_id").maybe_equal(3).value(7));
        assert_eq!(moved_on.where_, vec![format!("{field} is null")]);
        assert_eq!(moved_on.order, vec![format!("{field} ASC")]);
    }

    #[test]
    fn filters() {
        let b = after();
        assert_eq!(
            b.where_eq(&WhereParam {
                field: "other.kind".into(),
                value: "x".into()
            })
            .where_,
            vec![r#""other"."kind" = 'x'"#]
        );
        assert_eq!(
            b.in_values(&SliceParam {
                field: "id".into(),
                values: vec![Value::Int(1), Value::Int(2)]
            })
            .where_,
            vec![r#""id" IN ('1','2')"#]
        );
        assert_eq!(
            b.intersect(&SliceParam {
                field: "tags".into(),
                values: vec!["a".into()]
            })
            .where_,
            vec![r#""tags" && ARRAY['a']"#]
        );
        assert_eq!(
            b.null_test(&NullParam {
                field: "message".into(),
                is_null: false
            })
            .where_,
            vec![r#""test"."message" IS NOT NULL"#]
        );
    }

    #[test]
    fn empty_slices_match_nothing() {
        let out = after().in_values(&SliceParam {
            field: "id".into(),
            values: vec![],
        });
        assert_eq!(out.where_, vec!["FALSE"]);
    }
}
