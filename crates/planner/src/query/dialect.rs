//! Defines the `Dialect` trait for database-specific SQL syntax.

use model::core::value::Value;

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect, escaping embedded quotes.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Renders a value as an inline SQL literal.
    fn quote_literal(&self, value: &Value) -> String;

    /// `table.column` reference. A field that already names its table
    /// (`other.column`) keeps that table.
    fn qualify(&self, table: &str, field: &str) -> String {
        match field.split_once('.') {
            Some((owner, column)) => format!(
                "{}.{}",
                self.quote_identifier(owner),
                self.quote_identifier(column)
            ),
            None => format!(
                "{}.{}",
                self.quote_identifier(table),
                self.quote_identifier(field)
            ),
        }
    }

    /// Comma separated literals, as used inside `IN (...)` and `ARRAY[...]`.
    fn literal_list(&self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.quote_literal(v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', r#""""#))
    }

    fn quote_literal(&self, value: &Value) -> String {
        let Some(text) = value.as_text() else {
            return "NULL".into();
        };

        let mut quoted = String::with_capacity(text.len() + 2);
        let has_backslash = text.contains('\\');
        if has_backslash {
            quoted.push('E');
        }
        quoted.push('\'');
        for c in text.chars() {
            match c {
                '\'' => quoted.push_str("''"),
                '\\' => quoted.push_str("\\\\"),
                c => quoted.push(c),
            }
        }
        quoted.push('\'');

        if let Value::Json(json) = value
            && (json.is_object() || json.is_array())
        {
            quoted.push_str("::jsonb");
        }
        quoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_are_always_quoted() {
        assert_eq!(Postgres.quote_identifier("id"), r#""id""#);
        assert_eq!(Postgres.quote_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn qualify_uses_the_named_table() {
        assert_eq!(Postgres.qualify("test", "id"), r#""test"."id""#);
        assert_eq!(Postgres.qualify("test", "other.id"), r#""other"."id""#);
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(Postgres.quote_literal(&Value::Int(10)), "'10'");
        assert_eq!(Postgres.quote_literal(&"it's".into()), "'it''s'");
        assert_eq!(Postgres.quote_literal(&r"a\b".into()), r"E'a\\b'");
        assert_eq!(Postgres.quote_literal(&Value::Null), "NULL");
        assert_eq!(Postgres.quote_literal(&Value::Boolean(true)), "'t'");
        assert_eq!(
            Postgres.quote_literal(&Value::Json(json!({"a": 1}))),
            r#"'{"a":1}'::jsonb"#
        );
    }
}
