use crate::error::DbError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use rust_decimal::Decimal;
use tokio_postgres::{
    Row as PgRow,
    types::{FromSql, Json as PgJson},
};
use uuid::Uuid;

/// Read-only view over a driver row.
pub struct DbRow<'a>(pub &'a PgRow);

impl DbRow<'_> {
    pub fn to_row_data(&self, table: &str) -> Result<RowData, DbError> {
        let field_values = self
            .0
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                Ok(FieldValue {
                    name: column.name().to_string(),
                    value: self.get_value(idx, column.type_().name())?,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(RowData::new(table, field_values))
    }

    /// Decodes column `idx` by its Postgres type name. SQL NULL is `None`.
    pub fn get_value(&self, idx: usize, type_name: &str) -> Result<Option<Value>, DbError> {
        let value = match type_name {
            "int2" => self.try_get::<i16>(idx)?.map(|v| Value::Int(v as i64)),
            "int4" => self.try_get::<i32>(idx)?.map(|v| Value::Int(v as i64)),
            "int8" => self.try_get::<i64>(idx)?.map(Value::Int),
            "float4" => self.try_get::<f32>(idx)?.map(|v| Value::Float(v as f64)),
            "float8" => self.try_get::<f64>(idx)?.map(Value::Float),
            "numeric" => self.try_get::<Decimal>(idx)?.map(Value::Decimal),
            "text" | "varchar" | "bpchar" | "name" | "citext" => {
                self.try_get::<String>(idx)?.map(Value::String)
            }
            "bool" => self.try_get::<bool>(idx)?.map(Value::Boolean),
            "json" | "jsonb" => self
                .try_get::<PgJson<serde_json::Value>>(idx)?
                .map(|json| Value::Json(json.0)),
            "uuid" => self.try_get::<Uuid>(idx)?.map(Value::Uuid),
            "bytea" => self.try_get::<Vec<u8>>(idx)?.map(Value::Bytes),
            "date" => self.try_get::<NaiveDate>(idx)?.map(Value::Date),
            "timestamptz" => self.try_get::<DateTime<Utc>>(idx)?.map(Value::Timestamp),
            "timestamp" => self
                .try_get::<NaiveDateTime>(idx)?
                .map(|naive| Value::Timestamp(naive.and_utc())),
            "time" => self
                .try_get::<NaiveTime>(idx)?
                .map(|time| Value::String(time.to_string())),
            "_text" | "_varchar" => self.try_get::<Vec<String>>(idx)?.map(Value::StringArray),
            "_int2" => self.try_get::<Vec<Option<i16>>>(idx)?.map(json_array),
            "_int4" => self.try_get::<Vec<Option<i32>>>(idx)?.map(json_array),
            "_int8" => self.try_get::<Vec<Option<i64>>>(idx)?.map(json_array),
            "_float4" => self.try_get::<Vec<Option<f32>>>(idx)?.map(json_array),
            "_float8" => self.try_get::<Vec<Option<f64>>>(idx)?.map(json_array),
            "_bool" => self.try_get::<Vec<Option<bool>>>(idx)?.map(json_array),
            "_numeric" => self
                .try_get::<Vec<Option<Decimal>>>(idx)?
                .map(|items| json_array(text_items(items))),
            "_uuid" => self
                .try_get::<Vec<Option<Uuid>>>(idx)?
                .map(|items| json_array(text_items(items))),
            other => {
                return Err(DbError::Decode {
                    column: self.0.columns()[idx].name().to_string(),
                    type_name: other.to_string(),
                    reason: "unsupported column type, cast it to text in the select list"
                        .to_string(),
                });
            }
        };
        Ok(value)
    }

    fn try_get<'a, T: FromSql<'a>>(&'a self, idx: usize) -> Result<Option<T>, DbError> {
        self.0
            .try_get::<_, Option<T>>(idx)
            .map_err(|err| DbError::Decode {
                column: self.0.columns()[idx].name().to_string(),
                type_name: self.0.columns()[idx].type_().name().to_string(),
                reason: err.to_string(),
            })
    }
}

/// Array columns without a `Value` counterpart travel as JSON arrays.
fn json_array<T: Into<serde_json::Value>>(items: Vec<Option<T>>) -> Value {
    Value::Json(serde_json::Value::Array(
        items
            .into_iter()
            .map(|item| item.map_or(serde_json::Value::Null, Into::into))
            .collect(),
    ))
}

fn text_items<T: ToString>(items: Vec<Option<T>>) -> Vec<Option<String>> {
    items
        .into_iter()
        .map(|item| item.map(|v| v.to_string()))
        .collect()
}
