use crate::{
    core::value::Value,
    pagination::params::{KeysetParam, NullParam, SeekParam, SliceParam, WhereParam},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorDecodeError {
    #[error("cursor is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("cursor payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {kind} parameter on field `{field}`: {reason}")]
    Shape {
        kind: &'static str,
        field: String,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
#[error("failed to serialize cursor: {0}")]
pub struct CursorEncodeError(#[from] serde_json::Error);

/// Type tags for values whose plain JSON form reads back as another `Value`:
/// a jsonb string would come back as text, a jsonb array of strings as a
/// text array.
const JSON_TAG: &str = "j";
const TEXT_ARRAY_TAG: &str = "a";

/// On-the-wire form of a parameter list. Short keys keep cursors small.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireCursor {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    s: Vec<WireParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    f: Vec<WireParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    w: Vec<WireParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    i: Vec<WireParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    n: Vec<WireParam>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireParam {
    f: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<serde_json::Value>,
    /// Tag of `v`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
    /// Tags of the items of a slice `v`, by position.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ts: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    m: Option<serde_json::Value>,
    /// Tag of `m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    u: Option<String>,
}

impl WireParam {
    fn field(field: &str) -> Self {
        WireParam {
            f: field.to_string(),
            ..Default::default()
        }
    }
}

fn tag_of(value: &Value) -> Option<String> {
    match value {
        Value::Json(_) => Some(JSON_TAG.to_string()),
        Value::StringArray(_) => Some(TEXT_ARRAY_TAG.to_string()),
        _ => None,
    }
}

/// Serializes the parameter list into an opaque cursor string.
pub fn encode(params: &[KeysetParam]) -> Result<String, CursorEncodeError> {
    let mut wire = WireCursor::default();
    for param in params {
        match param {
            KeysetParam::Seek(p) => wire.s.push(WireParam {
                v: p.value.as_ref().map(Value::to_json),
                t: p.value.as_ref().and_then(tag_of),
                d: p.desc.then_some(true),
                q: p.search_query.clone(),
                m: p.maybe_equal.as_ref().map(Value::to_json),
                u: p.maybe_equal.as_ref().and_then(tag_of),
                ..WireParam::field(&p.field)
            }),
            KeysetParam::In(p) => wire.f.push(slice_to_wire(p)),
            KeysetParam::Intersect(p) => wire.i.push(slice_to_wire(p)),
            KeysetParam::Where(p) => wire.w.push(WireParam {
                v: Some(p.value.to_json()),
                t: tag_of(&p.value),
                ..WireParam::field(&p.field)
            }),
            KeysetParam::Null(p) => wire.n.push(WireParam {
                n: Some(p.is_null),
                ..WireParam::field(&p.field)
            }),
        }
    }

    let json = serde_json::to_vec(&wire)?;
    Ok(BASE64.encode(json))
}

/// Parses a cursor produced by [`encode`].
///
/// The result is grouped by kind (seek, in, where, intersect, null), which is
/// the order the condition builder consumes them in.
pub fn decode(cursor: &str) -> Result<Vec<KeysetParam>, CursorDecodeError> {
    let bytes = BASE64.decode(cursor.trim())?;
    let wire: WireCursor = serde_json::from_slice(&bytes)?;

    let mut params = Vec::new();
    for p in wire.s {
        params.push(KeysetParam::Seek(seek_from_wire(p)?));
    }
    for p in wire.f {
        params.push(KeysetParam::In(slice_from_wire("in", p)?));
    }
    for p in wire.w {
        params.push(KeysetParam::Where(where_from_wire(p)?));
    }
    for p in wire.i {
        params.push(KeysetParam::Intersect(slice_from_wire("intersect", p)?));
    }
    for p in wire.n {
        let is_null = p.n.ok_or_else(|| shape("null", &p.f, "missing null flag"))?;
        params.push(KeysetParam::Null(NullParam {
            field: p.f,
            is_null,
        }));
    }
    Ok(params)
}

fn slice_to_wire(p: &SliceParam) -> WireParam {
    let tags: Vec<_> = p.values.iter().map(tag_of).collect();
    WireParam {
        v: Some(serde_json::Value::Array(
            p.values.iter().map(Value::to_json).collect(),
        )),
        ts: if tags.iter().any(Option::is_some) {
            tags
        } else {
            Vec::new()
        },
        ..WireParam::field(&p.field)
    }
}

/// Reads a value written with a type tag.
fn tagged(
    kind: &'static str,
    field: &str,
    json: serde_json::Value,
    tag: &str,
) -> Result<Value, CursorDecodeError> {
    match tag {
        JSON_TAG => Ok(Value::Json(json)),
        TEXT_ARRAY_TAG => match json {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s),
                    _ => Err(shape(kind, field, "text array items must be strings")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::StringArray),
            _ => Err(shape(kind, field, "text array must be an array")),
        },
        _ => Err(shape(kind, field, "unknown value tag")),
    }
}

fn seek_from_wire(p: WireParam) -> Result<SeekParam, CursorDecodeError> {
    let value = optional_value("seek", &p.f, p.v, p.t.as_deref(), "value must be a scalar")?;
    let maybe_equal =
        optional_value("seek", &p.f, p.m, p.u.as_deref(), "maybeEqual must be a scalar")?;
    Ok(SeekParam {
        field: p.f,
        value,
        desc: p.d.unwrap_or(false),
        search_query: p.q.filter(|q| !q.is_empty()),
        maybe_equal,
    })
}

/// Untagged values must be scalars, JSON null meaning "no value".
fn optional_value(
    kind: &'static str,
    field: &str,
    json: Option<serde_json::Value>,
    tag: Option<&str>,
    reason: &'static str,
) -> Result<Option<Value>, CursorDecodeError> {
    match (json, tag) {
        (None, _) => Ok(None),
        (Some(json), Some(tag)) => tagged(kind, field, json, tag).map(Some),
        (Some(json), None) => match Value::from_json_scalar(&json) {
            Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(value)),
            None => Err(shape(kind, field, reason)),
        },
    }
}

fn slice_from_wire(kind: &'static str, p: WireParam) -> Result<SliceParam, CursorDecodeError> {
    let items = match p.v {
        Some(serde_json::Value::Array(items)) => items,
        None => Vec::new(),
        Some(_) => return Err(shape(kind, &p.f, "values must be an array")),
    };
    let values = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match p.ts.get(idx).and_then(Option::as_deref) {
            Some(tag) => tagged(kind, &p.f, item, tag),
            None => Value::from_json_scalar(&item).ok_or_else(|| shape(kind, &p.f, "nested values")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SliceParam { field: p.f, values })
}

fn where_from_wire(p: WireParam) -> Result<WhereParam, CursorDecodeError> {
    let json = p.v.unwrap_or(serde_json::Value::Null);
    let value = match (p.t.as_deref(), json) {
        (Some(tag), json) => tagged("where", &p.f, json, tag)?,
        // Untagged arrays and objects come from cursors written without tags.
        (None, serde_json::Value::Array(items)) if items.iter().all(|i| i.is_string()) => {
            Value::StringArray(
                items
                    .into_iter()
                    .filter_map(|i| match i {
                        serde_json::Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            )
        }
        (None, json @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => {
            Value::Json(json)
        }
        (None, scalar) => Value::from_json_scalar(&scalar).unwrap_or(Value::Null),
    };
    Ok(WhereParam { field: p.f, value })
}

fn shape(kind: &'static str, field: &str, reason: &'static str) -> CursorDecodeError {
    CursorDecodeError::Shape {
        kind,
        field: field.to_string(),
        reason,
    }
}
