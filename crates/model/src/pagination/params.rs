use crate::core::value::Value;
use serde::{Deserialize, Serialize};

/// Which side of the cursor a page is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SeekDirection {
    #[default]
    After,
    Before,
}

impl SeekDirection {
    pub fn reversed(self) -> Self {
        match self {
            SeekDirection::After => SeekDirection::Before,
            SeekDirection::Before => SeekDirection::After,
        }
    }
}

/// Primary ordering / resume point of a keyset query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeekParam {
    pub field: String,
    /// Seek value of the row the cursor points at. `None` on the first page.
    pub value: Option<Value>,
    pub desc: bool,
    /// Orders by trigram similarity to this text instead of the raw column.
    pub search_query: Option<String>,
    /// Column may be NULL; rows equal to this value are grouped with the NULLs.
    pub maybe_equal: Option<Value>,
}

impl SeekParam {
    pub fn new(field: impl Into<String>) -> Self {
        SeekParam {
            field: field.into(),
            value: None,
            desc: false,
            search_query: None,
            maybe_equal: None,
        }
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.value = if value.is_null() { None } else { Some(value) };
        self
    }

    pub fn desc(mut self, desc: bool) -> Self {
        self.desc = desc;
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.search_query = if query.is_empty() { None } else { Some(query) };
        self
    }

    pub fn maybe_equal(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.maybe_equal = if value.is_null() { None } else { Some(value) };
        self
    }

    pub fn has_value(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_null())
    }
}

/// `field = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereParam {
    pub field: String,
    pub value: Value,
}

/// A field and a list of values; used for both `IN` and array-overlap filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceParam {
    pub field: String,
    pub values: Vec<Value>,
}

/// `field IS [NOT] NULL`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullParam {
    pub field: String,
    pub is_null: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKind {
    Seek,
    In,
    Where,
    Intersect,
    Null,
}

impl ParamKind {
    /// Kinds in the order their conditions are generated (and serialized).
    pub const ALL: [ParamKind; 5] = [
        ParamKind::Seek,
        ParamKind::In,
        ParamKind::Where,
        ParamKind::Intersect,
        ParamKind::Null,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeysetParam {
    Seek(SeekParam),
    In(SliceParam),
    Where(WhereParam),
    Intersect(SliceParam),
    Null(NullParam),
}

impl KeysetParam {
    pub fn kind(&self) -> ParamKind {
        match self {
            KeysetParam::Seek(_) => ParamKind::Seek,
            KeysetParam::In(_) => ParamKind::In,
            KeysetParam::Where(_) => ParamKind::Where,
            KeysetParam::Intersect(_) => ParamKind::Intersect,
            KeysetParam::Null(_) => ParamKind::Null,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            KeysetParam::Seek(p) => &p.field,
            KeysetParam::In(p) | KeysetParam::Intersect(p) => &p.field,
            KeysetParam::Where(p) => &p.field,
            KeysetParam::Null(p) => &p.field,
        }
    }

    pub fn as_seek(&self) -> Option<&SeekParam> {
        match self {
            KeysetParam::Seek(p) => Some(p),
            _ => None,
        }
    }
}

/// Returns the params grouped by kind, keeping insertion order inside a kind.
pub fn grouped(params: &[KeysetParam]) -> Vec<&KeysetParam> {
    ParamKind::ALL
        .iter()
        .flat_map(|kind| params.iter().filter(move |p| p.kind() == *kind))
        .collect()
}
