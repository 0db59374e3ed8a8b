use crate::records::row::RowData;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total_count: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// A result row paired with the cursor that resumes right after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    #[serde(serialize_with = "row_as_object")]
    pub node: RowData,
    pub cursor: String,
}

/// One page of a keyset query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysetConnection {
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
}

impl KeysetConnection {
    pub fn rows(&self) -> impl Iterator<Item = &RowData> {
        self.edges.iter().map(|e| &e.node)
    }

    pub fn start_cursor(&self) -> Option<&str> {
        self.edges.first().map(|e| e.cursor.as_str())
    }

    pub fn end_cursor(&self) -> Option<&str> {
        self.edges.last().map(|e| e.cursor.as_str())
    }
}

fn row_as_object<S: Serializer>(row: &RowData, serializer: S) -> Result<S::Ok, S::Error> {
    row.to_json().serialize(serializer)
}
