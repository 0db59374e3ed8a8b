//! Migration file name grammar:
//! `<base>[.v<major>[.<minor>]][.pre|.post|.snap].sql`.

use crate::migration::CatalogError;
use model::migration::{script::ScriptKind, version::SchemaVersion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub base_name: String,
    pub version: Option<SchemaVersion>,
    pub kind: ScriptKind,
}

/// Parses a (possibly nested) `.sql` path relative to the catalog root.
///
/// A version without a marker is a pre migration. A file with neither is
/// idempotent.
pub fn parse(filename: &str) -> Result<ParsedName, CatalogError> {
    let invalid = |reason: &'static str| CatalogError::InvalidFileName {
        filename: filename.to_string(),
        reason,
    };

    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = name
        .strip_suffix(".sql")
        .ok_or_else(|| invalid("not a .sql file"))?;

    let mut segments: Vec<&str> = stem.split('.').collect();

    let marker = match segments.last().copied() {
        Some("pre") => Some(ScriptKind::Pre),
        Some("post") => Some(ScriptKind::Post),
        Some("snap") => Some(ScriptKind::Snap),
        _ => None,
    };
    if marker.is_some() {
        segments.pop();
    }

    let version = take_version(&mut segments).map_err(invalid)?;

    if segments.iter().skip(1).any(|s| is_version_token(s)) {
        return Err(invalid("version token must directly precede the marker"));
    }
    let base_name = segments.join(".");
    if base_name.is_empty() {
        return Err(invalid("missing base name"));
    }

    let kind = match (version, marker) {
        (None, Some(_)) => return Err(invalid("pre/post/snap marker without a version")),
        (None, None) => ScriptKind::Idempotent,
        (Some(_), marker) => marker.unwrap_or(ScriptKind::Pre),
    };

    Ok(ParsedName {
        base_name,
        version,
        kind,
    })
}

/// Pops a trailing `v<major>` or `v<major>.<minor>` off `segments`.
fn take_version(segments: &mut Vec<&str>) -> Result<Option<SchemaVersion>, &'static str> {
    let n = segments.len();
    let (text, consumed) = if n >= 3 && is_version_token(segments[n - 2]) && is_digits(segments[n - 1])
    {
        (format!("{}.{}", &segments[n - 2][1..], segments[n - 1]), 2)
    } else if n >= 2 && is_version_token(segments[n - 1]) {
        (segments[n - 1][1..].to_string(), 1)
    } else {
        return Ok(None);
    };

    let version = text.parse().map_err(|_| "version out of range")?;
    segments.truncate(n - consumed);
    Ok(Some(version))
}

fn is_version_token(segment: &str) -> bool {
    segment.strip_prefix('v').is_some_and(is_digits)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
