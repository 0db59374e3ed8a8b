use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

const SCALE: u32 = 5;
const FACTOR: i64 = 100_000;

/// A schema version such as `0.4` or `50.2`.
///
/// Stored as a fixed-point integer with five decimals, matching the
/// `numeric(10,5)` column it is persisted in, so ordering and equality are
/// exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion(i64);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid schema version `{0}`")]
pub struct InvalidVersion(pub String);

impl SchemaVersion {
    pub const ZERO: SchemaVersion = SchemaVersion(0);

    pub fn from_scaled(scaled: i64) -> Self {
        SchemaVersion(scaled)
    }

    pub fn scaled(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, SCALE)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, InvalidVersion> {
        let mut rescaled = value;
        rescaled.rescale(SCALE);
        if rescaled != value || rescaled.is_sign_negative() {
            return Err(InvalidVersion(value.to_string()));
        }
        i64::try_from(rescaled.mantissa())
            .map(SchemaVersion)
            .map_err(|_| InvalidVersion(value.to_string()))
    }
}

impl FromStr for SchemaVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersion(s.to_string());
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > SCALE as usize || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<5}").parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(FACTOR)
            .and_then(|w| w.checked_add(frac))
            .map(SchemaVersion)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / FACTOR;
        let frac = format!("{:05}", self.0 % FACTOR);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            write!(f, "{whole}.0")
        } else {
            write!(f, "{whole}.{frac}")
        }
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = InvalidVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(value: SchemaVersion) -> Self {
        value.to_string()
    }
}

/// One row of the version ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: SchemaVersion,
    pub deploy_start: DateTime<Utc>,
    /// Set once the migration to `version` finished. `None` while in flight.
    pub deployed_at: Option<DateTime<Utc>>,
    pub payload: Option<serde_json::Value>,
}

impl VersionRecord {
    pub fn is_deployed(&self) -> bool {
        self.deployed_at.is_some()
    }
}
