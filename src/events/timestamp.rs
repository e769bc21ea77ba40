//! Serde helpers for event timestamps.
//!
//! Outbound timestamps are always RFC 3339. Inbound timestamps may come from workers that emit
//! naive ISO-8601 values (no offset); those are read as UTC.

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Parse an RFC 3339 timestamp, falling back to a naive ISO-8601 value interpreted as UTC.
pub fn parse_lenient(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let trimmed = value.trim();
    match OffsetDateTime::parse(trimmed, &Rfc3339) {
        Ok(parsed) => Ok(parsed),
        Err(_) => PrimitiveDateTime::parse(trimmed, &Iso8601::DEFAULT).map(|naive| naive.assume_utc()),
    }
}

/// Format a timestamp as RFC 3339.
pub fn format_rfc3339(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Serialize a required timestamp.
pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_rfc3339(*value))
}

/// Deserialize a required timestamp.
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_lenient(&raw).map_err(D::Error::custom)
}

/// Variant of the helpers for optional timestamps.
pub mod option {
    use super::*;

    /// Serialize an optional timestamp, emitting `null` when absent.
    pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&format_rfc3339(*ts)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional timestamp; blank strings count as absent.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => {
                parse_lenient(&raw).map(Some).map_err(D::Error::custom)
            }
            _ => Ok(None),
        }
    }
}
