// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Journal records and their typed field values.
//!
//! A [`Record`] is one journal entry: an ordered map of field names to
//! [`FieldValue`]s, plus the two reserved fields every entry carries, the
//! cursor (`__CURSOR`) and the wall-clock timestamp (`__REALTIME_TIMESTAMP`).
//!
//! Journal export JSON carries every value as a string (or as an array for
//! binary and multi-valued fields). Well-known fields are converted to their
//! natural types the same way the journal's own client libraries do, so that
//! integers stay integers and identifiers stay UUIDs in the shipped payload.

use crate::errors::SourceError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const CURSOR_FIELD: &str = "__CURSOR";
pub const REALTIME_TIMESTAMP_FIELD: &str = "__REALTIME_TIMESTAMP";

const UUID_FIELDS: &[&str] = &["MESSAGE_ID", "_MACHINE_ID", "_BOOT_ID"];

const TIMESTAMP_FIELDS: &[&str] = &[
    REALTIME_TIMESTAMP_FIELD,
    "_SOURCE_REALTIME_TIMESTAMP",
    "COREDUMP_TIMESTAMP",
];

const INTEGER_FIELDS: &[&str] = &[
    "PRIORITY",
    "LEADER",
    "SESSION_ID",
    "USERSPACE_USEC",
    "INITRD_USEC",
    "KERNEL_USEC",
    "_UID",
    "_GID",
    "_PID",
    "SYSLOG_FACILITY",
    "SYSLOG_PID",
    "_AUDIT_SESSION",
    "_AUDIT_LOGINUID",
    "_SYSTEMD_SESSION",
    "_SYSTEMD_OWNER_UID",
    "CODE_LINE",
    "ERRNO",
    "EXIT_STATUS",
    "COREDUMP_PID",
    "COREDUMP_UID",
    "COREDUMP_GID",
    "COREDUMP_SESSION",
    "COREDUMP_SIGNAL",
];

/// A single typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    /// Binary blobs, multi-valued fields, monotonic clocks and anything else
    /// without a scalar representation. Never shipped.
    Other(serde_json::Value),
}

impl FieldValue {
    /// Converts a raw journal string into the type the field is known to carry.
    ///
    /// Unknown fields, and known fields whose content does not parse, stay strings.
    #[must_use]
    pub fn from_journal(key: &str, raw: &str) -> Self {
        if key == "__MONOTONIC_TIMESTAMP" || key == "_SOURCE_MONOTONIC_TIMESTAMP" {
            return FieldValue::Other(serde_json::Value::String(raw.to_string()));
        }
        if TIMESTAMP_FIELDS.contains(&key) {
            if let Some(ts) = raw
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_micros)
            {
                return FieldValue::Timestamp(ts);
            }
        } else if INTEGER_FIELDS.contains(&key) {
            if let Ok(n) = raw.parse::<i64>() {
                return FieldValue::Int(n);
            }
        } else if UUID_FIELDS.contains(&key) {
            if let Ok(id) = Uuid::parse_str(raw) {
                return FieldValue::Uuid(id);
            }
        }
        FieldValue::Str(raw.to_string())
    }

    /// Whether the value is carried into the shipped payload.
    #[must_use]
    pub fn is_serializable(&self) -> bool {
        !matches!(self, FieldValue::Other(_))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    cursor: String,
    timestamp: DateTime<Utc>,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates a record holding only the two reserved fields.
    pub fn new(cursor: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let cursor = cursor.into();
        let mut fields = BTreeMap::new();
        fields.insert(CURSOR_FIELD.to_string(), FieldValue::Str(cursor.clone()));
        fields.insert(
            REALTIME_TIMESTAMP_FIELD.to_string(),
            FieldValue::Timestamp(timestamp),
        );
        Record {
            cursor,
            timestamp,
            fields,
        }
    }

    /// Adds a field. Reserved fields cannot be overwritten this way.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let key = key.into();
        if key != CURSOR_FIELD && key != REALTIME_TIMESTAMP_FIELD {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Builds a record from a complete field map, which must contain both
    /// reserved fields with their expected types.
    pub fn from_fields(fields: BTreeMap<String, FieldValue>) -> Result<Self, SourceError> {
        let cursor = match fields.get(CURSOR_FIELD) {
            Some(FieldValue::Str(cursor)) => cursor.clone(),
            _ => return Err(SourceError::MissingField(CURSOR_FIELD)),
        };
        let timestamp = match fields.get(REALTIME_TIMESTAMP_FIELD) {
            Some(FieldValue::Timestamp(ts)) => *ts,
            _ => return Err(SourceError::MissingField(REALTIME_TIMESTAMP_FIELD)),
        };
        Ok(Record {
            cursor,
            timestamp,
            fields,
        })
    }

    /// Parses one line of `journalctl --output=json`.
    pub fn from_journal_json(line: &str) -> Result<Self, SourceError> {
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(line).map_err(|e| SourceError::Malformed(e.to_string()))?;

        let fields = object
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(raw) => FieldValue::from_journal(&key, &raw),
                    other => FieldValue::Other(other),
                };
                (key, value)
            })
            .collect();
        Self::from_fields(fields)
    }

    #[must_use]
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Returns the field as a string slice if it holds a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_journal_json() {
        let line = r#"{
            "__CURSOR": "s=abc;i=1",
            "__REALTIME_TIMESTAMP": "1700000000123456",
            "__MONOTONIC_TIMESTAMP": "12345",
            "_BOOT_ID": "0b3e4f1a2c5d4e6f8a9b0c1d2e3f4a5b",
            "_PID": "42",
            "MESSAGE": "hello",
            "BLOB": [1, 2, 3]
        }"#;
        let record = Record::from_journal_json(line).unwrap();

        assert_eq!(record.cursor(), "s=abc;i=1");
        assert_eq!(record.timestamp().timestamp_micros(), 1_700_000_000_123_456);
        assert_eq!(record.get("_PID"), Some(&FieldValue::Int(42)));
        assert_eq!(record.get_str("MESSAGE"), Some("hello"));
        assert!(matches!(record.get("_BOOT_ID"), Some(FieldValue::Uuid(_))));
        assert!(!record.get("BLOB").unwrap().is_serializable());
        assert!(!record.get("__MONOTONIC_TIMESTAMP").unwrap().is_serializable());
    }

    #[test]
    fn test_from_journal_json_missing_cursor() {
        let line = r#"{"__REALTIME_TIMESTAMP": "1700000000000000"}"#;
        assert!(matches!(
            Record::from_journal_json(line),
            Err(SourceError::MissingField(CURSOR_FIELD))
        ));
    }

    #[test]
    fn test_from_journal_json_malformed() {
        assert!(matches!(
            Record::from_journal_json("not json"),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn test_unparsable_known_field_stays_string() {
        assert_eq!(
            FieldValue::from_journal("_PID", "abc"),
            FieldValue::Str("abc".to_string())
        );
        assert_eq!(
            FieldValue::from_journal("_BOOT_ID", "not-a-uuid"),
            FieldValue::Str("not-a-uuid".to_string())
        );
    }

    #[test]
    fn test_with_field_keeps_reserved_fields() {
        let now = Utc::now();
        let record = Record::new("c1", now)
            .with_field("__CURSOR", "other")
            .with_field("a", 1i64);
        assert_eq!(record.cursor(), "c1");
        assert_eq!(record.get_str(CURSOR_FIELD), Some("c1"));
        assert_eq!(record.get("a"), Some(&FieldValue::Int(1)));
    }
}
