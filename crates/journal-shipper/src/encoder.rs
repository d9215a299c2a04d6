// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Encodes records into CloudWatch Logs input events.
//!
//! The event message is the record serialized as a JSON object. Values that
//! have no JSON form (binary fields, multi-valued fields, monotonic clocks)
//! are dropped; UUIDs become hyphenated strings and timestamps become
//! fractional seconds since the epoch.

use crate::record::{FieldValue, Record};
use crate::sink::InputEvent;

/// JSON form of a field value, `None` for values that are not shipped.
#[must_use]
pub fn encode_value(value: &FieldValue) -> Option<serde_json::Value> {
    match value {
        FieldValue::Str(s) => Some(serde_json::Value::String(s.clone())),
        FieldValue::Int(n) => Some(serde_json::Value::from(*n)),
        FieldValue::Bool(b) => Some(serde_json::Value::Bool(*b)),
        FieldValue::Uuid(id) => Some(serde_json::Value::String(id.hyphenated().to_string())),
        #[allow(clippy::cast_precision_loss)]
        FieldValue::Timestamp(ts) => Some(serde_json::Value::from(
            ts.timestamp_micros() as f64 / 1_000_000.0,
        )),
        FieldValue::Other(_) => None,
    }
}

/// Encodes the serializable fields of a record as a JSON object string.
#[must_use]
pub fn encode_message(record: &Record) -> String {
    let object: serde_json::Map<String, serde_json::Value> = record
        .fields()
        .iter()
        .filter_map(|(key, value)| encode_value(value).map(|v| (key.clone(), v)))
        .collect();
    serde_json::Value::Object(object).to_string()
}

#[must_use]
pub fn encode_event(record: &Record) -> InputEvent {
    InputEvent {
        timestamp: record.timestamp().timestamp_millis(),
        message: encode_message(record),
    }
}
