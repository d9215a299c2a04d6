// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolves each record to the log group and log stream it is shipped to.
//!
//! Plain template alternatives name record fields, falling back to an
//! environment variable of the same name. `$` alternatives are derived
//! variables, looked up in order in:
//!
//! 1. the instance identity document (`$instanceId`, `$region`, ...)
//! 2. journal convenience variables (`$unit`, `$docker_container`)
//! 3. the process environment (`$HOSTNAME`, ...)

use crate::errors::RoutingError;
use crate::identity::IdentityDocument;
use crate::record::{FieldValue, Record};
use crate::template::{Lookup, Template, Value};
use std::borrow::Cow;
use std::env;
use std::fmt;
use std::sync::Arc;

const USER_UNIT_FIELD: &str = "USER_UNIT";
const SYSTEMD_UNIT_FIELD: &str = "_SYSTEMD_UNIT";
const CONTAINER_NAME_FIELD: &str = "CONTAINER_NAME";
const DOCKER_UNIT: &str = "docker.service";

/// Where a record is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub group: String,
    pub stream: String,
}

impl Destination {
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Destination {
            group: group.into(),
            stream: stream.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.stream)
    }
}

/// Strips the instance parameter from a templated unit name:
/// `sshd@127.0.0.1:22.service` becomes `sshd.service`.
#[must_use]
pub fn normalize_unit(unit: &str) -> Cow<'_, str> {
    match unit.split_once('@') {
        Some((base, instance)) => match instance.rsplit_once('.') {
            Some((_, suffix)) => Cow::Owned(format!("{base}.{suffix}")),
            None => Cow::Borrowed(base),
        },
        None => Cow::Borrowed(unit),
    }
}

fn env_value(name: &str) -> Option<Value<'static>> {
    if name.is_empty() || name.contains(['=', '\0']) {
        return None;
    }
    env::var(name).ok().map(|v| Value::Str(Cow::Owned(v)))
}

fn field_value(value: &FieldValue) -> Option<Value<'_>> {
    match value {
        FieldValue::Str(s) => Some(Value::Str(Cow::Borrowed(s))),
        FieldValue::Int(n) => Some(Value::Int(*n)),
        FieldValue::Bool(b) => Some(Value::Str(Cow::Borrowed(if *b { "true" } else { "false" }))),
        FieldValue::Uuid(id) => Some(Value::Str(Cow::Owned(id.hyphenated().to_string()))),
        FieldValue::Timestamp(ts) => Some(Value::Str(Cow::Owned(ts.to_rfc3339()))),
        FieldValue::Other(_) => None,
    }
}

struct RecordLookup<'a> {
    record: &'a Record,
    identity: &'a IdentityDocument,
}

impl RecordLookup<'_> {
    fn journal_variable(&self, name: &str) -> Option<Value<'_>> {
        match name {
            "unit" => self
                .record
                .get_str(USER_UNIT_FIELD)
                .or_else(|| self.record.get_str(SYSTEMD_UNIT_FIELD))
                .map(|unit| Value::Str(normalize_unit(unit))),
            "docker_container" => {
                if self.record.get_str(SYSTEMD_UNIT_FIELD) == Some(DOCKER_UNIT) {
                    self.record
                        .get_str(CONTAINER_NAME_FIELD)
                        .map(|name| Value::Str(Cow::Borrowed(name)))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl Lookup for RecordLookup<'_> {
    fn field(&self, name: &str) -> Option<Value<'_>> {
        match self.record.get(name) {
            Some(value) => field_value(value),
            None => env_value(name),
        }
    }

    fn derived(&self, name: &str) -> Option<Value<'_>> {
        self.identity
            .get(name)
            .map(Value::Str)
            .or_else(|| self.journal_variable(name))
            .or_else(|| env_value(name))
    }
}

/// Renders one template against one record.
pub fn resolve(
    template: &Template,
    record: &Record,
    identity: &IdentityDocument,
) -> Result<String, RoutingError> {
    template.render(&RecordLookup { record, identity }, &[])
}

/// Resolves records to destinations using the configured group and stream
/// templates.
#[derive(Debug, Clone)]
pub struct DestinationFormatter {
    group: Template,
    stream: Template,
    identity: Arc<IdentityDocument>,
}

impl DestinationFormatter {
    #[must_use]
    pub fn new(group: Template, stream: Template, identity: Arc<IdentityDocument>) -> Self {
        DestinationFormatter {
            group,
            stream,
            identity,
        }
    }

    pub fn resolve(&self, record: &Record) -> Result<Destination, RoutingError> {
        Ok(Destination {
            group: resolve(&self.group, record, &self.identity)?,
            stream: resolve(&self.stream, record, &self.identity)?,
        })
    }
}
