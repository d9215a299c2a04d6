// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log sink surface: the four CloudWatch Logs operations the shipper uses
//! and the error taxonomy that drives its recovery.

use async_trait::async_trait;
use std::fmt;

pub const ALREADY_EXISTS_CODE: &str = "ResourceAlreadyExistsException";
pub const THROTTLED_CODE: &str = "ThrottlingException";
pub const OPERATION_ABORTED_CODE: &str = "OperationAbortedException";
pub const INVALID_SEQUENCE_TOKEN_CODE: &str = "InvalidSequenceTokenException";

/// One event of a `PutLogEvents` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub message: String,
}

/// A log stream as returned by `DescribeLogStreams`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStream {
    pub name: String,
    pub upload_sequence_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    AlreadyExists,
    Throttled,
    OperationAborted,
    InvalidSequenceToken,
    Other,
}

impl SinkErrorKind {
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            ALREADY_EXISTS_CODE => SinkErrorKind::AlreadyExists,
            THROTTLED_CODE => SinkErrorKind::Throttled,
            OPERATION_ABORTED_CODE => SinkErrorKind::OperationAborted,
            INVALID_SEQUENCE_TOKEN_CODE => SinkErrorKind::InvalidSequenceToken,
            _ => SinkErrorKind::Other,
        }
    }

    /// Whether delivery retries after this error instead of aborting.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            SinkErrorKind::Throttled
                | SinkErrorKind::OperationAborted
                | SinkErrorKind::InvalidSequenceToken
        )
    }
}

/// An error returned by the sink, keeping the service code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    kind: SinkErrorKind,
    code: String,
    message: String,
}

impl SinkError {
    pub fn new(kind: SinkErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        SinkError {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Classifies a service error by its code.
    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        SinkError {
            kind: SinkErrorKind::from_code(&code),
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SinkErrorKind {
        self.kind
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for SinkError {}

/// The CloudWatch Logs operations used for delivery.
#[async_trait]
pub trait LogsApi: Send + Sync {
    async fn create_log_group(&self, group: &str) -> Result<(), SinkError>;

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError>;

    /// First stream of `group` whose name starts with `prefix`.
    async fn describe_log_stream(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<Option<LogStream>, SinkError>;

    /// Submits events and returns the next sequence token.
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: Vec<InputEvent>,
    ) -> Result<Option<String>, SinkError>;
}

/// Treats "already exists" as success for create calls.
pub fn ignore_already_exists(result: Result<(), SinkError>) -> Result<(), SinkError> {
    match result {
        Err(e) if e.kind() == SinkErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}
