// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Upload sequence tokens for the streams of one log group.
//!
//! A stream's entry is either missing (unknown, looked up on next use) or
//! known, holding the token to send next or `None` when the next submission
//! must omit it.

use crate::sink::{ignore_already_exists, LogsApi, SinkError};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// The token the service expects next, as reported in an
/// `InvalidSequenceTokenException` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedToken {
    Token(String),
    /// The service reported `null`: the next submission sends no token.
    Absent,
    /// The message carried no token.
    Unknown,
}

#[allow(clippy::expect_used)]
fn expected_token_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"sequenceToken[^:]*:\s*(\S+)").expect("failed creating regex")
    })
}

#[must_use]
pub fn parse_expected_token(message: &str) -> ExpectedToken {
    match expected_token_regex()
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    {
        Some("null") => ExpectedToken::Absent,
        Some(token) => ExpectedToken::Token(token.to_string()),
        None => ExpectedToken::Unknown,
    }
}

#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: HashMap<String, Option<String>>,
}

impl TokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for the next submission to `stream`.
    ///
    /// An unknown stream is looked up by name prefix. If no stream with
    /// exactly that name exists it is created, and the first submission
    /// carries no token.
    pub async fn get(
        &mut self,
        api: &dyn LogsApi,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, SinkError> {
        if let Some(token) = self.tokens.get(stream) {
            return Ok(token.clone());
        }

        let token = match api.describe_log_stream(group, stream).await? {
            Some(found) if found.name == stream => found.upload_sequence_token,
            _ => {
                debug!("DELIVERY | Creating log stream {group}/{stream}");
                ignore_already_exists(api.create_log_stream(group, stream).await)?;
                None
            }
        };
        self.tokens.insert(stream.to_string(), token.clone());
        Ok(token)
    }

    /// Records the token returned by a successful submission.
    pub fn update(&mut self, stream: &str, next_token: Option<String>) {
        self.tokens.insert(stream.to_string(), next_token);
    }

    /// Recovers from a rejected token using the error message.
    pub fn invalidate(&mut self, stream: &str, message: &str) {
        match parse_expected_token(message) {
            ExpectedToken::Token(token) => {
                self.tokens.insert(stream.to_string(), Some(token));
            }
            ExpectedToken::Absent => {
                self.tokens.insert(stream.to_string(), None);
            }
            ExpectedToken::Unknown => {
                self.tokens.remove(stream);
            }
        }
    }

    /// The cached state of a stream: `None` when unknown.
    #[must_use]
    pub fn cached(&self, stream: &str) -> Option<Option<&str>> {
        self.tokens.get(stream).map(Option::as_deref)
    }
}
