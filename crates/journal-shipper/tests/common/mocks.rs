// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory CloudWatch Logs for integration tests

use async_trait::async_trait;
use journal_shipper::sink::{
    InputEvent, LogStream, LogsApi, SinkError, ALREADY_EXISTS_CODE, INVALID_SEQUENCE_TOKEN_CODE,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct StreamState {
    next_token: u64,
    events: Vec<InputEvent>,
}

#[derive(Debug, Default)]
struct State {
    groups: BTreeSet<String>,
    streams: BTreeMap<(String, String), StreamState>,
    failures: VecDeque<SinkError>,
    put_calls: usize,
}

/// Enforces sequence tokens the way the service does: the first submission
/// to a new stream carries no token, later ones the token returned by the
/// previous submission.
#[derive(Debug, Default)]
pub struct MockCloudWatch {
    state: Mutex<State>,
}

#[allow(dead_code)]
impl MockCloudWatch {
    fn expected(stream: &StreamState) -> Option<String> {
        (stream.next_token > 0).then(|| stream.next_token.to_string())
    }

    /// Fails the next `put_log_events` calls, in order.
    pub fn fail_next_puts(&self, errors: Vec<SinkError>) {
        self.state.lock().unwrap().failures.extend(errors);
    }

    /// Simulates another writer advancing the stream's token.
    pub fn advance_token(&self, group: &str, stream: &str) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .streams
            .entry((group.to_string(), stream.to_string()))
            .or_default();
        entry.next_token += 1;
    }

    pub fn events(&self, group: &str, stream: &str) -> Vec<InputEvent> {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(&(group.to_string(), stream.to_string()))
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }

    pub fn groups(&self) -> Vec<String> {
        self.state.lock().unwrap().groups.iter().cloned().collect()
    }

    pub fn streams(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().streams.keys().cloned().collect()
    }

    pub fn put_calls(&self) -> usize {
        self.state.lock().unwrap().put_calls
    }
}

#[async_trait]
impl LogsApi for MockCloudWatch {
    async fn create_log_group(&self, group: &str) -> Result<(), SinkError> {
        if self.state.lock().unwrap().groups.insert(group.to_string()) {
            Ok(())
        } else {
            Err(SinkError::from_code(ALREADY_EXISTS_CODE, "The specified log group already exists"))
        }
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        let key = (group.to_string(), stream.to_string());
        if state.streams.contains_key(&key) {
            return Err(SinkError::from_code(
                ALREADY_EXISTS_CODE,
                "The specified log stream already exists",
            ));
        }
        state.streams.insert(key, StreamState::default());
        Ok(())
    }

    async fn describe_log_stream(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<Option<LogStream>, SinkError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .streams
            .iter()
            .find(|((g, s), _)| g == group && s.starts_with(prefix))
            .map(|((_, name), stream)| LogStream {
                name: name.clone(),
                upload_sequence_token: Self::expected(stream),
            }))
    }

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: Vec<InputEvent>,
    ) -> Result<Option<String>, SinkError> {
        let mut state = self.state.lock().unwrap();
        state.put_calls += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        let Some(entry) = state
            .streams
            .get_mut(&(group.to_string(), stream.to_string()))
        else {
            return Err(SinkError::from_code(
                "ResourceNotFoundException",
                "The specified log stream does not exist.",
            ));
        };

        let expected = Self::expected(entry);
        if sequence_token.map(str::to_string) != expected {
            return Err(SinkError::from_code(
                INVALID_SEQUENCE_TOKEN_CODE,
                format!(
                    "The given sequenceToken is invalid. The next expected sequenceToken is: {}",
                    expected.as_deref().unwrap_or("null")
                ),
            ));
        }
        entry.events.extend(events);
        entry.next_token += 1;
        Ok(Self::expected(entry))
    }
}
