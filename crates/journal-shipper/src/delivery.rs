// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivers batches to CloudWatch Logs and advances the checkpoint.
//!
//! Each log group gets a [`LogGroupHandle`] the first time it is seen. The
//! handle provisions the group once and owns the sequence tokens of its
//! streams. Transient sink errors are retried without limit; any other error
//! aborts delivery and leaves the checkpoint where it was.

use crate::checkpoint::Checkpoint;
use crate::encoder::encode_event;
use crate::errors::ShipperError;
use crate::formatter::Destination;
use crate::segmenter::Batch;
use crate::sequence_token::TokenStore;
use crate::sink::{ignore_already_exists, InputEvent, LogsApi, SinkError, SinkErrorKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_THROTTLE_BACKOFF: Duration = Duration::from_secs(1);

/// Per log group state.
#[derive(Debug)]
pub struct LogGroupHandle {
    name: String,
    provisioned: bool,
    tokens: TokenStore,
}

impl LogGroupHandle {
    pub fn new(name: impl Into<String>) -> Self {
        LogGroupHandle {
            name: name.into(),
            provisioned: false,
            tokens: TokenStore::new(),
        }
    }

    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Creates the group unless this handle already did.
    pub async fn ensure_group(&mut self, api: &dyn LogsApi) -> Result<(), SinkError> {
        if self.provisioned {
            return Ok(());
        }
        debug!("DELIVERY | Creating log group {}", self.name);
        ignore_already_exists(api.create_log_group(&self.name).await)?;
        self.provisioned = true;
        Ok(())
    }

    async fn submit(
        &mut self,
        api: &dyn LogsApi,
        stream: &str,
        events: Vec<InputEvent>,
    ) -> Result<(), SinkError> {
        let token = self.tokens.get(api, &self.name, stream).await?;
        let next = api
            .put_log_events(&self.name, stream, token.as_deref(), events)
            .await?;
        self.tokens.update(stream, next);
        Ok(())
    }
}

pub struct DeliveryClient {
    api: Arc<dyn LogsApi>,
    handles: HashMap<String, LogGroupHandle>,
    throttle_backoff: Duration,
}

impl DeliveryClient {
    #[must_use]
    pub fn new(api: Arc<dyn LogsApi>, throttle_backoff: Duration) -> Self {
        DeliveryClient {
            api,
            handles: HashMap::new(),
            throttle_backoff,
        }
    }

    #[must_use]
    pub fn handle(&self, group: &str) -> Option<&LogGroupHandle> {
        self.handles.get(group)
    }

    /// Submits one batch, retrying transient failures, then saves the cursor
    /// of its last record.
    pub async fn deliver(
        &mut self,
        destination: &Destination,
        batch: &Batch,
        checkpoint: &Checkpoint,
    ) -> Result<(), ShipperError> {
        let Some(cursor) = batch.last_cursor() else {
            return Ok(());
        };

        let api = self.api.as_ref();
        let handle = self
            .handles
            .entry(destination.group.clone())
            .or_insert_with(|| LogGroupHandle::new(destination.group.clone()));
        handle.ensure_group(api).await?;

        let events: Vec<InputEvent> = batch.records().iter().map(encode_event).collect();
        let stream = destination.stream.as_str();
        loop {
            let Err(e) = handle.submit(api, stream, events.clone()).await else {
                break;
            };
            match e.kind() {
                SinkErrorKind::Throttled => {
                    debug!(
                        "DELIVERY | Throttled on {destination}, retrying in {:?}",
                        self.throttle_backoff
                    );
                    tokio::time::sleep(self.throttle_backoff).await;
                }
                SinkErrorKind::InvalidSequenceToken => {
                    debug!("DELIVERY | Invalid sequence token on {destination}: {e}");
                    handle.tokens.invalidate(stream, e.message());
                }
                kind if kind.is_transient() => {
                    debug!("DELIVERY | {e} on {destination}, retrying");
                }
                _ => {
                    warn!("DELIVERY | Failed to deliver to {destination}: {e}");
                    return Err(e.into());
                }
            }
        }

        checkpoint.save(cursor)?;
        debug!(
            "DELIVERY | Delivered {} events to {destination}",
            batch.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::segmenter::chunk;
    use crate::sink::{LogStream, INVALID_SEQUENCE_TOKEN_CODE, THROTTLED_CODE};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct ScriptedApi {
        group_result: Mutex<Option<SinkError>>,
        put_results: Mutex<VecDeque<Result<Option<String>, SinkError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn with_puts(results: Vec<Result<Option<String>, SinkError>>) -> Self {
            ScriptedApi {
                put_results: Mutex::new(results.into()),
                ..ScriptedApi::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogsApi for ScriptedApi {
        async fn create_log_group(&self, group: &str) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(format!("create_group {group}"));
            match self.group_result.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn create_log_stream(&self, _group: &str, stream: &str) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(format!("create_stream {stream}"));
            Ok(())
        }

        async fn describe_log_stream(
            &self,
            _group: &str,
            prefix: &str,
        ) -> Result<Option<LogStream>, SinkError> {
            self.calls.lock().unwrap().push(format!("describe {prefix}"));
            Ok(None)
        }

        async fn put_log_events(
            &self,
            _group: &str,
            stream: &str,
            sequence_token: Option<&str>,
            events: Vec<InputEvent>,
        ) -> Result<Option<String>, SinkError> {
            self.calls.lock().unwrap().push(format!(
                "put {stream} {} {}",
                sequence_token.unwrap_or("-"),
                events.len()
            ));
            self.put_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    fn batch(prefix: &str, n: usize) -> Batch {
        let now = Utc::now();
        let records = (0..n).map(|i| Record::new(format!("{prefix}{i}"), now)).collect();
        chunk(records).into_iter().next().unwrap()
    }

    fn setup(api: ScriptedApi) -> (Arc<ScriptedApi>, DeliveryClient, Checkpoint, TempDir) {
        let api = Arc::new(api);
        let client = DeliveryClient::new(api.clone(), Duration::from_millis(1));
        let dir = TempDir::new().unwrap();
        let checkpoint = Checkpoint::new(dir.path().join("cursor"));
        (api, client, checkpoint, dir)
    }

    #[tokio::test]
    async fn test_deliver_provisions_once_and_tracks_tokens() {
        let (api, mut client, checkpoint, _dir) = setup(ScriptedApi::with_puts(vec![
            Ok(Some("T1".to_string())),
            Ok(Some("T2".to_string())),
        ]));
        let destination = Destination::new("group", "stream");

        client.deliver(&destination, &batch("a", 3), &checkpoint).await.unwrap();
        client.deliver(&destination, &batch("b", 2), &checkpoint).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                "create_group group",
                "describe stream",
                "create_stream stream",
                "put stream - 3",
                "put stream T1 2",
            ]
        );
        assert_eq!(checkpoint.load().unwrap().as_deref(), Some("b1"));
        let handle = client.handle("group").unwrap();
        assert!(handle.is_provisioned());
        assert_eq!(handle.tokens().cached("stream"), Some(Some("T2")));
    }

    #[tokio::test]
    async fn test_group_already_exists_is_ignored() {
        let api = ScriptedApi::default();
        *api.group_result.lock().unwrap() = Some(SinkError::from_code(
            crate::sink::ALREADY_EXISTS_CODE,
            "exists",
        ));
        let (_api, mut client, checkpoint, _dir) = setup(api);

        client
            .deliver(&Destination::new("g", "s"), &batch("a", 1), &checkpoint)
            .await
            .unwrap();
        assert_eq!(checkpoint.load().unwrap().as_deref(), Some("a0"));
    }

    #[tokio::test]
    async fn test_group_creation_failure_is_fatal() {
        let api = ScriptedApi::default();
        *api.group_result.lock().unwrap() =
            Some(SinkError::from_code("AccessDeniedException", "denied"));
        let (api, mut client, checkpoint, _dir) = setup(api);

        let result = client
            .deliver(&Destination::new("g", "s"), &batch("a", 1), &checkpoint)
            .await;
        assert!(matches!(result, Err(ShipperError::Sink(_))));
        assert_eq!(api.calls(), vec!["create_group g"]);
        assert_eq!(checkpoint.load().unwrap(), None);
        assert!(!client.handle("g").unwrap().is_provisioned());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_transient_errors_are_retried() {
        let (api, mut client, checkpoint, _dir) = setup(ScriptedApi::with_puts(vec![
            Err(SinkError::from_code(THROTTLED_CODE, "Rate exceeded")),
            Err(SinkError::from_code("OperationAbortedException", "busy")),
            Ok(Some("T1".to_string())),
        ]));

        client
            .deliver(&Destination::new("g", "s"), &batch("a", 2), &checkpoint)
            .await
            .unwrap();
        let puts = api.calls().into_iter().filter(|c| c.starts_with("put")).count();
        assert_eq!(puts, 3);
        assert_eq!(checkpoint.load().unwrap().as_deref(), Some("a1"));
        assert!(logs_contain("Throttled on g/s"));
        assert!(logs_contain("OperationAbortedException: busy on g/s, retrying"));
    }

    #[tokio::test]
    async fn test_invalid_token_recovery() {
        let (api, mut client, checkpoint, _dir) = setup(ScriptedApi::with_puts(vec![
            Err(SinkError::from_code(
                INVALID_SEQUENCE_TOKEN_CODE,
                "The given sequenceToken is invalid. The next expected sequenceToken is: T1",
            )),
            Err(SinkError::from_code(
                INVALID_SEQUENCE_TOKEN_CODE,
                "The next expected sequenceToken is: null",
            )),
            Err(SinkError::from_code(INVALID_SEQUENCE_TOKEN_CODE, "garbled")),
            Ok(None),
        ]));

        client
            .deliver(&Destination::new("g", "s"), &batch("a", 1), &checkpoint)
            .await
            .unwrap();
        assert_eq!(
            api.calls(),
            vec![
                "create_group g",
                "describe s",
                "create_stream s",
                "put s - 1",
                "put s T1 1",
                "put s - 1",
                // unparsable message: fresh lookup
                "describe s",
                "create_stream s",
                "put s - 1",
            ]
        );
    }

    #[tokio::test]
    async fn test_fatal_error_keeps_checkpoint() {
        let (_api, mut client, checkpoint, _dir) = setup(ScriptedApi::with_puts(vec![
            Ok(Some("T1".to_string())),
            Err(SinkError::from_code("DataAlreadyAcceptedException", "dup")),
        ]));
        let destination = Destination::new("g", "s");

        client.deliver(&destination, &batch("a", 2), &checkpoint).await.unwrap();
        let result = client.deliver(&destination, &batch("b", 2), &checkpoint).await;

        match result {
            Err(ShipperError::Sink(e)) => assert_eq!(e.code(), "DataAlreadyAcceptedException"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(checkpoint.load().unwrap().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_separate_groups_get_separate_handles() {
        let (api, mut client, checkpoint, _dir) = setup(ScriptedApi::default());

        client
            .deliver(&Destination::new("g1", "s"), &batch("a", 1), &checkpoint)
            .await
            .unwrap();
        client
            .deliver(&Destination::new("g2", "s"), &batch("b", 1), &checkpoint)
            .await
            .unwrap();

        let groups: Vec<_> = api
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("create_group"))
            .collect();
        assert_eq!(groups, vec!["create_group g1", "create_group g2"]);
        assert!(client.handle("g1").is_some());
        assert!(client.handle("g2").is_some());
    }
}
