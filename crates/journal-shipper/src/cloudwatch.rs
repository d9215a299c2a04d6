// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`LogsApi`] backed by the AWS SDK CloudWatch Logs client.

use crate::sink::{InputEvent, LogStream, LogsApi, SinkError, SinkErrorKind};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use aws_sdk_cloudwatchlogs::Client;
use tracing::debug;

/// Maps an SDK failure onto the sink taxonomy. Failures without a service code
/// (dispatch, timeout, construction) are not retried.
fn sink_error<E, R>(err: SdkError<E, R>) -> SinkError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.code() {
        Some(code) => SinkError::from_code(code, err.message().unwrap_or_default()),
        None => SinkError::new(
            SinkErrorKind::Other,
            "SdkError",
            DisplayErrorContext(&err).to_string(),
        ),
    }
}

#[derive(Debug, Clone)]
pub struct CloudWatchLogs {
    client: Client,
}

impl CloudWatchLogs {
    /// Loads credentials from the default provider chain.
    pub async fn new(region: Option<String>, endpoint_url: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        if let Some(ref endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;
        debug!(
            "CLOUDWATCH | Client configured for region {:?}",
            sdk_config.region()
        );
        CloudWatchLogs {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl LogsApi for CloudWatchLogs {
    async fn create_log_group(&self, group: &str) -> Result<(), SinkError> {
        self.client
            .create_log_group()
            .log_group_name(group)
            .send()
            .await
            .map(|_| ())
            .map_err(sink_error)
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        self.client
            .create_log_stream()
            .log_group_name(group)
            .log_stream_name(stream)
            .send()
            .await
            .map(|_| ())
            .map_err(sink_error)
    }

    async fn describe_log_stream(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<Option<LogStream>, SinkError> {
        let output = self
            .client
            .describe_log_streams()
            .log_group_name(group)
            .log_stream_name_prefix(prefix)
            .limit(1)
            .send()
            .await
            .map_err(sink_error)?;

        Ok(output.log_streams().first().and_then(|stream| {
            stream.log_stream_name().map(|name| LogStream {
                name: name.to_string(),
                upload_sequence_token: stream.upload_sequence_token().map(str::to_string),
            })
        }))
    }

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: Vec<InputEvent>,
    ) -> Result<Option<String>, SinkError> {
        let events = events
            .into_iter()
            .map(|event| {
                InputLogEvent::builder()
                    .timestamp(event.timestamp)
                    .message(event.message)
                    .build()
                    .map_err(|e| SinkError::new(SinkErrorKind::Other, "BuildError", e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .put_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .set_sequence_token(sequence_token.map(str::to_string))
            .set_log_events(Some(events))
            .send()
            .await
            .map_err(sink_error)?;

        if let Some(rejected) = output.rejected_log_events_info() {
            debug!("CLOUDWATCH | Events rejected for {group}/{stream}: {rejected:?}");
        }
        Ok(output.next_sequence_token().map(str::to_string))
    }
}
