// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc, time::Duration};
use tracing::{debug, error, info};

use journal_shipper::{
    checkpoint::Checkpoint,
    cloudwatch::CloudWatchLogs,
    config::Config,
    delivery::DeliveryClient,
    errors::ShipperError,
    formatter::DestinationFormatter,
    identity::{IdentityDocument, IdentityProvider, DEFAULT_METADATA_ENDPOINT},
    logger,
    pipeline::Shipper,
};

const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("JOURNALD_CW_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = match logger::env_filter(&log_level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Invalid log level '{log_level}': {e}");
            process::exit(1);
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .event_format(logger::Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {e}");
        process::exit(1);
    }

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on startup: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("Shipping stopped: {e}");
        process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), ShipperError> {
    let group = config.group_template()?;
    let stream = config.stream_template()?;

    let identity = IdentityProvider::new(DEFAULT_METADATA_ENDPOINT, METADATA_TIMEOUT);
    let document = if group.uses_derived() || stream.uses_derived() {
        identity.document().await
    } else {
        Arc::new(IdentityDocument::default())
    };
    let region = identity.region().await;
    let api = Arc::new(CloudWatchLogs::new(region, config.endpoint_url.clone()).await);

    let checkpoint = Checkpoint::new(config.cursor_path.clone());
    let cursor = checkpoint.load()?;
    match &cursor {
        Some(cursor) => info!("Resuming after cursor {cursor}"),
        None => info!("No checkpoint found, starting at the retention boundary"),
    }
    let reader = config
        .journal_source()
        .open(cursor.as_deref(), chrono::Utc::now())?;

    let mut shipper = Shipper::new(
        reader,
        DestinationFormatter::new(group, stream, document),
        DeliveryClient::new(api, config.throttle_backoff),
        checkpoint,
        config.max_pending,
    );
    shipper.run().await
}
