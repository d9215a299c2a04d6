// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The shipping loop: pull, segment, deliver, wait.

use crate::checkpoint::Checkpoint;
use crate::delivery::DeliveryClient;
use crate::errors::ShipperError;
use crate::formatter::DestinationFormatter;
use crate::journal::JournalReader;
use crate::record::Record;
use crate::segmenter::{chunk, Run, Segmenter};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub const DEFAULT_MAX_PENDING: usize = 1000;

pub struct Shipper<R> {
    reader: R,
    formatter: DestinationFormatter,
    delivery: DeliveryClient,
    checkpoint: Checkpoint,
    max_pending: usize,
}

impl<R: JournalReader> Shipper<R> {
    #[must_use]
    pub fn new(
        reader: R,
        formatter: DestinationFormatter,
        delivery: DeliveryClient,
        checkpoint: Checkpoint,
        max_pending: usize,
    ) -> Self {
        Shipper {
            reader,
            formatter,
            delivery,
            checkpoint,
            max_pending: max_pending.max(1),
        }
    }

    /// Ships until a fatal error. Never returns `Ok` on its own: the journal
    /// is followed indefinitely.
    pub async fn run(&mut self) -> Result<(), ShipperError> {
        info!(
            "SHIPPER | Shipping journal, checkpoint at {}",
            self.checkpoint.path().display()
        );
        loop {
            if self.step().await? {
                self.reader.wait().await?;
            }
        }
    }

    /// One pass over the records available now. Returns whether the reader
    /// is caught up.
    pub async fn step(&mut self) -> Result<bool, ShipperError> {
        let mut records = Vec::new();
        let mut caught_up = false;
        while records.len() < self.max_pending {
            match self.reader.next_entry() {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    caught_up = true;
                    break;
                }
                Err(e) if records.is_empty() => return Err(e.into()),
                // ship what was pulled, the error resurfaces on the next pull
                Err(e) => {
                    debug!("SHIPPER | Journal source stopped mid pass: {e}");
                    caught_up = true;
                    break;
                }
            }
        }
        if !records.is_empty() {
            self.ship(records, Utc::now()).await?;
        }
        Ok(caught_up)
    }

    /// Delivers records in order, returning the number of batches sent.
    ///
    /// Runs are delivered as soon as they close. A record that cannot be
    /// routed stops the pass after everything before its run was shipped.
    pub async fn ship(
        &mut self,
        records: Vec<Record>,
        now: DateTime<Utc>,
    ) -> Result<usize, ShipperError> {
        let pulled = records.len();
        let mut segmenter = Segmenter::new(now);
        let mut batches = 0;
        for record in records {
            let formatter = &self.formatter;
            let closed = segmenter.push(record, |r| formatter.resolve(r))?;
            if let Some(run) = closed {
                batches += self.deliver_run(run).await?;
            }
        }
        if let Some(run) = segmenter.finish() {
            batches += self.deliver_run(run).await?;
        }
        debug!("SHIPPER | Shipped {pulled} records in {batches} batches");
        Ok(batches)
    }

    async fn deliver_run(&mut self, run: Run) -> Result<usize, ShipperError> {
        let batches = chunk(run.records);
        for batch in &batches {
            self.delivery
                .deliver(&run.destination, batch, &self.checkpoint)
                .await?;
        }
        Ok(batches.len())
    }
}
