// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splits the record stream into runs and the runs into batches.
//!
//! CloudWatch Logs silently discards events older than its retention floor,
//! caps the number of events per `PutLogEvents` call and rejects batches
//! spanning more than a day. Records are therefore:
//!
//! 1. filtered against the 14 day retention window,
//! 2. grouped into maximal runs of consecutive records with one destination,
//! 3. chunked into batches of at most 10 records spanning less than 23 hours.
//!
//! Order is never changed. Two runs for the same destination separated by a
//! record for another destination stay separate.

use crate::errors::RoutingError;
use crate::formatter::Destination;
use crate::record::Record;
use chrono::{DateTime, TimeDelta, Utc};

/// Maximum number of events per submission.
pub const MAX_BATCH_EVENTS: usize = 10;

/// Maximum span between the earliest and latest event of a submission.
pub const MAX_BATCH_SPAN: TimeDelta = TimeDelta::hours(23);

/// Records at least this old are dropped.
pub const RETENTION: TimeDelta = TimeDelta::days(14);

/// Whether the sink would still accept a record at `now`.
#[must_use]
pub fn retain(record: &Record, now: DateTime<Utc>) -> bool {
    now - record.timestamp() < RETENTION
}

/// A maximal run of consecutive records sharing one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub destination: Destination,
    pub records: Vec<Record>,
}

/// Records submitted in a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cursor of the last record, the checkpoint once this batch is confirmed.
    #[must_use]
    pub fn last_cursor(&self) -> Option<&str> {
        self.records.last().map(Record::cursor)
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Groups records into runs as they arrive.
///
/// A run is handed back as soon as a record for another destination closes
/// it, so runs completed before an unroutable record can still be delivered.
#[derive(Debug)]
pub struct Segmenter {
    now: DateTime<Utc>,
    open: Option<Run>,
}

impl Segmenter {
    /// `now` is the reference time for the retention filter.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Segmenter { now, open: None }
    }

    /// Filters and routes one record, returning the run it closed.
    ///
    /// Expired records are dropped before routing. On a routing error the
    /// open run is kept and nothing is returned.
    pub fn push<F>(&mut self, record: Record, route: F) -> Result<Option<Run>, RoutingError>
    where
        F: FnOnce(&Record) -> Result<Destination, RoutingError>,
    {
        if !retain(&record, self.now) {
            return Ok(None);
        }
        let destination = route(&record)?;
        match self.open.as_mut() {
            Some(run) if run.destination == destination => {
                run.records.push(record);
                Ok(None)
            }
            _ => Ok(self.open.replace(Run {
                destination,
                records: vec![record],
            })),
        }
    }

    /// Closes the open run, if any.
    pub fn finish(&mut self) -> Option<Run> {
        self.open.take()
    }
}

/// Splits a run into batches, greedily filling each one until the next record
/// would exceed the event cap or the time span.
#[must_use]
pub fn chunk(records: Vec<Record>) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<Record> = Vec::new();
    let mut earliest = DateTime::<Utc>::MAX_UTC;
    let mut latest = DateTime::<Utc>::MIN_UTC;

    for record in records {
        let ts = record.timestamp();
        let fits = current.len() < MAX_BATCH_EVENTS
            && latest.max(ts) - earliest.min(ts) < MAX_BATCH_SPAN;
        if !fits && !current.is_empty() {
            batches.push(Batch {
                records: std::mem::take(&mut current),
            });
            earliest = DateTime::<Utc>::MAX_UTC;
            latest = DateTime::<Utc>::MIN_UTC;
        }
        earliest = earliest.min(ts);
        latest = latest.max(ts);
        current.push(record);
    }
    if !current.is_empty() {
        batches.push(Batch { records: current });
    }
    batches
}
