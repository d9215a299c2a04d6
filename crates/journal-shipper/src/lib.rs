// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Journal Shipper
//!
//! Ships systemd journal records to CloudWatch Logs.
//!
//! ## Overview
//!
//! Records are pulled from the journal, routed to a log group and log stream
//! by two user templates, split into batches CloudWatch Logs accepts and
//! submitted in order. The journal cursor of the last confirmed record is
//! saved after every successful submission, so a restart re-delivers at most
//! one batch.
//!
//! ## Architecture
//!
//! - [`journal`]: journal source (`journalctl` follower)
//! - [`record`]: records and typed field values
//! - [`template`], [`formatter`]: destination templates and their resolution
//! - [`identity`]: EC2 instance identity document and region
//! - [`segmenter`]: retention filter, runs and batches
//! - [`encoder`]: wire encoding of records
//! - [`sink`], [`cloudwatch`]: the log sink surface and its AWS implementation
//! - [`sequence_token`], [`delivery`]: per group handles and the retry loop
//! - [`checkpoint`]: durable cursor
//! - [`pipeline`]: the shipping loop

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]

pub mod checkpoint;
pub mod cloudwatch;
pub mod config;
pub mod delivery;
pub mod encoder;
pub mod errors;
pub mod formatter;
pub mod identity;
pub mod journal;
pub mod logger;
pub mod pipeline;
pub mod record;
pub mod segmenter;
pub mod sequence_token;
pub mod sink;
pub mod template;
