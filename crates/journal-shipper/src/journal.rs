// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Journal source.
//!
//! Records are pulled with [`JournalReader::next_entry`] until it reports that
//! the reader is caught up, then [`JournalReader::wait`] suspends until more
//! input arrives.
//!
//! [`JournalctlReader`] follows `journalctl --output=json`. A background task
//! reads its stdout line by line into a bounded channel, so a slow sink
//! pushes back on the child process instead of buffering without limit.

use crate::errors::SourceError;
use crate::record::Record;
use crate::segmenter::RETENTION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, warn};

pub const DEFAULT_JOURNALCTL: &str = "journalctl";
const LINE_BUFFER: usize = 1024;

#[async_trait]
pub trait JournalReader: Send {
    /// The next record if one is available now, `None` when caught up.
    fn next_entry(&mut self) -> Result<Option<Record>, SourceError>;

    /// Suspends until at least one more record may be available.
    async fn wait(&mut self) -> Result<(), SourceError>;
}

/// Command line for following the journal.
///
/// With a cursor the journal resumes strictly after it; without one it starts
/// at the retention boundary, since older entries would be dropped anyway.
#[must_use]
pub fn journalctl_args(
    directory: Option<&Path>,
    cursor: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut args = vec![
        "--output=json".to_string(),
        "--follow".to_string(),
        "--no-tail".to_string(),
        "--all".to_string(),
        "--no-pager".to_string(),
    ];
    if let Some(directory) = directory {
        args.push(format!("--directory={}", directory.display()));
    }
    match cursor {
        Some(cursor) => args.push(format!("--after-cursor={cursor}")),
        None => args.push(format!("--since=@{}", (now - RETENTION).timestamp())),
    }
    args
}

#[derive(Debug)]
pub struct JournalctlReader {
    lines: mpsc::Receiver<String>,
    pending: Option<String>,
    // killed on drop
    _child: Option<Child>,
}

impl JournalctlReader {
    /// Starts `executable` following the journal after `cursor`.
    pub fn spawn(
        executable: &Path,
        directory: Option<&Path>,
        cursor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, SourceError> {
        let args = journalctl_args(directory, cursor, now);
        debug!("JOURNAL | Spawning {} {}", executable.display(), args.join(" "));

        let mut child = Command::new(executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::Spawn)?;
        let stdout = child.stdout.take().ok_or(SourceError::Closed)?;

        let mut reader = Self::from_output(stdout);
        reader._child = Some(child);
        Ok(reader)
    }

    /// Reads journal export lines from any byte stream.
    pub fn from_output<R>(output: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(async move {
            let mut lines = BufReader::new(output).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("JOURNAL | Journal output closed");
                        break;
                    }
                    Err(e) => {
                        error!("JOURNAL | Failed to read journal output: {e}");
                        break;
                    }
                }
            }
        });
        JournalctlReader {
            lines: rx,
            pending: None,
            _child: None,
        }
    }
}

#[async_trait]
impl JournalReader for JournalctlReader {
    fn next_entry(&mut self) -> Result<Option<Record>, SourceError> {
        loop {
            let line = match self.pending.take() {
                Some(line) => line,
                None => match self.lines.try_recv() {
                    Ok(line) => line,
                    Err(TryRecvError::Empty) => return Ok(None),
                    Err(TryRecvError::Disconnected) => return Err(SourceError::Closed),
                },
            };
            if line.trim().is_empty() {
                continue;
            }
            match Record::from_journal_json(&line) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => warn!("JOURNAL | Skipping journal entry: {e}"),
            }
        }
    }

    async fn wait(&mut self) -> Result<(), SourceError> {
        if self.pending.is_some() {
            return Ok(());
        }
        match self.lines.recv().await {
            Some(line) => {
                self.pending = Some(line);
                Ok(())
            }
            None => Err(SourceError::Closed),
        }
    }
}

/// Journal reader configuration resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSource {
    pub executable: PathBuf,
    pub directory: Option<PathBuf>,
}

impl JournalSource {
    pub fn open(
        &self,
        cursor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<JournalctlReader, SourceError> {
        JournalctlReader::spawn(&self.executable, self.directory.as_deref(), cursor, now)
    }
}
