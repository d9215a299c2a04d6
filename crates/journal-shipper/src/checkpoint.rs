// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable journal cursor.
//!
//! The file holds the cursor of the last record confirmed by the sink. Saves
//! replace it atomically: the cursor is written to a sibling temporary file,
//! synced and renamed over the target, so a crash leaves either the old or
//! the new cursor.

use crate::errors::CheckpointError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Checkpoint { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the saved cursor, `None` if nothing was saved yet.
    pub fn load(&self) -> Result<Option<String>, CheckpointError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let cursor = content.trim();
                Ok((!cursor.is_empty()).then(|| cursor.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Read {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }

    pub fn save(&self, cursor: &str) -> Result<(), CheckpointError> {
        self.write(cursor).map_err(|source| CheckpointError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn write(&self, cursor: &str) -> io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp)?;
        file.write_all(cursor.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
    }
}
