// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::delivery::DEFAULT_THROTTLE_BACKOFF;
use crate::errors::ConfigError;
use crate::journal::{JournalSource, DEFAULT_JOURNALCTL};
use crate::pipeline::DEFAULT_MAX_PENDING;
use crate::template::Template;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOG_GROUP_FORMAT: &str = "{$instanceId}";
pub const DEFAULT_LOG_STREAM_FORMAT: &str =
    r#"{$unit|$docker_container|SYSLOG_IDENTIFIER|_EXE|"other"}"#;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// File holding the cursor of the last delivered record
    pub cursor_path: PathBuf,
    /// Journal directory, the system journal when unset
    pub journal_dir: Option<PathBuf>,
    pub log_group_format: String,
    pub log_stream_format: String,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// Wait before retrying a throttled submission
    pub throttle_backoff: Duration,
    /// Records pulled from the journal per pass
    pub max_pending: usize,
    /// CloudWatch Logs endpoint override
    pub endpoint_url: Option<String>,
    pub journalctl: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cursor_path: PathBuf::new(),
            journal_dir: None,
            log_group_format: DEFAULT_LOG_GROUP_FORMAT.to_string(),
            log_stream_format: DEFAULT_LOG_STREAM_FORMAT.to_string(),
            log_level: "info".to_string(),
            throttle_backoff: DEFAULT_THROTTLE_BACKOFF,
            max_pending: DEFAULT_MAX_PENDING,
            endpoint_url: None,
            journalctl: PathBuf::from(DEFAULT_JOURNALCTL),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cursor_path = non_empty_var("JOURNALD_CW_CURSOR_PATH")
            .map(PathBuf::from)
            .unwrap_or_default();
        let journal_dir = non_empty_var("JOURNALD_CW_JOURNAL_DIR").map(PathBuf::from);
        let log_group_format =
            non_empty_var("JOURNALD_CW_LOG_GROUP_FORMAT").unwrap_or(defaults.log_group_format);
        let log_stream_format =
            non_empty_var("JOURNALD_CW_LOG_STREAM_FORMAT").unwrap_or(defaults.log_stream_format);
        let log_level = env::var("JOURNALD_CW_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);
        let throttle_backoff = env::var("JOURNALD_CW_THROTTLE_BACKOFF_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.throttle_backoff);
        let max_pending = env::var("JOURNALD_CW_MAX_PENDING")
            .ok()
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(defaults.max_pending);
        let endpoint_url = non_empty_var("JOURNALD_CW_ENDPOINT_URL");
        let journalctl = non_empty_var("JOURNALD_CW_JOURNALCTL")
            .map(PathBuf::from)
            .unwrap_or(defaults.journalctl);

        let config = Self {
            cursor_path,
            journal_dir,
            log_group_format,
            log_stream_format,
            log_level,
            throttle_backoff,
            max_pending,
            endpoint_url,
            journalctl,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cursor_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "JOURNALD_CW_CURSOR_PATH must be set".to_string(),
            ));
        }

        self.group_template()?;
        self.stream_template()?;

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.max_pending == 0 {
            return Err(ConfigError::Invalid(
                "JOURNALD_CW_MAX_PENDING must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn group_template(&self) -> Result<Template, ConfigError> {
        Template::parse(&self.log_group_format).map_err(|source| ConfigError::Template {
            name: "JOURNALD_CW_LOG_GROUP_FORMAT",
            source,
        })
    }

    pub fn stream_template(&self) -> Result<Template, ConfigError> {
        Template::parse(&self.log_stream_format).map_err(|source| ConfigError::Template {
            name: "JOURNALD_CW_LOG_STREAM_FORMAT",
            source,
        })
    }

    #[must_use]
    pub fn journal_source(&self) -> JournalSource {
        JournalSource {
            executable: self.journalctl.clone(),
            directory: self.journal_dir.clone(),
        }
    }
}
