// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the shipper.

use crate::sink::SinkError;

/// Errors raised while parsing a destination template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unmatched '{{' at offset {0}")]
    UnclosedPlaceholder(usize),

    #[error("single '}}' encountered at offset {0}")]
    UnmatchedClose(usize),

    #[error("empty alternative in placeholder '{0}'")]
    EmptyAlternative(String),

    #[error("invalid format spec '{0}'")]
    InvalidSpec(String),

    #[error("cannot switch from automatic field numbering to manual field specification")]
    MixedNumbering,
}

/// A record's destination could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("no alternative of '{{{0}}}' resolved for this record")]
    Unresolved(String),

    #[error("positional argument {0} is out of range")]
    MissingPositional(usize),
}

/// Errors from the journal source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to spawn journal reader: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("journal reader exited")]
    Closed,

    #[error("malformed journal entry: {0}")]
    Malformed(String),

    #[error("journal entry is missing reserved field {0}")]
    MissingField(&'static str),
}

/// Errors loading or saving the checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid template for {name}: {source}")]
    Template {
        name: &'static str,
        #[source]
        source: TemplateError,
    },
}

/// Top-level error: anything that aborts a shipping run.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
