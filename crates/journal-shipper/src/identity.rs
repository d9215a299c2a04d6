// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host identity document from the EC2 instance metadata service.
//!
//! The document is fetched at most once per process and shared read-only with
//! the destination formatter, which exposes its fields as `$` variables
//! (`{$instanceId}`, `{$region}`, ...).

use std::borrow::Cow;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254";
const TOKEN_PATH: &str = "/latest/api/token";
const DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: &str = "21600";

/// Fields of the instance identity document, with null values removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityDocument {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl IdentityDocument {
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        let fields = match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect(),
            _ => serde_json::Map::new(),
        };
        IdentityDocument { fields }
    }

    /// Returns a field rendered as a string. Arrays and objects have no name
    /// form and are not returned.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.fields.get(key)? {
            serde_json::Value::String(s) => Some(Cow::Borrowed(s)),
            serde_json::Value::Number(n) => Some(Cow::Owned(n.to_string())),
            serde_json::Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Lazily fetches and caches the identity document.
#[derive(Debug)]
pub struct IdentityProvider {
    client: reqwest::Client,
    endpoint: String,
    document: OnceCell<Arc<IdentityDocument>>,
}

impl IdentityProvider {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("IDENTITY | Failed to build HTTP client, using defaults: {e}");
                reqwest::Client::new()
            });
        IdentityProvider {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            document: OnceCell::new(),
        }
    }

    /// Returns the cached document, fetching it on first use.
    ///
    /// A failed fetch is logged and cached as an empty document: hosts outside
    /// EC2 still route through journal fields and environment variables.
    pub async fn document(&self) -> Arc<IdentityDocument> {
        self.document
            .get_or_init(|| async {
                match self.fetch().await {
                    Ok(document) => {
                        debug!("IDENTITY | Fetched instance identity document");
                        Arc::new(document)
                    }
                    Err(e) => {
                        warn!("IDENTITY | Failed to fetch instance identity document: {e}");
                        Arc::new(IdentityDocument::default())
                    }
                }
            })
            .await
            .clone()
    }

    async fn fetch(&self) -> Result<IdentityDocument, reqwest::Error> {
        let token = self.session_token().await;
        let mut request = self.client.get(format!("{}{DOCUMENT_PATH}", self.endpoint));
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        let value: serde_json::Value = request.send().await?.error_for_status()?.json().await?;
        Ok(IdentityDocument::from_json(value))
    }

    /// IMDSv2 session token. `None` falls back to unauthenticated IMDSv1 requests.
    async fn session_token(&self) -> Option<String> {
        let response = self
            .client
            .put(format!("{}{TOKEN_PATH}", self.endpoint))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    /// Region from `AWS_DEFAULT_REGION`, then `AWS_REGION`, then the identity
    /// document.
    pub async fn region(&self) -> Option<String> {
        for var in ["AWS_DEFAULT_REGION", "AWS_REGION"] {
            if let Ok(region) = env::var(var) {
                if !region.is_empty() {
                    return Some(region);
                }
            }
        }
        self.document().await.get("region").map(Cow::into_owned)
    }
}
