//! Recorded responses
//!
//! [`FixtureConnection`] answers [`CloudFrontApi`] calls from recorded pages
//! instead of the network, and keeps a log of the calls it received.
//!
//! A fixture maps operation names to one page or a list of pages:
//!
//! ```json
//! {
//!   "list_distributions": [
//!     { "DistributionList": { "Items": [...], "NextMarker": "p2" } },
//!     { "DistributionList": { "Items": [...] } }
//!   ],
//!   "list_key_groups": { "KeyGroupList": { "Items": [] } }
//! }
//! ```
//!
//! The first page answers a call without a `Marker`; a call with a marker is
//! answered by the page after the one whose `NextMarker` matches it.

use super::client::CloudFrontApi;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One call received by a [`FixtureConnection`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: String,
    pub params: Value,
}

/// [`CloudFrontApi`] backed by recorded responses
#[derive(Debug, Default)]
pub struct FixtureConnection {
    pages: HashMap<String, Vec<Value>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FixtureConnection {
    /// Build from an in-memory fixture document
    pub fn from_value(fixture: Value) -> Result<Self> {
        let Value::Object(map) = fixture else {
            return Err(anyhow::anyhow!("Fixture must be an object of operation names"));
        };

        let pages = map
            .into_iter()
            .map(|(operation, value)| {
                let pages = match value {
                    Value::Array(pages) => pages,
                    page => vec![page],
                };
                (operation, pages)
            })
            .collect();

        Ok(Self {
            pages,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Load a fixture file; `.yaml`/`.yml` files are parsed as YAML, anything else as JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let fixture: Value = if is_yaml {
            serde_yaml::from_str(&content).context("Failed to parse fixture YAML")?
        } else {
            serde_json::from_str(&content).context("Failed to parse fixture JSON")?
        };

        tracing::info!("Loaded fixture {}", path.display());
        Self::from_value(fixture)
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Names of the operations called so far, oldest first
    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    fn serve(&self, operation: &str, params: Value) -> Result<Value> {
        let marker = params
            .get("Marker")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                operation: operation.to_string(),
                params,
            });
        }

        let Some(pages) = self.pages.get(operation) else {
            tracing::debug!("No fixture for {}, returning empty response", operation);
            return Ok(Value::Object(serde_json::Map::new()));
        };

        let Some(marker) = marker else {
            return Ok(pages
                .first()
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())));
        };

        let idx = pages
            .iter()
            .position(|page| page_marker(page) == Some(marker.as_str()))
            .with_context(|| format!("No fixture page for {} with marker {}", operation, marker))?;

        pages
            .get(idx + 1)
            .cloned()
            .with_context(|| format!("Fixture for {} ends before marker {}", operation, marker))
    }
}

/// `NextMarker` of a page, looked up one level below the top (e.g. `DistributionList.NextMarker`)
fn page_marker(page: &Value) -> Option<&str> {
    page.as_object()?
        .values()
        .find_map(|list| list.get("NextMarker").and_then(|v| v.as_str()))
}

#[async_trait]
impl CloudFrontApi for FixtureConnection {
    async fn list_distributions(&self, params: Value) -> Result<Value> {
        self.serve("list_distributions", params)
    }

    async fn list_key_groups(&self, params: Value) -> Result<Value> {
        self.serve("list_key_groups", params)
    }

    async fn list_cloud_front_origin_access_identities(&self, params: Value) -> Result<Value> {
        self.serve("list_cloud_front_origin_access_identities", params)
    }

    async fn list_cache_policies(&self, params: Value) -> Result<Value> {
        self.serve("list_cache_policies", params)
    }

    async fn list_origin_request_policies(&self, params: Value) -> Result<Value> {
        self.serve("list_origin_request_policies", params)
    }
}
