//! Marker-based pagination
//!
//! AWS list operations return one page of results plus an optional marker
//! pointing at the next page. [`paginate`] follows the markers and merges
//! every page's items into the first response.

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::future::Future;

/// Where a list operation keeps its items and continuation marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageShape {
    /// Dot path of the next-page marker in a response, e.g. `DistributionList.NextMarker`
    pub marker_path: &'static str,
    /// Dot path of the item list in a response, e.g. `DistributionList.Items`
    pub data_path: &'static str,
    /// Request parameter that carries the marker back to the API
    pub marker_param: &'static str,
}

/// Fetch every page of a list operation.
///
/// `fetch` is called with `params`, then again with `params[marker_param]`
/// set to each marker found at `marker_path` until a response carries none.
/// The first response is returned with the items of all later pages appended
/// to its `data_path` list.
///
/// Fails if a response hands back a marker that was already followed.
pub async fn paginate<F, Fut>(mut fetch: F, shape: &PageShape, params: Value) -> Result<Value>
where
    F: FnMut(Value) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut params = match params {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let mut result = fetch(Value::Object(params.clone())).await?;
    let mut marker = next_marker(&result, shape);
    let mut pages = 1;
    let mut seen = HashSet::new();

    while let Some(token) = marker {
        if !seen.insert(token.clone()) {
            bail!(
                "Pagination loop detected at {}: {} '{}' was already requested",
                shape.data_path,
                shape.marker_param,
                token
            );
        }
        tracing::debug!(
            "Fetching page {} ({}={})",
            pages + 1,
            shape.marker_param,
            token
        );
        params.insert(shape.marker_param.to_string(), Value::String(token));

        let page = fetch(Value::Object(params.clone())).await?;
        marker = next_marker(&page, shape);
        pages += 1;

        let Some(Value::Array(more)) = lookup(&page, shape.data_path).cloned() else {
            continue;
        };
        append_items(&mut result, shape.data_path, more);
    }

    if pages > 1 {
        tracing::debug!("Merged {} pages at {}", pages, shape.data_path);
    }

    Ok(result)
}

fn next_marker(response: &Value, shape: &PageShape) -> Option<String> {
    lookup(response, shape.marker_path)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Look up a value using a dot-notation path
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        // Handle array index
        current = if let Ok(idx) = part.parse::<usize>() {
            current.get(idx)?
        } else {
            current.get(part)?
        };
    }

    Some(current)
}

/// Items of the list at `path`, empty when the path is absent or not a list
pub fn extract_items<'a>(value: &'a Value, path: &str) -> &'a [Value] {
    lookup(value, path)
        .and_then(|v| v.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[])
}

/// Number of items in the list at `path`, zero when absent
pub fn count_items(value: &Value, path: &str) -> u64 {
    extract_items(value, path).len() as u64
}

/// String at `path`, if present
pub fn lookup_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    lookup(value, path).and_then(|v| v.as_str())
}

/// Append `more` to the list at `path`, creating intermediate objects as needed
fn append_items(value: &mut Value, path: &str, more: Vec<Value>) {
    let mut current = value;

    for part in path.split('.') {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map.entry(part.to_string()).or_insert(Value::Null);
    }

    match current {
        Value::Array(items) => items.extend(more),
        other => *other = Value::Array(more),
    }
}
