//! CloudFront client
//!
//! The [`CloudFrontApi`] trait is the set of list operations usage collection
//! needs. [`CloudFrontClient`] implements it over HTTP against an endpoint that
//! answers with the JSON form of the CloudFront API responses.

use super::http::{add_query_params, AwsHttpClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// Public CloudFront control-plane endpoint
pub const DEFAULT_ENDPOINT: &str = "https://cloudfront.amazonaws.com";

/// CloudFront API version used in request paths
pub const API_VERSION: &str = "2020-05-31";

/// CloudFront list operations used for usage collection.
///
/// Each operation takes its request parameters as a JSON object
/// (e.g. `{"Marker": "...", "Type": "custom"}`) and returns the response body.
#[async_trait]
pub trait CloudFrontApi: Send + Sync {
    async fn list_distributions(&self, params: Value) -> Result<Value>;

    async fn list_key_groups(&self, params: Value) -> Result<Value>;

    async fn list_cloud_front_origin_access_identities(&self, params: Value) -> Result<Value>;

    async fn list_cache_policies(&self, params: Value) -> Result<Value>;

    async fn list_origin_request_policies(&self, params: Value) -> Result<Value>;
}

/// HTTP implementation of [`CloudFrontApi`]
#[derive(Clone)]
pub struct CloudFrontClient {
    http: AwsHttpClient,
    endpoint: Url,
    token: Option<String>,
}

impl CloudFrontClient {
    /// Create a client for `endpoint`, sending `token` as a bearer token when given
    pub fn new(endpoint: &str, token: Option<&str>) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let http = AwsHttpClient::new()?;

        Ok(Self {
            http,
            endpoint,
            token: token.map(|t| t.to_string()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build a versioned API URL
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            API_VERSION,
            path
        )
    }

    async fn list(&self, path: &str, params: &Value) -> Result<Value> {
        let url = add_query_params(&self.api_url(path), params);
        self.http.get(&url, self.token.as_deref()).await
    }
}

/// Parse and validate an endpoint URL
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL: {}", endpoint))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow::anyhow!(
            "Unsupported endpoint scheme '{}' in {}",
            other,
            endpoint
        )),
    }
}

#[async_trait]
impl CloudFrontApi for CloudFrontClient {
    async fn list_distributions(&self, params: Value) -> Result<Value> {
        self.list("distribution", &params).await
    }

    async fn list_key_groups(&self, params: Value) -> Result<Value> {
        self.list("key-group", &params).await
    }

    async fn list_cloud_front_origin_access_identities(&self, params: Value) -> Result<Value> {
        self.list("origin-access-identity/cloudfront", &params).await
    }

    async fn list_cache_policies(&self, params: Value) -> Result<Value> {
        self.list("cache-policy", &params).await
    }

    async fn list_origin_request_policies(&self, params: Value) -> Result<Value> {
        self.list("origin-request-policy", &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = CloudFrontClient::new("https://gateway.example.test/", None).unwrap();
        assert_eq!(
            client.api_url("key-group"),
            "https://gateway.example.test/2020-05-31/key-group"
        );
    }

    #[test]
    fn test_api_url_keeps_base_path() {
        let client = CloudFrontClient::new("http://localhost:4566/cloudfront", Some("t")).unwrap();
        assert_eq!(
            client.api_url("distribution"),
            "http://localhost:4566/cloudfront/2020-05-31/distribution"
        );
    }

    #[test]
    fn test_parse_endpoint_rejects_bad_input() {
        assert!(parse_endpoint("not a url").is_err());
        assert!(parse_endpoint("ftp://example.test").is_err());
        assert!(parse_endpoint(DEFAULT_ENDPOINT).is_ok());
    }
}
