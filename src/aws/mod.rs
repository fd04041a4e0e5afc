//! AWS API interaction module
//!
//! # Module Structure
//!
//! - [`client`] - The [`CloudFrontApi`] list operations and their HTTP client
//! - [`fixture`] - Recorded-response implementation of [`CloudFrontApi`]
//! - [`http`] - HTTP utilities for REST API calls
//!
//! # Example
//!
//! ```ignore
//! use cflimits::aws::{CloudFrontApi, CloudFrontClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = CloudFrontClient::new("https://gateway.example.test", None)?;
//!     let page = client.list_distributions(serde_json::json!({})).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod fixture;
pub mod http;

pub use client::{CloudFrontApi, CloudFrontClient, DEFAULT_ENDPOINT};
pub use fixture::{FixtureConnection, RecordedCall};
pub use http::format_api_error;
