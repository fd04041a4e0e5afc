//! Check AWS CloudFront usage against service quotas.
//!
//! - [`service`] - Limit catalog and usage collection per service
//! - [`limit`] - Limits, usage observations and threshold checks
//! - [`paginate`] - Marker-based pagination of list operations
//! - [`aws`] - CloudFront API transport (HTTP and recorded fixtures)
//! - [`config`] - Persistent user configuration
//! - [`report`] - Table and JSON rendering

pub mod aws;
pub mod config;
pub mod limit;
pub mod paginate;
pub mod report;
pub mod service;

/// Version injected at compile time via CFLIMITS_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("CFLIMITS_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
