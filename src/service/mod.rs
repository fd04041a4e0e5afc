//! Service usage checks
//!
//! Each service module declares the limits it knows about and collects
//! current usage for them from the service's API.

pub mod cloudfront;

pub use cloudfront::CloudFrontService;
