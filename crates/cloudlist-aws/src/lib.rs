//! AWS listing variants for cloudlist
//!
//! - CloudWatch Logs log groups: tagged page by page.
//! - S3 buckets: collected, tagged in batches, then read per bucket.
//!
//! Both talk to a JSON gateway through [`HttpBackend`] and tag through the
//! Resource Groups Tagging lookup.

pub mod arn;
pub mod client;
pub mod logs;
pub mod s3;
pub mod tagging;

pub use client::{Endpoint, HttpBackend, HttpSettings};
pub use logs::{LogGroup, LogGroupsApi, list_log_groups};
pub use s3::{Bucket, BucketDetail, BucketDetailApi, BucketsApi, list_buckets};
pub use tagging::TaggingApi;
