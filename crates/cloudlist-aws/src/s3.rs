//! S3 buckets
//!
//! The whole bucket listing is collected first, tagged in batches of 100 ARNs,
//! then every bucket gets a detail read on the worker pool. A bucket whose
//! detail read reports not-found was deleted after listing and is skipped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudlist_core::{
    ApiError, DetailApi, EnrichScope, ItemFilter, ListApi, ListingStream, Page, Resource,
    Session, StreamEmitter, TagApi,
};
use serde::{Deserialize, Serialize};

use crate::arn::{bucket_arn, partition_for_region};
use crate::client::{HttpBackend, ListResponse};

/// `ListBuckets` `MaxBuckets` ceiling
pub const BUCKETS_MAX_PAGE: usize = 10_000;

const BUCKETS_PATH: &str = "s3/buckets";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_region: Option<String>,
    /// Tagging key, derived from the name and the endpoint's partition
    #[serde(default)]
    pub arn: String,
}

impl Resource for Bucket {
    fn identifier(&self) -> &str {
        &self.arn
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Bucket configuration read per bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<String>,
    pub object_lock_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_payer: Option<String>,
    pub server_side_encryption: Vec<String>,
}

/// `ListBuckets` over the HTTP backend
#[derive(Debug, Clone)]
pub struct BucketsApi {
    backend: Arc<HttpBackend>,
    region: String,
    partition: &'static str,
}

impl BucketsApi {
    /// Lists buckets in the endpoint's region
    pub fn new(backend: Arc<HttpBackend>) -> Self {
        let region = backend.endpoint().region.clone();
        Self {
            partition: partition_for_region(&region),
            region,
            backend,
        }
    }
}

#[async_trait]
impl ListApi for BucketsApi {
    type Item = Bucket;

    fn resource_name(&self) -> &str {
        "S3 Buckets"
    }

    fn max_page_size(&self) -> usize {
        BUCKETS_MAX_PAGE
    }

    /// One request bounded by `page_size`; the continuation token is not
    /// followed.
    async fn list_page(
        &self,
        _page_token: Option<&str>,
        page_size: usize,
    ) -> Result<Page<Bucket>, ApiError> {
        let query = [
            ("limit", page_size.to_string()),
            ("bucketRegion", self.region.clone()),
        ];
        let response: ListResponse<Bucket> = self.backend.get_json(BUCKETS_PATH, &query).await?;
        if response.next_token.is_some() {
            log::debug!("bucket listing truncated at {page_size}");
        }
        let items = response
            .items
            .into_iter()
            .map(|mut b| {
                b.arn = bucket_arn(self.partition, &b.name);
                b
            })
            .collect();
        Ok(Page::last(items))
    }
}

/// Per-bucket configuration read
#[derive(Debug, Clone)]
pub struct BucketDetailApi {
    backend: Arc<HttpBackend>,
}

impl BucketDetailApi {
    pub fn new(backend: Arc<HttpBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DetailApi<Bucket> for BucketDetailApi {
    type Detail = BucketDetail;

    async fn fetch_detail(&self, bucket: &Bucket) -> Result<BucketDetail, ApiError> {
        let path = format!("{BUCKETS_PATH}/{}", bucket.name);
        self.backend.get_json(&path, &[]).await
    }
}

/// Buckets with tags and detail, in detail-completion order
pub fn list_buckets<L, G, D>(
    session: Session,
    list: Arc<L>,
    tags: Arc<G>,
    detail: Arc<D>,
    filter: ItemFilter<Bucket>,
) -> ListingStream<Bucket, D::Detail>
where
    L: ListApi<Item = Bucket>,
    G: TagApi,
    D: DetailApi<Bucket>,
{
    StreamEmitter::new(session, list, tags)
        .with_filter(filter)
        .with_scope(EnrichScope::Collected)
        .stream_with_detail(detail)
}
