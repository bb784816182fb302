//! CloudWatch Logs log groups
//!
//! Listed 50 per page (the API maximum). Each page is tagged and emitted
//! before the next page is requested.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudlist_core::{
    ApiError, EnrichScope, ItemFilter, ListApi, ListingStream, Page, Resource, Session,
    StreamEmitter, TagApi,
};
use serde::{Deserialize, Serialize};

use crate::arn::{log_group_arn, trim_wildcard};
use crate::client::{Endpoint, HttpBackend, ListResponse};

/// `DescribeLogGroups` page size ceiling
pub const LOG_GROUPS_MAX_PAGE: usize = 50;

const LOG_GROUPS_PATH: &str = "logs/log-groups";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGroup {
    pub log_group_name: String,
    /// Tagging key; filled from `arn` when the API omits it
    #[serde(default)]
    pub log_group_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// Milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_in_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group_class: Option<String>,
}

impl LogGroup {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_time.and_then(DateTime::from_timestamp_millis)
    }

    /// Fill `log_group_arn` from `arn`, or from the name and endpoint when
    /// the API returned neither
    fn fill_arn(mut self, endpoint: &Endpoint) -> Self {
        if !self.log_group_arn.is_empty() {
            return self;
        }
        self.log_group_arn = match &self.arn {
            Some(arn) if !arn.is_empty() => trim_wildcard(arn).to_string(),
            _ => {
                log::debug!("{}: no ARN in listing, deriving one", self.log_group_name);
                log_group_arn(endpoint, &self.log_group_name)
            }
        };
        self
    }
}

impl Resource for LogGroup {
    fn identifier(&self) -> &str {
        &self.log_group_arn
    }

    fn display_name(&self) -> &str {
        &self.log_group_name
    }
}

/// `DescribeLogGroups` over the HTTP backend
#[derive(Debug, Clone)]
pub struct LogGroupsApi {
    backend: Arc<HttpBackend>,
    name_prefix: Option<String>,
}

impl LogGroupsApi {
    pub fn new(backend: Arc<HttpBackend>) -> Self {
        Self {
            backend,
            name_prefix: None,
        }
    }

    /// Server-side name prefix filter
    pub fn with_name_prefix(mut self, prefix: Option<String>) -> Self {
        self.name_prefix = prefix.filter(|p| !p.is_empty());
        self
    }
}

#[async_trait]
impl ListApi for LogGroupsApi {
    type Item = LogGroup;

    fn resource_name(&self) -> &str {
        "CloudWatch Logs Log Groups"
    }

    fn max_page_size(&self) -> usize {
        LOG_GROUPS_MAX_PAGE
    }

    async fn list_page(
        &self,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<Page<LogGroup>, ApiError> {
        let mut query = vec![("limit", page_size.to_string())];
        if let Some(prefix) = &self.name_prefix {
            query.push(("logGroupNamePrefix", prefix.clone()));
        }
        if let Some(token) = page_token {
            query.push(("nextToken", token.to_string()));
        }
        let response: ListResponse<LogGroup> =
            self.backend.get_json(LOG_GROUPS_PATH, &query).await?;
        let endpoint = self.backend.endpoint();
        Ok(Page {
            items: response
                .items
                .into_iter()
                .map(|lg| lg.fill_arn(endpoint))
                .collect(),
            next_token: response.next_token,
        })
    }
}

/// Log groups with tags, tagged one page at a time
pub fn list_log_groups<L, G>(
    session: Session,
    list: Arc<L>,
    tags: Arc<G>,
    filter: ItemFilter<LogGroup>,
) -> ListingStream<LogGroup>
where
    L: ListApi<Item = LogGroup>,
    G: TagApi,
{
    StreamEmitter::new(session, list, tags)
        .with_filter(filter)
        .with_scope(EnrichScope::PerPage)
        .stream()
}
