//! Resource Groups Tagging `GetResources` lookup

use std::sync::Arc;

use async_trait::async_trait;
use cloudlist_core::{ApiError, TagApi, TagMapping, TagPage, Tags};
use serde::{Deserialize, Serialize};

use crate::client::HttpBackend;

const GET_RESOURCES_PATH: &str = "tagging/get-resources";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetResourcesRequest<'a> {
    #[serde(rename = "ResourceARNList")]
    resource_arn_list: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetResourcesResponse {
    #[serde(default)]
    resource_tag_mapping_list: Vec<ResourceTagMapping>,
    #[serde(default)]
    pagination_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceTagMapping {
    #[serde(rename = "ResourceARN")]
    resource_arn: String,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    #[serde(default)]
    value: String,
}

impl From<ResourceTagMapping> for TagMapping {
    fn from(m: ResourceTagMapping) -> Self {
        Self {
            identifier: m.resource_arn,
            tags: m.tags.into_iter().map(|t| (t.key, t.value)).collect::<Tags>(),
        }
    }
}

/// Tag lookup keyed by ARN
#[derive(Debug, Clone)]
pub struct TaggingApi {
    backend: Arc<HttpBackend>,
}

impl TaggingApi {
    pub fn new(backend: Arc<HttpBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TagApi for TaggingApi {
    async fn get_resources(
        &self,
        identifiers: &[String],
        page_token: Option<&str>,
    ) -> Result<TagPage, ApiError> {
        let request = GetResourcesRequest {
            resource_arn_list: identifiers,
            pagination_token: page_token,
        };
        let response: GetResourcesResponse = self
            .backend
            .post_json(GET_RESOURCES_PATH, &request)
            .await?;
        log::trace!(
            "GetResources: {} mappings for {} arns",
            response.resource_tag_mapping_list.len(),
            identifiers.len()
        );
        Ok(TagPage {
            mappings: response
                .resource_tag_mapping_list
                .into_iter()
                .map(TagMapping::from)
                .collect(),
            next_token: response.pagination_token,
        })
    }
}
