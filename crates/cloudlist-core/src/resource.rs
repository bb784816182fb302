//! Resource items and enriched results

use std::collections::BTreeMap;

use serde::Serialize;

/// Tag set attached to a resource (key → value)
pub type Tags = BTreeMap<String, String>;

/// A primary item produced by a listing API.
///
/// Items are immutable after read. `identifier` is the join key used to merge
/// enrichment data and must be unique within one listing.
pub trait Resource: Clone + Send + Sync + 'static {
    fn identifier(&self) -> &str;

    /// Human-readable label, defaults to the identifier
    fn display_name(&self) -> &str {
        self.identifier()
    }
}

/// One output record of a listing: the item, its tags, and optional detail.
///
/// `tags` is empty (never absent) when the enrichment map had no entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedResult<T, D = ()> {
    pub display_name: String,
    pub resource: T,
    pub tags: Tags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<D>,
}

impl<T: Resource, D> EnrichedResult<T, D> {
    pub fn new(resource: T, tags: Tags, detail: Option<D>) -> Self {
        Self {
            display_name: resource.display_name().to_string(),
            resource,
            tags,
            detail,
        }
    }

    pub fn identifier(&self) -> &str {
        self.resource.identifier()
    }
}
