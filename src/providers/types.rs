//! Values returned by provider adapters.

use serde::{Deserialize, Serialize};

/// A manga listed by search or catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaSummary {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

/// A chapter of a manga, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// One page of a provider's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub page: u32,
    pub has_more: bool,
    pub items: Vec<MangaSummary>,
}

/// Public description of a registered provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub key: String,
    pub label: String,
    pub hosts: Vec<String>,
    pub supports_custom_host: bool,
}
