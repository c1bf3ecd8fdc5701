//! Indexer connection settings.

use serde::{Deserialize, Serialize};

use paytos_core::constants::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use paytos_core::types::AssetType;

/// Public Aptos mainnet indexer.
pub const MAINNET_INDEXER_URL: &str = "https://api.mainnet.aptoslabs.com/v1/graphql";

/// Aptos indexer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AptosConfig {
    /// GraphQL endpoint
    pub indexer_url: String,
    /// API key sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Events requested per page
    pub page_size: usize,
    /// Pages read per fetch at most
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Asset type for events whose type does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
}

impl Default for AptosConfig {
    fn default() -> Self {
        Self {
            indexer_url: MAINNET_INDEXER_URL.to_string(),
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout_secs: 30,
            asset_type: None,
        }
    }
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

impl AptosConfig {
    /// Creates config for the given endpoint.
    pub fn new(indexer_url: impl Into<String>) -> Self {
        Self {
            indexer_url: indexer_url.into(),
            ..Default::default()
        }
    }

    /// Adds an API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the page size. Zero is raised to one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the page cap per fetch. Zero is raised to one.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Sets the fallback asset type.
    pub fn with_asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = Some(asset_type);
        self
    }
}
