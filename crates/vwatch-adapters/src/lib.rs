//! Marketplace client contract + the Vinted catalog implementation.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use vwatch_core::Listing;

mod vinted;

pub use vinted::{parse_catalog_body, search_target, SearchTarget, VintedClient};

pub const CRATE_NAME: &str = "vwatch-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("invalid search query: {0}")]
    InvalidQuery(String),
    #[error("undecodable response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One page of search results.
///
/// `items` is `None` when the upstream answered with a shape that carries no
/// item list at all; callers treat that as "nothing to announce".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub items: Option<Vec<Listing>>,
}

impl SearchPage {
    pub fn with_items(items: Vec<Listing>) -> Self {
        Self { items: Some(items) }
    }

    pub fn empty_response() -> Self {
        Self { items: None }
    }
}

#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Run the saved search `query` and return at most `per_page` listings.
    async fn search(&self, query: &str, per_page: u32) -> Result<SearchPage, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Host used for bare-text queries that do not carry their own URL.
    pub default_domain: String,
    /// Scheme and host every request is sent to instead of `https://{domain}`,
    /// e.g. a local relay. The search's own domain still keys the session.
    pub api_base: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            default_domain: vwatch_core::DEFAULT_MERCHANT_DOMAIN.to_string(),
            api_base: None,
        }
    }
}
