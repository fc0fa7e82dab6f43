//! Plain HTTP retrieval, used for direct endpoints and the non-rendered
//! fallback.

pub mod http_fetcher;

pub use http_fetcher::HttpFetcher;

use async_trait::async_trait;

use crate::app::Result;

/// A successfully retrieved (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}
