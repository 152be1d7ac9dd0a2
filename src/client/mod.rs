//! Upstream API access.
//!
//! The core only sees two capabilities, [`SearchApi`] and [`EnrichApi`].
//! [`ApiClient`] implements both on top of a [`Transport`], adding the
//! result cache and the timing recorder.

pub mod cache;
pub mod http;
pub mod timing;

pub use cache::ResultCache;
pub use http::{ApiClient, Endpoints, HttpTransport};
pub use timing::TimingRecorder;

use crate::error::Result;
use crate::models::SearchPage;
use crate::search::SearchQuery;
use async_trait::async_trait;
use serde_json::Value;

/// A single-page call to the search API.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}

/// A call to the content-enrichment API for one item.
#[async_trait]
pub trait EnrichApi: Send + Sync {
    async fn enrich(&self, item_id: &str) -> Result<Value>;
}
