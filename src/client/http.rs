//! HTTP transport and the caching, timed API client.

use crate::client::cache::{cache_key, ResultCache};
use crate::client::timing::{TimingRecord, TimingRecorder};
use crate::client::{EnrichApi, SearchApi};
use crate::error::{FacetError, Result};
use crate::models::{FacetCounts, SearchItem, SearchPage};
use crate::search::SearchQuery;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An outbound request, without credentials.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body),
        }
    }

    /// The URL as it may appear in logs, errors and cache keys.
    pub fn safe_url(&self) -> String {
        format!("{}?apiKey=...", self.url)
    }

    fn options(&self) -> Value {
        match &self.body {
            Some(body) => json!({ "method": self.method.as_str(), "body": body }),
            None => json!({ "method": self.method.as_str() }),
        }
    }
}

/// Status line and body of an upstream response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request over the network. Non-2xx statuses are not errors here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<TransportResponse>;
}

/// `reqwest`-backed transport that appends the API key to every URL.
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<TransportResponse> {
        let builder = match (request.method, &request.body) {
            (HttpMethod::Get, _) => self.client.get(&request.url),
            (HttpMethod::Post, Some(body)) => self.client.post(&request.url).json(body),
            (HttpMethod::Post, None) => self.client.post(&request.url),
        };

        let response = builder
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

/// Base URLs of the two upstream APIs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub search_url: String,
    pub enrich_url: String,
}

/// Search and enrichment client with memoization and timing.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    cache: Arc<ResultCache>,
    timings: Arc<TimingRecorder>,
    endpoints: Endpoints,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<ResultCache>,
        timings: Arc<TimingRecorder>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            transport,
            cache,
            timings,
            endpoints,
        }
    }

    /// Response text for `request`, from the cache when seen before.
    pub async fn fetch_text(&self, request: &ApiRequest) -> Result<String> {
        let key = cache_key(&request.safe_url(), &request.options());
        if let Some(text) = self.cache.get(&key) {
            debug!("Cache hit: {} {}", request.method.as_str(), request.safe_url());
            return Ok(text);
        }

        let method = request.method.as_str();
        let start = Instant::now();
        let outcome = self.transport.send(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                self.timings.record(
                    method,
                    TimingRecord {
                        elapsed_ms,
                        ok: false,
                        status: 0,
                        status_text: "network error".to_string(),
                    },
                );
                return Err(e);
            }
        };

        let ok = response.is_success();
        self.timings.record(
            method,
            TimingRecord {
                elapsed_ms,
                ok,
                status: response.status,
                status_text: response.status_text.clone(),
            },
        );

        if !ok {
            warn!(
                "{} {} returned {} {}",
                method,
                request.safe_url(),
                response.status,
                response.status_text
            );
            return Err(FacetError::Upstream {
                method: method.to_string(),
                status: response.status,
                status_text: response.status_text,
                url: request.safe_url(),
            });
        }

        debug!("{} {} took {}ms", method, request.safe_url(), elapsed_ms);
        self.cache.insert(key, response.body.clone());
        Ok(response.body)
    }

    /// Response body for `request`, parsed as JSON.
    pub async fn fetch_json(&self, request: &ApiRequest) -> Result<Value> {
        let text = self.fetch_text(request).await?;
        serde_json::from_str(&text).map_err(|e| FacetError::malformed(e.to_string(), &text))
    }
}

#[async_trait]
impl SearchApi for ApiClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        debug!(
            "Search query={:?} aspects={:?} facets={:?}",
            query.query_string(),
            query.aspects(),
            query.facets().names
        );
        let body = serde_json::to_value(query)
            .map_err(|e| FacetError::malformed(e.to_string(), format!("{:?}", query)))?;
        let request = ApiRequest::post(self.endpoints.search_url.clone(), body);
        let json = self.fetch_json(&request).await?;
        parse_search_page(json, query)
    }
}

#[async_trait]
impl EnrichApi for ApiClient {
    async fn enrich(&self, item_id: &str) -> Result<Value> {
        let url = format!(
            "{}/{}",
            self.endpoints.enrich_url.trim_end_matches('/'),
            item_id
        );
        self.fetch_json(&ApiRequest::get(url)).await
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResultSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultSet {
    #[serde(default)]
    index_count: u64,
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    facets: Vec<FacetCounts>,
}

/// Convert a raw search response into a [`SearchPage`] for `query`.
pub fn parse_search_page(json: Value, query: &SearchQuery) -> Result<SearchPage> {
    let raw = json.to_string();
    let response: SearchResponse =
        serde_json::from_value(json).map_err(|e| FacetError::malformed(e.to_string(), &raw))?;

    let mut page = SearchPage {
        offset: query.offset(),
        max_results: query.max_results(),
        index_count: 0,
        items: Vec::new(),
        facets: Vec::new(),
        max_depth: None,
        duration_ms: None,
    };

    let Some(set) = response.results.into_iter().next() else {
        return Ok(page);
    };

    page.index_count = set.index_count;
    page.facets = set.facets;
    for hit in set.results {
        let Value::Object(mut fields) = hit else {
            debug!("Skipping non-object search hit");
            continue;
        };
        match fields.remove("id") {
            Some(Value::String(id)) => page.items.push(SearchItem {
                id,
                fields,
                enrichment: None,
            }),
            _ => debug!("Skipping search hit without an id"),
        }
    }

    Ok(page)
}
