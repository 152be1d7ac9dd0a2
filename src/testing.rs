//! In-process fakes of the upstream APIs for tests.

use crate::client::http::{ApiRequest, Transport, TransportResponse};
use crate::client::{EnrichApi, SearchApi};
use crate::error::{FacetError, Result};
use crate::models::{Annotation, FacetCounts, FacetElement, SearchItem, SearchPage};
use crate::search::SearchQuery;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const PREDICATE_BASE: &str = "http://www.ft.com/ontology/annotation/";

/// A raw annotation with the given predicate suffix.
pub fn annotation(predicate: &str, kind: &str, label: &str) -> Annotation {
    Annotation {
        predicate: format!("{}{}", PREDICATE_BASE, predicate),
        kind: kind.to_string(),
        pref_label: label.to_string(),
        extra: Map::new(),
    }
}

/// A raw enrichment record with `about` annotations for each `TYPE:label`
/// and a genre classification.
pub fn enrichment_record(uuid: &str, published: &str, genre: &str, abouts: &[&str]) -> Value {
    let mut annotations: Vec<Value> = abouts
        .iter()
        .map(|csv| {
            let (kind, label) = csv.split_once(':').unwrap_or(("TOPIC", csv));
            json!({
                "predicate": format!("{}about", PREDICATE_BASE),
                "type": kind,
                "prefLabel": label,
            })
        })
        .collect();
    annotations.push(json!({
        "predicate": format!("{}isClassifiedBy", PREDICATE_BASE),
        "type": "GENRE",
        "prefLabel": genre,
    }));

    json!({
        "id": format!("http://www.ft.com/thing/{}", uuid),
        "title": format!("Title of {}", uuid),
        "publishedDate": published,
        "annotations": annotations,
    })
}

/// Search API serving `index_count` synthetic hits.
pub struct FakeSearchApi {
    index_count: u64,
    delay: Duration,
    fail_at: Option<u32>,
    facets_by_query: HashMap<String, Vec<FacetCounts>>,
    offsets: Mutex<Vec<u32>>,
    queries: Mutex<Vec<String>>,
}

impl FakeSearchApi {
    pub fn new(index_count: u64) -> Self {
        Self {
            index_count,
            delay: Duration::ZERO,
            fail_at: None,
            facets_by_query: HashMap::new(),
            offsets: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn failing_at_offset(mut self, offset: u32) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Facet counts to return when the query string contains `needle`.
    pub fn with_facets(mut self, needle: &str, facets: &[(&str, &[(&str, u64)])]) -> Self {
        let facets = facets
            .iter()
            .map(|(name, elements)| FacetCounts {
                name: name.to_string(),
                facet_elements: elements
                    .iter()
                    .map(|(element, count)| FacetElement {
                        name: element.to_string(),
                        count: *count,
                    })
                    .collect(),
            })
            .collect();
        self.facets_by_query.insert(needle.to_string(), facets);
        self
    }

    pub fn offsets(&self) -> Vec<u32> {
        self.offsets.lock().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchApi for FakeSearchApi {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.offsets.lock().push(query.offset());
        self.queries.lock().push(query.query_string().to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_at == Some(query.offset()) {
            return Err(FacetError::Upstream {
                method: "POST".to_string(),
                status: 500,
                status_text: "Internal Server Error".to_string(),
                url: "https://api.example.com/search?apiKey=...".to_string(),
            });
        }

        let start = u64::from(query.offset()).min(self.index_count);
        let end = (start + u64::from(query.max_results())).min(self.index_count);
        let items = (start..end)
            .map(|i| SearchItem {
                id: format!("item-{}", i),
                fields: Map::new(),
                enrichment: None,
            })
            .collect();

        let facets = self
            .facets_by_query
            .iter()
            .find(|(needle, _)| query.query_string().contains(needle.as_str()))
            .map(|(_, facets)| facets.clone())
            .unwrap_or_default();

        Ok(SearchPage {
            offset: query.offset(),
            max_results: query.max_results(),
            index_count: self.index_count,
            items,
            facets,
            max_depth: None,
            duration_ms: None,
        })
    }
}

/// Enrichment API returning a record per id, or configured failures.
pub struct FakeEnrichApi {
    records: HashMap<String, Value>,
    failing: HashSet<String>,
    delay: Duration,
    slow: HashMap<String, Duration>,
    created: Instant,
    starts: Mutex<HashMap<String, u64>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeEnrichApi {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            failing: HashSet::new(),
            delay: Duration::ZERO,
            slow: HashMap::new(),
            created: Instant::now(),
            starts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn with_record(mut self, id: &str, record: Value) -> Self {
        self.records.insert(id.to_string(), record);
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    /// Delay `id` by `ms` instead of the shared delay.
    pub fn with_slow(mut self, id: &str, ms: u64) -> Self {
        self.slow.insert(id.to_string(), Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Milliseconds from construction to the start of each id's call.
    pub fn start_offsets_ms(&self) -> HashMap<String, u64> {
        self.starts.lock().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichApi for FakeEnrichApi {
    async fn enrich(&self, item_id: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.starts
            .lock()
            .insert(item_id.to_string(), self.created.elapsed().as_millis() as u64);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = self.slow.get(item_id).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(item_id) {
            return Err(FacetError::Upstream {
                method: "GET".to_string(),
                status: 503,
                status_text: "Service Unavailable".to_string(),
                url: format!("https://api.example.com/content/{}?apiKey=...", item_id),
            });
        }

        Ok(self
            .records
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| enrichment_record(item_id, "2020-01-01T00:00:00Z", "News", &[])))
    }
}

/// Transport that counts calls and always answers the same way.
pub struct CountingTransport {
    status: u16,
    status_text: String,
    body: String,
    calls: AtomicUsize,
    last_url: Mutex<Option<String>>,
}

impl CountingTransport {
    pub fn ok(body: &str) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.to_string(),
            calls: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        }
    }

    pub fn status(status: u16, status_text: &str) -> Self {
        Self {
            status,
            status_text: status_text.to_string(),
            ..Self::ok("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().clone()
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(&self, request: &ApiRequest) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock() = Some(request.url.clone());
        Ok(TransportResponse {
            status: self.status,
            status_text: self.status_text.clone(),
            body: self.body.clone(),
        })
    }
}
