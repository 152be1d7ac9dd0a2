//! Per-item enrichment with bounded concurrency.

use crate::client::EnrichApi;
use crate::error::{FacetError, Result};
use crate::models::{
    Annotation, EnrichedArticle, EnrichmentSlot, SearchPage, ENRICHMENT_ALLOW_LIST,
};
use crate::search::annotations::{AnnotationLookup, AnnotationSet};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Default number of enrichment calls in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

impl EnrichedArticle {
    /// Build an article from a raw enrichment record.
    ///
    /// Annotations are merged (and registered in `lookup`); of the rest of
    /// the record only allow-listed fields are kept.
    pub fn from_raw(raw: Value, lookup: &AnnotationLookup) -> Result<Self> {
        let Value::Object(mut record) = raw else {
            return Err(FacetError::malformed(
                "enrichment record is not an object",
                raw.to_string(),
            ));
        };

        let annotations: Vec<Annotation> = match record.remove("annotations") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match serde_json::from_value(item) {
                    Ok(anno) => Some(anno),
                    Err(e) => {
                        warn!("Dropping unreadable annotation: {}", e);
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };
        let merged_annotations = AnnotationSet::detect(&annotations).canonicalize(lookup);

        let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
        let uuid = id.rsplit('/').next().unwrap_or(id).to_string();
        let published_date = record
            .get("publishedDate")
            .and_then(Value::as_str)
            .map(String::from);

        let mut fields = Map::new();
        for &name in ENRICHMENT_ALLOW_LIST {
            if matches!(name, "uuid" | "publishedDate") {
                continue;
            }
            if let Some(value) = record.remove(name) {
                fields.insert(name.to_string(), value);
            }
        }

        Ok(Self {
            uuid,
            published_date,
            merged_annotations,
            fields,
        })
    }
}

/// Fetches and merges enrichment records for search results.
#[derive(Clone)]
pub struct Enricher {
    api: Arc<dyn EnrichApi>,
    lookup: Arc<AnnotationLookup>,
    concurrency: usize,
}

impl Enricher {
    pub fn new(api: Arc<dyn EnrichApi>, lookup: Arc<AnnotationLookup>, concurrency: usize) -> Self {
        Self {
            api,
            lookup,
            concurrency: concurrency.max(1),
        }
    }

    pub fn lookup(&self) -> &Arc<AnnotationLookup> {
        &self.lookup
    }

    /// Fetch and merge one item, propagating failures.
    pub async fn fetch_article(&self, item_id: &str) -> Result<EnrichedArticle> {
        let raw = self.api.enrich(item_id).await?;
        EnrichedArticle::from_raw(raw, &self.lookup)
    }

    /// Fetch one item; a failure becomes an `{err}` slot.
    pub async fn get_article(&self, item_id: &str) -> EnrichmentSlot {
        match self.fetch_article(item_id).await {
            Ok(article) => EnrichmentSlot::Article(Box::new(article)),
            Err(e) => {
                warn!("Enrichment failed for {}: {}", item_id, e);
                EnrichmentSlot::Failed { err: e.to_string() }
            }
        }
    }

    /// Enrich every id, at most `concurrency` at a time.
    ///
    /// Calls start in submission order and each queued call starts as soon
    /// as any slot frees. Results come back in submission order.
    pub async fn fetch_all(&self, item_ids: &[String]) -> Vec<EnrichmentSlot> {
        let mut finished: Vec<(usize, EnrichmentSlot)> = stream::iter(item_ids.iter().enumerate())
            .map(|(index, id)| async move { (index, self.get_article(id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        finished.sort_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, slot)| slot).collect()
    }

    /// Attach an enrichment slot to every item of `page`.
    pub async fn enrich_page(&self, page: &mut SearchPage) {
        let ids = page.item_ids();
        if ids.is_empty() {
            return;
        }

        info!(
            "Enriching {} items (concurrency {})",
            ids.len(),
            self.concurrency
        );
        let slots = self.fetch_all(&ids).await;
        for (item, slot) in page.items.iter_mut().zip(slots) {
            item.enrichment = Some(slot);
        }
    }
}
