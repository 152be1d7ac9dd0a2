//! The staged search, enrichment and correlation pipeline.
//!
//! Each stage feeds the next: a single search page, the paginated pages,
//! the flattened article set, and finally the correlation report. The
//! year operations reuse only the search capability.

use crate::analysis::year::{
    AllFacets, FacetsByYear, YearClassification, YearComparison, YearTopicSnapshot, DEFAULT_EARLIEST_YEAR,
};
use crate::analysis::{
    classify, correlate_merged_annotations, ClassifyParams, CorrelateOptions, GroupCorrelations, GroupSelector,
    YearComparator,
};
use crate::client::SearchApi;
use crate::error::{redact_api_key, Result};
use crate::models::{Annotation, EnrichedArticle, EnrichmentSlot, SearchPage, SearchStats};
use crate::search::{Budget, Enricher, Paginator, SearchParams};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What to correlate once the articles are in.
#[derive(Debug, Clone)]
pub struct CorrelateRequest {
    pub genres: Vec<String>,
    pub groups: Vec<GroupSelector>,
    pub options: CorrelateOptions,
}

impl Default for CorrelateRequest {
    fn default() -> Self {
        Self {
            genres: vec!["News".to_string(), "Opinion".to_string()],
            groups: vec![GroupSelector::PrimaryThemes, GroupSelector::Abouts],
            options: CorrelateOptions::default(),
        }
    }
}

/// Settings shared by every pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub budget: Budget,
    pub correlate: CorrelateRequest,
    pub classify: ClassifyParams,
    pub earliest_year: i32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            budget: Budget::default(),
            correlate: CorrelateRequest::default(),
            classify: ClassifyParams::default(),
            earliest_year: DEFAULT_EARLIEST_YEAR,
        }
    }
}

/// Enriched articles from a paginated search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSet {
    pub articles: Vec<EnrichedArticle>,
    pub search_stats: SearchStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationReport {
    pub num_articles: usize,
    pub correlations: GroupCorrelations,
    pub articles_by_uuid: BTreeMap<String, EnrichedArticle>,
    /// Full annotation for every correlated key.
    pub annotations_by_csv: BTreeMap<String, Annotation>,
    pub search_stats: SearchStats,
}

/// Result of one operation as callers see it: the value, or `{ "err": ... }`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Ok(T),
    Err { err: String },
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(e) => Outcome::Err {
                err: redact_api_key(&e.to_string()),
            },
        }
    }
}

/// Runs the search stages against the upstream capabilities.
pub struct Aggregator {
    search: Arc<dyn SearchApi>,
    enricher: Enricher,
    settings: PipelineSettings,
}

impl Aggregator {
    pub fn new(search: Arc<dyn SearchApi>, enricher: Enricher, settings: PipelineSettings) -> Self {
        Self {
            search,
            enricher,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn years(&self) -> YearComparator<'_> {
        YearComparator::new(self.search.as_ref(), self.settings.earliest_year)
    }

    /// One page of results, each item enriched.
    pub async fn search(&self, params: &SearchParams) -> Result<SearchPage> {
        let mut page = self.search.search(&params.build()).await?;
        self.enricher.enrich_page(&mut page).await;
        Ok(page)
    }

    /// Paginate under `budget`, enriching each page as it arrives.
    pub async fn search_deeper(&self, params: &SearchParams, budget: Budget) -> Result<Vec<SearchPage>> {
        Paginator::new(self.search.as_ref())
            .with_enrichment(&self.enricher)
            .paginate(params, budget)
            .await
    }

    /// Paginate and flatten to the successfully enriched articles.
    pub async fn search_deeper_articles(&self, params: &SearchParams, budget: Budget) -> Result<ArticleSet> {
        let pages = self.search_deeper(params, budget).await?;
        let search_stats = SearchStats::from_pages(&pages);

        let articles: Vec<EnrichedArticle> = pages
            .into_iter()
            .flat_map(|page| page.items)
            .filter_map(|item| match item.enrichment {
                Some(EnrichmentSlot::Article(article)) => Some(*article),
                _ => None,
            })
            .collect();

        info!(
            "Collected {} articles from {} searches ({} enrichment failures)",
            articles.len(),
            search_stats.num_searches,
            search_stats.num_enrichment_failures
        );
        Ok(ArticleSet {
            articles,
            search_stats,
        })
    }

    /// The full pipeline: search, enrich, filter to genres, correlate.
    pub async fn correlate(
        &self,
        params: &SearchParams,
        budget: Budget,
        request: &CorrelateRequest,
    ) -> Result<CorrelationReport> {
        let ArticleSet {
            articles,
            search_stats,
        } = self.search_deeper_articles(params, budget).await?;

        let correlations =
            correlate_merged_annotations(&articles, &request.genres, &request.groups, &request.options);

        let annotations_by_csv = self.enricher.lookup().resolve(
            correlations
                .groups
                .values()
                .flat_map(|group| &group.items),
        );
        debug!("Resolved {} correlated annotations", annotations_by_csv.len());

        let num_articles = articles.len();
        let articles_by_uuid = articles
            .into_iter()
            .map(|article| (article.uuid.clone(), article))
            .collect();

        Ok(CorrelationReport {
            num_articles,
            correlations,
            articles_by_uuid,
            annotations_by_csv,
            search_stats,
        })
    }

    /// A single enriched article.
    pub async fn get_article(&self, uuid: &str) -> Result<EnrichedArticle> {
        self.enricher.fetch_article(uuid).await
    }

    pub async fn year_topics(&self, year: i32) -> Result<YearTopicSnapshot> {
        self.years().snapshot(year).await
    }

    pub async fn compare_years(&self, year_a: i32, year_b: i32) -> Result<YearComparison> {
        self.years().compare(year_a, year_b).await
    }

    pub async fn classify_years(&self, year_a: i32, year_b: i32) -> Result<YearClassification> {
        let comparison = self.compare_years(year_a, year_b).await?;
        Ok(classify(&comparison, self.settings.classify))
    }

    pub async fn all_facets(&self, year: Option<i32>) -> Result<AllFacets> {
        self.years().all_facets(year).await
    }

    pub async fn facets_by_year(&self) -> Result<FacetsByYear> {
        self.years().facets_by_year().await
    }
}
