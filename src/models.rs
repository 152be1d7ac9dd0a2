//! Data models for search results and enriched articles.
//!
//! This module contains the core data structures shared by the search,
//! enrichment and analysis stages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields of a raw enrichment record kept on an [`EnrichedArticle`].
pub const ENRICHMENT_ALLOW_LIST: &[&str] = &[
    "id",
    "title",
    "standfirst",
    "summary",
    "firstPublishedDate",
    "publishedDate",
    "prefLabel",
    "types",
    "uuid",
    "mainImage",
];

/// Count of one facet value as reported by the search API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetElement {
    pub name: String,
    pub count: u64,
}

/// All facet values of one taxonomy for a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetCounts {
    pub name: String,
    #[serde(default)]
    pub facet_elements: Vec<FacetElement>,
}

/// One hit in a search page, with its enrichment once fetched.
#[derive(Debug, Clone, Serialize)]
pub struct SearchItem {
    pub id: String,
    /// The remaining fields of the hit as returned by the search API.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentSlot>,
}

/// One response of the search API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub offset: u32,
    pub max_results: u32,
    pub index_count: u64,
    pub items: Vec<SearchItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<FacetCounts>,
    /// Depth budget left when this page was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    /// Milliseconds since the first page of the run was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl SearchPage {
    /// Results still unfetched after this page. Never negative.
    pub fn remaining(&self) -> u64 {
        self.index_count
            .saturating_sub(self.items.len() as u64)
            .saturating_sub(u64::from(self.offset))
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

/// A raw annotation (relation) from the enrichment API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub predicate: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub pref_label: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Annotation {
    /// The `TYPE:label` identity key.
    pub fn csv(&self) -> String {
        format!("{}:{}", self.kind, self.pref_label)
    }
}

/// Annotation schema generation detected for one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schema {
    Old,
    New,
}

/// How an annotation relates to its article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    About,
    ImplicitlyAbout,
    Mention,
    ClassifiedBy,
    ImplicitlyClassifiedBy,
}

/// One annotation in the unified representation shared by both schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalAnnotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub taxonomy_csv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub is_primary_theme: bool,
    pub is_primary_classification: bool,
}

/// The merged annotation view of one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedAnnotations {
    pub schema: Schema,
    pub annotations: Vec<CanonicalAnnotation>,
    pub abouts: Vec<String>,
    pub implicitly_abouts: Vec<String>,
    pub mentions: Vec<String>,
    pub classified_bys: Vec<String>,
    pub implicitly_classified_bys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primarily_classified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl MergedAnnotations {
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            annotations: Vec::new(),
            abouts: Vec::new(),
            implicitly_abouts: Vec::new(),
            mentions: Vec::new(),
            classified_bys: Vec::new(),
            implicitly_classified_bys: Vec::new(),
            primary_theme: None,
            primarily_classified_by: None,
            genre: None,
        }
    }
}

/// An article after enrichment and annotation merge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedArticle {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub merged_annotations: MergedAnnotations,
    /// Allow-listed fields of the raw enrichment record.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Outcome of enriching one search item.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EnrichmentSlot {
    Article(Box<EnrichedArticle>),
    Failed { err: String },
}

impl EnrichmentSlot {
    pub fn article(&self) -> Option<&EnrichedArticle> {
        match self {
            EnrichmentSlot::Article(article) => Some(article),
            EnrichmentSlot::Failed { .. } => None,
        }
    }
}

/// Summary of the searches behind a set of articles.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub num_searches: usize,
    pub index_count: u64,
    pub num_enrichment_failures: usize,
}

impl SearchStats {
    pub fn from_pages(pages: &[SearchPage]) -> Self {
        let num_enrichment_failures = pages
            .iter()
            .flat_map(|page| &page.items)
            .filter_map(|item| item.enrichment.as_ref())
            .filter(|slot| slot.article().is_none())
            .count();

        Self {
            num_searches: pages.len(),
            index_count: pages.first().map(|page| page.index_count).unwrap_or(0),
            num_enrichment_failures,
        }
    }
}
