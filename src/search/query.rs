//! Search query construction.
//!
//! Turns a loose [`SearchParams`] bag into the canonical query document
//! expected by the search API.

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::LazyLock;

/// Largest page size the search API accepts.
pub const MAX_MAX_RESULTS: u32 = 100;

const DEFAULT_MAX_RESULTS: i64 = 10;

// Only bare ontology names, optionally with an `Id` suffix (people, peopleId),
// and not other constraint fields such as lastPublishDateTime.
static ENTITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+(?:Id)?):(.+)$").expect("valid regex"));

pub fn default_aspects() -> Vec<String> {
    ["title", "lifecycle", "location", "summary", "metadata"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_facet_names() -> Vec<String> {
    ["people", "organisations", "topics"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Which facet counts to request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetSpec {
    pub names: Vec<String>,
    /// `-1` asks for every element.
    pub max_elements: i64,
}

impl Default for FacetSpec {
    fn default() -> Self {
        Self {
            names: default_facet_names(),
            max_elements: -1,
        }
    }
}

/// Caller-supplied search options. Unset fields take documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub query_string: Option<String>,
    pub max_results: Option<i64>,
    pub offset: Option<u32>,
    pub aspects: Option<Vec<String>>,
    /// `field:value` strings ANDed onto the free text.
    pub constraints: Vec<String>,
    pub facets: Option<FacetSpec>,
}

impl SearchParams {
    pub fn build(&self) -> SearchQuery {
        let max_results = clamp_max_results(self.max_results.unwrap_or(DEFAULT_MAX_RESULTS));

        let free_text = self.query_string.clone().unwrap_or_default();
        let mut clauses: Vec<String> = Vec::with_capacity(self.constraints.len() + 1);
        if !free_text.trim().is_empty() {
            clauses.push(free_text);
        }
        clauses.extend(self.constraints.iter().map(|c| rephrase_constraint(c)));

        SearchQuery {
            query_string: clauses.join(" and "),
            query_context: QueryContext {
                curations: vec!["ARTICLES".to_string(), "BLOGS".to_string()],
            },
            result_context: ResultContext {
                max_results,
                offset: self.offset.unwrap_or(0),
                aspects: self.aspects.clone().unwrap_or_else(default_aspects),
                sort_order: "DESC".to_string(),
                sort_field: "lastPublishDateTime".to_string(),
                facets: self.facets.clone().unwrap_or_default(),
            },
        }
    }
}

/// Clamp a requested page size into `1..=100`.
pub fn clamp_max_results(requested: i64) -> u32 {
    requested.clamp(1, i64::from(MAX_MAX_RESULTS)) as u32
}

/// Quote the value of an ontology constraint: `people:Ada` → `people:"Ada"`.
///
/// Anything that is not `<ontology>:<value>` passes through unchanged.
pub fn rephrase_constraint(constraint: &str) -> String {
    match ENTITY_PATTERN.captures(constraint) {
        Some(caps) => format!("{}:\"{}\"", &caps[1], &caps[2]),
        None => constraint.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub curations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultContext {
    #[serde(serialize_with = "as_string")]
    max_results: u32,
    #[serde(serialize_with = "as_string")]
    offset: u32,
    aspects: Vec<String>,
    sort_order: String,
    sort_field: String,
    facets: FacetSpec,
}

/// The canonical search-API query document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    query_string: String,
    query_context: QueryContext,
    result_context: ResultContext,
}

impl SearchQuery {
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn max_results(&self) -> u32 {
        self.result_context.max_results
    }

    pub fn offset(&self) -> u32 {
        self.result_context.offset
    }

    pub fn aspects(&self) -> &[String] {
        &self.result_context.aspects
    }

    pub fn facets(&self) -> &FacetSpec {
        &self.result_context.facets
    }
}

fn as_string<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}
