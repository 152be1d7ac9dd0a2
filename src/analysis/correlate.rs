//! Facet frequency and co-occurrence statistics over a set of articles.

use crate::analysis::concertina::{concertina_sorted_lists, ConcertinaedLists};
use crate::models::EnrichedArticle;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Default uuid-overlap fraction for the concertina merge.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.66;

/// A facet key and how many articles carry it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub name: String,
    pub count: usize,
    /// Names of the merged entries; absent for entries that were never merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constituent_names: Option<Vec<String>>,
}

impl RankedItem {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            count,
            constituent_names: None,
        }
    }

    pub fn constituents(&self) -> Vec<String> {
        self.constituent_names
            .clone()
            .unwrap_or_else(|| vec![self.name.clone()])
    }
}

/// Which facet keys of an article to correlate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum GroupSelector {
    PrimaryThemes,
    Abouts,
    Mentions,
    AboutsAndMentions,
}

impl GroupSelector {
    pub fn select(&self, article: &EnrichedArticle) -> Vec<String> {
        let merged = &article.merged_annotations;
        match self {
            GroupSelector::PrimaryThemes => merged.primary_theme.iter().cloned().collect(),
            GroupSelector::Abouts => merged.abouts.clone(),
            GroupSelector::Mentions => merged.mentions.clone(),
            GroupSelector::AboutsAndMentions => merged
                .abouts
                .iter()
                .chain(&merged.mentions)
                .cloned()
                .collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GroupSelector::PrimaryThemes => "primaryThemes",
            GroupSelector::Abouts => "abouts",
            GroupSelector::Mentions => "mentions",
            GroupSelector::AboutsAndMentions => "aboutsAndMentions",
        }
    }
}

/// Options for [`correlate`].
#[derive(Debug, Clone)]
pub struct CorrelateOptions {
    /// Keys to drop, compared case-insensitively.
    pub ignore: Vec<String>,
    pub overlap_threshold: f64,
}

impl Default for CorrelateOptions {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationStats {
    pub num_articles: usize,
    /// Articles with none of the requested keys.
    pub undefined_count: usize,
    pub undefined_uuids: Vec<String>,
    pub pubdate_earliest: Option<String>,
    pub pubdate_latest: Option<String>,
    pub date_now: String,
}

/// Counts, rankings and pairwise co-occurrence for one group of keys.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlations {
    pub stats: CorrelationStats,
    pub sorted_by_count: Vec<RankedItem>,
    pub counts: BTreeMap<String, usize>,
    pub sorted_by_count_grouped_by_taxonomy: BTreeMap<String, Vec<RankedItem>>,
    /// Every distinct key, sorted.
    pub items: Vec<String>,
    /// `correlations[a][b]`: articles carrying both `a` and `b`. Each
    /// direction is counted on its own.
    pub correlations: BTreeMap<String, BTreeMap<String, usize>>,
    pub uuids_grouped_by_item: HashMap<String, Vec<String>>,
    pub concertinaed_sorted_lists: ConcertinaedLists,
}

/// The part of a key before its first `:`.
pub fn taxonomy_of(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

/// Fold `articles` into correlation statistics over the keys chosen by `select`.
pub fn correlate<F>(select: F, articles: &[EnrichedArticle], options: &CorrelateOptions) -> Correlations
where
    F: Fn(&EnrichedArticle) -> Vec<String>,
{
    let ignore: HashSet<String> = options.ignore.iter().map(|i| i.to_lowercase()).collect();

    let mut stats = CorrelationStats {
        num_articles: articles.len(),
        undefined_count: 0,
        undefined_uuids: Vec::new(),
        pubdate_earliest: None,
        pubdate_latest: None,
        date_now: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    let mut first_seen: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut uuids_grouped_by_item: HashMap<String, Vec<String>> = HashMap::new();
    let mut correlations: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

    for article in articles {
        if let Some(date) = &article.published_date {
            if stats.pubdate_earliest.as_ref().map_or(true, |e| date < e) {
                stats.pubdate_earliest = Some(date.clone());
            }
            if stats.pubdate_latest.as_ref().map_or(true, |l| date > l) {
                stats.pubdate_latest = Some(date.clone());
            }
        }

        let mut seen = HashSet::new();
        let group: Vec<String> = select(article)
            .into_iter()
            .filter(|key| !ignore.contains(&key.to_lowercase()))
            .filter(|key| seen.insert(key.clone()))
            .collect();

        if group.is_empty() {
            stats.undefined_count += 1;
            stats.undefined_uuids.push(article.uuid.clone());
            continue;
        }

        for key in &group {
            let count = counts.entry(key.clone()).or_insert_with(|| {
                first_seen.push(key.clone());
                0
            });
            *count += 1;
            uuids_grouped_by_item
                .entry(key.clone())
                .or_default()
                .push(article.uuid.clone());
        }

        for a in &group {
            for b in &group {
                if a != b {
                    *correlations
                        .entry(a.clone())
                        .or_default()
                        .entry(b.clone())
                        .or_insert(0) += 1;
                }
            }
        }
    }

    // Stable sort: ties keep first-appearance order.
    let mut sorted_by_count: Vec<RankedItem> = first_seen
        .iter()
        .map(|name| RankedItem::new(name.clone(), counts[name]))
        .collect();
    sorted_by_count.sort_by(|a, b| b.count.cmp(&a.count));

    let mut sorted_by_count_grouped_by_taxonomy: BTreeMap<String, Vec<RankedItem>> = BTreeMap::new();
    for item in &sorted_by_count {
        sorted_by_count_grouped_by_taxonomy
            .entry(taxonomy_of(&item.name).to_string())
            .or_default()
            .push(item.clone());
    }

    let mut items: Vec<String> = first_seen;
    items.sort();

    let concertinaed_sorted_lists = concertina_sorted_lists(
        &sorted_by_count,
        &sorted_by_count_grouped_by_taxonomy,
        &mut uuids_grouped_by_item,
        options.overlap_threshold,
    );

    debug!(
        "Correlated {} articles: {} keys, {} undefined",
        stats.num_articles,
        items.len(),
        stats.undefined_count
    );

    Correlations {
        stats,
        sorted_by_count,
        counts: counts.into_iter().collect(),
        sorted_by_count_grouped_by_taxonomy,
        items,
        correlations,
        uuids_grouped_by_item,
        concertinaed_sorted_lists,
    }
}

/// Correlation results for several groups over the articles of chosen genres.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCorrelations {
    pub genres: Vec<String>,
    pub num_articles_in_genres: usize,
    pub groups: BTreeMap<String, Correlations>,
}

/// Correlate each group in `groups` over the articles whose genre is in `genres`.
pub fn correlate_merged_annotations(
    articles: &[EnrichedArticle],
    genres: &[String],
    groups: &[GroupSelector],
    options: &CorrelateOptions,
) -> GroupCorrelations {
    let in_genres: Vec<EnrichedArticle> = articles
        .iter()
        .filter(|article| {
            article
                .merged_annotations
                .genre
                .as_ref()
                .is_some_and(|genre| genres.contains(genre))
        })
        .cloned()
        .collect();

    let groups = groups
        .iter()
        .map(|group| {
            let selector = *group;
            (
                group.name().to_string(),
                correlate(move |a| selector.select(a), &in_genres, options),
            )
        })
        .collect();

    GroupCorrelations {
        genres: genres.to_vec(),
        num_articles_in_genres: in_genres.len(),
        groups,
    }
}
