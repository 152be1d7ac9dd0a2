//! Year-over-year facet counts: snapshots, comparisons and classification.

use crate::client::SearchApi;
use crate::error::Result;
use crate::models::SearchPage;
use crate::search::query::{default_facet_names, SearchParams};
use crate::search::FacetSpec;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const DEFAULT_EARLIEST_YEAR: i32 = 2010;
pub const DEFAULT_MIN_COUNT: u64 = 20;
pub const DEFAULT_MIN_FRACTION_DELTA: f64 = 0.2;

/// An exclusive `lastPublishDateTime` window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub after: String,
    pub before: String,
}

impl DateRange {
    /// Jan 1 00:00:00Z to Dec 31 23:59:59Z of `year`.
    pub fn calendar_year(year: i32) -> Self {
        Self {
            after: format!("{}-01-01T00:00:00Z", year),
            before: format!("{}-12-31T23:59:59Z", year),
        }
    }

    /// From Jan 1 of `earliest_year` to the end of `last_day`.
    pub fn through(earliest_year: i32, last_day: NaiveDate) -> Self {
        Self {
            after: format!("{}-01-01T00:00:00Z", earliest_year),
            before: format!("{}T23:59:59Z", last_day.format("%Y-%m-%d")),
        }
    }

    pub fn constraints(&self) -> Vec<String> {
        vec![
            format!("lastPublishDateTime:>{}", self.after),
            format!("lastPublishDateTime:<{}", self.before),
        ]
    }
}

/// One facet value's count within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyCount {
    pub name: String,
    pub name_csv: String,
    pub count: u64,
}

/// Facet counts for every article published in one year.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearTopicSnapshot {
    pub year: i32,
    pub counts_by_taxonomy: BTreeMap<String, Vec<TaxonomyCount>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparedEntry {
    pub name: String,
    pub name_csv: String,
    /// Counts for the earlier and the later year; absent means zero.
    pub counts: [u64; 2],
    pub max_count: u64,
    pub min_count: u64,
    pub delta: i64,
    /// `delta / max_count`; NaN when both counts are zero.
    pub fraction_delta: f64,
    pub abs_fraction_delta: f64,
}

impl ComparedEntry {
    fn new(name: &str, name_csv: &str) -> Self {
        Self {
            name: name.to_string(),
            name_csv: name_csv.to_string(),
            counts: [0, 0],
            max_count: 0,
            min_count: 0,
            delta: 0,
            fraction_delta: f64::NAN,
            abs_fraction_delta: f64::NAN,
        }
    }

    fn update_derived(&mut self) {
        let [earlier, later] = self.counts;
        self.max_count = earlier.max(later);
        self.min_count = earlier.min(later);
        self.delta = later as i64 - earlier as i64;
        self.fraction_delta = if self.max_count == 0 {
            f64::NAN
        } else {
            self.delta as f64 / self.max_count as f64
        };
        self.abs_fraction_delta = self.fraction_delta.abs();
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearComparison {
    /// Ascending.
    pub years: [i32; 2],
    pub combined_by_taxonomy: BTreeMap<String, BTreeMap<String, ComparedEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyParams {
    pub min_count: u64,
    pub min_fraction_delta: f64,
}

impl Default for ClassifyParams {
    fn default() -> Self {
        Self {
            min_count: DEFAULT_MIN_COUNT,
            min_fraction_delta: DEFAULT_MIN_FRACTION_DELTA,
        }
    }
}

pub const CATEGORIES: [&str; 5] = ["newKids", "increasing", "decreasing", "deadToUs", "littleChange"];

/// Classified entries of one taxonomy, one list per category.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryLists {
    pub new_kids: Vec<ComparedEntry>,
    pub increasing: Vec<ComparedEntry>,
    pub decreasing: Vec<ComparedEntry>,
    pub dead_to_us: Vec<ComparedEntry>,
    pub little_change: Vec<ComparedEntry>,
}

impl CategoryLists {
    fn lists_mut(&mut self) -> [&mut Vec<ComparedEntry>; 5] {
        [
            &mut self.new_kids,
            &mut self.increasing,
            &mut self.decreasing,
            &mut self.dead_to_us,
            &mut self.little_change,
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearClassification {
    pub years: [i32; 2],
    pub categories: Vec<String>,
    pub taxonomies: Vec<String>,
    pub classifications_by_taxonomy: BTreeMap<String, CategoryLists>,
    pub comparison_params: ClassifyParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct OntologyStats {
    pub count: usize,
}

/// Facet counts over a whole date range.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllFacets {
    pub last_publish_date_time: DateRange,
    pub article_count: u64,
    pub ontology_names: Vec<String>,
    pub ontologies_stats: BTreeMap<String, OntologyStats>,
    pub ontologies: BTreeMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearSpan {
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetsByYear {
    pub year_range: YearSpan,
    pub years: Vec<i32>,
    pub ontologies: Vec<String>,
    /// `ontology -> name -> year -> count`.
    pub ontologies_names_by_year: BTreeMap<String, BTreeMap<String, BTreeMap<i32, u64>>>,
    pub all_facets: AllFacets,
}

/// Runs facet-count queries against the search API.
pub struct YearComparator<'a> {
    search: &'a dyn SearchApi,
    earliest_year: i32,
}

impl<'a> YearComparator<'a> {
    pub fn new(search: &'a dyn SearchApi, earliest_year: i32) -> Self {
        Self {
            search,
            earliest_year,
        }
    }

    async fn facet_page(&self, range: &DateRange, aspects: Option<Vec<String>>) -> Result<SearchPage> {
        let params = SearchParams {
            max_results: Some(1),
            aspects,
            constraints: range.constraints(),
            facets: Some(FacetSpec::default()),
            ..Default::default()
        };
        self.search.search(&params.build()).await
    }

    pub async fn snapshot(&self, year: i32) -> Result<YearTopicSnapshot> {
        debug!("Fetching facet snapshot for {}", year);
        let page = self.facet_page(&DateRange::calendar_year(year), None).await?;

        let mut counts_by_taxonomy: BTreeMap<String, Vec<TaxonomyCount>> = BTreeMap::new();
        for facet in page.facets {
            let entries = counts_by_taxonomy.entry(facet.name.clone()).or_default();
            entries.extend(facet.facet_elements.into_iter().map(|element| TaxonomyCount {
                name_csv: format!("{}:{}", facet.name, element.name),
                name: element.name,
                count: element.count,
            }));
        }

        Ok(YearTopicSnapshot {
            year,
            counts_by_taxonomy,
        })
    }

    /// Snapshot both years concurrently and line up their counts.
    pub async fn compare(&self, year_a: i32, year_b: i32) -> Result<YearComparison> {
        let (earlier, later) = if year_a <= year_b {
            (year_a, year_b)
        } else {
            (year_b, year_a)
        };
        let (first, second) = futures::try_join!(self.snapshot(earlier), self.snapshot(later))?;
        Ok(combine_snapshots(&first, &second))
    }

    /// Facet counts from the earliest year to today, or over one `year`.
    pub async fn all_facets(&self, year: Option<i32>) -> Result<AllFacets> {
        let range = match year {
            Some(year) => DateRange::through(year, end_of_year(year)),
            None => DateRange::through(self.earliest_year, Utc::now().date_naive()),
        };
        let aspects = vec!["title".to_string(), "metadata".to_string()];
        let page = self.facet_page(&range, Some(aspects)).await?;

        let mut ontologies_stats = BTreeMap::new();
        let mut ontologies = BTreeMap::new();
        for facet in page.facets {
            ontologies_stats.insert(
                facet.name.clone(),
                OntologyStats {
                    count: facet.facet_elements.len(),
                },
            );
            ontologies.insert(
                facet.name,
                facet
                    .facet_elements
                    .into_iter()
                    .map(|element| (element.name, element.count))
                    .collect(),
            );
        }

        Ok(AllFacets {
            last_publish_date_time: range,
            article_count: page.index_count,
            ontology_names: default_facet_names(),
            ontologies_stats,
            ontologies,
        })
    }

    /// The full-range counts, then one query per year up to this year.
    pub async fn facets_by_year(&self) -> Result<FacetsByYear> {
        let this_year = Utc::now().year();
        let all_facets = self.all_facets(None).await?;

        let mut years = Vec::new();
        let mut by_year: BTreeMap<String, BTreeMap<String, BTreeMap<i32, u64>>> = BTreeMap::new();
        for year in self.earliest_year..=this_year {
            let facets = self.all_facets(Some(year)).await?;
            for (ontology, names) in facets.ontologies {
                let ontology_entry = by_year.entry(ontology).or_default();
                for (name, count) in names {
                    ontology_entry.entry(name).or_default().insert(year, count);
                }
            }
            years.push(year);
        }
        info!("Collected facet counts for {} years", years.len());

        Ok(FacetsByYear {
            year_range: YearSpan {
                from: self.earliest_year,
                to: this_year,
            },
            years,
            ontologies: all_facets.ontology_names.clone(),
            ontologies_names_by_year: by_year,
            all_facets,
        })
    }
}

fn end_of_year(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Merge an earlier and a later snapshot into per-taxonomy comparisons.
pub fn combine_snapshots(earlier: &YearTopicSnapshot, later: &YearTopicSnapshot) -> YearComparison {
    let mut combined: BTreeMap<String, BTreeMap<String, ComparedEntry>> = BTreeMap::new();

    for (index, snapshot) in [earlier, later].into_iter().enumerate() {
        for (taxonomy, entries) in &snapshot.counts_by_taxonomy {
            let by_name = combined.entry(taxonomy.clone()).or_default();
            for entry in entries {
                by_name
                    .entry(entry.name.clone())
                    .or_insert_with(|| ComparedEntry::new(&entry.name, &entry.name_csv))
                    .counts[index] = entry.count;
            }
        }
    }

    for entry in combined.values_mut().flat_map(|by_name| by_name.values_mut()) {
        entry.update_derived();
    }

    YearComparison {
        years: [earlier.year, later.year],
        combined_by_taxonomy: combined,
    }
}

/// Bucket each entry with `max_count >= params.min_count` by its change.
///
/// Entries below `min_count` are dropped. Each list is sorted by
/// `abs_fraction_delta` descending, then `max_count` descending.
pub fn classify(comparison: &YearComparison, params: ClassifyParams) -> YearClassification {
    let mut classifications_by_taxonomy = BTreeMap::new();

    for (taxonomy, by_name) in &comparison.combined_by_taxonomy {
        let mut lists = CategoryLists::default();
        for entry in by_name.values() {
            if entry.max_count < params.min_count {
                continue;
            }
            let fd = entry.fraction_delta;
            let target = if fd <= -params.min_fraction_delta {
                if entry.min_count == 0 {
                    &mut lists.dead_to_us
                } else {
                    &mut lists.decreasing
                }
            } else if fd >= params.min_fraction_delta {
                if entry.min_count == 0 {
                    &mut lists.new_kids
                } else {
                    &mut lists.increasing
                }
            } else {
                &mut lists.little_change
            };
            target.push(entry.clone());
        }

        for list in lists.lists_mut() {
            list.sort_by(|a, b| {
                b.abs_fraction_delta
                    .total_cmp(&a.abs_fraction_delta)
                    .then(b.max_count.cmp(&a.max_count))
            });
        }
        classifications_by_taxonomy.insert(taxonomy.clone(), lists);
    }

    YearClassification {
        years: comparison.years,
        categories: CATEGORIES.iter().map(|c| c.to_string()).collect(),
        taxonomies: comparison.combined_by_taxonomy.keys().cloned().collect(),
        classifications_by_taxonomy,
        comparison_params: params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSearchApi;

    fn two_years() -> FakeSearchApi {
        FakeSearchApi::new(500)
            .with_facets(
                "2018-01-01",
                &[(
                    "topics",
                    &[("Old", 30), ("Stable", 50), ("Rising", 25), ("Tiny", 3)],
                )],
            )
            .with_facets(
                "2019-01-01",
                &[(
                    "topics",
                    &[("New", 30), ("Newer", 40), ("Stable", 52), ("Rising", 40), ("Tiny", 5)],
                )],
            )
    }

    fn names(list: &[ComparedEntry]) -> Vec<&str> {
        list.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_date_ranges() {
        let year = DateRange::calendar_year(2018);
        assert_eq!(year.after, "2018-01-01T00:00:00Z");
        assert_eq!(year.before, "2018-12-31T23:59:59Z");
        assert_eq!(
            year.constraints(),
            vec![
                "lastPublishDateTime:>2018-01-01T00:00:00Z",
                "lastPublishDateTime:<2018-12-31T23:59:59Z",
            ]
        );

        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let range = DateRange::through(2010, day);
        assert_eq!(range.after, "2010-01-01T00:00:00Z");
        assert_eq!(range.before, "2024-03-05T23:59:59Z");
    }

    #[tokio::test]
    async fn test_snapshot_query_and_counts() {
        let api = two_years();
        let snapshot = YearComparator::new(&api, DEFAULT_EARLIEST_YEAR)
            .snapshot(2018)
            .await
            .unwrap();

        let query = &api.queries()[0];
        assert!(query.contains("lastPublishDateTime:>2018-01-01T00:00:00Z"));
        assert!(query.contains("lastPublishDateTime:<2018-12-31T23:59:59Z"));

        let topics = &snapshot.counts_by_taxonomy["topics"];
        assert_eq!(topics[0].name_csv, "topics:Old");
        assert_eq!(topics[0].count, 30);
    }

    #[tokio::test]
    async fn test_compare_sorts_years_and_fills_missing() {
        let api = two_years();
        let comparison = YearComparator::new(&api, DEFAULT_EARLIEST_YEAR)
            .compare(2019, 2018)
            .await
            .unwrap();

        assert_eq!(comparison.years, [2018, 2019]);
        let topics = &comparison.combined_by_taxonomy["topics"];
        assert_eq!(topics["New"].counts, [0, 30]);
        assert_eq!(topics["Old"].counts, [30, 0]);
        assert_eq!(topics["Rising"].delta, 15);
        assert_eq!(topics["Rising"].max_count, 40);
        assert_eq!(topics["Rising"].min_count, 25);
        assert!((topics["Rising"].fraction_delta - 0.375).abs() < 1e-9);
        assert_eq!(topics["Old"].fraction_delta, -1.0);
        assert_eq!(topics["Old"].abs_fraction_delta, 1.0);
    }

    #[tokio::test]
    async fn test_classify() {
        let api = two_years();
        let comparison = YearComparator::new(&api, DEFAULT_EARLIEST_YEAR)
            .compare(2018, 2019)
            .await
            .unwrap();

        let result = classify(&comparison, ClassifyParams::default());
        let topics = &result.classifications_by_taxonomy["topics"];

        // equal |fractionDelta|, larger maxCount first
        assert_eq!(names(&topics.new_kids), vec!["Newer", "New"]);
        assert_eq!(names(&topics.increasing), vec!["Rising"]);
        assert!(topics.decreasing.is_empty());
        assert_eq!(names(&topics.dead_to_us), vec!["Old"]);
        assert_eq!(names(&topics.little_change), vec!["Stable"]);
        assert_eq!(result.taxonomies, vec!["topics"]);
        assert_eq!(result.categories, CATEGORIES.to_vec());
    }

    #[tokio::test]
    async fn test_classify_drops_entries_below_min_count() {
        let api = two_years();
        let comparison = YearComparator::new(&api, DEFAULT_EARLIEST_YEAR)
            .compare(2018, 2019)
            .await
            .unwrap();

        let result = classify(&comparison, ClassifyParams::default());
        let topics = &result.classifications_by_taxonomy["topics"];
        let everything: Vec<&str> = [
            &topics.new_kids,
            &topics.increasing,
            &topics.decreasing,
            &topics.dead_to_us,
            &topics.little_change,
        ]
        .into_iter()
        .flat_map(|list| names(list))
        .collect();
        assert!(!everything.contains(&"Tiny"));
    }

    #[test]
    fn test_zero_counts_give_nan_and_little_change() {
        let empty = |year| YearTopicSnapshot {
            year,
            counts_by_taxonomy: BTreeMap::from([(
                "topics".to_string(),
                vec![TaxonomyCount {
                    name: "Ghost".to_string(),
                    name_csv: "topics:Ghost".to_string(),
                    count: 0,
                }],
            )]),
        };
        let comparison = combine_snapshots(&empty(2018), &empty(2019));
        assert!(comparison.combined_by_taxonomy["topics"]["Ghost"].fraction_delta.is_nan());

        let result = classify(
            &comparison,
            ClassifyParams {
                min_count: 0,
                ..Default::default()
            },
        );
        assert_eq!(
            names(&result.classifications_by_taxonomy["topics"].little_change),
            vec!["Ghost"]
        );
    }

    #[tokio::test]
    async fn test_all_facets_for_year() {
        let api = FakeSearchApi::new(1234).with_facets(
            "2015-01-01",
            &[("people", &[("Ada", 7), ("Grace", 3)]), ("topics", &[("Maths", 9)])],
        );
        let facets = YearComparator::new(&api, DEFAULT_EARLIEST_YEAR)
            .all_facets(Some(2015))
            .await
            .unwrap();

        assert_eq!(facets.article_count, 1234);
        assert_eq!(facets.last_publish_date_time.before, "2015-12-31T23:59:59Z");
        assert_eq!(facets.ontologies["people"]["Ada"], 7);
        assert_eq!(facets.ontologies_stats["people"].count, 2);
        assert_eq!(facets.ontology_names, vec!["people", "organisations", "topics"]);
    }

    #[tokio::test]
    async fn test_facets_by_year_is_sequential_and_pivoted() {
        let this_year = Utc::now().year();
        let earliest = this_year - 1;
        let api = FakeSearchApi::new(10)
            .with_facets(&format!("{}-12-31", earliest), &[("topics", &[("Maths", 4)])]);

        let result = YearComparator::new(&api, earliest)
            .facets_by_year()
            .await
            .unwrap();

        // full range first, then each year in order
        assert_eq!(api.queries().len(), 3);
        assert_eq!(result.years, vec![earliest, this_year]);
        assert_eq!(result.ontologies_names_by_year["topics"]["Maths"][&earliest], 4);
        assert!(!result.ontologies_names_by_year["topics"]["Maths"].contains_key(&this_year));
    }
}
