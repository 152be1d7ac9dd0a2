//! Sequential, budgeted pagination over the search API.

use crate::client::SearchApi;
use crate::error::Result;
use crate::models::SearchPage;
use crate::search::enrich::Enricher;
use crate::search::query::SearchParams;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_MAX_DEPTH: i64 = 10;
pub const DEFAULT_MAX_DURATION_MS: u64 = 3000;

/// Limits on one pagination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Maximum number of search calls. Zero or less means none.
    pub max_depth: i64,
    /// Checked between calls only; a call in flight is never cut short.
    pub max_duration: Duration,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_duration: Duration::from_millis(DEFAULT_MAX_DURATION_MS),
        }
    }
}

/// Why a pagination run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    DepthReached,
    OutOfTime,
}

pub struct Paginator<'a> {
    search: &'a dyn SearchApi,
    enricher: Option<&'a Enricher>,
}

impl<'a> Paginator<'a> {
    pub fn new(search: &'a dyn SearchApi) -> Self {
        Self {
            search,
            enricher: None,
        }
    }

    /// Enrich the items of each page as it arrives.
    pub fn with_enrichment(mut self, enricher: &'a Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Fetch pages from `params.offset` onwards until the results run out,
    /// `budget.max_depth` calls have been made, or the time budget has elapsed.
    pub async fn paginate(&self, params: &SearchParams, budget: Budget) -> Result<Vec<SearchPage>> {
        let mut pages = Vec::new();
        if budget.max_depth < 1 {
            return Ok(pages);
        }

        let start = Instant::now();
        let mut params = params.clone();
        let mut depth = budget.max_depth;

        let reason = loop {
            let query = params.build();
            debug!(
                "Search call: offset={} maxResults={} depth={}",
                query.offset(),
                query.max_results(),
                depth
            );

            let mut page = self.search.search(&query).await?;
            if let Some(enricher) = self.enricher {
                enricher.enrich_page(&mut page).await;
            }

            let elapsed = start.elapsed();
            page.max_depth = Some(depth.min(i64::from(u32::MAX)) as u32);
            page.duration_ms = Some(elapsed.as_millis() as u64);

            let remaining = page.remaining();
            let next_offset = query.offset().saturating_add(page.max_results);
            pages.push(page);

            if remaining == 0 {
                break StopReason::Exhausted;
            }
            if depth < 2 {
                break StopReason::DepthReached;
            }
            if elapsed >= budget.max_duration {
                break StopReason::OutOfTime;
            }

            params.offset = Some(next_offset);
            depth -= 1;
        };

        info!(
            "Pagination stopped ({:?}) after {} calls in {}ms",
            reason,
            pages.len(),
            start.elapsed().as_millis()
        );
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::annotations::AnnotationLookup;
    use crate::testing::{FakeEnrichApi, FakeSearchApi};
    use std::sync::Arc;

    fn budget(max_depth: i64, max_duration_ms: u64) -> Budget {
        Budget {
            max_depth,
            max_duration: Duration::from_millis(max_duration_ms),
        }
    }

    fn params() -> SearchParams {
        SearchParams {
            max_results: Some(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stops_when_results_exhausted() {
        let api = FakeSearchApi::new(25);
        let pages = Paginator::new(&api)
            .paginate(&params(), budget(10, 60_000))
            .await
            .unwrap();

        assert_eq!(api.offsets(), vec![0, 10, 20]);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].items.len(), 5);
        assert_eq!(pages[2].remaining(), 0);
        assert_eq!(pages[0].max_depth, Some(10));
        assert_eq!(pages[2].max_depth, Some(8));
    }

    #[tokio::test]
    async fn test_depth_cap() {
        let api = FakeSearchApi::new(25);
        let pages = Paginator::new(&api)
            .paginate(&params(), budget(2, 60_000))
            .await
            .unwrap();

        assert_eq!(api.offsets(), vec![0, 10]);
        assert_eq!(pages.len(), 2);
        assert!(pages[1].remaining() > 0);
    }

    #[tokio::test]
    async fn test_zero_depth_makes_no_calls() {
        let api = FakeSearchApi::new(25);
        for depth in [0, -3] {
            let pages = Paginator::new(&api)
                .paginate(&params(), budget(depth, 60_000))
                .await
                .unwrap();
            assert!(pages.is_empty());
        }
        assert!(api.offsets().is_empty());
    }

    #[tokio::test]
    async fn test_time_budget_checked_between_calls() {
        let api = FakeSearchApi::new(1000).with_delay_ms(20);
        let pages = Paginator::new(&api)
            .paginate(&params(), budget(10, 1))
            .await
            .unwrap();

        // the first call always runs to completion
        assert_eq!(pages.len(), 1);
        assert_eq!(api.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_starts_from_given_offset() {
        let api = FakeSearchApi::new(25);
        let start = SearchParams {
            offset: Some(10),
            ..params()
        };
        Paginator::new(&api)
            .paginate(&start, budget(10, 60_000))
            .await
            .unwrap();
        assert_eq!(api.offsets(), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let api = FakeSearchApi::new(25).failing_at_offset(10);
        let result = Paginator::new(&api)
            .paginate(&params(), budget(10, 60_000))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pages_are_enriched() {
        let api = FakeSearchApi::new(12);
        let enricher = Enricher::new(
            Arc::new(FakeEnrichApi::new().failing("item-3")),
            Arc::new(AnnotationLookup::new()),
            4,
        );

        let pages = Paginator::new(&api)
            .with_enrichment(&enricher)
            .paginate(&params(), budget(10, 60_000))
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        let slots: Vec<_> = pages
            .iter()
            .flat_map(|p| &p.items)
            .map(|item| item.enrichment.as_ref().unwrap())
            .collect();
        assert_eq!(slots.len(), 12);
        assert!(slots[3].article().is_none());
        assert_eq!(slots[11].article().unwrap().uuid, "item-11");
    }
}
