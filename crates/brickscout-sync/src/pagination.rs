//! Sequential page crawl for one search query.

use brickscout_adapters::{ListingQuery, SourceAdapter};
use brickscout_core::RawListing;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Normal end of results.
    EmptyPage { page: u32 },
    /// Fail-fast: the remaining pages are never requested.
    FetchFailed { page: u32, error: String },
    MaxPages { max_pages: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlOutcome {
    pub requests: u32,
    pub pages_with_records: u32,
    pub shape_failures: usize,
    pub stop: StopReason,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationController {
    max_pages: u32,
}

impl PaginationController {
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Fetch pages 1..=max_pages one at a time, appending every extracted record to `buffer`.
    ///
    /// Whatever was accumulated before a stop condition stays in `buffer`. No page is retried.
    pub async fn crawl(
        &self,
        adapter: &dyn SourceAdapter,
        search: &str,
        buffer: &mut Vec<RawListing>,
    ) -> CrawlOutcome {
        let mut requests = 0;
        let mut pages_with_records = 0;
        let mut shape_failures = 0;

        for page in 1..=self.max_pages {
            requests += 1;
            let query = ListingQuery::new(search, page);
            let result = match adapter.fetch(&query).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        source_id = adapter.source_id(),
                        page,
                        error = %err,
                        "page fetch failed; abandoning remaining pages"
                    );
                    return CrawlOutcome {
                        requests,
                        pages_with_records,
                        shape_failures,
                        stop: StopReason::FetchFailed {
                            page,
                            error: err.to_string(),
                        },
                    };
                }
            };

            if result.is_empty() {
                info!(source_id = adapter.source_id(), page, "empty page; end of results");
                return CrawlOutcome {
                    requests,
                    pages_with_records,
                    shape_failures,
                    stop: StopReason::EmptyPage { page },
                };
            }

            for failure in &result.shape_failures {
                warn!(
                    source_id = adapter.source_id(),
                    page,
                    position = failure.position,
                    error = %failure.error,
                    "skipping record with unexpected shape"
                );
            }
            shape_failures += result.shape_failures.len();
            pages_with_records += 1;
            info!(
                source_id = adapter.source_id(),
                page,
                records = result.record_count(),
                kept = result.listings.len(),
                "page collected"
            );
            buffer.extend(result.listings);
        }

        CrawlOutcome {
            requests,
            pages_with_records,
            shape_failures,
            stop: StopReason::MaxPages {
                max_pages: self.max_pages,
            },
        }
    }
}
