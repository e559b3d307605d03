//! Run orchestration: pick a pipeline, accumulate, normalize, write once.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use brickscout_adapters::{dealabs, vinted, DealabsAdapter, SourceAdapter, VintedAdapter};
use brickscout_core::{normalize_listing, DealList, RawListing, SalesBySet};
use brickscout_storage::{write_json_document, HttpClientConfig, HttpFetcher, DEFAULT_USER_AGENT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod pagination;
pub mod scheduler;
pub mod throttle;

pub use pagination::{CrawlOutcome, PaginationController, StopReason};
pub use scheduler::{dedup_keys, JobReport, JobScheduler, JobState, SchedulerReport, SchedulerState};
pub use throttle::{FixedDelay, Throttle};

pub const CRATE_NAME: &str = "brickscout-sync";

pub const SALES_DOCUMENT: &str = "vinted_sales.json";
pub const DEALS_DOCUMENT: &str = "dealabs_deals.json";

pub const USAGE: &str = "usage: brickscout vinted    scrape Vinted sales for every watched set
       brickscout dealabs   scrape Dealabs deals page by page";

/// Sets tracked when no watchlist file is present.
pub const DEFAULT_SET_IDS: &[&str] = &[
    "42182", "60363", "43231", "75403", "75404", "21034", "42635", "75405", "76266", "42176",
    "71460", "42202", "40524", "75402", "76262", "77051", "71387", "76303", "21333", "43224",
    "10363", "60373", "72032", "75332", "76959", "76969", "40460",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTarget {
    Vinted,
    Dealabs,
}

impl FromStr for RunTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "vinted" => Ok(Self::Vinted),
            "dealabs" => Ok(Self::Dealabs),
            other => Err(format!("unknown run target `{other}`")),
        }
    }
}

impl fmt::Display for RunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vinted => f.write_str("vinted"),
            Self::Dealabs => f.write_str("dealabs"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub output_dir: PathBuf,
    pub watchlist_path: PathBuf,
    pub dealabs_endpoint: String,
    pub dealabs_query: String,
    pub vinted_endpoint: String,
    pub vinted_cookie: Option<String>,
    pub max_pages: u32,
    pub job_delay: Duration,
    pub user_agent: String,
    pub http_timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            watchlist_path: PathBuf::from("./watchlist.yaml"),
            dealabs_endpoint: dealabs::DEFAULT_ENDPOINT.to_string(),
            dealabs_query: "lego".to_string(),
            vinted_endpoint: vinted::DEFAULT_ENDPOINT.to_string(),
            vinted_cookie: None,
            max_pages: 100,
            job_delay: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            output_dir: std::env::var("BRICKSCOUT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            watchlist_path: std::env::var("BRICKSCOUT_WATCHLIST")
                .map(PathBuf::from)
                .unwrap_or(defaults.watchlist_path),
            dealabs_endpoint: std::env::var("BRICKSCOUT_DEALABS_ENDPOINT")
                .unwrap_or(defaults.dealabs_endpoint),
            dealabs_query: std::env::var("BRICKSCOUT_DEALABS_QUERY")
                .unwrap_or(defaults.dealabs_query),
            vinted_endpoint: std::env::var("BRICKSCOUT_VINTED_ENDPOINT")
                .unwrap_or(defaults.vinted_endpoint),
            vinted_cookie: std::env::var("BRICKSCOUT_VINTED_COOKIE")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_pages: std::env::var("BRICKSCOUT_MAX_PAGES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_pages),
            job_delay: std::env::var("BRICKSCOUT_JOB_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_delay),
            user_agent: std::env::var("BRICKSCOUT_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("BRICKSCOUT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn sales_path(&self) -> PathBuf {
        self.output_dir.join(SALES_DOCUMENT)
    }

    pub fn deals_path(&self) -> PathBuf {
        self.output_dir.join(DEALS_DOCUMENT)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Watchlist {
    pub set_ids: Vec<String>,
}

/// Set ids from the YAML watchlist, or the built-in list when the file does not exist.
pub fn load_watchlist(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        debug!(path = %path.display(), "no watchlist file; using built-in set ids");
        return Ok(dedup_keys(DEFAULT_SET_IDS));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let watchlist: Watchlist =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(dedup_keys(&watchlist.set_ids))
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requests: usize,
    pub raw_records: usize,
    pub kept: usize,
    pub dropped: usize,
    pub shape_failures: usize,
    pub failed_jobs: Vec<String>,
    pub stop_reason: Option<StopReason>,
    pub output_path: String,
}

/// Normalize per-key buckets; keys left with no resolvable listing are omitted.
pub fn normalize_buckets(raw: BTreeMap<String, Vec<RawListing>>) -> (SalesBySet, usize) {
    let mut dropped = 0;
    let mut sales = SalesBySet::new();
    for (key, listings) in raw {
        let (kept, key_dropped) = normalize_all(listings);
        dropped += key_dropped;
        if kept.is_empty() {
            debug!(key = %key, "no listing with a resolvable set id");
            continue;
        }
        sales.insert(key, kept);
    }
    (sales, dropped)
}

pub fn normalize_all(raw: Vec<RawListing>) -> (DealList, usize) {
    let total = raw.len();
    let kept: DealList = raw.into_iter().filter_map(normalize_listing).collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

/// Schedule pipeline: one throttled job per key, then a single write of the whole bucket map.
pub async fn run_scheduled(
    adapter: &dyn SourceAdapter,
    scheduler: &JobScheduler,
    keys: &[String],
    output: &Path,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%run_id, source_id = adapter.source_id(), keys = keys.len(), "schedule run started");

    let mut buffer: BTreeMap<String, Vec<RawListing>> = BTreeMap::new();
    let report = scheduler.run(adapter, keys, &mut buffer).await;
    debug_assert_eq!(report.state(), SchedulerState::Idle);

    let raw_records = buffer.values().map(Vec::len).sum();
    let (sales, dropped) = normalize_buckets(buffer);
    let kept = sales.values().map(Vec::len).sum();

    let written = write_json_document(output, &sales).await?;
    info!(
        %run_id,
        path = %written.path.display(),
        sets = sales.len(),
        listings = kept,
        "sales document written"
    );

    Ok(RunSummary {
        run_id,
        source_id: adapter.source_id().to_string(),
        started_at,
        finished_at: Utc::now(),
        requests: report.jobs.len(),
        raw_records,
        kept,
        dropped,
        shape_failures: report.shape_failures(),
        failed_jobs: report.failed().map(|j| j.key.clone()).collect(),
        stop_reason: None,
        output_path: written.path.display().to_string(),
    })
}

/// Pagination pipeline: sequential pages until empty/failure/cap, then a single write of the flat list.
pub async fn run_paginated(
    adapter: &dyn SourceAdapter,
    controller: &PaginationController,
    search: &str,
    output: &Path,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(
        %run_id,
        source_id = adapter.source_id(),
        search,
        max_pages = controller.max_pages(),
        "pagination run started"
    );

    let mut buffer: Vec<RawListing> = Vec::new();
    let outcome = controller.crawl(adapter, search, &mut buffer).await;
    if let StopReason::FetchFailed { page, error } = &outcome.stop {
        warn!(%run_id, page, error = %error, "crawl stopped early; keeping pages collected so far");
    }

    let raw_records = buffer.len();
    let (deals, dropped) = normalize_all(buffer);

    let written = write_json_document(output, &deals).await?;
    info!(
        %run_id,
        path = %written.path.display(),
        listings = deals.len(),
        "deals document written"
    );

    Ok(RunSummary {
        run_id,
        source_id: adapter.source_id().to_string(),
        started_at,
        finished_at: Utc::now(),
        requests: outcome.requests as usize,
        raw_records,
        kept: deals.len(),
        dropped,
        shape_failures: outcome.shape_failures,
        failed_jobs: Vec::new(),
        stop_reason: Some(outcome.stop),
        output_path: written.path.display().to_string(),
    })
}

pub struct SyncPipeline {
    config: SyncConfig,
    http: HttpFetcher,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout_secs.map(Duration::from_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        Ok(Self { config, http })
    }

    pub async fn run_once(&self, target: RunTarget) -> Result<RunSummary> {
        match target {
            RunTarget::Vinted => {
                let mut adapter =
                    VintedAdapter::new(self.http.clone(), self.config.vinted_endpoint.clone());
                if let Some(cookie) = &self.config.vinted_cookie {
                    adapter = adapter.with_session_cookie(cookie)?;
                }
                let keys = load_watchlist(&self.config.watchlist_path)?;
                let scheduler = JobScheduler::new(Box::new(FixedDelay::new(self.config.job_delay)));
                run_scheduled(&adapter, &scheduler, &keys, &self.config.sales_path()).await
            }
            RunTarget::Dealabs => {
                let adapter =
                    DealabsAdapter::new(self.http.clone(), self.config.dealabs_endpoint.clone());
                let controller = PaginationController::new(self.config.max_pages);
                run_paginated(
                    &adapter,
                    &controller,
                    &self.config.dealabs_query,
                    &self.config.deals_path(),
                )
                .await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use brickscout_adapters::{AdapterError, ListingPage, ListingQuery, SourceAdapter};
    use brickscout_core::RawListing;
    use brickscout_storage::FetchError;

    pub enum Scripted {
        Page(Vec<RawListing>),
        Fail,
    }

    /// Replays scripted responses keyed by (search, page); unscripted queries return an empty page.
    pub struct ScriptedAdapter {
        responses: HashMap<(String, u32), Scripted>,
        latency: Duration,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub requests: Mutex<Vec<ListingQuery>>,
    }

    impl ScriptedAdapter {
        pub fn new() -> Self {
            Self {
                responses: HashMap::new(),
                latency: Duration::from_millis(10),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with(mut self, search: &str, page: u32, response: Scripted) -> Self {
            self.responses.insert((search.to_string(), page), response);
            self
        }

        pub fn requested_pages(&self) -> Vec<u32> {
            self.requests.lock().unwrap().iter().map(|q| q.page).collect()
        }

        pub fn requested_searches(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|q| q.search.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn source_id(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self, query: &ListingQuery) -> Result<ListingPage, AdapterError> {
            self.requests.lock().unwrap().push(query.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.responses.get(&(query.search.clone(), query.page)) {
                Some(Scripted::Page(listings)) => Ok(ListingPage {
                    listings: listings.clone(),
                    shape_failures: Vec::new(),
                }),
                Some(Scripted::Fail) => Err(AdapterError::Fetch(FetchError::HttpStatus {
                    status: 503,
                    url: format!("https://upstream.test/{}?page={}", query.search, query.page),
                })),
                None => Ok(ListingPage::default()),
            }
        }
    }

    pub fn listing(title: &str, n: usize) -> RawListing {
        RawListing::new(title, format!("https://upstream.test/listing/{n}"))
    }

    pub fn page_of(prefix: usize, count: usize) -> Vec<RawListing> {
        (0..count)
            .map(|i| listing(&format!("LEGO 75402 offer {prefix}-{i}"), prefix * 100 + i))
            .collect()
    }
}
