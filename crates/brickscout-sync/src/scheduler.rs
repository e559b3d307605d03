//! Serialized, throttled job runner over a fixed set of query keys.

use std::collections::BTreeMap;

use brickscout_adapters::{ListingQuery, SourceAdapter};
use brickscout_core::RawListing;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::throttle::Throttle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded { records: usize, shape_failures: usize },
    Failed { error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub key: String,
    pub state: JobState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub jobs: Vec<JobReport>,
}

impl SchedulerReport {
    /// `Idle` once no job is left pending or running.
    pub fn state(&self) -> SchedulerState {
        if self.jobs.iter().all(|j| j.state.is_terminal()) {
            SchedulerState::Idle
        } else {
            SchedulerState::Busy
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs
            .iter()
            .filter(|j| matches!(j.state, JobState::Failed { .. }))
    }

    pub fn shape_failures(&self) -> usize {
        self.jobs
            .iter()
            .map(|j| match j.state {
                JobState::Succeeded { shape_failures, .. } => shape_failures,
                _ => 0,
            })
            .sum()
    }
}

/// Order-preserving de-duplication of query keys.
pub fn dedup_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.as_ref().trim();
        if !key.is_empty() && !out.iter().any(|k| k == key) {
            out.push(key.to_string());
        }
    }
    out
}

/// Runs exactly one job at a time and awaits the throttle after each one,
/// whatever its outcome. A failed job is logged and skipped.
pub struct JobScheduler {
    throttle: Box<dyn Throttle>,
}

impl JobScheduler {
    pub fn new(throttle: Box<dyn Throttle>) -> Self {
        Self { throttle }
    }

    /// Returns once every job is terminal. Successful non-empty jobs append under their key in `buffer`.
    pub async fn run<S: AsRef<str>>(
        &self,
        adapter: &dyn SourceAdapter,
        keys: &[S],
        buffer: &mut BTreeMap<String, Vec<RawListing>>,
    ) -> SchedulerReport {
        let mut report = SchedulerReport {
            jobs: dedup_keys(keys)
                .into_iter()
                .map(|key| JobReport {
                    key,
                    state: JobState::Pending,
                })
                .collect(),
        };
        info!(
            source_id = adapter.source_id(),
            jobs = report.jobs.len(),
            "scheduler started"
        );

        for job in report.jobs.iter_mut() {
            job.state = JobState::Running;
            debug!(key = %job.key, state = ?job.state, "job transition");
            let query = ListingQuery::new(job.key.as_str(), 1);

            job.state = match adapter.fetch(&query).await {
                Ok(page) => {
                    for failure in &page.shape_failures {
                        warn!(
                            source_id = adapter.source_id(),
                            key = %job.key,
                            position = failure.position,
                            error = %failure.error,
                            "skipping record with unexpected shape"
                        );
                    }
                    let records = page.listings.len();
                    if records == 0 {
                        warn!(
                            source_id = adapter.source_id(),
                            key = %job.key,
                            seen = page.record_count(),
                            "no results"
                        );
                    } else {
                        info!(
                            source_id = adapter.source_id(),
                            key = %job.key,
                            seen = page.record_count(),
                            records,
                            "job collected"
                        );
                        buffer
                            .entry(job.key.clone())
                            .or_default()
                            .extend(page.listings);
                    }
                    JobState::Succeeded {
                        records,
                        shape_failures: page.shape_failures.len(),
                    }
                }
                Err(err) => {
                    warn!(
                        source_id = adapter.source_id(),
                        key = %job.key,
                        error = %err,
                        "job failed; continuing with next key"
                    );
                    JobState::Failed {
                        error: err.to_string(),
                    }
                }
            };

            self.throttle.wait().await;
        }

        info!(
            source_id = adapter.source_id(),
            failed = report.failed().count(),
            "scheduler idle"
        );
        report
    }
}
