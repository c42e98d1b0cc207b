//! Batch fetcher: one fetch-and-persist operation per day, at most
//! `concurrency` of them in flight.
//!
//! Every window is an independent failure domain. An error in one window is
//! logged, recorded in the summary, and leaves no artifact, so the next run
//! picks the day up again. Windows that already have an artifact are skipped
//! without touching the network.
//!
//! All operations are futures joined on the calling task; they interleave at
//! the semaphore, the network calls and the timeout, never on separate threads.

use super::provider::{DataError, SubgraphClient};
use super::query::SwapQuery;
use super::store::CsvStore;
use super::table::PROTOCOL_COLUMN;
use super::window::TimeWindow;
use crate::config::FetchConfig;
use chrono::NaiveDate;
use futures::future::join_all;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a single window ended.
#[derive(Debug)]
pub enum WindowOutcome {
    Written { rows: usize, path: PathBuf },
    /// The artifact already existed; no request was made.
    Skipped,
    Failed(DataError),
    Cancelled,
}

impl WindowOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, WindowOutcome::Written { .. } | WindowOutcome::Skipped)
    }
}

#[derive(Debug)]
pub struct WindowReport {
    pub window: TimeWindow,
    pub outcome: WindowOutcome,
    pub elapsed: Duration,
}

impl WindowReport {
    pub fn date(&self) -> NaiveDate {
        self.window.date()
    }
}

/// Summary of a batch run, one report per window in window order.
#[derive(Debug)]
pub struct FetchSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub rows: usize,
    pub reports: Vec<WindowReport>,
    pub elapsed: Duration,
}

impl FetchSummary {
    fn from_reports(reports: Vec<WindowReport>, elapsed: Duration) -> Self {
        let mut summary = Self {
            total: reports.len(),
            written: 0,
            skipped: 0,
            failed: 0,
            cancelled: 0,
            rows: 0,
            reports: Vec::new(),
            elapsed,
        };
        for report in &reports {
            match &report.outcome {
                WindowOutcome::Written { rows, .. } => {
                    summary.written += 1;
                    summary.rows += rows;
                }
                WindowOutcome::Skipped => summary.skipped += 1,
                WindowOutcome::Failed(_) => summary.failed += 1,
                WindowOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary.reports = reports;
        summary
    }

    /// True when every window ended written or skipped.
    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_ok())
    }

    /// Dates that produced no artifact, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (NaiveDate, &DataError)> + '_ {
        self.reports.iter().filter_map(|r| match &r.outcome {
            WindowOutcome::Failed(e) => Some((r.date(), e)),
            _ => None,
        })
    }
}

/// Progress callbacks for a batch run.
pub trait FetchProgress: Send + Sync {
    /// A window acquired a slot and is about to query the subgraph.
    fn on_start(&self, window: &TimeWindow, index: usize, total: usize);

    /// A window reached a terminal state.
    fn on_complete(&self, report: &WindowReport, index: usize, total: usize);

    fn on_batch_complete(&self, summary: &FetchSummary);
}

/// Progress reporter that logs through `tracing`.
pub struct TracingProgress;

impl FetchProgress for TracingProgress {
    fn on_start(&self, window: &TimeWindow, index: usize, total: usize) {
        info!(date = %window.date(), "[{}/{total}] query started", index + 1);
    }

    fn on_complete(&self, report: &WindowReport, index: usize, total: usize) {
        let date = report.date();
        let n = index + 1;
        let secs = report.elapsed.as_secs_f64();
        match &report.outcome {
            WindowOutcome::Written { rows, path } => {
                info!(%date, rows, path = %path.display(), "[{n}/{total}] completed in {secs:.2}s")
            }
            WindowOutcome::Skipped => info!(%date, "[{n}/{total}] already fetched, skipped"),
            WindowOutcome::Failed(e) => error!(%date, error = %e, "[{n}/{total}] failed"),
            WindowOutcome::Cancelled => warn!(%date, "[{n}/{total}] cancelled"),
        }
    }

    fn on_batch_complete(&self, summary: &FetchSummary) {
        info!(
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            rows = summary.rows,
            "batch completed in {:.2}s",
            summary.elapsed.as_secs_f64()
        );
    }
}

/// Runs fetch-and-persist operations for a set of windows.
pub struct BatchFetcher<'a> {
    client: &'a dyn SubgraphClient,
    store: &'a CsvStore,
    config: &'a FetchConfig,
    progress: &'a dyn FetchProgress,
    cancel: CancellationToken,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(client: &'a dyn SubgraphClient, store: &'a CsvStore, config: &'a FetchConfig) -> Self {
        Self {
            client,
            store,
            config,
            progress: &TracingProgress,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn FetchProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Abort queued and in-flight windows when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch every window and wait until all of them reach a terminal state.
    pub async fn run(&self, windows: &[TimeWindow]) -> FetchSummary {
        let started = Instant::now();
        let total = windows.len();
        // At most one permit per window, which also stays under MAX_PERMITS.
        let slots = Semaphore::new(self.config.concurrency.clamp(1, total.max(1)));

        let operations = windows
            .iter()
            .enumerate()
            .map(|(index, window)| self.run_window(&slots, window, index, total));
        let reports = join_all(operations).await;

        let summary = FetchSummary::from_reports(reports, started.elapsed());
        self.progress.on_batch_complete(&summary);
        summary
    }

    async fn run_window(
        &self,
        slots: &Semaphore,
        window: &TimeWindow,
        index: usize,
        total: usize,
    ) -> WindowReport {
        let started = Instant::now();

        // Dropping the losing branch releases its slot and session.
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => WindowOutcome::Cancelled,
            outcome = self.run_in_slot(slots, window, index, total) => outcome,
        };

        let report = WindowReport {
            window: *window,
            outcome,
            elapsed: started.elapsed(),
        };
        self.progress.on_complete(&report, index, total);
        report
    }

    async fn run_in_slot(
        &self,
        slots: &Semaphore,
        window: &TimeWindow,
        index: usize,
        total: usize,
    ) -> WindowOutcome {
        let Ok(_permit) = slots.acquire().await else {
            return WindowOutcome::Cancelled;
        };

        if !self.config.force && self.store.exists(window) {
            return WindowOutcome::Skipped;
        }

        self.progress.on_start(window, index, total);
        let timeout = self.config.operation_timeout();
        match tokio::time::timeout(timeout, self.fetch_and_persist(window)).await {
            Ok(Ok((rows, path))) => WindowOutcome::Written { rows, path },
            Ok(Err(e)) => WindowOutcome::Failed(e),
            Err(_) => WindowOutcome::Failed(DataError::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }

    /// Query one window and persist it: session → query → tag → write.
    async fn fetch_and_persist(&self, window: &TimeWindow) -> Result<(usize, PathBuf), DataError> {
        if !self.client.is_available() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let query = SwapQuery::for_window(window, self.config.query_size);
        let mut table = {
            let mut session = self.client.open_session().await?;
            session.query_swaps(&query).await?
        };

        if table.is_empty() {
            return Err(DataError::EmptyResult {
                date: window.date(),
            });
        }

        table.insert_label_column(PROTOCOL_COLUMN, &self.config.protocol);
        let path = self.store.write(window, &table)?;
        Ok((table.len(), path))
    }
}
