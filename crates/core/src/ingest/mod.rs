//! Ingestion orchestrator.
//!
//! Funnels the two scheduled entry points into one lease-guarded run:
//!
//! ```text
//! Ingestor
//!     │
//!     ├─► MarketSession (session gating)
//!     ├─► LeaseLock (fleet-wide mutual exclusion)
//!     ├─► BarProvider (fetch intraday/daily bars)
//!     └─► BarStore (persist bars + run status)
//! ```
//!
//! Failures are isolated per symbol; the run itself never lets an error
//! escape to the scheduler, and every exit path attempts to release the
//! lease.


use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use log::{debug, error, info, warn};

use crate::calendar::MarketSession;
use crate::errors::{LockError, Result};
use crate::lock::LeaseLock;
use crate::store::BarStore;
use quotedeck_market_data::{Bar, BarProvider, MarketDataError};

/// Refetch overlap applied before the latest persisted intraday bar, to
/// pick up provider backfill/corrections of very recent bars.
const INTRADAY_OVERLAP_DAYS: i64 = 2;

/// Trailing window for daily bar refreshes.
const DAILY_WINDOW_DAYS: i64 = 365;

/// The daily job runs no earlier than this after the close.
const DAILY_RUN_DELAY_SECS: i64 = 5 * 60;

/// ...and no later than this after the close, so a misfired daily job
/// cannot run arbitrarily late into the next session.
const DAILY_RUN_CEILING_SECS: i64 = 2 * 60 * 60;

const FETCH_ATTEMPTS: u32 = 3;
const FETCH_BACKOFF_BASE_MS: u64 = 400;

/// Aggregate outcome of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Total rows written across all symbols and both bar kinds.
    pub rows_upserted: usize,
    /// Symbols whose fetch or persist failed this run.
    pub symbols_failed: usize,
}

enum FetchRequest {
    Intraday { since: Option<DateTime<Utc>> },
    Daily { window_days: i64 },
}

/// Lock-coordinated ingestion orchestrator.
pub struct Ingestor {
    symbols: Vec<String>,
    session: MarketSession,
    provider: Arc<dyn BarProvider>,
    store: Arc<dyn BarStore>,
    lock: LeaseLock,
}

impl Ingestor {
    pub fn new(
        symbols: Vec<String>,
        session: MarketSession,
        provider: Arc<dyn BarProvider>,
        store: Arc<dyn BarStore>,
        lock: LeaseLock,
    ) -> Self {
        Self {
            symbols,
            session,
            provider,
            store,
            lock,
        }
    }

    /// Intraday entry point: runs only while the market session is open.
    ///
    /// The session check happens before any lock attempt; this fires twice
    /// an hour, so skipping the remote round-trip outside the session
    /// matters.
    pub async fn ingest_intraday_if_market_open(&self) {
        let now = self.session.now();
        if !self.intraday_due(&now) {
            info!(
                "Skipping intraday ingestion (outside session): {}",
                now.to_rfc3339()
            );
            return;
        }
        self.run_ingestion(true, false).await;
    }

    /// Daily entry point: runs on weekdays within a bounded window after
    /// the close.
    pub async fn ingest_daily_after_close(&self) {
        let now = self.session.now();
        if !self.daily_due(&now) {
            return;
        }
        self.run_ingestion(false, true).await;
    }

    fn intraday_due(&self, now: &DateTime<Tz>) -> bool {
        self.session.is_in_session(now)
    }

    fn daily_due(&self, now: &DateTime<Tz>) -> bool {
        if !self.session.is_weekday(now) {
            return false;
        }
        match self.session.seconds_after_close(now) {
            Some(elapsed) => {
                (DAILY_RUN_DELAY_SECS..=DAILY_RUN_CEILING_SECS).contains(&elapsed)
            }
            None => false,
        }
    }

    /// One lease-guarded ingestion run. Nothing escapes from here: lock
    /// contention is an expected skip, and any failure ends up in the
    /// persisted status row instead of the caller.
    pub(crate) async fn run_ingestion(&self, intraday: bool, daily: bool) {
        match self.lock.acquire().await {
            Ok(true) => {}
            Ok(false) => {
                info!("Another instance holds the ingestion lock; skipping.");
                return;
            }
            Err(e) => {
                error!("Ingestion lock acquire failed: {}", e);
                self.record_run_failure(&e.to_string()).await;
                return;
            }
        }

        let started = Instant::now();
        match self.run_locked(intraday, daily).await {
            Ok(report) => {
                info!(
                    "Ingestion run complete intraday={} daily={} rows={} failed_symbols={} duration={:.2}s",
                    intraday,
                    daily,
                    report.rows_upserted,
                    report.symbols_failed,
                    started.elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                error!("Ingestion run failed: {}", e);
                self.record_run_failure(&e.to_string()).await;
            }
        }

        match self.lock.release().await {
            Ok(true) => {}
            Ok(false) => warn!("Ingestion lock already expired or reclaimed before release"),
            Err(e) => error!("Failed to release ingestion lock: {}", e),
        }
    }

    /// Per-symbol loop under the lease. A symbol failure is recorded and
    /// skipped; a lost lease aborts the run. Completing the loop writes the
    /// success status even when individual symbols failed - the status row
    /// reports "the run completed", and symbol failures surface through the
    /// error text of the preceding status writes and the run summary log.
    async fn run_locked(&self, intraday: bool, daily: bool) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for (index, symbol) in self.symbols.iter().enumerate() {
            if index > 0 && !self.lock.heartbeat().await? {
                return Err(LockError::Lost.into());
            }

            match self.ingest_symbol(symbol, intraday, daily).await {
                Ok(rows) => report.rows_upserted += rows,
                Err(e) => {
                    error!("Ingestion error for {}: {}", symbol, e);
                    report.symbols_failed += 1;
                    self.store
                        .set_ingestion_status(None, Some(format!("{}: {}", symbol, e)))
                        .await?;
                }
            }
        }

        self.store
            .set_ingestion_status(Some(Utc::now()), None)
            .await?;
        Ok(report)
    }

    async fn ingest_symbol(&self, symbol: &str, intraday: bool, daily: bool) -> Result<usize> {
        let mut rows_upserted = 0;

        if intraday {
            let since = self
                .store
                .latest_intraday_timestamp(symbol)
                .await?
                .map(|ts| ts - Duration::days(INTRADAY_OVERLAP_DAYS));
            let bars = self
                .fetch_with_retry(symbol, FetchRequest::Intraday { since })
                .await?;
            let bars = self.session_bars(bars);
            let rows = self.store.upsert_intraday_bars(symbol, &bars).await?;
            info!("Upserted {} intraday rows for {}", rows, symbol);
            rows_upserted += rows;
        }

        if daily {
            let bars = self
                .fetch_with_retry(
                    symbol,
                    FetchRequest::Daily {
                        window_days: DAILY_WINDOW_DAYS,
                    },
                )
                .await?;
            let rows = self.store.upsert_daily_bars(symbol, &bars).await?;
            info!("Upserted {} daily rows for {}", rows, symbol);
            rows_upserted += rows;
        }

        Ok(rows_upserted)
    }

    /// Fetch with a small bounded retry for transient provider failures.
    async fn fetch_with_retry(
        &self,
        symbol: &str,
        request: FetchRequest,
    ) -> std::result::Result<Vec<Bar>, MarketDataError> {
        let mut attempt = 0;
        loop {
            let result = match &request {
                FetchRequest::Intraday { since } => {
                    self.provider.fetch_intraday(symbol, *since).await
                }
                FetchRequest::Daily { window_days } => {
                    self.provider.fetch_daily(symbol, *window_days).await
                }
            };

            match result {
                Ok(bars) => return Ok(bars),
                Err(e) if e.is_transient() && attempt + 1 < FETCH_ATTEMPTS => {
                    let backoff_ms = FETCH_BACKOFF_BASE_MS * 2u64.pow(attempt);
                    debug!(
                        "Transient fetch failure for {} (attempt {}): {}; retrying in {}ms",
                        symbol,
                        attempt + 1,
                        e,
                        backoff_ms
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Keep only bars whose timestamps fall inside the regular session.
    fn session_bars(&self, bars: Vec<Bar>) -> Vec<Bar> {
        bars.into_iter()
            .filter(|bar| self.session.is_in_session(&bar.timestamp))
            .collect()
    }

    async fn record_run_failure(&self, message: &str) {
        if let Err(e) = self
            .store
            .set_ingestion_status(None, Some(message.to_string()))
            .await
        {
            error!("Failed to record ingestion failure status: {}", e);
        }
    }
}
