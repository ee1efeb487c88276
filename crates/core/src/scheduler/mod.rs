//! Calendar-based trigger scheduler.
//!
//! Fires the orchestrator's entry points on weekday/hour/minute slots in
//! the market timezone. Three policies per job:
//!
//! - **No-overlap**: each job's firing is awaited inside its own loop, so a
//!   job never runs concurrently with itself on one instance.
//! - **Coalescing**: after a firing (or a pause) the next slot is computed
//!   strictly after the current instant, so any number of missed slots
//!   collapse into at most one catch-up firing.
//! - **Misfire grace**: a firing that would start later than its grace
//!   period after the slot is dropped instead of run late.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{info, warn};

use crate::ingest::Ingestor;

pub const INTRADAY_JOB_ID: &str = "intraday_ingestion";
pub const DAILY_JOB_ID: &str = "daily_ingestion";

/// Grace window for the half-hourly intraday job.
const INTRADAY_MISFIRE_GRACE_SECS: i64 = 300;
/// Grace window for the once-daily job.
const DAILY_MISFIRE_GRACE_SECS: i64 = 3600;

/// Weekday firing slots: the cross product of `hours` and `minutes`,
/// Monday through Friday, evaluated on the market's wall clock.
#[derive(Debug, Clone)]
pub struct Cadence {
    hours: Vec<u32>,
    minutes: Vec<u32>,
    tz: Tz,
}

impl Cadence {
    pub fn on_weekdays(mut hours: Vec<u32>, mut minutes: Vec<u32>, tz: Tz) -> Self {
        hours.sort_unstable();
        hours.dedup();
        minutes.sort_unstable();
        minutes.dedup();
        Self { hours, minutes, tz }
    }

    /// The earliest slot strictly after `after`.
    ///
    /// DST-ambiguous local times resolve to their earliest mapping;
    /// nonexistent local times (spring-forward gap) are skipped.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = after.with_timezone(&self.tz).date_naive();
        // A week always contains the next weekday slot; one extra day
        // covers a DST-skipped candidate on the boundary.
        for day_offset in 0..=8 {
            let date = local_date + Duration::days(day_offset);
            if date.weekday().num_days_from_monday() >= 5 {
                continue;
            }
            for &hour in &self.hours {
                for &minute in &self.minutes {
                    let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                        continue;
                    };
                    let Some(candidate) = self.tz.from_local_datetime(&date.and_time(time)).earliest()
                    else {
                        continue;
                    };
                    let candidate = candidate.with_timezone(&Utc);
                    if candidate > after {
                        return candidate;
                    }
                }
            }
        }
        // Unreachable with non-empty slot sets; keep the loop alive anyway.
        after + Duration::days(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Intraday,
    Daily,
}

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: &'static str,
    pub cadence: Cadence,
    pub misfire_grace: Duration,
    pub kind: JobKind,
}

/// Scheduler lifecycle object, created once by the process entry point.
///
/// `start` spawns one background task per registered job and is idempotent;
/// a second call warns and changes nothing.
pub struct IngestScheduler {
    ingestor: Arc<Ingestor>,
    jobs: Vec<JobSpec>,
    running: AtomicBool,
}

impl IngestScheduler {
    pub fn new(ingestor: Arc<Ingestor>, jobs: Vec<JobSpec>) -> Self {
        Self {
            ingestor,
            jobs,
            running: AtomicBool::new(false),
        }
    }

    /// The standard registrations: intraday on the half hour during
    /// session hours, daily once shortly after the close. The orchestrator
    /// re-validates session timing, so edge slots (e.g. 16:30) self-guard.
    pub fn with_default_jobs(ingestor: Arc<Ingestor>, tz: Tz) -> Self {
        let jobs = vec![
            JobSpec {
                id: INTRADAY_JOB_ID,
                cadence: Cadence::on_weekdays((9..=16).collect(), vec![0, 30], tz),
                misfire_grace: Duration::seconds(INTRADAY_MISFIRE_GRACE_SECS),
                kind: JobKind::Intraday,
            },
            JobSpec {
                id: DAILY_JOB_ID,
                cadence: Cadence::on_weekdays(vec![16], vec![20], tz),
                misfire_grace: Duration::seconds(DAILY_MISFIRE_GRACE_SECS),
                kind: JobKind::Daily,
            },
        ];
        Self::new(ingestor, jobs)
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already started; ignoring start request");
            return;
        }
        for job in self.jobs.clone() {
            let ingestor = self.ingestor.clone();
            tokio::spawn(run_job(ingestor, job));
        }
        info!("Background scheduler started with {} jobs", self.jobs.len());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A firing is still runnable if its lateness is within the job's grace.
fn within_grace(scheduled: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> bool {
    now - scheduled <= grace
}

async fn run_job(ingestor: Arc<Ingestor>, job: JobSpec) {
    let mut next = job.cadence.next_occurrence(Utc::now());
    info!("Job {} scheduled; first firing at {}", job.id, next);

    loop {
        let now = Utc::now();
        if let Ok(wait) = (next - now).to_std() {
            tokio::time::sleep(wait).await;
        }

        let now = Utc::now();
        if within_grace(next, now, job.misfire_grace) {
            match job.kind {
                JobKind::Intraday => ingestor.ingest_intraday_if_market_open().await,
                JobKind::Daily => ingestor.ingest_daily_after_close().await,
            }
        } else {
            warn!(
                "Job {}: firing at {} missed by {}s (grace {}s); dropping",
                job.id,
                next,
                (now - next).num_seconds(),
                job.misfire_grace.num_seconds()
            );
        }

        next = job.cadence.next_occurrence(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::MarketSession;
    use crate::errors::Result;
    use crate::lock::{LeaseLock, LockStore};
    use crate::store::{BarStore, IngestionStatus};
    use async_trait::async_trait;
    use quotedeck_market_data::{Bar, BarProvider, MarketDataError};

    const NY: Tz = chrono_tz::America::New_York;

    fn intraday_cadence() -> Cadence {
        Cadence::on_weekdays((9..=16).collect(), vec![0, 30], NY)
    }

    fn daily_cadence() -> Cadence {
        Cadence::on_weekdays(vec![16], vec![20], NY)
    }

    /// 2024-01-10 is a Wednesday.
    fn ny_instant(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        NY.with_ymd_and_hms(2024, 1, day, hour, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_next_occurrence_same_day() {
        let next = intraday_cadence().next_occurrence(ny_instant(10, 10, 5));
        assert_eq!(next, ny_instant(10, 10, 30));
    }

    #[test]
    fn test_next_occurrence_is_strictly_after() {
        let next = intraday_cadence().next_occurrence(ny_instant(10, 10, 30));
        assert_eq!(next, ny_instant(10, 11, 0));
    }

    #[test]
    fn test_next_occurrence_rolls_friday_into_monday() {
        // 2024-01-12 is a Friday; the 16:30 slot is the day's last.
        let next = intraday_cadence().next_occurrence(ny_instant(12, 16, 45));
        assert_eq!(next, ny_instant(15, 9, 0));
    }

    #[test]
    fn test_next_occurrence_skips_weekend() {
        // 2024-01-13 is a Saturday.
        let next = intraday_cadence().next_occurrence(ny_instant(13, 11, 0));
        assert_eq!(next, ny_instant(15, 9, 0));
    }

    #[test]
    fn test_daily_cadence_fires_once_per_weekday() {
        let next = daily_cadence().next_occurrence(ny_instant(10, 16, 21));
        assert_eq!(next, ny_instant(11, 16, 20));

        let next = daily_cadence().next_occurrence(ny_instant(12, 16, 21));
        assert_eq!(next, ny_instant(15, 16, 20));
    }

    #[test]
    fn test_coalescing_skips_all_missed_slots() {
        // Three intraday slots were missed between 10:00 and 11:40; the
        // next firing is the single upcoming slot, not a backlog.
        let next = intraday_cadence().next_occurrence(ny_instant(10, 11, 40));
        assert_eq!(next, ny_instant(10, 12, 0));
    }

    #[test]
    fn test_misfire_grace_bounds_lateness() {
        let scheduled = ny_instant(10, 10, 30);
        let grace = Duration::seconds(300);

        assert!(within_grace(scheduled, scheduled, grace));
        assert!(within_grace(
            scheduled,
            scheduled + Duration::seconds(300),
            grace
        ));
        // One second past the grace window: the firing is dropped.
        assert!(!within_grace(
            scheduled,
            scheduled + Duration::seconds(301),
            grace
        ));
    }

    #[test]
    fn test_cadence_slot_order_is_normalized() {
        let cadence = Cadence::on_weekdays(vec![16, 9, 12], vec![30, 0, 30], NY);
        let next = cadence.next_occurrence(ny_instant(10, 8, 0));
        assert_eq!(next, ny_instant(10, 9, 0));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    struct NullProvider;

    #[async_trait]
    impl BarProvider for NullProvider {
        fn id(&self) -> &'static str {
            "NULL"
        }

        async fn fetch_intraday(
            &self,
            _symbol: &str,
            _since: Option<DateTime<Utc>>,
        ) -> std::result::Result<Vec<Bar>, MarketDataError> {
            Ok(Vec::new())
        }

        async fn fetch_daily(
            &self,
            _symbol: &str,
            _window_days: i64,
        ) -> std::result::Result<Vec<Bar>, MarketDataError> {
            Ok(Vec::new())
        }
    }

    struct NullStore;

    #[async_trait]
    impl BarStore for NullStore {
        async fn upsert_intraday_bars(&self, _symbol: &str, bars: &[Bar]) -> Result<usize> {
            Ok(bars.len())
        }

        async fn upsert_daily_bars(&self, _symbol: &str, bars: &[Bar]) -> Result<usize> {
            Ok(bars.len())
        }

        async fn latest_intraday_timestamp(
            &self,
            _symbol: &str,
        ) -> Result<Option<DateTime<Utc>>> {
            Ok(None)
        }

        async fn set_ingestion_status(
            &self,
            _last_success_utc: Option<DateTime<Utc>>,
            _last_error: Option<String>,
        ) -> Result<()> {
            Ok(())
        }

        async fn get_ingestion_status(&self) -> Result<IngestionStatus> {
            Ok(IngestionStatus::default())
        }
    }

    struct UnheldLockStore;

    #[async_trait]
    impl LockStore for UnheldLockStore {
        async fn acquire_lock(&self, _n: &str, _o: &str, _l: i64) -> Result<bool> {
            Ok(false)
        }

        async fn heartbeat_lock(&self, _n: &str, _o: &str, _l: i64) -> Result<bool> {
            Ok(false)
        }

        async fn release_lock(&self, _n: &str, _o: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn test_ingestor() -> Arc<Ingestor> {
        Arc::new(Ingestor::new(
            vec!["AAPL".to_string()],
            MarketSession::default(),
            Arc::new(NullProvider),
            Arc::new(NullStore),
            LeaseLock::new(Arc::new(UnheldLockStore), "ingest", "test-owner", 120),
        ))
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let scheduler = IngestScheduler::with_default_jobs(test_ingestor(), NY);
        assert!(!scheduler.is_running());

        scheduler.start();
        assert!(scheduler.is_running());

        // Second start is a no-op, not a double registration.
        scheduler.start();
        assert!(scheduler.is_running());
    }

    #[test]
    fn test_default_jobs_registration() {
        let scheduler = IngestScheduler::with_default_jobs(test_ingestor(), NY);
        assert_eq!(scheduler.jobs.len(), 2);
        assert_eq!(scheduler.jobs[0].id, INTRADAY_JOB_ID);
        assert_eq!(scheduler.jobs[0].kind, JobKind::Intraday);
        assert_eq!(scheduler.jobs[1].id, DAILY_JOB_ID);
        assert_eq!(scheduler.jobs[1].kind, JobKind::Daily);
        assert!(scheduler.jobs[0].misfire_grace < scheduler.jobs[1].misfire_grace);
    }
}
