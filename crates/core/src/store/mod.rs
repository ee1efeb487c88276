//! Shared-store interfaces and models.
//!
//! The ingestion pipeline talks to the shared relational store through the
//! [`BarStore`] trait (bar persistence and run status) and the
//! [`LockStore`](crate::lock::LockStore) trait (lease lock RPCs). The
//! Supabase/PostgREST implementation of both lives in [`supabase`].

pub mod models;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use quotedeck_market_data::Bar;

pub use models::IngestionStatus;
pub use supabase::SupabaseStore;

/// Intraday bar table, keyed by (ticker, ts_utc).
pub const TABLE_INTRADAY: &str = "price_bars_30m";
/// Daily bar table, keyed by (ticker, ny_date).
pub const TABLE_DAILY: &str = "price_bars_1d";
/// Singleton app-state table holding the ingestion status row.
pub const TABLE_APP_STATE: &str = "app_state";
/// Key of the ingestion status row in [`TABLE_APP_STATE`].
pub const STATUS_KEY: &str = "last_ingestion";

/// Storage interface for persisted bars and the run status row.
///
/// Upserts are idempotent on their table keys, so re-ingesting an
/// overlapping window never duplicates rows.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Upsert intraday bars for a symbol; returns the affected row count.
    async fn upsert_intraday_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize>;

    /// Upsert daily bars for a symbol; returns the affected row count.
    async fn upsert_daily_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize>;

    /// Most recent persisted intraday bar timestamp for a symbol, if any.
    async fn latest_intraday_timestamp(&self, symbol: &str) -> Result<Option<DateTime<Utc>>>;

    /// Overwrite the ingestion status row.
    async fn set_ingestion_status(
        &self,
        last_success_utc: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> Result<()>;

    /// Read the ingestion status row; absent row maps to the empty status.
    async fn get_ingestion_status(&self) -> Result<IngestionStatus>;
}
