//! Market data provider trait definitions.

pub mod yahoo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::MarketDataError;
use crate::models::Bar;

/// Trait for market data providers.
///
/// Implement this trait to add support for a new bar source. Both fetch
/// methods return bars ordered by timestamp ascending.
#[async_trait]
pub trait BarProvider: Send + Sync {
    /// Unique identifier for this provider, e.g. "YAHOO".
    fn id(&self) -> &'static str;

    /// Fetch intraday (30-minute) bars for a symbol.
    ///
    /// When `since` is given, bars are fetched from that instant to now;
    /// otherwise the provider fetches its default recent window.
    async fn fetch_intraday(
        &self,
        symbol: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, MarketDataError>;

    /// Fetch daily bars covering the trailing `window_days` days.
    async fn fetch_daily(&self, symbol: &str, window_days: i64)
        -> Result<Vec<Bar>, MarketDataError>;
}
