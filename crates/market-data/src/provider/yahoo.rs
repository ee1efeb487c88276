//! Yahoo Finance market data provider.
//!
//! Fetches 30-minute intraday bars and daily bars through the Yahoo
//! Finance chart API. Yahoo limits intraday history to roughly the last
//! 60 days, so the intraday default window is a short rolling one.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::warn;
use yahoo_finance_api as yahoo;

use crate::errors::MarketDataError;
use crate::models::Bar;
use crate::provider::BarProvider;

const PROVIDER_ID: &str = "YAHOO";

/// Default intraday lookback when no persisted timestamp exists.
const DEFAULT_INTRADAY_WINDOW_DAYS: i64 = 7;

/// Yahoo Finance bar provider.
pub struct YahooProvider {
    connector: yahoo::YahooConnector,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider.
    pub fn new() -> Result<Self, MarketDataError> {
        let connector =
            yahoo::YahooConnector::new().map_err(|e| MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to initialize Yahoo connector: {}", e),
            })?;
        Ok(Self { connector })
    }

    /// Convert chrono DateTime<Utc> to time::OffsetDateTime for the Yahoo API.
    fn chrono_to_offset_datetime(dt: DateTime<Utc>) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(dt.timestamp())
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    fn map_yahoo_error(symbol: &str, error: yahoo::YahooError) -> MarketDataError {
        if matches!(error, yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult) {
            MarketDataError::SymbolNotFound(symbol.to_string())
        } else {
            MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Convert a Yahoo quote to a Bar.
    fn yahoo_quote_to_bar(yahoo_quote: yahoo::Quote) -> Result<Bar, MarketDataError> {
        let timestamp: DateTime<Utc> = Utc
            .timestamp_opt(yahoo_quote.timestamp as i64, 0)
            .single()
            .ok_or_else(|| MarketDataError::ValidationFailed {
                message: format!("Invalid timestamp: {}", yahoo_quote.timestamp),
            })?;

        let price = |value: f64, field: &str| {
            Decimal::from_f64_retain(value).ok_or_else(|| MarketDataError::ValidationFailed {
                message: format!("Failed to convert {} price {} to Decimal", field, value),
            })
        };

        Ok(Bar {
            timestamp,
            open: price(yahoo_quote.open, "open")?,
            high: price(yahoo_quote.high, "high")?,
            low: price(yahoo_quote.low, "low")?,
            close: price(yahoo_quote.close, "close")?,
        })
    }

    /// Convert a chart response into bars, skipping individual quotes that
    /// fail conversion.
    fn response_to_bars(symbol: &str, response: yahoo::YResponse) -> Vec<Bar> {
        match response.quotes() {
            Ok(yahoo_quotes) => yahoo_quotes
                .into_iter()
                .filter_map(|q| match Self::yahoo_quote_to_bar(q) {
                    Ok(bar) => Some(bar),
                    Err(e) => {
                        warn!("Skipping bar for {} due to conversion error: {:?}", symbol, e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("No quotes in Yahoo response for {}: {}", symbol, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl BarProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_intraday(
        &self,
        symbol: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let end = Utc::now();
        let start = since.unwrap_or(end - Duration::days(DEFAULT_INTRADAY_WINDOW_DAYS));

        let response = self
            .connector
            .get_quote_history_interval(
                symbol,
                Self::chrono_to_offset_datetime(start),
                Self::chrono_to_offset_datetime(end),
                "30m",
            )
            .await
            .map_err(|e| Self::map_yahoo_error(symbol, e))?;

        let mut bars = Self::response_to_bars(symbol, response);
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        window_days: i64,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let end = Utc::now();
        let start = end - Duration::days(window_days);

        let response = self
            .connector
            .get_quote_history(
                symbol,
                Self::chrono_to_offset_datetime(start),
                Self::chrono_to_offset_datetime(end),
            )
            .await
            .map_err(|e| Self::map_yahoo_error(symbol, e))?;

        let mut bars = Self::response_to_bars(symbol, response);
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn yahoo_quote(timestamp: u64, close: f64) -> yahoo::Quote {
        yahoo::Quote {
            timestamp: timestamp as i64,
            open: 100.0,
            high: 101.5,
            low: 99.25,
            volume: 1_000,
            close,
            adjclose: close,
        }
    }

    #[test]
    fn test_yahoo_quote_to_bar_maps_prices_and_timestamp() {
        let bar = YahooProvider::yahoo_quote_to_bar(yahoo_quote(1_704_897_000, 102.0)).unwrap();
        assert_eq!(bar.timestamp, Utc.timestamp_opt(1_704_897_000, 0).unwrap());
        assert_eq!(bar.open, dec!(100.0));
        assert_eq!(bar.high, dec!(101.5));
        assert_eq!(bar.low, dec!(99.25));
        assert_eq!(bar.close, dec!(102.0));
    }

    #[test]
    fn test_yahoo_quote_to_bar_rejects_invalid_timestamp() {
        // Far beyond chrono's representable range.
        let result = YahooProvider::yahoo_quote_to_bar(yahoo_quote(i64::MAX as u64, 102.0));
        assert!(matches!(
            result,
            Err(MarketDataError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_yahoo_quote_to_bar_rejects_non_finite_price() {
        let result = YahooProvider::yahoo_quote_to_bar(yahoo_quote(1_704_897_000, f64::NAN));
        assert!(matches!(
            result,
            Err(MarketDataError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_chrono_to_offset_datetime_preserves_unix_timestamp() {
        let dt = Utc.timestamp_opt(1_704_897_000, 0).unwrap();
        let offset = YahooProvider::chrono_to_offset_datetime(dt);
        assert_eq!(offset.unix_timestamp(), 1_704_897_000);
    }
}
