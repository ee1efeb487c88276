//! Row models for the shared store's tables.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationError};
use quotedeck_market_data::Bar;

/// Outcome of the most recent ingestion run, as persisted in the store.
///
/// A successful run sets `last_success_utc` and clears `last_error`; a
/// failed run does the opposite. Read-mostly by the dashboard layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionStatus {
    pub last_success_utc: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// A row of the intraday bar table.
///
/// Carries the market-local date/time alongside the UTC timestamp so the
/// dashboard can slice by trading day without timezone math.
#[derive(Debug, Clone, Serialize)]
pub struct IntradayBarRow {
    pub ticker: String,
    pub ts_utc: String,
    pub ny_date: String,
    pub ny_time: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl IntradayBarRow {
    pub fn from_bar(ticker: &str, bar: &Bar, tz: &Tz) -> Self {
        let local = bar.timestamp.with_timezone(tz);
        Self {
            ticker: ticker.to_string(),
            ts_utc: format_utc(bar.timestamp),
            ny_date: local.date_naive().to_string(),
            ny_time: local.time().format("%H:%M:%S").to_string(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }
}

/// A row of the daily bar table, keyed by the market-local date.
#[derive(Debug, Clone, Serialize)]
pub struct DailyBarRow {
    pub ticker: String,
    pub ny_date: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl DailyBarRow {
    pub fn from_bar(ticker: &str, bar: &Bar, tz: &Tz) -> Self {
        let local = bar.timestamp.with_timezone(tz);
        Self {
            ticker: ticker.to_string(),
            ny_date: local.date_naive().to_string(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }
}

/// Wire shape of the ingestion status row.
#[derive(Debug, Deserialize)]
pub struct StatusRow {
    pub last_success_utc: Option<String>,
    pub last_error: Option<String>,
}

impl StatusRow {
    pub fn into_status(self) -> Result<IngestionStatus> {
        let last_success_utc = self
            .last_success_utc
            .as_deref()
            .map(parse_utc_timestamp)
            .transpose()?;
        Ok(IngestionStatus {
            last_success_utc,
            last_error: self.last_error,
        })
    }
}

pub fn format_utc(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp into UTC.
///
/// Strings without a UTC offset are rejected: session boundaries are only
/// meaningful relative to a known offset, so a naive timestamp in the
/// store indicates a writer bug and must surface, not be guessed at.
pub fn parse_utc_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            ValidationError::InvalidInput(format!("timestamp {:?} lacks a UTC offset: {}", raw, e))
                .into()
        })
}
