//! Bar domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLC price bar.
///
/// The timestamp marks the start of the bar's interval and is always UTC;
/// timezone-naive timestamps never enter the pipeline. Volume is not carried
/// because the downstream store persists OHLC only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}
