//! Application settings.
//!
//! One explicit [`Settings`] struct, built once by the process entry point
//! and passed by constructor to every component. No component reads the
//! environment directly.

use chrono_tz::Tz;

/// Default symbol universe when `TICKERS` is not set.
const DEFAULT_TICKERS: &[&str] = &["TSM", "AAPL", "NVDA", "^GSPC"];

const DEFAULT_LOCK_NAME: &str = "global_ingestion_lock";
const DEFAULT_LEASE_SECONDS: i64 = 120;
const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Symbols to ingest, in processing order.
    pub tickers: Vec<String>,

    // Supabase
    pub supabase_url: String,
    pub supabase_key: String,
    pub supabase_schema: String,

    // Scheduler / Lock
    /// Optional fixed owner-id override for the lease lock.
    pub instance_id: Option<String>,
    pub lock_name: String,
    pub lease_seconds: i64,
    pub enable_scheduler: bool,

    // Market / Timezone
    pub market_tz: Tz,
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Self {
        let tickers = std::env::var("TICKERS")
            .map(|raw| parse_tickers(&raw))
            .ok()
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect());

        let supabase_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .unwrap_or_default();

        Self {
            tickers,
            supabase_url: std::env::var("SUPABASE_URL").unwrap_or_default(),
            supabase_key,
            supabase_schema: std::env::var("SUPABASE_SCHEMA")
                .unwrap_or_else(|_| DEFAULT_SCHEMA.to_string()),
            instance_id: std::env::var("INSTANCE_ID").ok().filter(|s| !s.is_empty()),
            lock_name: std::env::var("INGEST_LOCK_NAME")
                .unwrap_or_else(|_| DEFAULT_LOCK_NAME.to_string()),
            lease_seconds: std::env::var("INGEST_LOCK_LEASE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LEASE_SECONDS),
            enable_scheduler: std::env::var("ENABLE_SCHEDULER")
                .map(|v| parse_bool_flag(&v))
                .unwrap_or(true),
            market_tz: chrono_tz::America::New_York,
        }
    }
}

fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}
