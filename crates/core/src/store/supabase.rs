//! Supabase (PostgREST) store client.
//!
//! Implements [`BarStore`] and [`LockStore`] against a Supabase project:
//! table upserts go through `POST /rest/v1/<table>?on_conflict=...` with
//! merge-duplicates resolution, and the lock's atomic operations call the
//! store-side Postgres functions through `POST /rest/v1/rpc/<fn>`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use super::models::{
    format_utc, DailyBarRow, IngestionStatus, IntradayBarRow, StatusRow,
};
use super::{BarStore, STATUS_KEY, TABLE_APP_STATE, TABLE_DAILY, TABLE_INTRADAY};
use crate::errors::{ConfigError, Result, StoreError};
use crate::lock::LockStore;
use crate::settings::Settings;
use quotedeck_market_data::Bar;

const REQUEST_TIMEOUT_SECS: u64 = 20;

/// PostgREST upsert preference: merge on conflict, return the written rows
/// so the affected count can be reported.
const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";

pub struct SupabaseStore {
    http: Client,
    base_url: String,
    market_tz: Tz,
}

impl SupabaseStore {
    /// Build a store client from settings.
    ///
    /// Fails fast when the project URL or service key is missing: every
    /// later call would be rejected by the store anyway.
    pub fn new(settings: &Settings) -> Result<Self> {
        if settings.supabase_url.is_empty() {
            return Err(ConfigError::MissingKey("SUPABASE_URL".to_string()).into());
        }
        if settings.supabase_key.is_empty() {
            return Err(
                ConfigError::MissingKey("SUPABASE_SERVICE_ROLE_KEY".to_string()).into(),
            );
        }

        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(&settings.supabase_key).map_err(|_| {
            ConfigError::InvalidValue("service key is not a valid header value".to_string())
        })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", settings.supabase_key))
            .map_err(|_| {
                ConfigError::InvalidValue("service key is not a valid header value".to_string())
            })?;
        let schema = HeaderValue::from_str(&settings.supabase_schema).map_err(|_| {
            ConfigError::InvalidValue("schema is not a valid header value".to_string())
        })?;
        headers.insert(HeaderName::from_static("apikey"), key_value);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(HeaderName::from_static("accept-profile"), schema.clone());
        headers.insert(HeaderName::from_static("content-profile"), schema);

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(StoreError::from)?;

        Ok(Self {
            http,
            base_url: settings.supabase_url.trim_end_matches('/').to_string(),
            market_tz: settings.market_tz,
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    /// Call a store-side function returning a boolean.
    async fn rpc_bool(&self, function: &str, params: serde_json::Value) -> Result<bool> {
        let response = self
            .http
            .post(self.rest_url(&format!("rpc/{}", function)))
            .json(&params)
            .send()
            .await
            .map_err(StoreError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(response.json::<bool>().await.map_err(StoreError::from)?)
    }

    /// Upsert rows into a table; returns the affected row count.
    async fn upsert<T: Serialize>(
        &self,
        table: &str,
        on_conflict: &str,
        rows: &[T],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let response = self
            .http
            .post(self.rest_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", UPSERT_PREFER)
            .json(&rows)
            .send()
            .await
            .map_err(StoreError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let returned: Vec<serde_json::Value> =
            response.json().await.map_err(StoreError::from)?;
        debug!("upserted {} rows into {}", returned.len(), table);
        Ok(returned.len())
    }

    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let response = self
            .http
            .get(self.rest_url(table))
            .query(query)
            .send()
            .await
            .map_err(StoreError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(response.json().await.map_err(StoreError::from)?)
    }
}

#[async_trait]
impl BarStore for SupabaseStore {
    async fn upsert_intraday_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize> {
        let rows: Vec<IntradayBarRow> = bars
            .iter()
            .map(|bar| IntradayBarRow::from_bar(symbol, bar, &self.market_tz))
            .collect();
        self.upsert(TABLE_INTRADAY, "ticker,ts_utc", &rows).await
    }

    async fn upsert_daily_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize> {
        let rows: Vec<DailyBarRow> = bars
            .iter()
            .map(|bar| DailyBarRow::from_bar(symbol, bar, &self.market_tz))
            .collect();
        self.upsert(TABLE_DAILY, "ticker,ny_date", &rows).await
    }

    async fn latest_intraday_timestamp(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        #[derive(serde::Deserialize)]
        struct TsRow {
            ts_utc: String,
        }

        let ticker_filter = format!("eq.{}", symbol);
        let rows: Vec<TsRow> = self
            .select(
                TABLE_INTRADAY,
                &[
                    ("select", "ts_utc"),
                    ("ticker", ticker_filter.as_str()),
                    ("order", "ts_utc.desc"),
                    ("limit", "1"),
                ],
            )
            .await?;

        rows.first()
            .map(|row| super::models::parse_utc_timestamp(&row.ts_utc))
            .transpose()
    }

    async fn set_ingestion_status(
        &self,
        last_success_utc: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> Result<()> {
        let payload = json!({
            "key": STATUS_KEY,
            "last_success_utc": last_success_utc.map(format_utc),
            "last_error": last_error,
            "updated_at": format_utc(Utc::now()),
        });
        self.upsert(TABLE_APP_STATE, "key", &[payload]).await?;
        Ok(())
    }

    async fn get_ingestion_status(&self) -> Result<IngestionStatus> {
        let key_filter = format!("eq.{}", STATUS_KEY);
        let rows: Vec<StatusRow> = self
            .select(
                TABLE_APP_STATE,
                &[
                    ("select", "last_success_utc,last_error"),
                    ("key", key_filter.as_str()),
                    ("limit", "1"),
                ],
            )
            .await?;

        match rows.into_iter().next() {
            Some(row) => row.into_status(),
            None => Ok(IngestionStatus::default()),
        }
    }
}

#[async_trait]
impl LockStore for SupabaseStore {
    async fn acquire_lock(&self, name: &str, owner: &str, lease_seconds: i64) -> Result<bool> {
        self.rpc_bool(
            "acquire_ingest_lock",
            json!({
                "p_lock_name": name,
                "p_owner_id": owner,
                "p_lease_seconds": lease_seconds,
            }),
        )
        .await
    }

    async fn heartbeat_lock(&self, name: &str, owner: &str, lease_seconds: i64) -> Result<bool> {
        self.rpc_bool(
            "heartbeat_ingest_lock",
            json!({
                "p_lock_name": name,
                "p_owner_id": owner,
                "p_lease_seconds": lease_seconds,
            }),
        )
        .await
    }

    async fn release_lock(&self, name: &str, owner: &str) -> Result<bool> {
        self.rpc_bool(
            "release_ingest_lock",
            json!({
                "p_lock_name": name,
                "p_owner_id": owner,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn settings_with(url: &str, key: &str) -> Settings {
        let mut settings = Settings::from_env();
        settings.supabase_url = url.to_string();
        settings.supabase_key = key.to_string();
        settings.supabase_schema = "public".to_string();
        settings
    }

    #[test]
    fn test_missing_url_or_key_is_rejected() {
        let result = SupabaseStore::new(&settings_with("", "key"));
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingKey(_)))
        ));

        let result = SupabaseStore::new(&settings_with("https://x.supabase.co", ""));
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingKey(_)))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let store = SupabaseStore::new(&settings_with("https://x.supabase.co/", "key")).unwrap();
        assert_eq!(
            store.rest_url("rpc/acquire_ingest_lock"),
            "https://x.supabase.co/rest/v1/rpc/acquire_ingest_lock"
        );
        assert_eq!(
            store.rest_url(TABLE_INTRADAY),
            "https://x.supabase.co/rest/v1/price_bars_30m"
        );
    }
}
