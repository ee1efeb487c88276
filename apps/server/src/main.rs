use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quotedeck_core::calendar::MarketSession;
use quotedeck_core::ingest::Ingestor;
use quotedeck_core::lock::{build_owner_id, LeaseLock};
use quotedeck_core::scheduler::IngestScheduler;
use quotedeck_core::store::SupabaseStore;
use quotedeck_core::Settings;
use quotedeck_market_data::YahooProvider;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env();
    let session = MarketSession::default();

    let store = Arc::new(SupabaseStore::new(&settings)?);
    let provider = Arc::new(YahooProvider::new()?);

    let owner_id = build_owner_id(&settings);
    let lock = LeaseLock::new(
        store.clone(),
        settings.lock_name.clone(),
        owner_id.clone(),
        settings.lease_seconds,
    );

    let ingestor = Arc::new(Ingestor::new(
        settings.tickers.clone(),
        session,
        provider,
        store,
        lock,
    ));

    let scheduler = IngestScheduler::with_default_jobs(ingestor, settings.market_tz);
    if settings.enable_scheduler {
        scheduler.start();
        tracing::info!("Background scheduler started (owner_id={})", owner_id);
    } else {
        tracing::info!("Scheduler disabled by configuration");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, exiting");
    Ok(())
}
