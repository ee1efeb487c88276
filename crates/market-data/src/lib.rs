//! Quotedeck Market Data Crate
//!
//! Provider-agnostic price-bar fetching for the quotedeck ingestion
//! pipeline.
//!
//! # Overview
//!
//! The crate exposes:
//! - [`Bar`] - an OHLC price bar with a timezone-aware timestamp
//! - [`BarProvider`] - the trait every market data source implements
//! - [`YahooProvider`] - the Yahoo Finance implementation (30-minute
//!   intraday bars and daily bars)
//! - [`MarketDataError`] - the error type for all provider operations,
//!   with transiency classification for retry decisions

pub mod errors;
pub mod models;
pub mod provider;

pub use errors::MarketDataError;
pub use models::Bar;
pub use provider::yahoo::YahooProvider;
pub use provider::BarProvider;
