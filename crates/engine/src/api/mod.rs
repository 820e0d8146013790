//! Market data providers

pub mod binance;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PriceSeries;

pub use binance::BinanceClient;

/// Source of historical prices for a symbol
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch up to `limit` bars of `interval` history ending now, oldest first
    async fn fetch_series(&self, symbol: &str, interval: &str, limit: u32) -> Result<PriceSeries>;

    /// Latest traded price, if the provider exposes one
    async fn live_price(&self, symbol: &str) -> Result<f64>;
}
