//! Types for the forecasting engine

use chrono::{TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, ForecastError};
use crate::features::required_frame_rows;
use crate::forest::ForestConfig;
use crate::indicators::IndicatorConfig;

/// A single candlestick (OHLCV) as delivered by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

/// One row of a price series, converted to floating point for the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Bar open time, milliseconds since epoch
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Time-ordered OHLCV rows. Timestamps are strictly increasing and every
/// close is finite and positive; both are checked on construction.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> EngineResult<Self> {
        for (i, bar) in bars.iter().enumerate() {
            if !bar.close.is_finite() || bar.close <= 0.0 {
                return Err(ForecastError::InvalidSeries(format!(
                    "close at row {} is not a positive finite number ({})",
                    i, bar.close
                )));
            }
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(ForecastError::InvalidSeries(format!(
                    "timestamps not strictly increasing at row {} ({} after {})",
                    i,
                    bar.timestamp,
                    bars[i - 1].timestamp
                )));
            }
        }
        Ok(Self { bars })
    }

    /// Build a series from exchange klines
    pub fn from_klines(klines: &[Kline]) -> EngineResult<Self> {
        let bars = klines
            .iter()
            .map(|k| {
                Ok(PriceBar {
                    timestamp: k.open_time,
                    open: decimal_to_f64(k.open)?,
                    high: decimal_to_f64(k.high)?,
                    low: decimal_to_f64(k.low)?,
                    close: decimal_to_f64(k.close)?,
                    volume: decimal_to_f64(k.volume)?,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Self::new(bars)
    }

    /// Replace the most recent close, e.g. with a live ticker price
    pub fn with_last_close(mut self, close: f64) -> EngineResult<Self> {
        if !close.is_finite() || close <= 0.0 {
            return Err(ForecastError::InvalidSeries(format!(
                "live close {} is not a positive finite number",
                close
            )));
        }
        if let Some(last) = self.bars.last_mut() {
            last.close = close;
        }
        Ok(self)
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// The last `n` closes as dated points, oldest first
    pub fn history_tail(&self, n: usize) -> Vec<HistoryPoint> {
        let start = self.bars.len().saturating_sub(n);
        self.bars[start..]
            .iter()
            .map(|b| HistoryPoint {
                date: format_date(b.timestamp),
                close: b.close,
            })
            .collect()
    }
}

/// A dated close for charting recent history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    pub close: f64,
}

fn decimal_to_f64(value: Decimal) -> EngineResult<f64> {
    value
        .to_f64()
        .ok_or_else(|| ForecastError::InvalidSeries(format!("price {} out of f64 range", value)))
}

fn format_date(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Configuration for a forecast run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub indicators: IndicatorConfig,
    /// Labelled feature rows required before the model is trained (default: 11)
    pub min_training_rows: usize,
    pub forest: ForestConfig,
    /// Simulation horizon in bars (default: 30)
    pub simulation_days: usize,
    /// Number of simulated paths (default: 100)
    pub simulations: usize,
    /// Fixed seed for reproducible simulations; entropy-seeded when None
    pub simulation_seed: Option<u64>,
    /// Closes included in the historical tail of a report (default: 365)
    pub history_points: usize,
}

impl ForecastConfig {
    /// Raw bars needed for a forecast: indicator warm-up, lag window, label
    /// shift and the training minimum (71 with defaults)
    pub fn required_bars(&self) -> usize {
        self.indicators.warmup().saturating_sub(1) + required_frame_rows(self.min_training_rows)
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            indicators: IndicatorConfig::default(),
            min_training_rows: 11,
            forest: ForestConfig::default(),
            simulation_days: 30,
            simulations: 100,
            simulation_seed: None,
            history_points: 365,
        }
    }
}
