//! Technical indicators for the feature pipeline
//!
//! Derives EMA(20), EMA(50), a simple-window RSI(14), MACD(12, 26) and its
//! 9-period signal line from a price series. Every value at row `t` uses only
//! closes at or before `t`; rows inside the warm-up window are dropped.

use serde::{Deserialize, Serialize};
use ta::indicators::{ExponentialMovingAverage, MovingAverageConvergenceDivergence};
use ta::Next;
use tracing::debug;

use crate::error::{EngineResult, ForecastError};
use crate::types::PriceSeries;

// ============================================================================
// Configuration
// ============================================================================

/// Indicator periods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Fast EMA span (default: 20)
    pub ema_fast: usize,
    /// Slow EMA span (default: 50)
    pub ema_slow: usize,
    /// RSI window in deltas (default: 14)
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorConfig {
    /// Observations needed before a row is kept: the longest lookback window
    pub fn warmup(&self) -> usize {
        [
            self.ema_fast,
            self.ema_slow,
            self.rsi_period + 1,
            self.macd_slow,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A price row extended with its derived indicator columns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub timestamp: i64,
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub macd: f64,
    pub signal_line: f64,
}

/// Warmed-up indicator rows in time order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorFrame {
    rows: Vec<IndicatorRow>,
}

impl IndicatorFrame {
    pub fn from_rows(rows: Vec<IndicatorRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    pub fn last(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Computation
// ============================================================================

/// Compute the indicator frame for a price series
pub fn compute_indicators(
    series: &PriceSeries,
    config: &IndicatorConfig,
) -> EngineResult<IndicatorFrame> {
    if config.rsi_period == 0 {
        return Err(ForecastError::InvalidConfig(
            "RSI period must be at least 1".to_string(),
        ));
    }

    let warmup = config.warmup();
    if series.len() < warmup {
        return Err(ForecastError::InsufficientHistory {
            required: warmup,
            available: series.len(),
        });
    }

    let mut ema_fast = ExponentialMovingAverage::new(config.ema_fast)
        .map_err(|e| invalid_period("fast EMA", config.ema_fast, e))?;
    let mut ema_slow = ExponentialMovingAverage::new(config.ema_slow)
        .map_err(|e| invalid_period("slow EMA", config.ema_slow, e))?;
    let mut macd = MovingAverageConvergenceDivergence::new(
        config.macd_fast,
        config.macd_slow,
        config.macd_signal,
    )
    .map_err(|e| invalid_period("MACD", config.macd_slow, e))?;

    let closes = series.closes();
    let rsi = rolling_rsi(&closes, config.rsi_period);

    let mut rows = Vec::with_capacity(series.len() + 1 - warmup);
    for (i, bar) in series.bars().iter().enumerate() {
        // Every indicator must see every bar, warm-up included
        let fast = ema_fast.next(bar.close);
        let slow = ema_slow.next(bar.close);
        let macd_out = macd.next(bar.close);

        if i + 1 < warmup {
            continue;
        }
        let Some(rsi) = rsi[i] else {
            continue;
        };

        rows.push(IndicatorRow {
            timestamp: bar.timestamp,
            close: bar.close,
            ema_fast: fast,
            ema_slow: slow,
            rsi,
            macd: macd_out.macd,
            signal_line: macd_out.signal,
        });
    }

    debug!(
        input_rows = series.len(),
        output_rows = rows.len(),
        warmup,
        "Computed indicator frame"
    );

    Ok(IndicatorFrame { rows })
}

fn invalid_period(name: &str, period: usize, err: ta::errors::TaError) -> ForecastError {
    ForecastError::InvalidConfig(format!("invalid {} period {}: {:?}", name, period, err))
}

/// RSI over a trailing simple window of `period` close-to-close deltas.
///
/// `None` until `period` deltas exist. Zero average loss is resolved
/// explicitly: 100 when there were gains, 50 when the window is flat.
pub fn rolling_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = vec![0.0; closes.len()];
    let mut losses = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }

    (0..closes.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let window = i + 1 - period..=i;
            let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
            let avg_loss = losses[window].iter().sum::<f64>() / period as f64;
            Some(rsi_from_averages(avg_gain, avg_loss))
        })
        .collect()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}
