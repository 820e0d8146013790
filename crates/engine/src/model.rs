//! Next-close forecast: forest fit on the feature table, inference on the
//! live row, and historical log-return volatility

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineResult, ForecastError};
use crate::features::{build_feature_table, live_feature_row, FeatureTable};
use crate::forest::{ForestConfig, RandomForest};
use crate::indicators::IndicatorFrame;

/// Point forecast and the latest indicator readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub predicted_next_close: f64,
    pub last_close: f64,
    /// Sample standard deviation of log returns
    pub volatility: f64,
    pub last_rsi: f64,
    pub last_macd: f64,
}

/// A forest fitted on one feature table. Built fresh for every forecast.
pub struct ForecastModel {
    forest: RandomForest,
}

impl ForecastModel {
    pub fn fit(table: &FeatureTable, config: &ForestConfig) -> EngineResult<Self> {
        let mut forest = RandomForest::new(config.clone());
        forest.fit(&table.features, &table.labels, &table.feature_names)?;
        Ok(Self { forest })
    }

    pub fn predict(&self, row: &[f64]) -> EngineResult<f64> {
        self.forest.predict_one(row)
    }
}

/// Train on `frame` and forecast the close after its last row
pub fn forecast_next_close(
    frame: &IndicatorFrame,
    min_training_rows: usize,
    forest: &ForestConfig,
) -> EngineResult<ForecastResult> {
    let table = build_feature_table(frame, min_training_rows)?;
    let model = ForecastModel::fit(&table, forest)?;

    let live_row = live_feature_row(frame)?;
    let predicted_next_close = model.predict(&live_row)?;

    let volatility = log_return_volatility(&table.frame.closes());

    let last = frame.last().ok_or(ForecastError::InsufficientHistory {
        required: 1,
        available: 0,
    })?;

    debug!(
        samples = table.n_samples(),
        prediction = predicted_next_close,
        last_close = last.close,
        volatility,
        "Forecast computed"
    );

    Ok(ForecastResult {
        predicted_next_close,
        last_close: last.close,
        volatility,
        last_rsi: last.rsi,
        last_macd: last.macd,
    })
}

/// Sample standard deviation (n - 1) of `ln(close_t / close_{t-1})`.
///
/// Fewer than two returns leave the estimate undefined; it is clamped to
/// 0.0 and a warning is logged.
pub fn log_return_volatility(closes: &[f64]) -> f64 {
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    if returns.len() < 2 {
        warn!(
            returns = returns.len(),
            "Too few log returns for a volatility estimate, using 0"
        );
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
