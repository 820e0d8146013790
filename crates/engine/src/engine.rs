//! End-to-end forecast pipeline

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineResult, ForecastError};
use crate::fusion::{fusion_signal, FusionInputs, FusionSignal};
use crate::indicators::compute_indicators;
use crate::model::{forecast_next_close, ForecastResult};
use crate::simulation::{simulate_paths, DaySummary, SimulationConfig};
use crate::types::{ForecastConfig, HistoryPoint, PriceSeries};

/// Everything one forecast run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub prediction: f64,
    pub last_close: f64,
    pub volatility: f64,
    pub rsi: f64,
    pub macd: f64,
    pub sentiment: u8,
    pub fusion_signal: FusionSignal,
    pub simulation_summary: Vec<DaySummary>,
    /// Percentage of simulated paths ending more than 5% above last close
    pub probability_of_increase: f64,
    pub history: Vec<HistoryPoint>,
}

/// Runs indicators, model, simulation and fusion in sequence
pub struct ForecastEngine;

impl ForecastEngine {
    /// Forecast from `series`. `vol_multiplier` is expected in (0, 5) and is
    /// validated by the caller; `sentiment` is clamped to 0..=100.
    pub fn run(
        config: &ForecastConfig,
        series: &PriceSeries,
        sentiment: u8,
        vol_multiplier: f64,
    ) -> EngineResult<ForecastReport> {
        let sentiment = sentiment.min(100);

        let required = config.required_bars();
        if series.len() < required {
            return Err(ForecastError::InsufficientHistory {
                required,
                available: series.len(),
            });
        }

        info!(
            bars = series.len(),
            sentiment,
            vol_multiplier,
            "Starting forecast"
        );

        let frame = compute_indicators(series, &config.indicators)?;
        let forecast = forecast_next_close(&frame, config.min_training_rows, &config.forest)?;

        let sim_config = SimulationConfig {
            days: config.simulation_days,
            simulations: config.simulations,
            vol_multiplier,
            seed: config.simulation_seed,
        };
        let paths = simulate_paths(forecast.last_close, forecast.volatility, &sim_config)?;
        let simulation_summary = paths.summarize();
        let probability_of_increase = paths.probability_of_increase(forecast.last_close);

        let signal = fusion_signal(&fusion_inputs(&forecast, sentiment));

        info!(
            prediction = forecast.predicted_next_close,
            last_close = forecast.last_close,
            volatility = forecast.volatility,
            probability_of_increase,
            signal = %signal,
            "Forecast complete"
        );

        Ok(ForecastReport {
            prediction: forecast.predicted_next_close,
            last_close: forecast.last_close,
            volatility: forecast.volatility,
            rsi: forecast.last_rsi,
            macd: forecast.last_macd,
            sentiment,
            fusion_signal: signal,
            simulation_summary,
            probability_of_increase,
            history: series.history_tail(config.history_points),
        })
    }
}

fn fusion_inputs(forecast: &ForecastResult, sentiment: u8) -> FusionInputs {
    FusionInputs {
        prediction: forecast.predicted_next_close,
        last_close: forecast.last_close,
        rsi: forecast.last_rsi,
        macd: forecast.last_macd,
        sentiment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestConfig;
    use crate::types::PriceBar;

    fn make_series(n: usize) -> PriceSeries {
        let bars = (0..n)
            .map(|i| {
                let t = i as f64;
                let close = 100.0 + (t * 0.15).sin() * 8.0 + (t * 0.05).cos() * 3.0 + t * 0.02;
                PriceBar {
                    timestamp: 1_600_000_000_000 + (i as i64) * 86_400_000,
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0,
                }
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn test_config() -> ForecastConfig {
        ForecastConfig {
            forest: ForestConfig {
                n_trees: 10,
                ..Default::default()
            },
            simulation_seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_run_end_to_end() {
        let series = make_series(200);
        let report = ForecastEngine::run(&test_config(), &series, 50, 1.0).unwrap();

        assert_eq!(report.last_close, series.last_close().unwrap());
        assert!(report.prediction.is_finite());
        assert!(report.volatility > 0.0);
        assert!((0.0..=100.0).contains(&report.rsi));
        assert_eq!(report.simulation_summary.len(), 30);
        assert_eq!(report.simulation_summary[0].day, 1);
        assert_eq!(report.simulation_summary[29].day, 30);
        assert!((0.0..=100.0).contains(&report.probability_of_increase));
        assert_eq!(report.history.len(), 200);
    }

    #[test]
    fn test_minimum_history() {
        let config = test_config();
        assert_eq!(config.required_bars(), 71);

        let report = ForecastEngine::run(&config, &make_series(71), 50, 1.0).unwrap();
        assert_eq!(report.last_close, make_series(71).last_close().unwrap());
        assert!(report.prediction.is_finite());
        assert!(ForecastEngine::run(&config, &make_series(100), 50, 1.0).is_ok());

        let err = ForecastEngine::run(&config, &make_series(70), 50, 1.0).unwrap_err();
        assert_eq!(err.kind(), "insufficient_history");
        assert_eq!(
            err.to_string(),
            "Insufficient history: need at least 71 rows, got 70"
        );

        let err = ForecastEngine::run(&config, &make_series(10), 50, 1.0).unwrap_err();
        assert_eq!(
            err,
            ForecastError::InsufficientHistory {
                required: 71,
                available: 10
            }
        );
    }

    #[test]
    fn test_required_bars_follows_config() {
        let config = ForecastConfig {
            min_training_rows: 60,
            ..Default::default()
        };
        // 49 warm-up bars + 60 training rows + 10 lags + 1 label
        assert_eq!(config.required_bars(), 120);

        let err = ForecastEngine::run(&config, &make_series(119), 50, 1.0).unwrap_err();
        assert_eq!(
            err,
            ForecastError::InsufficientHistory {
                required: 120,
                available: 119
            }
        );
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let series = make_series(180);
        let config = test_config();
        let a = ForecastEngine::run(&config, &series, 70, 2.0).unwrap();
        let b = ForecastEngine::run(&config, &series, 70, 2.0).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_signal_matches_report_fields() {
        let series = make_series(150);
        let report = ForecastEngine::run(&test_config(), &series, 90, 1.0).unwrap();
        let expected = fusion_signal(&FusionInputs {
            prediction: report.prediction,
            last_close: report.last_close,
            rsi: report.rsi,
            macd: report.macd,
            sentiment: 90,
        });
        assert_eq!(report.fusion_signal, expected);
    }

    #[test]
    fn test_sentiment_clamped() {
        let report = ForecastEngine::run(&test_config(), &make_series(130), 250, 1.0).unwrap();
        assert_eq!(report.sentiment, 100);
    }
}
