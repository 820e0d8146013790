//! Price Forecaster Engine — next-session price and risk envelope
//!
//! Provides:
//! - EMA / RSI / MACD indicator frame with explicit warm-up handling
//! - Lagged-close feature table and a bagged regression forest
//! - Log-return volatility and Monte Carlo price paths
//! - Heuristic fusion of forecast, RSI and sentiment into a trading signal
//! - Binance public API client for historical prices

pub mod api;
pub mod engine;
pub mod error;
pub mod features;
pub mod forest;
pub mod fusion;
pub mod indicators;
pub mod model;
pub mod simulation;
pub mod types;

// Re-exports for convenience
pub use api::{BinanceClient, PriceSource};
pub use engine::{ForecastEngine, ForecastReport};
pub use error::{EngineResult, ForecastError};
pub use features::{build_feature_table, live_feature_row, FeatureTable, FEATURE_COLUMNS};
pub use forest::{ForestConfig, RandomForest};
pub use fusion::{fusion_score, fusion_signal, FusionInputs, FusionSignal};
pub use indicators::{compute_indicators, IndicatorConfig, IndicatorFrame, IndicatorRow};
pub use model::{forecast_next_close, log_return_volatility, ForecastModel, ForecastResult};
pub use simulation::{simulate_paths, DaySummary, SimulationConfig, SimulationPaths};
pub use types::*;
