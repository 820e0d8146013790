//! Error taxonomy for the forecasting pipeline

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Insufficient history: need at least {required} rows, got {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Degenerate volatility: {0}")]
    DegenerateVolatility(String),

    #[error("Model fit failed: {0}")]
    ModelFit(String),

    #[error("Invalid price series: {0}")]
    InvalidSeries(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ForecastError {
    /// Stable machine-readable kind, used by callers to build structured failures
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::InsufficientHistory { .. } => "insufficient_history",
            ForecastError::DegenerateVolatility(_) => "degenerate_volatility",
            ForecastError::ModelFit(_) => "model_fit_failure",
            ForecastError::InvalidSeries(_) => "invalid_series",
            ForecastError::InvalidConfig(_) => "invalid_config",
        }
    }
}

pub type EngineResult<T> = Result<T, ForecastError>;
