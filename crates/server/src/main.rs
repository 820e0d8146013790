//! Price-Forecaster — next-session price forecast and risk envelope
//!
//! Usage:
//!   price-forecaster serve --port 8000                 — Launch the HTTP API
//!   price-forecaster forecast --symbol BTCUSDT         — Run one forecast from CLI

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use engine::{
    BinanceClient, ForecastConfig, ForecastEngine, ForecastError, ForecastReport, PriceSeries,
    PriceSource,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_SENTIMENT: u8 = 50;

#[derive(Parser)]
#[command(name = "price-forecaster")]
#[command(about = "Next-session price forecast with Monte Carlo risk envelope", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the forecast web server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
    /// Run a single forecast from CLI (no web server)
    Forecast {
        /// Symbol to forecast (e.g. BTCUSDT or BTC-USD)
        #[arg(long)]
        symbol: String,
        /// External sentiment score, 0 (bearish) to 100 (bullish)
        #[arg(long, default_value_t = DEFAULT_SENTIMENT)]
        sentiment: u8,
        /// Volatility multiplier for the simulation, in (0, 5)
        #[arg(long, default_value_t = 1.0)]
        vol_multiplier: f64,
        /// Seed for reproducible simulation paths
        #[arg(long)]
        seed: Option<u64>,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<String>,
    },
}

/// Market data settings read from the environment
#[derive(Debug, Clone)]
struct DataSettings {
    interval: String,
    history_bars: u32,
}

impl DataSettings {
    fn from_env() -> Self {
        let interval = std::env::var("FORECAST_INTERVAL").unwrap_or_else(|_| "1d".to_string());
        let history_bars = std::env::var("FORECAST_HISTORY_BARS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(730);
        Self {
            interval,
            history_bars,
        }
    }
}

#[derive(Clone)]
struct AppState {
    source: Arc<dyn PriceSource>,
    config: Arc<ForecastConfig>,
    data: Arc<DataSettings>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,price_forecaster=debug")
    } else {
        EnvFilter::new("info,engine=info,price_forecaster=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn validate_vol_multiplier(vol_multiplier: f64) -> Result<(), String> {
    if vol_multiplier > 0.0 && vol_multiplier < 5.0 {
        Ok(())
    } else {
        Err(format!(
            "vol_multiplier must be greater than 0 and less than 5, got {}",
            vol_multiplier
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port).await?;
        }
        Commands::Forecast {
            symbol,
            sentiment,
            vol_multiplier,
            seed,
            export,
        } => {
            cmd_forecast(symbol, sentiment, vol_multiplier, seed, export).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Data loading
// ============================================================================

/// Fetch history and overwrite the last close with the live ticker price
/// when the provider has one
async fn load_series(
    source: &dyn PriceSource,
    symbol: &str,
    data: &DataSettings,
) -> anyhow::Result<PriceSeries> {
    let series = source
        .fetch_series(symbol, &data.interval, data.history_bars)
        .await?;

    match source.live_price(symbol).await {
        Ok(price) => match series.clone().with_last_close(price) {
            Ok(updated) => {
                info!(symbol, price, "Updated last close with live price");
                Ok(updated)
            }
            Err(e) => {
                warn!(symbol, "Ignoring live price: {}", e);
                Ok(series)
            }
        },
        Err(e) => {
            warn!(symbol, "Live price unavailable: {}", e);
            Ok(series)
        }
    }
}

async fn run_pipeline(
    config: Arc<ForecastConfig>,
    series: PriceSeries,
    sentiment: u8,
    vol_multiplier: f64,
) -> anyhow::Result<Result<ForecastReport, ForecastError>> {
    // Model fitting is CPU-bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || {
        ForecastEngine::run(&config, &series, sentiment, vol_multiplier)
    })
    .await?;
    Ok(result)
}

// ============================================================================
// Serve command — Axum web server
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("Price-Forecaster v{} starting...", APP_VERSION);

    let data = DataSettings::from_env();
    info!(
        interval = %data.interval,
        history_bars = data.history_bars,
        "Market data settings"
    );

    let state = AppState {
        source: Arc::new(BinanceClient::new()),
        config: Arc::new(ForecastConfig::default()),
        data: Arc::new(data),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/predict/:symbol", get(api_predict))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Price-Forecaster v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/predict/:symbol     - Forecast (?vol_multiplier=&sentiment=)");
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Forecast command — CLI mode (no web server)
// ============================================================================

async fn cmd_forecast(
    symbol: String,
    sentiment: u8,
    vol_multiplier: f64,
    seed: Option<u64>,
    export: Option<String>,
) -> anyhow::Result<()> {
    validate_vol_multiplier(vol_multiplier).map_err(anyhow::Error::msg)?;

    println!("\n=== Price-Forecaster v{} ===", APP_VERSION);

    let data = DataSettings::from_env();
    let client = BinanceClient::new();
    let series = load_series(&client, &symbol, &data).await?;
    println!(
        "Symbol: {} | Bars: {} | Interval: {} | Sentiment: {} | Vol x{}",
        symbol,
        series.len(),
        data.interval,
        sentiment,
        vol_multiplier
    );

    let config = Arc::new(ForecastConfig {
        simulation_seed: seed,
        ..Default::default()
    });
    let report = run_pipeline(config, series, sentiment, vol_multiplier).await??;

    print_report(&report);

    if let Some(export_path) = export {
        let json = serde_json::to_string_pretty(&report_json(&symbol, &report))?;
        std::fs::write(&export_path, &json)?;
        println!("\nReport exported to {}", export_path);
    }

    Ok(())
}

fn print_report(report: &ForecastReport) {
    println!("\nForecast:");
    println!("  Last close:        {:>12.4}", report.last_close);
    println!("  Predicted close:   {:>12.4}", report.prediction);
    println!("  Volatility:        {:>12.6}", report.volatility);
    println!("  RSI:               {:>12.2}", report.rsi);
    println!("  MACD:              {:>12.4}", report.macd);
    println!("  Fusion signal:     {:>12}", report.fusion_signal.to_string());
    println!(
        "  P(+5% at horizon): {:>11.1}%",
        report.probability_of_increase
    );

    println!("\nSimulation:");
    println!("  {:>4}  {:>12} {:>12} {:>12}", "Day", "P10", "Mean", "P90");
    println!("  {}", "-".repeat(44));
    for day in &report.simulation_summary {
        println!(
            "  {:>4}  {:>12.4} {:>12.4} {:>12.4}",
            day.day, day.p10, day.mean, day.p90
        );
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "price-forecaster",
        "version": APP_VERSION,
    }))
}

/// Query params for the predict endpoint
#[derive(Deserialize)]
struct PredictParams {
    #[serde(default = "default_vol_multiplier")]
    vol_multiplier: f64,
    #[serde(default = "default_sentiment")]
    sentiment: u8,
}

fn default_vol_multiplier() -> f64 {
    1.0
}

fn default_sentiment() -> u8 {
    DEFAULT_SENTIMENT
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, kind: &str, message: String) -> ApiError {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "kind": kind,
            "message": message,
        })),
    )
}

fn forecast_error_status(err: &ForecastError) -> StatusCode {
    match err {
        ForecastError::InsufficientHistory { .. } => StatusCode::NOT_FOUND,
        ForecastError::InvalidSeries(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Unpack and range-check the predict query; every failure is a JSON 400
fn parse_predict_params(
    query: Result<Query<PredictParams>, QueryRejection>,
) -> Result<PredictParams, ApiError> {
    let Query(params) = query.map_err(|rejection| {
        api_error(
            StatusCode::BAD_REQUEST,
            "invalid_parameter",
            rejection.body_text(),
        )
    })?;
    validate_vol_multiplier(params.vol_multiplier)
        .map_err(|msg| api_error(StatusCode::BAD_REQUEST, "invalid_parameter", msg))?;
    if params.sentiment > 100 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_parameter",
            format!("sentiment must be between 0 and 100, got {}", params.sentiment),
        ));
    }
    Ok(params)
}

/// GET /api/predict/:symbol — forecast the next close for a symbol
async fn api_predict(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    query: Result<Query<PredictParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let params = parse_predict_params(query)?;

    info!(
        %symbol,
        vol_multiplier = params.vol_multiplier,
        sentiment = params.sentiment,
        "Forecast requested"
    );

    let series = load_series(state.source.as_ref(), &symbol, &state.data)
        .await
        .map_err(|e| {
            error!(%symbol, "Failed to load prices: {:#}", e);
            api_error(
                StatusCode::NOT_FOUND,
                "data_unavailable",
                format!("Ticker not found or data unavailable: {}", e),
            )
        })?;

    let report = run_pipeline(
        state.config.clone(),
        series,
        params.sentiment,
        params.vol_multiplier,
    )
    .await
    .map_err(|e| {
        error!(%symbol, "Forecast task failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
    })?
    .map_err(|e| {
        error!(%symbol, kind = e.kind(), "Forecast failed: {}", e);
        api_error(forecast_error_status(&e), e.kind(), e.to_string())
    })?;

    Ok(Json(report_json(&symbol, &report)))
}

// ============================================================================
// Helpers
// ============================================================================

/// Response body shared by the HTTP API and CLI export
fn report_json(symbol: &str, report: &ForecastReport) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "symbol": symbol,
        "generated_at": Utc::now().to_rfc3339(),
        "last_close": report.last_close,
        "predicted_next_close": report.prediction,
        "volatility": report.volatility,
        "rsi": report.rsi,
        "macd": report.macd,
        "sentiment": report.sentiment,
        "fusion_signal": report.fusion_signal,
        "simulation_data": report.simulation_summary,
        "historical_data": report.history,
        "probability_increase_5_percent": report.probability_of_increase,
    })
}
