//! Monte Carlo price paths
//!
//! Each path compounds from the previous simulated price:
//! `p[s] = p[s-1] * (1 + N(0, sigma))`, with `p[0] = last_close` kept out of
//! the output. This is an arithmetic-return random walk rather than true
//! GBM: there is no drift or variance correction, and a draw below -1
//! flips the price negative. Large volatility multipliers make that likely.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineResult, ForecastError};

/// Threshold above last close counted by `probability_of_increase`
pub const TARGET_GAIN: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub days: usize,
    pub simulations: usize,
    pub vol_multiplier: f64,
    /// Fixed seed for reproducible paths; OS entropy when None
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            days: 30,
            simulations: 100,
            vol_multiplier: 1.0,
            seed: None,
        }
    }
}

/// Simulated closes, one row per path, one column per day
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPaths {
    paths: Vec<Vec<f64>>,
    days: usize,
}

/// Cross-path statistics for one simulated day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    /// 1-based: day 1 is the first simulated step
    pub day: usize,
    pub mean: f64,
    pub p90: f64,
    pub p10: f64,
}

impl SimulationPaths {
    pub fn paths(&self) -> &[Vec<f64>] {
        &self.paths
    }

    pub fn simulations(&self) -> usize {
        self.paths.len()
    }

    pub fn days(&self) -> usize {
        self.days
    }

    /// All paths' prices on a 0-based day column
    pub fn day_column(&self, day_index: usize) -> Vec<f64> {
        self.paths.iter().map(|p| p[day_index]).collect()
    }

    /// Mean, p90 and p10 of each day column, computed independently per day
    pub fn summarize(&self) -> Vec<DaySummary> {
        (0..self.days)
            .map(|d| {
                let mut column = self.day_column(d);
                column.sort_by(|a, b| a.total_cmp(b));
                DaySummary {
                    day: d + 1,
                    mean: column.iter().sum::<f64>() / column.len() as f64,
                    p90: quantile_sorted(&column, 0.9),
                    p10: quantile_sorted(&column, 0.1),
                }
            })
            .collect()
    }

    /// Percentage of final-day prices above `last_close * (1 + TARGET_GAIN)`
    pub fn probability_of_increase(&self, last_close: f64) -> f64 {
        let target = last_close * (1.0 + TARGET_GAIN);
        let finals = self.day_column(self.days - 1);
        let hits = finals.iter().filter(|&&p| p > target).count();
        hits as f64 / finals.len() as f64 * 100.0
    }
}

/// Run the simulation from `last_close` with historical `volatility`
pub fn simulate_paths(
    last_close: f64,
    volatility: f64,
    config: &SimulationConfig,
) -> EngineResult<SimulationPaths> {
    if config.days == 0 || config.simulations == 0 {
        return Err(ForecastError::InvalidConfig(format!(
            "simulation needs at least one day and one path (days={}, simulations={})",
            config.days, config.simulations
        )));
    }
    if !last_close.is_finite() || last_close <= 0.0 {
        return Err(ForecastError::DegenerateVolatility(format!(
            "start price {} is not a positive finite number",
            last_close
        )));
    }

    let sigma = volatility * config.vol_multiplier;
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(ForecastError::DegenerateVolatility(format!(
            "effective volatility {} (volatility {} x multiplier {}) must be finite and >= 0",
            sigma, volatility, config.vol_multiplier
        )));
    }
    let normal = Normal::new(0.0, sigma).map_err(|e| {
        ForecastError::DegenerateVolatility(format!(
            "effective volatility {} (volatility {} x multiplier {}): {}",
            sigma, volatility, config.vol_multiplier, e
        ))
    })?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let paths: Vec<Vec<f64>> = (0..config.simulations)
        .map(|_| {
            let mut price = last_close;
            (0..config.days)
                .map(|_| {
                    price *= 1.0 + normal.sample(&mut rng);
                    price
                })
                .collect()
        })
        .collect();

    debug!(
        simulations = config.simulations,
        days = config.days,
        sigma,
        seeded = config.seed.is_some(),
        "Simulated price paths"
    );

    Ok(SimulationPaths {
        paths,
        days: config.days,
    })
}

/// Linear-interpolated quantile of ascending `sorted` values
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(days: usize, simulations: usize, vol_multiplier: f64) -> SimulationConfig {
        SimulationConfig {
            days,
            simulations,
            vol_multiplier,
            seed: Some(7),
        }
    }

    #[test]
    fn test_shape_and_positivity() {
        let sim = simulate_paths(100.0, 0.02, &seeded(30, 100, 1.0)).unwrap();
        assert_eq!(sim.simulations(), 100);
        assert_eq!(sim.days(), 30);
        assert!(sim.paths().iter().all(|p| p.len() == 30));
        assert!(sim.paths().iter().flatten().all(|&p| p > 0.0));
    }

    #[test]
    fn test_three_day_summary() {
        let sim = simulate_paths(100.0, 0.02, &seeded(3, 1000, 1.0)).unwrap();
        let summary = sim.summarize();

        assert_eq!(summary.len(), 3);
        assert_eq!(
            summary.iter().map(|s| s.day).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        for s in &summary {
            assert!(s.mean > 85.0 && s.mean < 115.0, "mean {}", s.mean);
            assert!(s.p10 <= s.mean && s.mean <= s.p90);
        }
    }

    #[test]
    fn test_zero_volatility_is_flat() {
        let sim = simulate_paths(50.0, 0.0, &seeded(5, 10, 1.0)).unwrap();
        assert!(sim.paths().iter().flatten().all(|&p| p == 50.0));
        assert_eq!(sim.probability_of_increase(50.0), 0.0);
    }

    #[test]
    fn test_paths_compound() {
        let config = seeded(4, 3, 2.0);
        let sim = simulate_paths(100.0, 0.01, &config).unwrap();

        // Replay the same draws: each step applies to the previous price
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 0.02).unwrap();
        for path in sim.paths() {
            let mut expected = 100.0;
            for &price in path {
                expected *= 1.0 + normal.sample(&mut rng);
                assert_eq!(price, expected);
            }
        }
    }

    #[test]
    fn test_seed_reproducible() {
        let a = simulate_paths(100.0, 0.03, &seeded(10, 50, 1.5)).unwrap();
        let b = simulate_paths(100.0, 0.03, &seeded(10, 50, 1.5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_extreme_volatility_can_go_negative() {
        // Documented limitation of the arithmetic step: draws below -1 flip sign
        let sim = simulate_paths(100.0, 1.0, &seeded(30, 200, 4.9)).unwrap();
        assert!(sim.paths().iter().flatten().all(|p| p.is_finite()));
        assert!(sim.paths().iter().flatten().any(|&p| p <= 0.0));
    }

    #[test]
    fn test_probability_of_increase() {
        let sim = SimulationPaths {
            paths: vec![
                vec![99.0, 106.0],
                vec![101.0, 104.0],
                vec![100.0, 110.0],
                vec![100.0, 90.0],
            ],
            days: 2,
        };
        assert_eq!(sim.probability_of_increase(100.0), 50.0);
    }

    #[test]
    fn test_invalid_inputs() {
        let err = simulate_paths(100.0, f64::NAN, &seeded(3, 3, 1.0)).unwrap_err();
        assert_eq!(err.kind(), "degenerate_volatility");
        assert!(simulate_paths(100.0, -0.1, &seeded(3, 3, 1.0)).is_err());
        assert!(simulate_paths(0.0, 0.1, &seeded(3, 3, 1.0)).is_err());
        assert_eq!(
            simulate_paths(100.0, 0.1, &seeded(0, 3, 1.0)).unwrap_err().kind(),
            "invalid_config"
        );
    }

    #[test]
    fn test_quantile_sorted() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&v, 0.5), 3.0);
        assert!((quantile_sorted(&v, 0.9) - 4.6).abs() < 1e-12);
        assert!((quantile_sorted(&v, 0.1) - 1.4).abs() < 1e-12);
        assert_eq!(quantile_sorted(&[7.0], 0.9), 7.0);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }
}
