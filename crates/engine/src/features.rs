//! Supervised feature table: lagged closes plus indicators, labelled with
//! the next close

use tracing::debug;

use crate::error::{EngineResult, ForecastError};
use crate::indicators::{IndicatorFrame, IndicatorRow};

/// Number of lagged closes per feature row
pub const LAG_COUNT: usize = 10;

/// Column order shared by training rows and the live inference row
pub const FEATURE_COLUMNS: [&str; LAG_COUNT + 5] = [
    "Close_Lag_1",
    "Close_Lag_2",
    "Close_Lag_3",
    "Close_Lag_4",
    "Close_Lag_5",
    "Close_Lag_6",
    "Close_Lag_7",
    "Close_Lag_8",
    "Close_Lag_9",
    "Close_Lag_10",
    "RSI",
    "EMA_20",
    "EMA_50",
    "MACD",
    "Signal_Line",
];

/// Training matrix, labels, and the frame rows they were built from
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    /// Indicator rows aligned one-to-one with `features`
    pub frame: IndicatorFrame,
    pub feature_names: Vec<String>,
}

impl FeatureTable {
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Frame rows needed to yield `min_training_rows` labelled feature rows
pub fn required_frame_rows(min_training_rows: usize) -> usize {
    min_training_rows + LAG_COUNT + 1
}

/// Build the training table from an indicator frame.
///
/// Row `t` gets closes `t-1 ..= t-10` as lags, the indicators at `t`, and the
/// close at `t+1` as its label. The first `LAG_COUNT` rows and the last row
/// are dropped.
pub fn build_feature_table(
    frame: &IndicatorFrame,
    min_training_rows: usize,
) -> EngineResult<FeatureTable> {
    let required = required_frame_rows(min_training_rows);
    if frame.len() < required {
        return Err(ForecastError::InsufficientHistory {
            required,
            available: frame.len(),
        });
    }

    let rows = frame.rows();
    let mut features = Vec::with_capacity(rows.len() - LAG_COUNT - 1);
    let mut labels = Vec::with_capacity(rows.len() - LAG_COUNT - 1);
    let mut kept = Vec::with_capacity(rows.len() - LAG_COUNT - 1);

    for t in LAG_COUNT..rows.len() - 1 {
        let mut row: Vec<f64> = (1..=LAG_COUNT).map(|lag| rows[t - lag].close).collect();
        push_indicators(&mut row, &rows[t]);
        features.push(row);
        labels.push(rows[t + 1].close);
        kept.push(rows[t]);
    }

    debug!(
        samples = features.len(),
        features = FEATURE_COLUMNS.len(),
        "Built feature table"
    );

    Ok(FeatureTable {
        features,
        labels,
        frame: IndicatorFrame::from_rows(kept),
        feature_names: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
    })
}

/// Feature row for predicting past the end of the frame: the last
/// `LAG_COUNT` closes, most recent first, then the last row's indicators.
pub fn live_feature_row(frame: &IndicatorFrame) -> EngineResult<Vec<f64>> {
    let rows = frame.rows();
    let Some(last) = rows.last() else {
        return Err(ForecastError::InsufficientHistory {
            required: LAG_COUNT,
            available: 0,
        });
    };
    if rows.len() < LAG_COUNT {
        return Err(ForecastError::InsufficientHistory {
            required: LAG_COUNT,
            available: rows.len(),
        });
    }

    let mut row: Vec<f64> = rows.iter().rev().take(LAG_COUNT).map(|r| r.close).collect();
    push_indicators(&mut row, last);
    Ok(row)
}

fn push_indicators(row: &mut Vec<f64>, ind: &IndicatorRow) {
    row.extend_from_slice(&[
        ind.rsi,
        ind.ema_fast,
        ind.ema_slow,
        ind.macd,
        ind.signal_line,
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(n: usize) -> IndicatorFrame {
        let rows = (0..n)
            .map(|i| IndicatorRow {
                timestamp: i as i64,
                close: 100.0 + i as f64,
                ema_fast: 1.0,
                ema_slow: 2.0,
                rsi: 3.0,
                macd: 4.0,
                signal_line: 5.0,
            })
            .collect();
        IndicatorFrame::from_rows(rows)
    }

    #[test]
    fn test_table_shape_and_alignment() {
        let frame = make_frame(80);
        let table = build_feature_table(&frame, 60).unwrap();

        assert_eq!(table.n_samples(), 80 - LAG_COUNT - 1);
        assert_eq!(table.labels.len(), table.n_samples());
        assert_eq!(table.frame.len(), table.n_samples());
        assert_eq!(table.n_features(), 15);
        assert_eq!(table.feature_names[0], "Close_Lag_1");
        assert_eq!(table.feature_names[14], "Signal_Line");

        // First kept row is frame row 10
        let first = &table.features[0];
        assert_eq!(first[0], 109.0); // lag 1 = row 9
        assert_eq!(first[9], 100.0); // lag 10 = row 0
        assert_eq!(&first[10..], &[3.0, 1.0, 2.0, 4.0, 5.0]);
        assert_eq!(table.labels[0], 111.0);
        assert_eq!(table.frame.rows()[0].close, 110.0);

        // Last kept row is frame row 78, labelled with row 79
        assert_eq!(*table.labels.last().unwrap(), 179.0);
        assert_eq!(table.frame.last().unwrap().close, 178.0);
    }

    #[test]
    fn test_required_frame_rows() {
        assert_eq!(required_frame_rows(60), 71);
        assert!(build_feature_table(&make_frame(71), 60).is_ok());

        let err = build_feature_table(&make_frame(70), 60).unwrap_err();
        assert_eq!(
            err,
            ForecastError::InsufficientHistory {
                required: 71,
                available: 70
            }
        );
    }

    #[test]
    fn test_live_row_order() {
        let frame = make_frame(20);
        let row = live_feature_row(&frame).unwrap();

        assert_eq!(row.len(), FEATURE_COLUMNS.len());
        assert_eq!(row[0], 119.0);
        assert_eq!(row[9], 110.0);
        assert_eq!(&row[10..], &[3.0, 1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_live_row_needs_lags() {
        assert!(live_feature_row(&make_frame(0)).is_err());
        assert!(live_feature_row(&make_frame(9)).is_err());
    }
}
