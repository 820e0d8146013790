//! Heuristic signal fusion: forecast direction, RSI extremes and an external
//! sentiment score folded into one of five discrete signals

use serde::{Deserialize, Serialize};

/// Discrete trading signal, ordered from most bearish to most bullish
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FusionSignal {
    #[serde(rename = "Strong Sell")]
    StrongSell,
    Sell,
    Neutral,
    Buy,
    #[serde(rename = "Strong Buy")]
    StrongBuy,
}

impl FusionSignal {
    /// Map an accumulated score to a signal, first match wins
    pub fn from_score(score: i32) -> Self {
        if score >= 3 {
            FusionSignal::StrongBuy
        } else if score >= 1 {
            FusionSignal::Buy
        } else if score <= -3 {
            FusionSignal::StrongSell
        } else if score <= -1 {
            FusionSignal::Sell
        } else {
            FusionSignal::Neutral
        }
    }
}

impl std::fmt::Display for FusionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusionSignal::StrongSell => write!(f, "Strong Sell"),
            FusionSignal::Sell => write!(f, "Sell"),
            FusionSignal::Neutral => write!(f, "Neutral"),
            FusionSignal::Buy => write!(f, "Buy"),
            FusionSignal::StrongBuy => write!(f, "Strong Buy"),
        }
    }
}

/// Scoring inputs
#[derive(Debug, Clone, Copy)]
pub struct FusionInputs {
    pub prediction: f64,
    pub last_close: f64,
    pub rsi: f64,
    /// Carried alongside the other readings; does not affect the score
    pub macd: f64,
    /// External sentiment, 0 (bearish) to 100 (bullish)
    pub sentiment: u8,
}

/// Accumulate the fusion score. Every rule is evaluated; none short-circuits.
pub fn fusion_score(inputs: &FusionInputs) -> i32 {
    let mut score = 0;

    if inputs.prediction > inputs.last_close {
        score += 1;
    }
    if inputs.prediction > inputs.last_close * 1.02 {
        score += 1;
    }

    if inputs.rsi < 35.0 {
        score += 2;
    } else if inputs.rsi > 65.0 {
        score -= 2;
    }

    if inputs.sentiment > 65 {
        score += 1;
    }
    if inputs.sentiment < 35 {
        score -= 1;
    }

    score
}

pub fn fusion_signal(inputs: &FusionInputs) -> FusionSignal {
    FusionSignal::from_score(fusion_score(inputs))
}
