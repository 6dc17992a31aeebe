//! Summary statistics over prediction history.

use serde::Serialize;

use crate::models::{Prediction, RiskLevel};

/// Which history entries to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelFilter {
    #[default]
    All,
    Only(RiskLevel),
}

impl LevelFilter {
    #[must_use]
    pub fn matches(self, prediction: &Prediction) -> bool {
        match self {
            Self::All => true,
            Self::Only(level) => prediction.risk_level() == Some(level),
        }
    }
}

impl std::str::FromStr for LevelFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<RiskLevel>()
            .map(Self::Only)
            .map_err(|_| format!("unknown level filter: {s} (expected: all, high, medium, low)"))
    }
}

/// Filter history, preserving order.
#[must_use]
pub fn filter_history(history: &[Prediction], filter: LevelFilter) -> Vec<&Prediction> {
    history.iter().filter(|p| filter.matches(p)).collect()
}

/// Aggregate figures for a batch of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    /// Mean model confidence, rounded percent
    pub avg_confidence_pct: u8,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl HistorySummary {
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_history(history: &[Prediction]) -> Self {
        let count = |level| history.iter().filter(|p| p.risk_level() == Some(level)).count();

        let avg_confidence_pct = if history.is_empty() {
            0
        } else {
            let mean = history.iter().map(Prediction::confidence).sum::<f64>() / history.len() as f64;
            (mean * 100.0 + 0.5).floor().clamp(0.0, 100.0) as u8
        };

        Self {
            total: history.len(),
            avg_confidence_pct,
            high: count(RiskLevel::High),
            medium: count(RiskLevel::Medium),
            low: count(RiskLevel::Low),
        }
    }

    /// Share of entries at `level`, as a percentage of all entries.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn share(&self, level: RiskLevel) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let n = match level {
            RiskLevel::High => self.high,
            RiskLevel::Medium => self.medium,
            RiskLevel::Low => self.low,
        };
        n as f64 / self.total as f64 * 100.0
    }
}
