// Portfolio view over a batch of discrepancy results
// Summary statistics of primary ratios and a portfolio-level risk tier

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::climate_compliance::{grade_distribution, EsgGrade};
use crate::climate_discrepancy::DiscrepancyResult;

const HIGH_RISK_SHARE: f64 = 0.3;    // share of results ≥ 3×
const MODERATE_RISK_SHARE: f64 = 0.3; // share of results ≥ 2×

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioRisk {
    High,
    Moderate,
    Low,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioStatistics {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    /// Sample standard deviation (n - 1); 0.0 for a single result
    pub std: f64,
}

impl RatioStatistics {
    /// `None` for an empty slice. Ratios are finite and non-negative; sums run on
    /// values scaled by the maximum so saturated ratios cannot overflow.
    pub fn from_ratios(ratios: &[f64]) -> Option<Self> {
        if ratios.is_empty() {
            return None;
        }
        let n = ratios.len() as f64;

        let mut sorted = ratios.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let (min, max) = (sorted[0], sorted[sorted.len() - 1]);
        let scale = if max > 0.0 { max } else { 1.0 };

        let scaled_mean = ratios.iter().map(|r| r / scale).sum::<f64>() / n;
        let mean = scaled_mean * scale;

        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            sorted[mid - 1] / 2.0 + sorted[mid] / 2.0
        } else {
            sorted[mid]
        };

        let std = if ratios.len() < 2 {
            0.0
        } else {
            let var = ratios.iter().map(|r| (r / scale - scaled_mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt() * scale
        };

        Some(Self { mean, median, max, min, std })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub count: usize,
    pub statistics: Option<RatioStatistics>,
    pub above_3x: usize,
    pub above_5x: usize,
    pub above_10x: usize,
    pub risk_level: PortfolioRisk,
    pub grade_distribution: BTreeMap<EsgGrade, usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioAggregator;

impl PortfolioAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn summarize(&self, results: &[DiscrepancyResult]) -> PortfolioSummary {
        let ratios: Vec<f64> = results.iter().map(|r| r.primary_ratio()).collect();
        let summary = Self::summarize_ratios(&ratios);
        info!(
            count = summary.count,
            above_3x = summary.above_3x,
            risk = ?summary.risk_level,
            "portfolio summarized"
        );
        summary
    }

    pub fn summarize_ratios(ratios: &[f64]) -> PortfolioSummary {
        let at_least = |threshold: f64| ratios.iter().filter(|r| **r >= threshold).count();
        let count = ratios.len();
        let above_2x = at_least(2.0);
        let above_3x = at_least(3.0);

        let risk_level = if count == 0 {
            PortfolioRisk::NoData
        } else if above_3x as f64 / count as f64 > HIGH_RISK_SHARE {
            PortfolioRisk::High
        } else if above_2x as f64 / count as f64 > MODERATE_RISK_SHARE {
            PortfolioRisk::Moderate
        } else {
            PortfolioRisk::Low
        };

        PortfolioSummary {
            count,
            statistics: RatioStatistics::from_ratios(ratios),
            above_3x,
            above_5x: at_least(5.0),
            above_10x: at_least(10.0),
            risk_level,
            grade_distribution: grade_distribution(ratios),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_portfolio() {
        let summary = PortfolioAggregator::new().summarize(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.statistics, None);
        assert_eq!(summary.above_3x, 0);
        assert_eq!(summary.risk_level, PortfolioRisk::NoData);
    }

    #[test]
    fn test_statistics() {
        let stats = RatioStatistics::from_ratios(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.median, 2.5);
        assert_relative_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.std, (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);

        let single = RatioStatistics::from_ratios(&[7.0]).unwrap();
        assert_eq!(single.std, 0.0);
        assert_eq!(single.median, 7.0);

        let odd = RatioStatistics::from_ratios(&[9.0, 1.0, 4.0]).unwrap();
        assert_eq!(odd.median, 4.0);
    }

    #[test]
    fn test_saturated_ratios_keep_statistics_finite() {
        let stats = RatioStatistics::from_ratios(&[f64::MAX, f64::MAX, 0.0]).unwrap();
        assert!(stats.mean.is_finite());
        assert!(stats.std.is_finite());
        assert_eq!(stats.median, f64::MAX);
        assert_relative_eq!(stats.mean, f64::MAX / 3.0 * 2.0, max_relative = 1e-12);

        let zeros = RatioStatistics::from_ratios(&[0.0, 0.0]).unwrap();
        assert_eq!((zeros.mean, zeros.std), (0.0, 0.0));
    }

    #[test]
    fn test_risk_tiers() {
        let high = PortfolioAggregator::summarize_ratios(&[0.1, 3.0, 12.0]);
        assert_eq!(high.risk_level, PortfolioRisk::High);
        assert_eq!((high.above_3x, high.above_5x, high.above_10x), (2, 1, 1));

        // exactly 30% at or above 2× does not exceed the share
        let boundary = PortfolioAggregator::summarize_ratios(&[0.1, 0.2, 2.0, 2.5, 3.0, 0.3, 0.4, 0.5, 0.6, 0.7]);
        assert_eq!(boundary.risk_level, PortfolioRisk::Low);

        let moderate = PortfolioAggregator::summarize_ratios(&[0.1, 2.0, 2.5, 0.2, 0.3]);
        assert_eq!(moderate.risk_level, PortfolioRisk::Moderate);

        let low = PortfolioAggregator::summarize_ratios(&[0.1, 0.5, 1.9]);
        assert_eq!(low.risk_level, PortfolioRisk::Low);
    }

    #[test]
    fn test_grade_distribution_carried() {
        let summary = PortfolioAggregator::summarize_ratios(&[0.5, 6.0]);
        assert_eq!(summary.grade_distribution[&EsgGrade::A], 1);
        assert_eq!(summary.grade_distribution[&EsgGrade::F], 1);
    }
}
