//! Types for Monte Carlo schedule and cost simulation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DistributionType, MonteCarloConfig};
use crate::cpm::CpmError;
use crate::models::Money;

/// Error types for a simulation run.
///
/// Only configuration and baseline problems reach the caller as `Err`;
/// an infeasible iteration or a cancellation ends the run with the matching
/// [`SimulationStatus`] instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Schedule(#[from] CpmError),
    #[error("Iteration {iteration} produced an infeasible schedule: {source}")]
    InfeasibleIteration { iteration: u32, source: CpmError },
    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),
    #[error("Total cost exceeds the representable money range")]
    CostOverflow,
    #[error("Simulation cancelled")]
    Cancelled,
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Three-point duration estimate for one activity.
///
/// Activities without an estimate keep their planned duration in every
/// iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationEstimate {
    pub activity_id: String,
    pub optimistic: i64,
    pub most_likely: i64,
    pub pessimistic: i64,
    /// Mean for normal sampling. Defaults to the PERT-weighted mean
    /// (optimistic + 4 * most_likely + pessimistic) / 6.
    #[serde(default)]
    pub mean: Option<f64>,
    /// Overrides the (pessimistic - optimistic) / 6 default for normal sampling.
    #[serde(default)]
    pub std_dev: Option<f64>,
    /// Overrides the configured distribution for this activity.
    #[serde(default)]
    pub distribution: Option<DistributionType>,
}

impl DurationEstimate {
    pub fn new(
        activity_id: impl Into<String>,
        optimistic: i64,
        most_likely: i64,
        pessimistic: i64,
    ) -> Self {
        Self {
            activity_id: activity_id.into(),
            optimistic,
            most_likely,
            pessimistic,
            mean: None,
            std_dev: None,
            distribution: None,
        }
    }

    /// Zero-variance estimate.
    pub fn fixed(activity_id: impl Into<String>, duration: i64) -> Self {
        Self::new(activity_id, duration, duration, duration)
    }

    pub fn with_mean(mut self, mean: f64) -> Self {
        self.mean = Some(mean);
        self
    }

    pub fn with_std_dev(mut self, std_dev: f64) -> Self {
        self.std_dev = Some(std_dev);
        self
    }

    pub fn with_distribution(mut self, distribution: DistributionType) -> Self {
        self.distribution = Some(distribution);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.optimistic < 0 {
            return Err(format!(
                "estimate for {} has negative optimistic duration {}",
                self.activity_id, self.optimistic
            ));
        }
        if !(self.optimistic <= self.most_likely && self.most_likely <= self.pessimistic) {
            return Err(format!(
                "estimate for {} must satisfy optimistic <= most_likely <= pessimistic ({}, {}, {})",
                self.activity_id, self.optimistic, self.most_likely, self.pessimistic
            ));
        }
        if let Some(mean) = self.mean {
            if !mean.is_finite() || mean < 0.0 {
                return Err(format!(
                    "estimate for {} has invalid mean {}",
                    self.activity_id, mean
                ));
            }
        }
        if let Some(std_dev) = self.std_dev {
            if !std_dev.is_finite() || std_dev < 0.0 {
                return Err(format!(
                    "estimate for {} has invalid std_dev {}",
                    self.activity_id, std_dev
                ));
            }
        }
        Ok(())
    }
}

/// Fixed cost booked once per iteration for an activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedCost {
    pub activity_id: String,
    pub amount: Money,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationPercentile {
    pub level: u8,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostPercentile {
    pub level: u8,
    pub value: Money,
}

/// Equal-width bin over the observed project durations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    /// count / iterations.
    pub frequency: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationResults {
    pub mean: f64,
    pub std_dev: f64,
    pub min: i64,
    pub max: i64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p80: f64,
    pub p90: f64,
    pub p95: f64,
    /// Values at the configured confidence levels.
    pub percentiles: Vec<DurationPercentile>,
    pub histogram: Vec<HistogramBin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostResults {
    pub mean: Money,
    pub min: Money,
    pub max: Money,
    pub p10: Money,
    pub p25: Money,
    pub p50: Money,
    pub p75: Money,
    pub p80: Money,
    pub p90: Money,
    pub p95: Money,
    pub percentiles: Vec<CostPercentile>,
}

/// Influence of one activity on the project duration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensitivityItem {
    pub activity_id: String,
    /// Pearson correlation between this activity's sampled duration and the
    /// project duration. None when correlation tracking is disabled.
    pub correlation: Option<f64>,
    /// Fraction of iterations in which the activity was critical.
    pub criticality_index: f64,
}

/// Probability of finishing by a given day.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SCurvePoint {
    pub day: i64,
    pub date: NaiveDate,
    pub cumulative_probability: f64,
}

/// Outcome of one simulation run.
///
/// Statistics are present only when `status` is `Completed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    /// Config as run, with the seed actually used filled in.
    pub config: MonteCarloConfig,
    pub status: SimulationStatus,
    pub iterations_completed: u32,
    /// Project duration with planned durations.
    pub deterministic_duration: i64,
    pub deterministic_cost: Option<Money>,
    pub duration_results: Option<DurationResults>,
    pub cost_results: Option<CostResults>,
    /// Tornado order: largest |correlation| first (criticality when untracked).
    pub sensitivity: Vec<SensitivityItem>,
    pub s_curve: Vec<SCurvePoint>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl MonteCarloResult {
    pub(crate) fn unfinished(
        config: MonteCarloConfig,
        status: SimulationStatus,
        deterministic_duration: i64,
        warnings: Vec<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            config,
            status,
            iterations_completed: 0,
            deterministic_duration,
            deterministic_cost: None,
            duration_results: None,
            cost_results: None,
            sensitivity: Vec::new(),
            s_curve: Vec::new(),
            warnings,
            error,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SimulationStatus::Completed
    }

    /// Probability that the project finishes within `target_duration` days.
    ///
    /// None unless the run completed.
    pub fn probability_on_time(&self, target_duration: i64) -> Option<f64> {
        let first = self.s_curve.first()?;
        if target_duration < first.day {
            return Some(0.0);
        }
        let point = self
            .s_curve
            .iter()
            .take_while(|p| p.day <= target_duration)
            .last()?;
        Some(point.cumulative_probability)
    }

    pub fn sensitivity_for(&self, activity_id: &str) -> Option<&SensitivityItem> {
        self.sensitivity.iter().find(|s| s.activity_id == activity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_validation() {
        assert!(DurationEstimate::new("a", 2, 4, 9).validate().is_ok());
        assert!(DurationEstimate::fixed("a", 3).validate().is_ok());
        assert!(DurationEstimate::new("a", 5, 4, 9).validate().is_err());
        assert!(DurationEstimate::new("a", -1, 4, 9).validate().is_err());
        assert!(DurationEstimate::new("a", 1, 4, 9)
            .with_std_dev(-2.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_probability_on_time_reads_s_curve() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut result = MonteCarloResult::unfinished(
            MonteCarloConfig::default(),
            SimulationStatus::Completed,
            10,
            Vec::new(),
            None,
        );
        assert_eq!(result.probability_on_time(10), None);

        result.s_curve = vec![
            SCurvePoint {
                day: 10,
                date,
                cumulative_probability: 0.25,
            },
            SCurvePoint {
                day: 11,
                date,
                cumulative_probability: 0.75,
            },
            SCurvePoint {
                day: 12,
                date,
                cumulative_probability: 1.0,
            },
        ];
        assert_eq!(result.probability_on_time(9), Some(0.0));
        assert_eq!(result.probability_on_time(11), Some(0.75));
        assert_eq!(result.probability_on_time(40), Some(1.0));
    }
}
