//! Types for resource leveling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LevelingStrategy;
use crate::cpm::{CpmError, ScheduleResult};

/// Error types for resource leveling.
///
/// Residual overallocation is not an error; it is reported through
/// `LevelingResult::success` and its warnings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LevelingError {
    #[error(transparent)]
    Schedule(#[from] CpmError),
    #[error("Invalid leveling options: {0}")]
    InvalidOptions(String),
    #[error("Leveling cancelled")]
    Cancelled,
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// One activity moved by the leveler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityShift {
    pub activity_id: String,
    pub original_start: i64,
    pub original_finish: i64,
    pub new_start: i64,
    pub new_finish: i64,
    pub delay_days: i64,
    pub reason: String,
}

/// Load summary for one leveled resource after leveling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub resource_id: String,
    /// Capacity in percent units (capacity_per_day * 100).
    pub capacity: u32,
    /// Highest single-day load in percent units.
    pub peak_load: u32,
    pub overallocated_days: u32,
}

/// Run metrics used to compare strategies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelingMetrics {
    pub strategy: LevelingStrategy,
    pub execution_time_ms: f64,
    pub threads_used: usize,
    pub components: usize,
    /// Merge rounds (always 1 for the serial strategy).
    pub rounds: u32,
    /// Shifts applied, counting repeated shifts of the same activity.
    pub iterations: u32,
    /// Distinct activities shifted.
    pub shifts: usize,
    pub extension_days: i64,
}

/// Outcome of one leveling run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelingResult {
    /// False when overallocation remains or capacity data was missing.
    pub success: bool,
    /// Shifted activities in the order they were first moved.
    pub shifts: Vec<ActivityShift>,
    /// Overallocated resource-days left on leveled resources.
    pub remaining_overallocations: u32,
    pub original_project_finish: i64,
    pub new_project_finish: i64,
    pub schedule_extension_days: i64,
    pub warnings: Vec<String>,
    /// Leveled schedule, one entry per activity in input order.
    pub schedule: Vec<ScheduleResult>,
    pub utilization: Vec<ResourceUtilization>,
    pub metrics: LevelingMetrics,
}

impl LevelingResult {
    pub fn shift_for(&self, activity_id: &str) -> Option<&ActivityShift> {
        self.shifts.iter().find(|s| s.activity_id == activity_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub strategy: LevelingStrategy,
    pub reason: String,
}

/// Both strategies run over the same input, with a recommendation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelingComparisonResponse {
    pub serial: LevelingResult,
    pub parallel: LevelingResult,
    pub recommendation: Recommendation,
    /// Whether both strategies produced the same leveled schedule.
    pub identical_schedules: bool,
    pub activity_count: usize,
    pub component_count: usize,
    /// Share of dependencies between resourced activities that cross components.
    pub cross_component_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::GraphError;

    #[test]
    fn test_schedule_error_converts() {
        let err: LevelingError = CpmError::Graph(GraphError::DuplicateActivity {
            id: "a".to_string(),
        })
        .into();
        assert!(matches!(err, LevelingError::Schedule(_)));
        assert!(err.to_string().contains("a"));
    }
}
