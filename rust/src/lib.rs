//! Schedule analytics for program dashboards.
//!
//! The crate takes plain activity, dependency, resource and assignment data and
//! produces CPM schedules, resource-leveled schedules, Monte Carlo risk
//! distributions and earned value metrics. It performs no I/O and installs no
//! logger; the host application owns both.
//!
//! Every analysis starts from an [`ActivityNetwork`], which validates the graph
//! once, and a [`CpmEngine`] over it. Leveling and simulation rerun the engine's
//! passes with their own durations or start floors.

pub mod config;
pub mod cpm;
pub mod evms;
pub mod interner;
pub mod leveling;
pub mod logging;
pub mod models;
pub mod network;
pub mod parallel;
pub mod risk;

pub use config::{DistributionType, LevelingOptions, LevelingStrategy, MonteCarloConfig};
pub use cpm::{CpmEngine, CpmError, CpmResult, ScheduleResult};
pub use evms::{
    calculate, calculate_series, earned_value_from_progress, planned_value, ActivityBudget,
    Computed, EacMethod, EvmsError, EvmsMetrics, EvmsSnapshot,
};
pub use leveling::{
    compare_strategies, level, LevelingComparisonResponse, LevelingError, LevelingInput,
    LevelingResult,
};
pub use models::{
    Activity, Assignment, Constraint, ConstraintType, Dependency, DependencyType, Money,
    Resource, ResourceType,
};
pub use network::{ActivityNetwork, GraphError};
pub use parallel::CancellationToken;
pub use risk::{
    simulate, DurationEstimate, MonteCarloResult, SimulationError, SimulationInput,
    SimulationStatus,
};

/// Build the network and run the CPM passes in one call.
pub fn schedule(
    activities: &[Activity],
    dependencies: &[Dependency],
    program_start: chrono::NaiveDate,
) -> Result<CpmResult, CpmError> {
    let network = ActivityNetwork::build(activities, dependencies)?;
    CpmEngine::new(&network, program_start).run()
}
