//! Monte Carlo schedule and cost risk simulation.
//!
//! Each iteration samples activity durations, reruns the CPM passes over the
//! same network and folds the project duration, cost, criticality and
//! correlation sums into a per-worker accumulator. Accumulators are reduced
//! once all iterations finish.

mod cost;
mod sampling;
mod simulator;
mod statistics;
mod types;

pub use simulator::{simulate, SimulationInput};
pub use statistics::{histogram, mean_std_dev, money_percentile, percentile, PearsonSums};
pub use types::{
    CostPercentile, CostResults, DurationEstimate, DurationPercentile, DurationResults,
    FixedCost, HistogramBin, MonteCarloResult, SCurvePoint, SensitivityItem, SimulationError,
    SimulationStatus,
};
