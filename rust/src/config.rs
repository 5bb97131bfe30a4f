//! Configuration types for the leveling and simulation passes.

use serde::{Deserialize, Serialize};

/// Resource leveling strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LevelingStrategy {
    /// One chronological sweep over the whole network.
    #[default]
    Serial,
    /// Independent resource-contention components leveled concurrently.
    Parallel,
}

impl LevelingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelingStrategy::Serial => "serial",
            LevelingStrategy::Parallel => "parallel",
        }
    }
}

/// Options for a resource leveling run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelingOptions {
    pub strategy: LevelingStrategy,
    /// Delay non-critical activities before critical ones.
    pub preserve_critical_path: bool,
    /// Upper bound on activity shifts before giving up with `success = false`.
    pub max_iterations: u32,
    /// Level only these resource ids (None = all resources).
    pub target_resources: Option<Vec<String>>,
    /// Prefer delays that keep the activity within its late finish.
    pub level_within_float: bool,
    /// Worker threads for the parallel strategy (0 = rayon default).
    pub max_workers: usize,
    /// Activity count above which the comparison recommends the parallel strategy.
    pub parallel_threshold: usize,
    /// Largest share of dependencies crossing component boundaries for which the
    /// components still count as independent.
    pub max_cross_component_ratio: f64,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
}

impl Default for LevelingOptions {
    fn default() -> Self {
        Self {
            strategy: LevelingStrategy::Serial,
            preserve_critical_path: true,
            max_iterations: 1000,
            target_resources: None,
            level_within_float: true,
            max_workers: 0,
            parallel_threshold: 200,
            max_cross_component_ratio: 0.25,
            verbosity: 0,
        }
    }
}

impl LevelingOptions {
    /// Whether a resource participates in this run.
    pub fn levels_resource(&self, resource_id: &str) -> bool {
        match &self.target_resources {
            Some(targets) => targets.iter().any(|t| t == resource_id),
            None => true,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_iterations == 0 {
            return Err("max_iterations must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.max_cross_component_ratio) {
            return Err(format!(
                "max_cross_component_ratio {} outside [0, 1]",
                self.max_cross_component_ratio
            ));
        }
        Ok(())
    }
}

/// Probability distribution used to sample activity durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    Triangular,
    #[default]
    Pert,
    Normal,
    Uniform,
}

/// Configuration for a Monte Carlo schedule/cost simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub iterations: u32,
    pub distribution_type: DistributionType,
    /// Percentiles to report in addition to the fixed p10..p95 set.
    pub confidence_levels: Vec<u8>,
    pub include_cost: bool,
    /// Compute duration/total-duration correlation for sensitivity ranking.
    pub correlation_enabled: bool,
    /// Fixed seed for reproducible runs (None = seeded from entropy).
    pub seed: Option<u64>,
    pub histogram_bins: u32,
    /// Worker threads (0 = rayon default).
    pub max_workers: usize,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            distribution_type: DistributionType::Pert,
            confidence_levels: vec![10, 25, 50, 75, 80, 90, 95],
            include_cost: false,
            correlation_enabled: true,
            seed: None,
            histogram_bins: 20,
            max_workers: 0,
            verbosity: 0,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.iterations == 0 {
            return Err("iterations must be positive".to_string());
        }
        if self.histogram_bins == 0 {
            return Err("histogram_bins must be positive".to_string());
        }
        if let Some(level) = self
            .confidence_levels
            .iter()
            .find(|&&l| l == 0 || l >= 100)
        {
            return Err(format!("confidence level {level} outside 1..=99"));
        }
        Ok(())
    }
}
