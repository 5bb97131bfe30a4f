//! Resource leveling: resolve resource overallocation by delaying activities.
//!
//! Both strategies work on the same immutable input: a CPM engine bound to a
//! network, resource capacities and assignments. Delays are expressed as
//! per-activity start floors fed back into the CPM forward pass, so every
//! intermediate schedule still honors dependencies and constraints.
//!
//! - [`level_serial`]: one chronological sweep over all leveled resources.
//! - [`level_parallel`]: the same sweep per resource-contention component on a
//!   bounded worker pool, with a join barrier before floors are merged.
//! - [`compare_strategies`]: both runs plus a recommendation.

mod compare;
mod parallel;
mod priority;
mod serial;
mod types;
mod usage;

pub use compare::compare_strategies;
pub use parallel::level_parallel;
pub use serial::level_serial;
pub use types::{
    ActivityShift, LevelingComparisonResponse, LevelingError, LevelingMetrics, LevelingResult,
    Recommendation, ResourceUtilization,
};

use rustc_hash::FxHashMap;
use std::time::Instant;

use crate::config::{LevelingOptions, LevelingStrategy};
use crate::cpm::{CpmEngine, CpmError, PassTimings};
use crate::interner::ActivityIdx;
use crate::models::{Assignment, Resource};
use crate::network::ActivityNetwork;
use crate::parallel::CancellationToken;

use usage::{ResourceDemand, ResourceSlot, UsageProfile};

/// Everything a leveling run reads.
#[derive(Clone, Copy, Debug)]
pub struct LevelingInput<'a> {
    pub engine: &'a CpmEngine<'a>,
    pub resources: &'a [Resource],
    pub assignments: &'a [Assignment],
}

impl<'a> LevelingInput<'a> {
    pub fn new(
        engine: &'a CpmEngine<'a>,
        resources: &'a [Resource],
        assignments: &'a [Assignment],
    ) -> Self {
        Self {
            engine,
            resources,
            assignments,
        }
    }
}

/// Level with the strategy selected in `options`.
pub fn level(
    input: LevelingInput<'_>,
    options: &LevelingOptions,
    token: Option<&CancellationToken>,
) -> Result<LevelingResult, LevelingError> {
    match options.strategy {
        LevelingStrategy::Serial => level_serial(input, options, token),
        LevelingStrategy::Parallel => level_parallel(input, options, token),
    }
}

/// Read-only state shared by every sweep of one run.
pub(crate) struct LevelingContext<'a> {
    pub engine: &'a CpmEngine<'a>,
    pub options: &'a LevelingOptions,
    pub durations: Vec<i64>,
    pub demand: ResourceDemand,
    /// Unleveled schedule; original dates in the report come from here.
    pub baseline: PassTimings,
    token: Option<&'a CancellationToken>,
}

impl<'a> LevelingContext<'a> {
    pub fn new(
        input: LevelingInput<'a>,
        options: &'a LevelingOptions,
        token: Option<&'a CancellationToken>,
    ) -> Result<Self, LevelingError> {
        options.validate().map_err(LevelingError::InvalidOptions)?;

        let network = input.engine.network();
        let durations = network.durations();
        let baseline = input.engine.compute(&durations, None)?;
        let demand = ResourceDemand::build(network, input.resources, input.assignments, options);

        Ok(Self {
            engine: input.engine,
            options,
            durations,
            demand,
            baseline,
            token,
        })
    }

    pub fn network(&self) -> &'a ActivityNetwork {
        self.engine.network()
    }

    pub fn check_cancelled(&self) -> Result<(), LevelingError> {
        match self.token {
            Some(token) if token.is_cancelled() => Err(LevelingError::Cancelled),
            _ => Ok(()),
        }
    }

    pub fn all_slots(&self) -> Vec<ResourceSlot> {
        (0..self.demand.len()).collect()
    }

    /// Rerun both passes with the given start floors.
    pub fn schedule(&self, floors: &[i64]) -> Result<PassTimings, CpmError> {
        self.engine.compute(&self.durations, Some(floors))
    }

    /// Whether the leveler may delay this activity to clear a conflict on `slot`.
    pub fn is_movable(&self, activity: ActivityIdx, slot: ResourceSlot) -> bool {
        if self.durations[activity as usize] == 0 {
            return false;
        }
        if self
            .engine
            .constraint_kind(activity)
            .is_some_and(|kind| kind.is_mandatory())
        {
            return false;
        }
        !self.demand.exceeds_alone(activity, slot)
    }
}

/// A delay applied during a sweep.
#[derive(Clone, Debug)]
pub(crate) struct ShiftRecord {
    pub activity: ActivityIdx,
    /// Start floor the shift set.
    pub start: i64,
    pub reason: String,
}

/// Run-level facts that feed the metrics and warnings.
pub(crate) struct RunSummary {
    pub strategy: LevelingStrategy,
    pub started: Instant,
    pub threads_used: usize,
    pub components: usize,
    pub rounds: u32,
    pub iterations: u32,
    pub exhausted: bool,
    pub warnings: Vec<String>,
}

/// Build the report from the final leveled timings.
pub(crate) fn assemble(
    ctx: &LevelingContext<'_>,
    timings: PassTimings,
    records: &[ShiftRecord],
    summary: RunSummary,
) -> LevelingResult {
    let network = ctx.network();
    let profile = UsageProfile::build(&ctx.demand, &timings, &ctx.demand.resourced_activities());
    let remaining = profile.overallocations(&ctx.demand, &ctx.all_slots());
    let utilization = profile.utilization(&ctx.demand);

    // One entry per activity in first-shift order, carrying the latest reason
    let mut order: Vec<ActivityIdx> = Vec::new();
    let mut reasons: FxHashMap<ActivityIdx, &str> = FxHashMap::default();
    for record in records {
        if reasons.insert(record.activity, &record.reason).is_none() {
            order.push(record.activity);
        }
    }
    let shifts: Vec<ActivityShift> = order
        .iter()
        .map(|&a| {
            let original = ctx.baseline.early_window(a);
            let leveled = timings.early_window(a);
            ActivityShift {
                activity_id: network.id_of(a).to_string(),
                original_start: original.start,
                original_finish: original.finish,
                new_start: leveled.start,
                new_finish: leveled.finish,
                delay_days: leveled.start - original.start,
                reason: reasons.get(&a).map_or_else(String::new, |r| r.to_string()),
            }
        })
        .collect();

    let mut warnings = ctx.demand.warnings.clone();
    warnings.extend(summary.warnings);
    if summary.exhausted {
        warnings.push(format!(
            "Stopped after {} iterations with {} overallocated resource-days remaining",
            summary.iterations, remaining
        ));
    } else if remaining > 0 {
        warnings.push(format!(
            "{remaining} overallocated resource-days could not be resolved"
        ));
    }

    let original_project_finish = ctx.baseline.project_duration;
    let resolved = ctx.engine.resolve(timings);
    let new_project_finish = resolved.project_duration;
    let schedule_extension_days = (new_project_finish - original_project_finish).max(0);

    let metrics = LevelingMetrics {
        strategy: summary.strategy,
        execution_time_ms: summary.started.elapsed().as_secs_f64() * 1000.0,
        threads_used: summary.threads_used,
        components: summary.components,
        rounds: summary.rounds,
        iterations: summary.iterations,
        shifts: shifts.len(),
        extension_days: schedule_extension_days,
    };

    LevelingResult {
        success: remaining == 0 && !ctx.demand.missing_capacity,
        shifts,
        remaining_overallocations: remaining,
        original_project_finish,
        new_project_finish,
        schedule_extension_days,
        warnings,
        schedule: resolved.schedule,
        utilization,
        metrics,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_level_dispatches_on_strategy() {
        let (activities, deps, resources, assignments) = shared_crew();
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let engine = CpmEngine::new(&network, start());
        let input = LevelingInput::new(&engine, &resources, &assignments);

        let options = LevelingOptions {
            strategy: LevelingStrategy::Parallel,
            ..Default::default()
        };
        let result = level(input, &options, None).unwrap();
        assert_eq!(result.metrics.strategy, LevelingStrategy::Parallel);
        assert!(result.success);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let (activities, deps, resources, assignments) = shared_crew();
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let engine = CpmEngine::new(&network, start());
        let input = LevelingInput::new(&engine, &resources, &assignments);

        let options = LevelingOptions {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(
            level(input, &options, None),
            Err(LevelingError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let (activities, deps, resources, assignments) = shared_crew();
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let engine = CpmEngine::new(&network, start());
        let input = LevelingInput::new(&engine, &resources, &assignments);

        let token = CancellationToken::new();
        token.cancel();
        let result = level(input, &LevelingOptions::default(), Some(&token));
        assert_eq!(result, Err(LevelingError::Cancelled));
    }
}
