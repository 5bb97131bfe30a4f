//! Side-by-side run of both leveling strategies.

use crate::config::{LevelingOptions, LevelingStrategy};
use crate::parallel::CancellationToken;

use super::parallel::{level_parallel, partition};
use super::serial::level_serial;
use super::usage::ResourceDemand;
use super::{
    LevelingComparisonResponse, LevelingError, LevelingInput, LevelingResult, Recommendation,
};

/// Run the serial and parallel strategies over the same input and recommend one.
///
/// Both runs read the same immutable input; neither sees the other's floors.
pub fn compare_strategies(
    input: LevelingInput<'_>,
    options: &LevelingOptions,
    token: Option<&CancellationToken>,
) -> Result<LevelingComparisonResponse, LevelingError> {
    let serial = level_serial(input, options, token)?;
    let parallel = level_parallel(input, options, token)?;

    let network = input.engine.network();
    let demand = ResourceDemand::build(network, input.resources, input.assignments, options);
    let partition = partition(network, &demand);

    let activity_count = network.len();
    let component_count = partition.components.len();
    let cross_component_ratio = partition.cross_component_ratio;
    let recommendation = recommend(
        options,
        activity_count,
        component_count,
        cross_component_ratio,
        &serial,
        &parallel,
    );

    Ok(LevelingComparisonResponse {
        identical_schedules: serial.schedule == parallel.schedule,
        serial,
        parallel,
        recommendation,
        activity_count,
        component_count,
        cross_component_ratio,
    })
}

fn recommend(
    options: &LevelingOptions,
    activity_count: usize,
    component_count: usize,
    cross_component_ratio: f64,
    serial: &LevelingResult,
    parallel: &LevelingResult,
) -> Recommendation {
    let serial_with = |reason: String| Recommendation {
        strategy: LevelingStrategy::Serial,
        reason,
    };

    if parallel.remaining_overallocations > serial.remaining_overallocations
        || parallel.schedule_extension_days > serial.schedule_extension_days
    {
        return serial_with(format!(
            "Serial leveling gave a better schedule ({} vs {} remaining overallocations, {} vs {} extension days)",
            serial.remaining_overallocations,
            parallel.remaining_overallocations,
            serial.schedule_extension_days,
            parallel.schedule_extension_days
        ));
    }
    if component_count < 2 {
        return serial_with(format!(
            "{component_count} contention component(s); nothing to level concurrently"
        ));
    }
    if activity_count <= options.parallel_threshold {
        return serial_with(format!(
            "{} activities is within the parallel threshold of {}; coordination overhead dominates",
            activity_count, options.parallel_threshold
        ));
    }
    if cross_component_ratio > options.max_cross_component_ratio {
        return serial_with(format!(
            "{:.0}% of dependencies cross components (limit {:.0}%)",
            cross_component_ratio * 100.0,
            options.max_cross_component_ratio * 100.0
        ));
    }

    Recommendation {
        strategy: LevelingStrategy::Parallel,
        reason: format!(
            "{} activities in {} largely independent components ({:.0}% cross-component dependencies)",
            activity_count,
            component_count,
            cross_component_ratio * 100.0
        ),
    }
}
