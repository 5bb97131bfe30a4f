//! Serial leveling: a chronological sweep over overloaded resource-days.

use rustc_hash::FxHashSet;
use std::time::Instant;

use crate::config::{LevelingOptions, LevelingStrategy};
use crate::cpm::{CpmError, PassTimings};
use crate::interner::ActivityIdx;
use crate::parallel::CancellationToken;
use crate::{log_changes, log_checks, log_debug};

use super::priority::delay_order;
use super::usage::{ResourceSlot, UsageProfile};
use super::{
    assemble, LevelingContext, LevelingError, LevelingInput, LevelingResult, RunSummary,
    ShiftRecord,
};

/// Activities and resources one sweep may touch.
///
/// Every user of a slot in `slots` must be in `activities`, otherwise the
/// sweep would see only part of that resource's load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Scope {
    pub activities: Vec<ActivityIdx>,
    pub slots: Vec<ResourceSlot>,
}

impl Scope {
    pub fn whole(ctx: &LevelingContext<'_>) -> Self {
        Self {
            activities: ctx.demand.resourced_activities(),
            slots: ctx.all_slots(),
        }
    }
}

/// Floors and schedule after sweeping one scope.
#[derive(Clone, Debug)]
pub(crate) struct SweepOutcome {
    pub floors: Vec<i64>,
    pub timings: PassTimings,
    pub shifts: Vec<ShiftRecord>,
    pub iterations: u32,
    pub exhausted: bool,
    /// Conflicts no contender could be delayed to clear.
    pub warnings: Vec<String>,
}

/// Resolve conflicts in `scope` one at a time, earliest day first.
///
/// For each overloaded (resource, day) the contenders active that day are
/// ordered by [`delay_order`], each is given the earliest start past the
/// conflict at which its whole window fits, and the first placement the CPM
/// passes accept is kept. With `level_within_float`, placements that finish by
/// the activity's current late finish are tried before those that do not.
/// Priority floats are refreshed only after a shift that crosses a float
/// boundary; critical-path protection always reads the current schedule.
pub(crate) fn sweep(
    ctx: &LevelingContext<'_>,
    scope: &Scope,
    floors: Vec<i64>,
    budget: u32,
) -> Result<SweepOutcome, LevelingError> {
    let network = ctx.network();
    let options = ctx.options;
    let verbosity = options.verbosity;

    let mut floors = floors;
    let mut timings = ctx.schedule(&floors)?;
    let mut floats = timings.clone();
    let mut shifts = Vec::new();
    let mut blocked: FxHashSet<(ResourceSlot, i64)> = FxHashSet::default();
    let mut warnings = Vec::new();
    let mut iterations = 0;
    let mut exhausted = false;

    loop {
        ctx.check_cancelled()?;

        let profile = UsageProfile::build(&ctx.demand, &timings, &scope.activities);
        let Some(conflict) = profile.first_conflict(&ctx.demand, &scope.slots, |slot, day| {
            blocked.contains(&(slot, day))
        }) else {
            break;
        };
        if iterations >= budget {
            exhausted = true;
            break;
        }

        let resource_id = &ctx.demand.resource_ids[conflict.slot];
        let capacity = ctx.demand.capacity[conflict.slot];
        log_checks!(
            verbosity,
            "Day {}: {} loaded {}% of {}%",
            conflict.day,
            resource_id,
            conflict.load,
            capacity
        );

        let contenders: Vec<ActivityIdx> = ctx.demand.users[conflict.slot]
            .iter()
            .copied()
            .filter(|&a| {
                let window = timings.early_window(a);
                window.start <= conflict.day && conflict.day < window.finish
            })
            .filter(|&a| ctx.is_movable(a, conflict.slot))
            .collect();

        let mut placements: Vec<(ActivityIdx, i64, bool)> =
            delay_order(
                network,
                &floats,
                &timings,
                &contenders,
                options.preserve_critical_path,
            )
                .into_iter()
                .map(|a| {
                    let current = timings.early_window(a);
                    let start = profile.earliest_fit(&ctx.demand, a, current, conflict.day + 1);
                    let finish = start + (current.finish - current.start);
                    (a, start, finish <= timings.late_finish[a as usize])
                })
                .collect();
        if options.level_within_float {
            // Stable: priority order is kept within each group
            placements.sort_by_key(|&(_, _, within_float)| !within_float);
        }

        let mut applied = false;
        for (activity, start, within_float) in placements {
            let i = activity as usize;
            let previous = floors[i];
            floors[i] = start;
            match ctx.schedule(&floors) {
                Ok(next) => {
                    let mut reason = format!(
                        "{} overallocated on day {} ({}% of {}%)",
                        resource_id, conflict.day, conflict.load, capacity
                    );
                    if !within_float {
                        reason.push_str("; delayed beyond float");
                    }
                    log_changes!(
                        verbosity,
                        "  Delayed {} from day {} to day {}{}",
                        network.id_of(activity),
                        timings.early_start[i],
                        start,
                        if within_float { "" } else { " (beyond float)" }
                    );

                    shifts.push(ShiftRecord {
                        activity,
                        start,
                        reason,
                    });
                    timings = next;
                    iterations += 1;
                    if !within_float {
                        floats = timings.clone();
                        log_debug!(verbosity, "  Refreshed float after day {}", conflict.day);
                    }
                    applied = true;
                    break;
                }
                Err(CpmError::InfeasibleSchedule { .. }) => {
                    floors[i] = previous;
                    log_checks!(
                        verbosity,
                        "  Delaying {} to day {} breaks a constraint",
                        network.id_of(activity),
                        start
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !applied {
            blocked.insert((conflict.slot, conflict.day));
            warnings.push(format!(
                "No activity can be delayed to clear {} on day {}",
                resource_id, conflict.day
            ));
        }
    }

    Ok(SweepOutcome {
        floors,
        timings,
        shifts,
        iterations,
        exhausted,
        warnings,
    })
}

/// Level every resource in one chronological sweep.
pub fn level_serial(
    input: LevelingInput<'_>,
    options: &LevelingOptions,
    token: Option<&CancellationToken>,
) -> Result<LevelingResult, LevelingError> {
    let started = Instant::now();
    let ctx = LevelingContext::new(input, options, token)?;
    let network = ctx.network();

    log_changes!(
        options.verbosity,
        "Serial leveling: {} activities, {} resources",
        network.len(),
        ctx.demand.len()
    );

    let scope = Scope::whole(&ctx);
    let outcome = sweep(&ctx, &scope, vec![0; network.len()], options.max_iterations)?;

    let summary = RunSummary {
        strategy: LevelingStrategy::Serial,
        started,
        threads_used: 1,
        components: usize::from(!scope.activities.is_empty()),
        rounds: 1,
        iterations: outcome.iterations,
        exhausted: outcome.exhausted,
        warnings: outcome.warnings,
    };
    Ok(assemble(&ctx, outcome.timings, &outcome.shifts, summary))
}
