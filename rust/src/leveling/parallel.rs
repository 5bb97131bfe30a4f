//! Parallel leveling over independent resource-contention components.
//!
//! Activities that share a leveled resource, directly or through a chain of
//! other activities, form one component. Each round sweeps every component
//! on the worker pool against the same snapshot of floors, joins, and then
//! merges the components' floors in component order. Dependencies between
//! components can push an already leveled activity into a new conflict, so
//! rounds repeat until nothing is left to resolve or no component moves.

use rayon::prelude::*;
use std::time::Instant;

use crate::config::{LevelingOptions, LevelingStrategy};
use crate::cpm::CpmError;
use crate::interner::ActivityIdx;
use crate::network::ActivityNetwork;
use crate::parallel::{build_pool, CancellationToken};
use crate::{log_changes, log_checks};

use super::serial::{sweep, Scope, SweepOutcome};
use super::usage::{ResourceDemand, UsageProfile};
use super::{
    assemble, LevelingContext, LevelingError, LevelingInput, LevelingResult, RunSummary,
    ShiftRecord,
};

/// Resource-contention components of a network.
#[derive(Clone, Debug)]
pub(crate) struct Partition {
    /// Ordered by lowest activity code in the component.
    pub components: Vec<Scope>,
    /// Share of dependencies between resourced activities that cross components.
    pub cross_component_ratio: f64,
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // Smaller index becomes the root so roots are stable across runs
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

pub(crate) fn partition(network: &ActivityNetwork, demand: &ResourceDemand) -> Partition {
    let n = network.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for users in &demand.users {
        for pair in users.windows(2) {
            union(&mut parent, pair[0] as usize, pair[1] as usize);
        }
    }

    let mut component_of: Vec<Option<usize>> = vec![None; n];
    let mut root_slot: Vec<Option<usize>> = vec![None; n];
    let mut components: Vec<Scope> = Vec::new();
    for activity in demand.resourced_activities() {
        let root = find(&mut parent, activity as usize);
        let id = match root_slot[root] {
            Some(id) => id,
            None => {
                components.push(Scope {
                    activities: Vec::new(),
                    slots: Vec::new(),
                });
                root_slot[root] = Some(components.len() - 1);
                components.len() - 1
            }
        };
        component_of[activity as usize] = Some(id);
        components[id].activities.push(activity);
    }
    for (slot, users) in demand.users.iter().enumerate() {
        if let Some(&first) = users.first() {
            if let Some(id) = component_of[first as usize] {
                components[id].slots.push(slot);
            }
        }
    }

    let mut considered = 0usize;
    let mut crossing = 0usize;
    for edge in network.edges() {
        if let (Some(p), Some(s)) = (
            component_of[edge.predecessor as usize],
            component_of[edge.successor as usize],
        ) {
            considered += 1;
            if p != s {
                crossing += 1;
            }
        }
    }
    let cross_component_ratio = if considered == 0 {
        0.0
    } else {
        crossing as f64 / considered as f64
    };

    let rank = |scope: &Scope| -> u32 {
        scope
            .activities
            .iter()
            .map(|&a| network.code_rank(a))
            .min()
            .unwrap_or(u32::MAX)
    };
    components.sort_by_key(rank);

    Partition {
        components,
        cross_component_ratio,
    }
}

/// Level each contention component concurrently on a bounded pool.
///
/// Every component sweeps with the budget left at the start of the round.
/// Merging spends that budget in component order; a component that would
/// overrun it contributes only its earliest shifts, and later components wait
/// for a round that never comes.
pub fn level_parallel(
    input: LevelingInput<'_>,
    options: &LevelingOptions,
    token: Option<&CancellationToken>,
) -> Result<LevelingResult, LevelingError> {
    let started = Instant::now();
    let ctx = LevelingContext::new(input, options, token)?;
    let network = ctx.network();
    let verbosity = options.verbosity;

    let partition = partition(network, &ctx.demand);
    let pool = build_pool(options.max_workers).map_err(LevelingError::ThreadPool)?;
    let threads_used = pool.current_num_threads().min(partition.components.len()).max(1);

    log_changes!(
        verbosity,
        "Parallel leveling: {} activities, {} components on {} threads",
        network.len(),
        partition.components.len(),
        threads_used
    );

    let resourced: Vec<ActivityIdx> = ctx.demand.resourced_activities();
    let all_slots = ctx.all_slots();
    let mut floors = vec![0; network.len()];
    let mut timings = ctx.schedule(&floors)?;
    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let mut iterations = 0u32;
    let mut rounds = 0u32;
    let mut exhausted = false;

    loop {
        ctx.check_cancelled()?;

        let profile = UsageProfile::build(&ctx.demand, &timings, &resourced);
        if profile.overallocations(&ctx.demand, &all_slots) == 0 {
            break;
        }
        if iterations >= options.max_iterations {
            exhausted = true;
            break;
        }
        rounds += 1;

        let budget = options.max_iterations - iterations;
        let snapshot = &floors;
        let outcomes: Vec<Result<SweepOutcome, LevelingError>> = pool.install(|| {
            partition
                .components
                .par_iter()
                .map(|scope| sweep(&ctx, scope, snapshot.clone(), budget))
                .collect()
        });

        // Barrier passed: merge in component order, within the iteration budget
        let mut progressed = false;
        warnings.clear();
        for (scope, outcome) in partition.components.iter().zip(outcomes) {
            let outcome = outcome?;
            warnings.extend(outcome.warnings);
            if outcome.shifts.is_empty() {
                continue;
            }
            let allowance = options.max_iterations - iterations;
            if allowance == 0 {
                log_checks!(
                    verbosity,
                    "  Round {}: iteration budget spent, remaining components not merged",
                    rounds
                );
                break;
            }

            let mut merged = floors.clone();
            let shifts = if outcome.iterations > allowance {
                // Replay only the shifts the budget allows, in sweep order
                let kept: Vec<ShiftRecord> =
                    outcome.shifts.into_iter().take(allowance as usize).collect();
                for record in &kept {
                    let i = record.activity as usize;
                    merged[i] = merged[i].max(record.start);
                }
                kept
            } else {
                for &a in &scope.activities {
                    let i = a as usize;
                    merged[i] = merged[i].max(outcome.floors[i]);
                }
                outcome.shifts
            };
            match ctx.schedule(&merged) {
                Ok(next) => {
                    floors = merged;
                    timings = next;
                    iterations += shifts.len() as u32;
                    records.extend(shifts);
                    progressed = true;
                }
                Err(CpmError::InfeasibleSchedule { activity_id, .. }) => {
                    log_checks!(
                        verbosity,
                        "  Round {}: component shifts conflict with a constraint on {}",
                        rounds,
                        activity_id
                    );
                    warnings.push(format!(
                        "Shifts in one component were discarded: merging them breaks a constraint on {activity_id}"
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }

        log_changes!(
            verbosity,
            "Round {}: {} iterations so far, project finish {}",
            rounds,
            iterations,
            timings.project_duration
        );

        if !progressed {
            break;
        }
    }

    let summary = RunSummary {
        strategy: LevelingStrategy::Parallel,
        started,
        threads_used,
        components: partition.components.len(),
        rounds,
        iterations,
        exhausted,
        warnings,
    };
    Ok(assemble(&ctx, timings, &records, summary))
}
