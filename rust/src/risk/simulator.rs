//! Monte Carlo driver: sample, reschedule, accumulate, summarize.

use chrono::NaiveDate;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::config::MonteCarloConfig;
use crate::cpm::{offset_to_date, CpmEngine};
use crate::models::{div_round, Assignment, Money, Resource};
use crate::network::ActivityNetwork;
use crate::parallel::{build_pool, CancellationToken};
use crate::{log_changes, log_checks, log_debug};

use super::cost::CostModel;
use super::sampling::Sampler;
use super::statistics::{histogram, mean_std_dev, money_percentile, percentile, PearsonSums};
use super::types::{
    CostPercentile, CostResults, DurationEstimate, DurationPercentile, DurationResults,
    FixedCost, MonteCarloResult, SCurvePoint, SensitivityItem, SimulationError,
    SimulationStatus,
};

/// Everything a simulation run reads.
#[derive(Clone, Copy, Debug)]
pub struct SimulationInput<'a> {
    pub engine: &'a CpmEngine<'a>,
    pub estimates: &'a [DurationEstimate],
    pub resources: &'a [Resource],
    pub assignments: &'a [Assignment],
    pub fixed_costs: &'a [FixedCost],
}

impl<'a> SimulationInput<'a> {
    pub fn new(engine: &'a CpmEngine<'a>, estimates: &'a [DurationEstimate]) -> Self {
        Self {
            engine,
            estimates,
            resources: &[],
            assignments: &[],
            fixed_costs: &[],
        }
    }

    /// Inputs for the cost model.
    pub fn with_costs(
        mut self,
        resources: &'a [Resource],
        assignments: &'a [Assignment],
        fixed_costs: &'a [FixedCost],
    ) -> Self {
        self.resources = resources;
        self.assignments = assignments;
        self.fixed_costs = fixed_costs;
        self
    }
}

/// Derive an independent stream seed for one iteration (splitmix64 finalizer).
fn stream_seed(seed: u64, iteration: u32) -> u64 {
    let mut z = seed.wrapping_add((iteration as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Per-worker summary of the iterations it ran.
#[derive(Clone, Debug)]
struct Accumulator {
    durations: Vec<i64>,
    costs: Vec<i64>,
    critical_counts: Vec<u32>,
    /// One entry per activity when correlation tracking is on.
    correlation: Vec<PearsonSums>,
}

impl Accumulator {
    fn new(activities: usize, track_correlation: bool) -> Self {
        Self {
            durations: Vec::new(),
            costs: Vec::new(),
            critical_counts: vec![0; activities],
            correlation: if track_correlation {
                vec![PearsonSums::default(); activities]
            } else {
                Vec::new()
            },
        }
    }

    fn merge(mut self, other: Accumulator) -> Self {
        self.durations.extend(other.durations);
        self.costs.extend(other.costs);
        for (count, add) in self.critical_counts.iter_mut().zip(other.critical_counts) {
            *count += add;
        }
        for (sums, add) in self.correlation.iter_mut().zip(&other.correlation) {
            sums.merge(add);
        }
        self
    }
}

/// Prepared, read-only state of one run.
struct Simulation<'a> {
    engine: &'a CpmEngine<'a>,
    config: &'a MonteCarloConfig,
    samplers: Vec<Option<Sampler>>,
    planned: Vec<i64>,
    cost: Option<CostModel>,
    seed: u64,
    token: Option<&'a CancellationToken>,
}

impl<'a> Simulation<'a> {
    fn network(&self) -> &'a ActivityNetwork {
        self.engine.network()
    }

    fn run_iteration(&self, iteration: u32, acc: &mut Accumulator) -> Result<(), SimulationError> {
        if self.token.is_some_and(|t| t.is_cancelled()) {
            return Err(SimulationError::Cancelled);
        }

        let mut rng = SmallRng::seed_from_u64(stream_seed(self.seed, iteration));
        let durations: Vec<i64> = self
            .samplers
            .iter()
            .zip(&self.planned)
            .map(|(sampler, &planned)| match sampler {
                Some(sampler) => sampler.sample(&mut rng),
                None => planned,
            })
            .collect();

        let timings = self
            .engine
            .compute(&durations, None)
            .map_err(|source| SimulationError::InfeasibleIteration { iteration, source })?;

        let project = timings.project_duration;
        acc.durations.push(project);
        if let Some(cost) = &self.cost {
            let total = cost.total(&durations).ok_or(SimulationError::CostOverflow)?;
            acc.costs.push(total.cents());
        }
        for (i, count) in acc.critical_counts.iter_mut().enumerate() {
            if timings.is_critical(i as u32) {
                *count += 1;
            }
        }
        for (sums, &duration) in acc.correlation.iter_mut().zip(&durations) {
            sums.add(duration, project);
        }
        Ok(())
    }
}

/// Run a Monte Carlo schedule (and optionally cost) simulation.
///
/// Iterations run on a rayon pool bounded by `config.max_workers`; each one
/// draws from its own stream seeded from `(seed, iteration)`, so a fixed seed
/// reproduces the same result at any worker count. An infeasible iteration
/// fails the whole run and no statistics are reported.
pub fn simulate(
    input: SimulationInput<'_>,
    config: &MonteCarloConfig,
    token: Option<&CancellationToken>,
) -> Result<MonteCarloResult, SimulationError> {
    config.validate().map_err(SimulationError::InvalidConfig)?;

    let engine = input.engine;
    let network = engine.network();
    let verbosity = config.verbosity;

    let planned = network.durations();
    let baseline = engine.compute(&planned, None)?;

    let mut samplers: Vec<Option<Sampler>> = vec![None; network.len()];
    for estimate in input.estimates {
        let idx = network.index_of(&estimate.activity_id).ok_or_else(|| {
            SimulationError::InvalidConfig(format!(
                "estimate references unknown activity {}",
                estimate.activity_id
            ))
        })?;
        if network.activity(idx).is_milestone {
            continue;
        }
        let sampler = Sampler::new(estimate, config.distribution_type)
            .map_err(SimulationError::InvalidConfig)?;
        samplers[idx as usize] = Some(sampler);
    }

    let mut warnings = Vec::new();
    let cost = config.include_cost.then(|| {
        CostModel::build(
            network,
            input.resources,
            input.assignments,
            input.fixed_costs,
            &mut warnings,
        )
    });

    let deterministic_cost = cost
        .as_ref()
        .map(|c| c.total(&planned).ok_or(SimulationError::CostOverflow))
        .transpose()?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let mut snapshot = config.clone();
    snapshot.seed = Some(seed);

    let pool = build_pool(config.max_workers).map_err(SimulationError::ThreadPool)?;
    log_changes!(
        verbosity,
        "Simulating {} iterations of {} activities (seed {}, {} threads)",
        config.iterations,
        network.len(),
        seed,
        pool.current_num_threads()
    );

    let simulation = Simulation {
        engine,
        config,
        samplers,
        planned,
        cost,
        seed,
        token,
    };
    let n = network.len();
    let track = config.correlation_enabled;

    let outcome = pool.install(|| {
        (0..config.iterations)
            .into_par_iter()
            .try_fold(
                || Accumulator::new(n, track),
                |mut acc, iteration| {
                    simulation.run_iteration(iteration, &mut acc)?;
                    Ok::<_, SimulationError>(acc)
                },
            )
            .try_reduce(|| Accumulator::new(n, track), |a, b| Ok(a.merge(b)))
    });

    let deterministic_duration = baseline.project_duration;
    let acc = match outcome {
        Ok(acc) => acc,
        Err(SimulationError::Cancelled) => {
            log_changes!(verbosity, "Simulation cancelled");
            return Ok(MonteCarloResult::unfinished(
                snapshot,
                SimulationStatus::Cancelled,
                deterministic_duration,
                warnings,
                Some(SimulationError::Cancelled.to_string()),
            ));
        }
        Err(e @ SimulationError::InfeasibleIteration { .. }) => {
            log_changes!(verbosity, "Simulation failed: {}", e);
            return Ok(MonteCarloResult::unfinished(
                snapshot,
                SimulationStatus::Failed,
                deterministic_duration,
                warnings,
                Some(e.to_string()),
            ));
        }
        Err(e) => return Err(e),
    };

    Ok(summarize(
        &simulation,
        acc,
        snapshot,
        deterministic_duration,
        deterministic_cost,
        warnings,
    ))
}

fn summarize(
    simulation: &Simulation<'_>,
    mut acc: Accumulator,
    config: MonteCarloConfig,
    deterministic_duration: i64,
    deterministic_cost: Option<Money>,
    warnings: Vec<String>,
) -> MonteCarloResult {
    let network = simulation.network();
    let verbosity = simulation.config.verbosity;
    let iterations = acc.durations.len() as u32;

    acc.durations.sort_unstable();
    acc.costs.sort_unstable();
    let durations = &acc.durations;

    let (mean, std_dev) = mean_std_dev(durations);
    let at = |level: u8| percentile(durations, level as f64);
    let duration_results = DurationResults {
        mean,
        std_dev,
        min: durations.first().copied().unwrap_or(0),
        max: durations.last().copied().unwrap_or(0),
        p10: at(10),
        p25: at(25),
        p50: at(50),
        p75: at(75),
        p80: at(80),
        p90: at(90),
        p95: at(95),
        percentiles: config
            .confidence_levels
            .iter()
            .map(|&level| DurationPercentile {
                level,
                value: at(level),
            })
            .collect(),
        histogram: histogram(durations, config.histogram_bins),
    };
    log_checks!(
        verbosity,
        "Duration mean {:.2}, p50 {:.1}, p90 {:.1} (deterministic {})",
        mean,
        duration_results.p50,
        duration_results.p90,
        deterministic_duration
    );

    let cost_results = simulation.cost.as_ref().map(|_| {
        let costs = &acc.costs;
        let sum: i128 = costs.iter().map(|&c| c as i128).sum();
        let mean = if costs.is_empty() {
            Money::ZERO
        } else {
            Money(div_round(sum, costs.len() as i128) as i64)
        };
        let at = |level: u8| money_percentile(costs, level);
        CostResults {
            mean,
            min: Money(costs.first().copied().unwrap_or(0)),
            max: Money(costs.last().copied().unwrap_or(0)),
            p10: at(10),
            p25: at(25),
            p50: at(50),
            p75: at(75),
            p80: at(80),
            p90: at(90),
            p95: at(95),
            percentiles: config
                .confidence_levels
                .iter()
                .map(|&level| CostPercentile {
                    level,
                    value: at(level),
                })
                .collect(),
        }
    });

    let sensitivity = rank_sensitivity(network, &acc, iterations);
    let s_curve = s_curve(simulation.engine.program_start(), durations);
    log_debug!(verbosity, "S-curve spans {} days", s_curve.len());

    MonteCarloResult {
        config,
        status: SimulationStatus::Completed,
        iterations_completed: iterations,
        deterministic_duration,
        deterministic_cost,
        duration_results: Some(duration_results),
        cost_results,
        sensitivity,
        s_curve,
        warnings,
        error: None,
    }
}

/// Tornado order: |correlation| descending, then criticality, then code.
fn rank_sensitivity(
    network: &ActivityNetwork,
    acc: &Accumulator,
    iterations: u32,
) -> Vec<SensitivityItem> {
    let tracked = !acc.correlation.is_empty();
    let mut items: Vec<(u32, SensitivityItem)> = (0..network.len())
        .map(|i| {
            let idx = i as u32;
            let item = SensitivityItem {
                activity_id: network.id_of(idx).to_string(),
                correlation: tracked.then(|| acc.correlation[i].coefficient()),
                criticality_index: if iterations == 0 {
                    0.0
                } else {
                    acc.critical_counts[i] as f64 / iterations as f64
                },
            };
            (network.code_rank(idx), item)
        })
        .collect();

    items.sort_by(|(rank_a, a), (rank_b, b)| {
        let by_correlation = match (a.correlation, b.correlation) {
            (Some(x), Some(y)) => y.abs().partial_cmp(&x.abs()).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        by_correlation
            .then(
                b.criticality_index
                    .partial_cmp(&a.criticality_index)
                    .unwrap_or(Ordering::Equal),
            )
            .then(rank_a.cmp(rank_b))
    });
    items.into_iter().map(|(_, item)| item).collect()
}

/// Cumulative probability of finishing by each day from the shortest to the
/// longest sampled duration.
fn s_curve(program_start: NaiveDate, sorted: &[i64]) -> Vec<SCurvePoint> {
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    let total = sorted.len() as f64;
    (min..=max)
        .filter_map(|day| {
            let finished = sorted.partition_point(|&d| d <= day);
            offset_to_date(program_start, day).map(|date| SCurvePoint {
                day,
                date,
                cumulative_probability: finished as f64 / total,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistributionType;
    use crate::models::{Activity, ConstraintType, Dependency, ResourceType};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn act(id: &str, duration: i64) -> Activity {
        Activity::new(id, id.to_uppercase(), id, duration)
    }

    fn diamond() -> ActivityNetwork {
        let activities = vec![act("a", 5), act("b", 3), act("c", 8), act("d", 2)];
        let deps = vec![
            Dependency::fs("a", "b"),
            Dependency::fs("b", "d"),
            Dependency::fs("a", "c"),
            Dependency::fs("c", "d"),
        ];
        ActivityNetwork::build(&activities, &deps).unwrap()
    }

    fn config(iterations: u32) -> MonteCarloConfig {
        MonteCarloConfig {
            iterations,
            seed: Some(42),
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_variance_matches_deterministic() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let estimates = vec![
            DurationEstimate::fixed("a", 5),
            DurationEstimate::fixed("b", 3),
            DurationEstimate::fixed("c", 8),
            DurationEstimate::fixed("d", 2),
        ];
        let result =
            simulate(SimulationInput::new(&engine, &estimates), &config(200), None).unwrap();

        assert!(result.is_completed());
        assert_eq!(result.iterations_completed, 200);
        assert_eq!(result.deterministic_duration, 15);
        let durations = result.duration_results.as_ref().unwrap();
        assert_eq!(durations.mean, 15.0);
        assert_eq!(durations.std_dev, 0.0);
        assert_eq!((durations.p10, durations.p50, durations.p95), (15.0, 15.0, 15.0));
        assert_eq!(durations.histogram.len(), 1);

        let b = result.sensitivity_for("b").unwrap();
        assert_eq!(b.correlation, Some(0.0));
        assert_eq!(b.criticality_index, 0.0);
        assert_eq!(result.sensitivity_for("c").unwrap().criticality_index, 1.0);
        assert_eq!(result.probability_on_time(15), Some(1.0));
        assert_eq!(result.probability_on_time(14), Some(0.0));
    }

    #[test]
    fn test_same_seed_same_result_any_worker_count() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let estimates = vec![
            DurationEstimate::new("a", 3, 5, 9),
            DurationEstimate::new("b", 2, 3, 10),
            DurationEstimate::new("c", 6, 8, 12),
        ];
        let input = SimulationInput::new(&engine, &estimates);

        let one = simulate(
            input,
            &MonteCarloConfig {
                max_workers: 1,
                ..config(300)
            },
            None,
        )
        .unwrap();
        let four = simulate(
            input,
            &MonteCarloConfig {
                max_workers: 4,
                ..config(300)
            },
            None,
        )
        .unwrap();

        assert_eq!(one.duration_results, four.duration_results);
        assert_eq!(one.sensitivity, four.sensitivity);
        assert_eq!(one.s_curve, four.s_curve);
        assert_eq!(one.config.seed, Some(42));
    }

    #[test]
    fn test_sensitivity_ranks_driving_activity_first() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        // Only c varies, and c is always critical
        let estimates = vec![DurationEstimate::new("c", 6, 8, 14)];
        let result =
            simulate(SimulationInput::new(&engine, &estimates), &config(500), None).unwrap();

        assert_eq!(result.sensitivity[0].activity_id, "c");
        assert!(result.sensitivity[0].correlation.unwrap() > 0.99);
        let durations = result.duration_results.unwrap();
        assert!(durations.min >= 13 && durations.max <= 21);
        assert!(durations.p10 <= durations.p50 && durations.p50 <= durations.p95);
    }

    #[test]
    fn test_correlation_disabled_ranks_by_criticality() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let estimates = vec![DurationEstimate::new("b", 1, 3, 12)];
        let cfg = MonteCarloConfig {
            correlation_enabled: false,
            ..config(200)
        };
        let result = simulate(SimulationInput::new(&engine, &estimates), &cfg, None).unwrap();

        assert!(result.sensitivity.iter().all(|s| s.correlation.is_none()));
        let ranked: Vec<f64> = result
            .sensitivity
            .iter()
            .map(|s| s.criticality_index)
            .collect();
        assert!(ranked.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_infeasible_iteration_fails_run() {
        // c must finish by day 14; sampled durations push it later
        let finish_cap = start().checked_add_days(chrono::Days::new(14)).unwrap();
        let activities = vec![
            act("a", 5),
            act("c", 8).with_constraint(ConstraintType::FinishNoLaterThan, finish_cap),
        ];
        let network = ActivityNetwork::build(&activities, &[Dependency::fs("a", "c")]).unwrap();
        let engine = CpmEngine::new(&network, start());
        let estimates = vec![DurationEstimate::new("c", 8, 12, 20)];
        let result =
            simulate(SimulationInput::new(&engine, &estimates), &config(100), None).unwrap();

        assert_eq!(result.status, SimulationStatus::Failed);
        assert!(result.duration_results.is_none());
        assert!(result.sensitivity.is_empty());
        assert!(result.error.unwrap().contains("infeasible"));
    }

    #[test]
    fn test_cancelled_run_has_no_statistics() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let token = CancellationToken::new();
        token.cancel();
        let result =
            simulate(SimulationInput::new(&engine, &[]), &config(100), Some(&token)).unwrap();

        assert_eq!(result.status, SimulationStatus::Cancelled);
        assert!(result.duration_results.is_none());
        assert_eq!(result.iterations_completed, 0);
    }

    #[test]
    fn test_cost_results() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let resources =
            vec![Resource::new("crew", ResourceType::Labor, 1).with_cost_rate(Money::from_units(100))];
        let assignments = vec![Assignment::new("c", "crew", 100)];
        let fixed = vec![FixedCost {
            activity_id: "a".to_string(),
            amount: Money::from_units(50),
        }];
        let estimates = vec![DurationEstimate::new("c", 6, 8, 10)];
        let cfg = MonteCarloConfig {
            include_cost: true,
            distribution_type: DistributionType::Uniform,
            ..config(400)
        };
        let input = SimulationInput::new(&engine, &estimates).with_costs(&resources, &assignments, &fixed);
        let result = simulate(input, &cfg, None).unwrap();

        assert_eq!(result.deterministic_cost, Some(Money::from_units(850)));
        let cost = result.cost_results.unwrap();
        assert!(cost.min >= Money::from_units(650) && cost.max <= Money::from_units(1050));
        assert!(cost.p10 <= cost.p50 && cost.p50 <= cost.p90);
        assert_eq!(cost.percentiles.len(), cfg.confidence_levels.len());
    }

    #[test]
    fn test_cost_overflow_rejected() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let resources =
            vec![Resource::new("crew", ResourceType::Labor, 1).with_cost_rate(Money(i64::MAX / 4))];
        let assignments = vec![Assignment::new("c", "crew", 100)];
        let cfg = MonteCarloConfig {
            include_cost: true,
            ..config(10)
        };
        let input = SimulationInput::new(&engine, &[]).with_costs(&resources, &assignments, &[]);
        assert_eq!(simulate(input, &cfg, None), Err(SimulationError::CostOverflow));
    }

    #[test]
    fn test_unknown_estimate_rejected() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let estimates = vec![DurationEstimate::new("zz", 1, 2, 3)];
        let err = simulate(SimulationInput::new(&engine, &estimates), &config(10), None);
        assert!(matches!(err, Err(SimulationError::InvalidConfig(_))));
    }
}
