//! Critical path calculation using forward and backward passes.

use chrono::NaiveDate;
use thiserror::Error;

use crate::interner::ActivityIdx;
use crate::models::{Constraint, ConstraintType};
use crate::network::{ActivityNetwork, GraphError, RequiredOffset, Window};

use super::path::trace_critical_path;
use super::types::{CpmPhase, CpmResult, PassTimings, ScheduleResult};

/// Error types for critical path calculation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpmError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(
        "Infeasible schedule: activity {activity_id} has late start {late_start} before early start {early_start} (driven by constraint on {constraint_activity_id})"
    )]
    InfeasibleSchedule {
        activity_id: String,
        /// Activity whose hard constraint produced the contradiction.
        constraint_activity_id: String,
        constraint: Option<Constraint>,
        early_start: i64,
        late_start: i64,
    },
    #[error("Expected {expected} durations, got {actual}")]
    DurationCountMismatch { expected: usize, actual: usize },
}

/// CPM engine bound to one immutable network snapshot.
///
/// Constraint dates are converted to day offsets once; every run after that is
/// pure integer arithmetic, so identical inputs give identical outputs.
#[derive(Debug, Clone)]
pub struct CpmEngine<'a> {
    network: &'a ActivityNetwork,
    program_start: NaiveDate,
    /// Constraint kind and day offset, indexed by activity.
    constraints: Vec<Option<(ConstraintType, i64)>>,
}

impl<'a> CpmEngine<'a> {
    pub fn new(network: &'a ActivityNetwork, program_start: NaiveDate) -> Self {
        let constraints = network
            .activities()
            .iter()
            .map(|a| {
                a.constraint
                    .map(|c| (c.kind, (c.date - program_start).num_days()))
            })
            .collect();

        Self {
            network,
            program_start,
            constraints,
        }
    }

    pub fn network(&self) -> &'a ActivityNetwork {
        self.network
    }

    pub fn program_start(&self) -> NaiveDate {
        self.program_start
    }

    /// Constraint kind on an activity, if any.
    pub fn constraint_kind(&self, idx: ActivityIdx) -> Option<ConstraintType> {
        self.constraints[idx as usize].map(|(kind, _)| kind)
    }

    /// Schedule the network with its planned durations.
    pub fn run(&self) -> Result<CpmResult, CpmError> {
        let durations = self.network.durations();
        self.run_with(&durations, None)
    }

    /// Schedule with overridden durations and optional per-activity start floors.
    ///
    /// Floors act like start-no-earlier-than constraints; the leveler uses them
    /// to hold shifted activities in place.
    pub fn run_with(
        &self,
        durations: &[i64],
        floors: Option<&[i64]>,
    ) -> Result<CpmResult, CpmError> {
        let timings = self.compute(durations, floors)?;
        Ok(self.resolve(timings))
    }

    /// Forward and backward passes without building the resolved result.
    pub fn compute(
        &self,
        durations: &[i64],
        floors: Option<&[i64]>,
    ) -> Result<PassTimings, CpmError> {
        let n = self.network.len();
        if durations.len() != n {
            return Err(CpmError::DurationCountMismatch {
                expected: n,
                actual: durations.len(),
            });
        }
        if let Some(floors) = floors {
            if floors.len() != n {
                return Err(CpmError::DurationCountMismatch {
                    expected: n,
                    actual: floors.len(),
                });
            }
        }

        let mut timings = PassTimings::unscheduled(n);
        self.forward_pass(durations, floors, &mut timings);
        self.backward_pass(&mut timings)?;
        Ok(timings)
    }

    /// Earliest dates in topological order.
    fn forward_pass(&self, durations: &[i64], floors: Option<&[i64]>, timings: &mut PassTimings) {
        debug_assert_eq!(timings.phase, CpmPhase::Unscheduled);

        let mut project_duration = 0;
        for &idx in self.network.topological_order() {
            let i = idx as usize;
            let duration = durations[i];

            // Nothing starts before the program start
            let mut early_start = 0;
            for edge in self.network.predecessors(idx) {
                let pred = timings.early_window(edge.predecessor);
                early_start = early_start.max(edge.required_offset(pred).as_start(duration));
            }

            if let Some((kind, offset)) = self.constraints[i] {
                match kind {
                    ConstraintType::StartNoEarlierThan | ConstraintType::MustStartOn => {
                        early_start = early_start.max(offset);
                    }
                    ConstraintType::FinishNoEarlierThan | ConstraintType::MustFinishOn => {
                        early_start = early_start.max(offset - duration);
                    }
                    ConstraintType::StartNoLaterThan | ConstraintType::FinishNoLaterThan => {}
                }
            }

            if let Some(floors) = floors {
                early_start = early_start.max(floors[i]);
            }

            timings.early_start[i] = early_start;
            timings.early_finish[i] = early_start + duration;
            project_duration = project_duration.max(early_start + duration);
        }

        timings.project_duration = project_duration;
        timings.phase = CpmPhase::ForwardPassed;
    }

    /// Latest dates in reverse topological order.
    ///
    /// Fails with `InfeasibleSchedule` when a cap forces a late start before the
    /// early start; the error names the activity whose constraint is responsible.
    fn backward_pass(&self, timings: &mut PassTimings) -> Result<(), CpmError> {
        debug_assert_eq!(timings.phase, CpmPhase::ForwardPassed);

        let n = self.network.len();
        // Activity whose own constraint set the binding late date
        let mut late_origin: Vec<Option<ActivityIdx>> = vec![None; n];

        for &idx in self.network.topological_order().iter().rev() {
            let i = idx as usize;
            let duration = timings.early_finish[i] - timings.early_start[i];

            let mut late_finish = timings.project_duration;
            let mut origin = None;
            for edge in self.network.successors(idx) {
                let succ = timings.late_window(edge.successor);
                let bound = edge.latest_allowed(succ).as_finish(duration);
                if bound < late_finish {
                    late_finish = bound;
                    origin = late_origin[edge.successor as usize];
                }
            }

            if let Some((kind, offset)) = self.constraints[i] {
                let cap = match kind {
                    ConstraintType::StartNoLaterThan | ConstraintType::MustStartOn => {
                        Some(offset + duration)
                    }
                    ConstraintType::FinishNoLaterThan | ConstraintType::MustFinishOn => {
                        Some(offset)
                    }
                    ConstraintType::StartNoEarlierThan | ConstraintType::FinishNoEarlierThan => {
                        None
                    }
                };
                if let Some(cap) = cap {
                    if cap < late_finish {
                        late_finish = cap;
                        origin = Some(idx);
                    }
                }
            }

            let late_start = late_finish - duration;
            if late_start < timings.early_start[i] {
                let constraint_idx = origin.unwrap_or(idx);
                return Err(CpmError::InfeasibleSchedule {
                    activity_id: self.network.id_of(idx).to_string(),
                    constraint_activity_id: self.network.id_of(constraint_idx).to_string(),
                    constraint: self.network.activity(constraint_idx).constraint,
                    early_start: timings.early_start[i],
                    late_start,
                });
            }

            timings.late_start[i] = late_start;
            timings.late_finish[i] = late_finish;
            late_origin[i] = origin;
        }

        timings.phase = CpmPhase::BackwardPassed;
        Ok(())
    }

    /// Derive float, criticality and the critical path from finished passes.
    pub fn resolve(&self, mut timings: PassTimings) -> CpmResult {
        debug_assert_eq!(timings.phase, CpmPhase::BackwardPassed);

        let network = self.network;
        let schedule: Vec<ScheduleResult> = (0..network.len())
            .map(|i| {
                let idx = i as ActivityIdx;
                let total_float = timings.total_float(idx);
                let free_float = self.free_float(idx, &timings).clamp(0, total_float.max(0));
                let activity = network.activity(idx);
                ScheduleResult {
                    activity_id: activity.id.clone(),
                    code: activity.code.clone(),
                    early_start: timings.early_start[i],
                    early_finish: timings.early_finish[i],
                    late_start: timings.late_start[i],
                    late_finish: timings.late_finish[i],
                    total_float,
                    free_float,
                    is_critical: total_float == 0,
                }
            })
            .collect();

        let critical_activities = network
            .topological_order()
            .iter()
            .filter(|&&idx| timings.is_critical(idx))
            .map(|&idx| network.id_of(idx).to_string())
            .collect();

        let critical_path = trace_critical_path(network, &timings)
            .into_iter()
            .map(|idx| network.id_of(idx).to_string())
            .collect();

        timings.phase = CpmPhase::Resolved;

        CpmResult {
            program_start: self.program_start,
            schedule,
            critical_path,
            critical_activities,
            project_duration: timings.project_duration,
        }
    }

    /// Smallest slack between this activity's early dates and the bound it
    /// imposes on each successor's early dates.
    fn free_float(&self, idx: ActivityIdx, timings: &PassTimings) -> i64 {
        let pred = timings.early_window(idx);
        let mut free_float: Option<i64> = None;
        for edge in self.network.successors(idx) {
            let succ: Window = timings.early_window(edge.successor);
            let slack = match edge.required_offset(pred) {
                RequiredOffset::Start(bound) => succ.start - bound,
                RequiredOffset::Finish(bound) => succ.finish - bound,
            };
            free_float = Some(free_float.map_or(slack, |f| f.min(slack)));
        }
        free_float.unwrap_or(timings.project_duration - pred.finish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, Dependency, DependencyType};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn day(offset: u64) -> NaiveDate {
        start().checked_add_days(chrono::Days::new(offset)).unwrap()
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

    #[test]
    fn test_diamond_critical_path() {
        let network = diamond();
        let result = CpmEngine::new(&network, start()).run().unwrap();

        assert_eq!(result.project_duration, 15);
        assert_eq!(result.critical_path, vec!["a", "c", "d"]);
        assert_eq!(result.critical_activities, vec!["a", "c", "d"]);

        let b = result.get("b").unwrap();
        assert_eq!(b.early_start, 5);
        assert_eq!(b.late_start, 10);
        assert_eq!(b.total_float, 5);
        assert_eq!(b.free_float, 5);
        assert!(!b.is_critical);

        let d = result.get("d").unwrap();
        assert_eq!((d.early_start, d.early_finish), (13, 15));
        assert_eq!(result.finish_date(), NaiveDate::from_ymd_opt(2025, 1, 16));
    }

    #[test]
    fn test_lag_and_dependency_types() {
        let activities = vec![act("a", 4), act("b", 3), act("c", 6), act("d", 2)];
        let deps = vec![
            Dependency::new("a", "b", DependencyType::FS, 2),
            Dependency::new("a", "c", DependencyType::SS, 1),
            Dependency::new("c", "d", DependencyType::FF, 1),
        ];
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let result = CpmEngine::new(&network, start()).run().unwrap();

        assert_eq!(result.get("b").unwrap().early_start, 6);
        assert_eq!(result.get("c").unwrap().early_start, 1);
        // d must finish at least one day after c finishes (7 + 1)
        assert_eq!(result.get("d").unwrap().early_finish, 8);
        assert_eq!(result.project_duration, 9);
    }

    #[test]
    fn test_negative_lag_clamped_to_program_start() {
        let activities = vec![act("a", 2), act("b", 3)];
        let deps = vec![Dependency::new("a", "b", DependencyType::SS, -5)];
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let result = CpmEngine::new(&network, start()).run().unwrap();
        assert_eq!(result.get("b").unwrap().early_start, 0);
    }

    #[test]
    fn test_start_no_earlier_than_pushes_activity() {
        let activities = vec![
            act("a", 3),
            act("b", 2).with_constraint(ConstraintType::StartNoEarlierThan, day(10)),
        ];
        let deps = vec![Dependency::fs("a", "b")];
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let result = CpmEngine::new(&network, start()).run().unwrap();

        assert_eq!(result.get("b").unwrap().early_start, 10);
        assert_eq!(result.project_duration, 12);
        // a can now slip until b's constrained start
        assert_eq!(result.get("a").unwrap().total_float, 7);
        assert_eq!(result.critical_path, vec!["b"]);
    }

    #[test]
    fn test_finish_no_later_than_infeasible() {
        let activities = vec![
            act("a", 5),
            act("b", 4).with_constraint(ConstraintType::FinishNoLaterThan, day(6)),
        ];
        let deps = vec![Dependency::fs("a", "b")];
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let err = CpmEngine::new(&network, start()).run().unwrap_err();

        match err {
            CpmError::InfeasibleSchedule {
                activity_id,
                constraint_activity_id,
                constraint,
                ..
            } => {
                assert_eq!(activity_id, "b");
                assert_eq!(constraint_activity_id, "b");
                assert_eq!(
                    constraint.map(|c| c.kind),
                    Some(ConstraintType::FinishNoLaterThan)
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_infeasibility_traced_to_constrained_successor() {
        // b must start by day 3 but a only finishes on day 5
        let activities = vec![
            act("a", 5),
            act("b", 1).with_constraint(ConstraintType::StartNoLaterThan, day(3)),
        ];
        let deps = vec![Dependency::fs("a", "b")];
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let err = CpmEngine::new(&network, start()).run().unwrap_err();

        assert!(matches!(
            err,
            CpmError::InfeasibleSchedule { ref activity_id, ref constraint_activity_id, .. }
                if activity_id == "b" && constraint_activity_id == "b"
        ));
    }

    #[test]
    fn test_must_finish_on_caps_late_dates() {
        let activities = vec![
            act("a", 2),
            act("b", 3).with_constraint(ConstraintType::MustFinishOn, day(8)),
            act("c", 10),
        ];
        let deps = vec![Dependency::fs("a", "b")];
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let result = CpmEngine::new(&network, start()).run().unwrap();

        let b = result.get("b").unwrap();
        assert_eq!((b.early_start, b.early_finish), (5, 8));
        assert_eq!(b.late_finish, 8);
        assert!(b.is_critical);
        assert_eq!(result.get("a").unwrap().late_finish, 5);
        assert_eq!(result.project_duration, 10);
    }

    #[test]
    fn test_floors_delay_successors() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        let b = network.index_of("b").unwrap() as usize;

        let mut floors = vec![0; network.len()];
        floors[b] = 12;
        let result = engine
            .run_with(&network.durations(), Some(&floors))
            .unwrap();

        assert_eq!(result.get("b").unwrap().early_start, 12);
        assert_eq!(result.get("d").unwrap().early_start, 15);
        assert_eq!(result.project_duration, 17);
        assert_eq!(result.critical_path, vec!["b", "d"]);
    }

    #[test]
    fn test_duration_count_mismatch() {
        let network = diamond();
        let engine = CpmEngine::new(&network, start());
        assert_eq!(
            engine.compute(&[1, 2], None).unwrap_err(),
            CpmError::DurationCountMismatch {
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_empty_network() {
        let network = ActivityNetwork::build(&[], &[]).unwrap();
        let result = CpmEngine::new(&network, start()).run().unwrap();
        assert_eq!(result.project_duration, 0);
        assert!(result.critical_path.is_empty());
    }

    /// Layered random DAG with FS links and non-negative lags.
    fn random_network(seed: u64, n: usize) -> (Vec<Activity>, Vec<Dependency>) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let activities: Vec<Activity> = (0..n)
            .map(|i| {
                Activity::new(
                    format!("a{i}"),
                    format!("C{i:03}"),
                    format!("a{i}"),
                    rng.gen_range(0..10),
                )
            })
            .collect();
        let mut deps = Vec::new();
        for succ in 1..n {
            for pred in 0..succ {
                if rng.gen_bool(0.15) {
                    deps.push(Dependency::new(
                        format!("a{pred}"),
                        format!("a{succ}"),
                        DependencyType::FS,
                        rng.gen_range(0..3),
                    ));
                }
            }
        }
        (activities, deps)
    }

    #[test]
    fn test_random_networks_satisfy_cpm_properties() {
        for seed in 0..20 {
            let (activities, deps) = random_network(seed, 30);
            let network = ActivityNetwork::build(&activities, &deps).unwrap();
            let result = CpmEngine::new(&network, start()).run().unwrap();

            for (i, s) in result.schedule.iter().enumerate() {
                assert!(s.early_finish >= s.early_start + activities[i].duration);
                assert!(s.total_float >= s.free_float);
                assert!(s.free_float >= 0);
                assert_eq!(s.is_critical, s.total_float == 0);
            }

            for dep in &deps {
                let p = result.get(&dep.predecessor_id).unwrap();
                let s = result.get(&dep.successor_id).unwrap();
                assert!(s.early_start >= p.early_finish + dep.lag);
            }

            // Critical path runs source -> sink and its length equals the project duration
            let path = &result.critical_path;
            assert!(!path.is_empty());
            let first = network.index_of(&path[0]).unwrap();
            let last = network.index_of(path.last().unwrap()).unwrap();
            assert!(network.is_source(first) || result.get(&path[0]).unwrap().early_start == 0);
            assert!(network.is_sink(last));

            let mut length = result.get(&path[0]).unwrap().early_start;
            for pair in path.windows(2) {
                let dep = deps
                    .iter()
                    .filter(|d| d.predecessor_id == pair[0] && d.successor_id == pair[1])
                    .map(|d| d.lag)
                    .max()
                    .unwrap();
                length += result.get(&pair[0]).unwrap().duration() + dep;
            }
            length += result.get(path.last().unwrap()).unwrap().duration();
            assert_eq!(length, result.project_duration);
        }
    }

    #[test]
    fn test_deterministic_output() {
        let (activities, deps) = random_network(42, 40);
        let network = ActivityNetwork::build(&activities, &deps).unwrap();
        let engine = CpmEngine::new(&network, start());
        assert_eq!(engine.run().unwrap(), engine.run().unwrap());
    }
}
