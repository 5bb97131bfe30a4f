//! Types for critical path scheduling.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::interner::ActivityIdx;
use crate::network::Window;

/// Progress of a CPM run through its passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpmPhase {
    Unscheduled,
    ForwardPassed,
    BackwardPassed,
    Resolved,
}

/// Raw per-activity dates from one forward/backward pass, indexed by activity.
///
/// This is the allocation-light form used in hot loops (simulation iterations,
/// leveling passes); [`CpmResult`] is the resolved form handed to callers.
#[derive(Clone, Debug)]
pub struct PassTimings {
    pub phase: CpmPhase,
    pub early_start: Vec<i64>,
    pub early_finish: Vec<i64>,
    pub late_start: Vec<i64>,
    pub late_finish: Vec<i64>,
    /// Max early finish over all activities.
    pub project_duration: i64,
}

impl PassTimings {
    pub(crate) fn unscheduled(n: usize) -> Self {
        Self {
            phase: CpmPhase::Unscheduled,
            early_start: vec![0; n],
            early_finish: vec![0; n],
            late_start: vec![0; n],
            late_finish: vec![0; n],
            project_duration: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.early_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.early_start.is_empty()
    }

    #[inline]
    pub fn early_window(&self, idx: ActivityIdx) -> Window {
        let i = idx as usize;
        Window::new(self.early_start[i], self.early_finish[i])
    }

    #[inline]
    pub fn late_window(&self, idx: ActivityIdx) -> Window {
        let i = idx as usize;
        Window::new(self.late_start[i], self.late_finish[i])
    }

    #[inline]
    pub fn total_float(&self, idx: ActivityIdx) -> i64 {
        let i = idx as usize;
        self.late_start[i] - self.early_start[i]
    }

    #[inline]
    pub fn is_critical(&self, idx: ActivityIdx) -> bool {
        self.total_float(idx) == 0
    }
}

/// Scheduled dates and float for one activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub activity_id: String,
    pub code: String,
    pub early_start: i64,
    pub early_finish: i64,
    pub late_start: i64,
    pub late_finish: i64,
    /// late_start - early_start.
    pub total_float: i64,
    /// Delay possible without moving any successor's early date.
    pub free_float: i64,
    pub is_critical: bool,
}

impl ScheduleResult {
    pub fn early_window(&self) -> Window {
        Window::new(self.early_start, self.early_finish)
    }

    pub fn duration(&self) -> i64 {
        self.early_finish - self.early_start
    }
}

/// Output of a resolved CPM run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmResult {
    pub program_start: NaiveDate,
    /// One entry per activity, in network (input) order.
    pub schedule: Vec<ScheduleResult>,
    /// Single driving chain from a source to a sink, ties broken by lowest code.
    pub critical_path: Vec<String>,
    /// Every activity with zero total float, in topological order.
    pub critical_activities: Vec<String>,
    pub project_duration: i64,
}

impl CpmResult {
    /// Look up an activity's schedule by id.
    pub fn get(&self, activity_id: &str) -> Option<&ScheduleResult> {
        self.schedule.iter().find(|s| s.activity_id == activity_id)
    }

    /// Calendar date of a day offset from the program start.
    pub fn date_of(&self, offset: i64) -> Option<NaiveDate> {
        offset_to_date(self.program_start, offset)
    }

    /// Calendar date on which the project finishes.
    pub fn finish_date(&self) -> Option<NaiveDate> {
        self.date_of(self.project_duration)
    }
}

pub(crate) fn offset_to_date(program_start: NaiveDate, offset: i64) -> Option<NaiveDate> {
    if offset >= 0 {
        program_start.checked_add_days(Days::new(offset as u64))
    } else {
        program_start.checked_sub_days(Days::new(offset.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_timings_float() {
        let mut timings = PassTimings::unscheduled(2);
        timings.early_start = vec![0, 5];
        timings.early_finish = vec![5, 8];
        timings.late_start = vec![0, 10];
        timings.late_finish = vec![5, 13];

        assert!(timings.is_critical(0));
        assert!(!timings.is_critical(1));
        assert_eq!(timings.total_float(1), 5);
        assert_eq!(timings.late_window(1), Window::new(10, 13));
    }

    #[test]
    fn test_offset_to_date() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 30).unwrap();
        assert_eq!(
            offset_to_date(start, 3),
            NaiveDate::from_ymd_opt(2025, 2, 2)
        );
        assert_eq!(
            offset_to_date(start, -1),
            NaiveDate::from_ymd_opt(2025, 1, 29)
        );
    }
}
