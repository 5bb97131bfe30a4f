//! Ordering of contenders for delay.

use std::cmp::{Ordering, Reverse};

use crate::cpm::PassTimings;
use crate::interner::ActivityIdx;
use crate::network::ActivityNetwork;

/// Sort key for choosing which contender to delay.
///
/// Lower key = delayed first. Fields compare in declaration order: protected
/// activities last when the critical path is preserved, then larger total
/// float first, then lower activity code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DelayKey {
    protected: bool,
    total_float: Reverse<i64>,
    code_rank: u32,
    pub activity: ActivityIdx,
}

impl Ord for DelayKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.protected
            .cmp(&other.protected)
            .then(self.total_float.cmp(&other.total_float))
            .then(self.code_rank.cmp(&other.code_rank))
            .then(self.activity.cmp(&other.activity))
    }
}

impl PartialOrd for DelayKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Key for one contender.
///
/// `floats` is the float snapshot used for ranking; `live` is the current
/// schedule. Protection follows `live`, so an activity whose float was used up
/// by earlier delays counts as critical even while `floats` still ranks it by
/// its old float.
pub(crate) fn delay_key(
    network: &ActivityNetwork,
    floats: &PassTimings,
    live: &PassTimings,
    activity: ActivityIdx,
    preserve_critical_path: bool,
) -> DelayKey {
    DelayKey {
        protected: preserve_critical_path && live.is_critical(activity),
        total_float: Reverse(floats.total_float(activity)),
        code_rank: network.code_rank(activity),
        activity,
    }
}

/// Contenders in the order they should be tried for delay.
pub(crate) fn delay_order(
    network: &ActivityNetwork,
    floats: &PassTimings,
    live: &PassTimings,
    contenders: &[ActivityIdx],
    preserve_critical_path: bool,
) -> Vec<ActivityIdx> {
    let mut keys: Vec<DelayKey> = contenders
        .iter()
        .map(|&a| delay_key(network, floats, live, a, preserve_critical_path))
        .collect();
    keys.sort();
    keys.into_iter().map(|k| k.activity).collect()
}
