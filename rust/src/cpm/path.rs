//! Extraction of a single critical chain from resolved pass timings.

use crate::interner::ActivityIdx;
use crate::network::ActivityNetwork;

use super::types::PassTimings;

/// Trace one critical path, walking backward from the project end.
///
/// Starts at the critical activity finishing on the project end (sinks first,
/// then lowest code) and repeatedly steps to the lowest-code critical
/// predecessor whose dependency actually drives the current early start. The
/// chain stops at an activity with no driving predecessor: a network source,
/// or an activity held in place by its own constraint.
pub fn trace_critical_path(network: &ActivityNetwork, timings: &PassTimings) -> Vec<ActivityIdx> {
    let end = network
        .topological_order()
        .iter()
        .copied()
        .filter(|&idx| {
            timings.is_critical(idx)
                && timings.early_finish[idx as usize] == timings.project_duration
        })
        .min_by_key(|&idx| (!network.is_sink(idx), network.code_rank(idx)));

    let Some(end) = end else {
        return Vec::new();
    };

    let mut path = vec![end];
    let mut current = end;
    loop {
        let window = timings.early_window(current);
        let duration = window.finish - window.start;

        let driving = network
            .predecessors(current)
            .filter(|edge| timings.is_critical(edge.predecessor))
            .filter(|edge| {
                let pred = timings.early_window(edge.predecessor);
                edge.required_offset(pred).as_start(duration) == window.start
            })
            .map(|edge| edge.predecessor)
            .min_by_key(|&idx| network.code_rank(idx));

        match driving {
            // Acyclic network: the walk always terminates
            Some(pred) => {
                path.push(pred);
                current = pred;
            }
            None => break,
        }
    }

    path.reverse();
    path
}
