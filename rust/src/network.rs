//! Activity network: an arena of activities with typed dependency edges.
//!
//! Activities live in a `Vec` indexed by [`ActivityIdx`]; dependencies are
//! stored as index pairs with per-node adjacency lists of edge indices. The
//! network owns no scheduling algorithm. It validates the graph (unknown ids,
//! cycles) and provides the traversal primitives the passes build on.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use thiserror::Error;

use crate::interner::{ActivityIdInterner, ActivityIdx};
use crate::models::{Activity, Dependency, DependencyType};

/// Structural errors in the activity graph. Fatal for any run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },
    #[error("Dependency {predecessor_id} -> {successor_id} references unknown activity {missing_id}")]
    DanglingReference {
        predecessor_id: String,
        successor_id: String,
        missing_id: String,
    },
    #[error("Duplicate activity id: {id}")]
    DuplicateActivity { id: String },
    #[error("Invalid activity {id}: {reason}")]
    InvalidActivity { id: String, reason: String },
}

/// A start/finish window in day offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: i64,
    pub finish: i64,
}

impl Window {
    pub fn new(start: i64, finish: i64) -> Self {
        Self { start, finish }
    }
}

/// A bound produced by a dependency on either the start or the finish of an activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequiredOffset {
    Start(i64),
    Finish(i64),
}

impl RequiredOffset {
    /// Express the bound as a start date for an activity of `duration`.
    pub fn as_start(self, duration: i64) -> i64 {
        match self {
            RequiredOffset::Start(t) => t,
            RequiredOffset::Finish(t) => t - duration,
        }
    }

    /// Express the bound as a finish date for an activity of `duration`.
    pub fn as_finish(self, duration: i64) -> i64 {
        match self {
            RequiredOffset::Start(t) => t + duration,
            RequiredOffset::Finish(t) => t,
        }
    }
}

/// A dependency edge between two arena indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub predecessor: ActivityIdx,
    pub successor: ActivityIdx,
    pub dep_type: DependencyType,
    pub lag: i64,
}

impl Edge {
    /// Earliest allowed successor start or finish given the predecessor's window.
    ///
    /// Lag is applied additively for all four dependency types.
    pub fn required_offset(&self, pred: Window) -> RequiredOffset {
        match self.dep_type {
            DependencyType::FS => RequiredOffset::Start(pred.finish + self.lag),
            DependencyType::SS => RequiredOffset::Start(pred.start + self.lag),
            DependencyType::FF => RequiredOffset::Finish(pred.finish + self.lag),
            DependencyType::SF => RequiredOffset::Finish(pred.start + self.lag),
        }
    }

    /// Latest allowed predecessor start or finish given the successor's late window.
    pub fn latest_allowed(&self, succ: Window) -> RequiredOffset {
        match self.dep_type {
            DependencyType::FS => RequiredOffset::Finish(succ.start - self.lag),
            DependencyType::SS => RequiredOffset::Start(succ.start - self.lag),
            DependencyType::FF => RequiredOffset::Finish(succ.finish - self.lag),
            DependencyType::SF => RequiredOffset::Start(succ.finish - self.lag),
        }
    }
}

/// Validated, acyclic activity network.
#[derive(Debug, Clone)]
pub struct ActivityNetwork {
    index: ActivityIdInterner,
    activities: Vec<Activity>,
    edges: Vec<Edge>,
    /// Incoming edge indices per activity.
    incoming: Vec<Vec<usize>>,
    /// Outgoing edge indices per activity.
    outgoing: Vec<Vec<usize>>,
    /// Position of each activity when sorted by (code, id).
    code_rank: Vec<u32>,
    topo_order: Vec<ActivityIdx>,
}

impl ActivityNetwork {
    /// Build the network, rejecting duplicate ids, unknown references and cycles.
    pub fn build(
        activities: &[Activity],
        dependencies: &[Dependency],
    ) -> Result<Self, GraphError> {
        let mut index = ActivityIdInterner::with_capacity(activities.len());
        let mut arena = Vec::with_capacity(activities.len());

        for activity in activities {
            if index.intern_unique(&activity.id).is_err() {
                return Err(GraphError::DuplicateActivity {
                    id: activity.id.clone(),
                });
            }
            if activity.duration < 0 {
                return Err(GraphError::InvalidActivity {
                    id: activity.id.clone(),
                    reason: format!("negative duration {}", activity.duration),
                });
            }
            if activity.percent_complete > 100 {
                return Err(GraphError::InvalidActivity {
                    id: activity.id.clone(),
                    reason: format!("percent_complete {} above 100", activity.percent_complete),
                });
            }
            let mut normalized = activity.clone();
            normalized.duration = activity.effective_duration();
            arena.push(normalized);
        }

        let n = arena.len();
        let mut edges = Vec::with_capacity(dependencies.len());
        let mut incoming = vec![Vec::new(); n];
        let mut outgoing = vec![Vec::new(); n];

        for dep in dependencies {
            let lookup = |id: &str| {
                index.get(id).ok_or_else(|| GraphError::DanglingReference {
                    predecessor_id: dep.predecessor_id.clone(),
                    successor_id: dep.successor_id.clone(),
                    missing_id: id.to_string(),
                })
            };
            let predecessor = lookup(&dep.predecessor_id)?;
            let successor = lookup(&dep.successor_id)?;

            let edge_idx = edges.len();
            edges.push(Edge {
                predecessor,
                successor,
                dep_type: dep.dep_type,
                lag: dep.lag,
            });
            outgoing[predecessor as usize].push(edge_idx);
            incoming[successor as usize].push(edge_idx);
        }

        let mut by_code: Vec<usize> = (0..n).collect();
        by_code.sort_by(|&a, &b| {
            arena[a]
                .code
                .cmp(&arena[b].code)
                .then_with(|| arena[a].id.cmp(&arena[b].id))
        });
        let mut code_rank = vec![0u32; n];
        for (rank, &idx) in by_code.iter().enumerate() {
            code_rank[idx] = rank as u32;
        }

        let mut network = Self {
            index,
            activities: arena,
            edges,
            incoming,
            outgoing,
            code_rank,
            topo_order: Vec::new(),
        };

        if let Some(cycle) = network.find_cycle() {
            return Err(GraphError::CycleDetected { cycle });
        }
        network.topo_order = network.topological_sort();

        Ok(network)
    }

    /// Find a cycle using iterative DFS with white/gray/black coloring.
    ///
    /// Returns the cycle as activity ids, first id repeated at the end.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let n = self.activities.len();
        let mut color = vec![Color::White; n];

        for root in 0..n {
            if color[root] != Color::White {
                continue;
            }

            // (node, position in its outgoing list)
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            color[root] = Color::Gray;

            while let Some(&(node, pos)) = stack.last() {
                if let Some(&edge_idx) = self.outgoing[node].get(pos) {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let next = self.edges[edge_idx].successor as usize;
                    match color[next] {
                        Color::White => {
                            color[next] = Color::Gray;
                            stack.push((next, 0));
                        }
                        Color::Gray => {
                            let start = stack
                                .iter()
                                .position(|&(id, _)| id == next)
                                .unwrap_or(0);
                            let mut cycle: Vec<String> = stack[start..]
                                .iter()
                                .map(|&(id, _)| self.activities[id].id.clone())
                                .collect();
                            cycle.push(self.activities[next].id.clone());
                            return Some(cycle);
                        }
                        Color::Black => {}
                    }
                } else {
                    color[node] = Color::Black;
                    stack.pop();
                }
            }
        }

        None
    }

    /// Kahn's algorithm; ready activities are released in (code, id) order so the
    /// resulting order is deterministic for a given input.
    fn topological_sort(&self) -> Vec<ActivityIdx> {
        let n = self.activities.len();
        let mut in_degree: Vec<usize> = self.incoming.iter().map(|e| e.len()).collect();

        let mut ready: BinaryHeap<Reverse<(u32, usize)>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(|i| Reverse((self.code_rank[i], i)))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(node as ActivityIdx);
            for &edge_idx in &self.outgoing[node] {
                let succ = self.edges[edge_idx].successor as usize;
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse((self.code_rank[succ], succ)));
                }
            }
        }

        order
    }

    /// Number of activities.
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn activity(&self, idx: ActivityIdx) -> &Activity {
        &self.activities[idx as usize]
    }

    pub fn index_of(&self, id: &str) -> Option<ActivityIdx> {
        self.index.get(id)
    }

    pub fn id_of(&self, idx: ActivityIdx) -> &str {
        self.index.resolve(idx).unwrap_or_default()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Activities in dependency order (predecessors first).
    pub fn topological_order(&self) -> &[ActivityIdx] {
        &self.topo_order
    }

    /// Incoming dependency edges of an activity.
    pub fn predecessors(&self, idx: ActivityIdx) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming[idx as usize].iter().map(|&e| &self.edges[e])
    }

    /// Outgoing dependency edges of an activity.
    pub fn successors(&self, idx: ActivityIdx) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing[idx as usize].iter().map(|&e| &self.edges[e])
    }

    pub fn is_source(&self, idx: ActivityIdx) -> bool {
        self.incoming[idx as usize].is_empty()
    }

    pub fn is_sink(&self, idx: ActivityIdx) -> bool {
        self.outgoing[idx as usize].is_empty()
    }

    /// Activities without predecessors, in topological order.
    pub fn sources(&self) -> Vec<ActivityIdx> {
        self.topo_order
            .iter()
            .copied()
            .filter(|&i| self.is_source(i))
            .collect()
    }

    /// Activities without successors, in topological order.
    pub fn sinks(&self) -> Vec<ActivityIdx> {
        self.topo_order
            .iter()
            .copied()
            .filter(|&i| self.is_sink(i))
            .collect()
    }

    /// Rank of the activity in (code, id) order; lower rank wins tie-breaks.
    #[inline]
    pub fn code_rank(&self, idx: ActivityIdx) -> u32 {
        self.code_rank[idx as usize]
    }

    /// Planned durations indexed by activity.
    pub fn durations(&self) -> Vec<i64> {
        self.activities.iter().map(|a| a.duration).collect()
    }
}
