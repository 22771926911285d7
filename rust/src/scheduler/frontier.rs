//! Frontier tracking and step sizing for the timestep grouper.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::config::DelayRule;
use crate::dag::PrecedenceGraph;
use crate::models::{OpId, Tick};

/// Precedence graph with completed operations removed.
///
/// The frontier holds every operation whose predecessors are all complete.
/// Two frontier operations never share a resource: the later of the two in
/// program order would still wait on the earlier one.
pub struct ResidualGraph<'g> {
    graph: &'g PrecedenceGraph,
    in_degree: Vec<usize>,
    frontier: BTreeSet<OpId>,
    completed: usize,
}

impl<'g> ResidualGraph<'g> {
    pub fn new(graph: &'g PrecedenceGraph) -> Self {
        let in_degree = graph.in_degrees();
        let frontier = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| id as OpId)
            .collect();
        Self {
            graph,
            in_degree,
            frontier,
            completed: 0,
        }
    }

    /// Frontier in program order.
    pub fn frontier(&self) -> Vec<OpId> {
        self.frontier.iter().copied().collect()
    }

    pub fn in_frontier(&self, id: OpId) -> bool {
        self.frontier.contains(&id)
    }

    pub fn is_done(&self) -> bool {
        self.completed == self.in_degree.len()
    }

    /// Remove a frontier operation and release its successors.
    ///
    /// Returns `false` if `id` was not in the frontier.
    pub fn complete(&mut self, id: OpId) -> bool {
        if !self.frontier.remove(&id) {
            return false;
        }
        self.completed += 1;
        for &succ in self.graph.succs(id) {
            let degree = &mut self.in_degree[succ as usize];
            *degree -= 1;
            if *degree == 0 {
                self.frontier.insert(succ);
            }
        }
        true
    }
}

/// Sort key for choosing the operation that sets a timestep's length.
///
/// The smallest key wins. Any non-delay operation beats every delay; among
/// non-delays the longest wins. Among delays the [`DelayRule`] decides.
/// Remaining ties go to the earliest operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominanceKey {
    Operation {
        duration: Tick,
        id: OpId,
    },
    Delay {
        duration: Tick,
        id: OpId,
        rule: DelayRule,
    },
}

impl DominanceKey {
    pub fn new(id: OpId, duration: Tick, is_delay: bool, rule: DelayRule) -> Self {
        if is_delay {
            Self::Delay { duration, id, rule }
        } else {
            Self::Operation { duration, id }
        }
    }

    pub fn id(&self) -> OpId {
        match self {
            Self::Operation { id, .. } | Self::Delay { id, .. } => *id,
        }
    }

    pub fn duration(&self) -> Tick {
        match self {
            Self::Operation { duration, .. } | Self::Delay { duration, .. } => *duration,
        }
    }
}

impl Ord for DominanceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Self::Operation {
                    duration: d1,
                    id: id1,
                },
                Self::Operation {
                    duration: d2,
                    id: id2,
                },
            ) => d2.cmp(d1).then(id1.cmp(id2)),
            (Self::Operation { .. }, Self::Delay { .. }) => Ordering::Less,
            (Self::Delay { .. }, Self::Operation { .. }) => Ordering::Greater,
            (
                Self::Delay {
                    duration: d1,
                    id: id1,
                    rule,
                },
                Self::Delay {
                    duration: d2,
                    id: id2,
                    ..
                },
            ) => {
                let by_duration = match rule {
                    DelayRule::Shortest => d1.cmp(d2),
                    DelayRule::Longest => d2.cmp(d1),
                };
                by_duration.then(id1.cmp(id2))
            }
        }
    }
}

impl PartialOrd for DominanceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
