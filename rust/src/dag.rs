//! Precedence graph over a program's operations.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::models::OpId;
use crate::program::Program;

/// Error types for precedence graph processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    /// Explicit dependencies form a cycle; carries the lowest id left on it.
    CircularDependency(OpId),
}

impl std::fmt::Display for DagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DagError::CircularDependency(id) => {
                write!(f, "Circular dependency detected involving operation {}", id)
            }
        }
    }
}

impl std::error::Error for DagError {}

/// Predecessor and successor lists for every operation of a program.
///
/// Edges come from (a) consecutive operations on the same resource and
/// (b) the program's explicit dependencies. Duplicate edges are collapsed.
#[derive(Debug, Clone)]
pub struct PrecedenceGraph {
    preds: Vec<Vec<OpId>>,
    succs: Vec<Vec<OpId>>,
}

impl PrecedenceGraph {
    pub fn build(program: &Program) -> Self {
        let n = program.len();
        let mut graph = Self {
            preds: vec![Vec::new(); n],
            succs: vec![Vec::new(); n],
        };

        let mut last_on: Vec<Option<OpId>> = vec![None; program.num_resources() as usize];
        for (id, op) in program.iter() {
            for &r in op.resources() {
                if let Some(prev) = last_on[r as usize] {
                    graph.add_edge(prev, id);
                }
                last_on[r as usize] = Some(id);
            }
        }
        for &(before, after) in program.dependencies() {
            graph.add_edge(before, after);
        }
        graph
    }

    fn add_edge(&mut self, from: OpId, to: OpId) {
        let succs = &mut self.succs[from as usize];
        if !succs.contains(&to) {
            succs.push(to);
            self.preds[to as usize].push(from);
        }
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    pub fn preds(&self, id: OpId) -> &[OpId] {
        &self.preds[id as usize]
    }

    pub fn succs(&self, id: OpId) -> &[OpId] {
        &self.succs[id as usize]
    }

    pub fn in_degrees(&self) -> Vec<usize> {
        self.preds.iter().map(|p| p.len()).collect()
    }

    /// Topological order using Kahn's algorithm.
    ///
    /// Among ready operations the lowest id goes first, so a program whose
    /// explicit edges already agree with program order comes back unchanged.
    pub fn topological_order(&self) -> Result<Vec<OpId>, DagError> {
        let mut in_degree = self.in_degrees();
        let mut ready: BinaryHeap<Reverse<OpId>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| Reverse(id as OpId))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &succ in self.succs(id) {
                let degree = &mut in_degree[succ as usize];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        if order.len() != self.len() {
            let stuck = in_degree
                .iter()
                .position(|&d| d > 0)
                .map(|i| i as OpId)
                .unwrap_or_default();
            return Err(DagError::CircularDependency(stuck));
        }
        Ok(order)
    }
}
