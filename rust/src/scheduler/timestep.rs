//! Quantized (lock-step) scheduling.
//!
//! Operations are packed into consecutive timesteps. Each step is as long as
//! its dominant ready operation; every resource is padded to exactly that
//! length and a zero-footprint Timestep marker closes the step.
//!
//! Timestep operations already present in the program (a quantized schedule
//! flattened back into a program, or its mirror) are not grouped. Each one
//! becomes the marker of the step it belongs to; one with no step to mark
//! closes an empty step.

use rustc_hash::FxHashMap;

use crate::config::DelayRule;
use crate::dag::PrecedenceGraph;
use crate::durations::DurationTable;
use crate::models::{OpId, Operation, ResourceId, Tick};
use crate::program::Program;
use crate::schedule::Schedule;
use crate::{log_changes, log_checks, log_debug};

use super::{ensure_physical, DominanceKey, ResidualGraph, ResourceTimeline, Scheduler, SchedulerError};

/// Which step a Timestep operation found in the program marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CarriedMarker {
    /// The step before it in program order.
    Closing,
    /// The step after it; markers of a mirrored program open their steps.
    Opening,
}

/// Groups operations into timesteps, earliest first.
#[derive(Clone, Copy, Debug)]
pub struct TimestepGrouper<'a> {
    table: &'a DurationTable,
    rule: DelayRule,
    carried: CarriedMarker,
    verbosity: u8,
}

/// State of the step being filled. Ticks are relative to `origin`.
struct Step {
    origin: Tick,
    length: Tick,
    timeline: ResourceTimeline,
    /// Relative finish of operations admitted in this step.
    finish: FxHashMap<OpId, Tick>,
}

impl Step {
    /// Earliest relative start for `id` on `resources`.
    fn earliest_start(&self, graph: &PrecedenceGraph, id: OpId, resources: &[ResourceId]) -> Tick {
        let ready = graph
            .preds(id)
            .iter()
            .filter_map(|p| self.finish.get(p))
            .copied()
            .max()
            .unwrap_or(0);
        self.timeline.earliest_start(resources).max(ready)
    }
}

impl<'a> TimestepGrouper<'a> {
    pub fn new(table: &'a DurationTable, rule: DelayRule) -> Self {
        Self {
            table,
            rule,
            carried: CarriedMarker::Closing,
            verbosity: 0,
        }
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Admit frontier operations into `step` until nothing more fits.
    ///
    /// Returns the number admitted.
    #[allow(clippy::too_many_arguments)]
    fn admit(
        &self,
        program: &Program,
        graph: &PrecedenceGraph,
        residual: &mut ResidualGraph<'_>,
        resolved: &[Tick],
        remaining: &[Tick],
        step: &mut Step,
        schedule: &mut Schedule,
    ) -> usize {
        let mut admitted = 0;
        loop {
            let mut progressed = false;
            for id in residual.frontier() {
                let op = program.op(id);
                if op.is_timestep() {
                    continue;
                }
                let duration = remaining[id as usize];
                let start = step.earliest_start(graph, id, op.resources());
                if start + duration > step.length {
                    log_checks!(
                        self.verbosity,
                        "[timestep] {} '{}' ({} ticks from {}) does not fit in {}",
                        id,
                        op.name(),
                        duration,
                        start,
                        step.length
                    );
                    continue;
                }

                step.timeline.pad_until(op.resources(), start, schedule);
                let placed = if op.is_delay() && duration != resolved[id as usize] {
                    Operation::delay(duration, op.resources()[0])
                } else {
                    op.clone()
                };
                schedule.push(placed, step.origin + start, duration, Some(id));
                step.timeline.occupy(op.resources(), start, duration);
                step.finish.insert(id, start + duration);
                residual.complete(id);
                admitted += 1;
                progressed = true;
            }
            if !progressed {
                return admitted;
            }
        }
    }

    /// Fill the rest of the step with the front of every delay that is too
    /// long for it; the delay keeps the unplaced remainder.
    fn split_delays(
        &self,
        program: &Program,
        graph: &PrecedenceGraph,
        residual: &ResidualGraph<'_>,
        remaining: &mut [Tick],
        step: &mut Step,
        schedule: &mut Schedule,
    ) {
        for id in residual.frontier() {
            let op = program.op(id);
            if !op.is_delay() {
                continue;
            }
            let start = step.earliest_start(graph, id, op.resources());
            if start >= step.length || remaining[id as usize] <= step.length - start {
                continue;
            }
            let left = step.length - start;
            let resource = op.resources()[0];
            step.timeline.pad_until(&[resource], start, schedule);
            schedule.push(Operation::delay(left, resource), step.origin + start, left, Some(id));
            step.timeline.occupy(&[resource], start, left);
            remaining[id as usize] -= left;
            log_checks!(
                self.verbosity,
                "[timestep] split delay {} on {}: {} placed, {} left",
                id,
                resource,
                left,
                remaining[id as usize]
            );
        }
    }

    /// Complete every Timestep operation in the frontier, including those
    /// released by completing one. Returns them in completion order.
    fn drain_markers(&self, program: &Program, residual: &mut ResidualGraph<'_>) -> Vec<OpId> {
        let mut drained = Vec::new();
        loop {
            let markers: Vec<OpId> = residual
                .frontier()
                .into_iter()
                .filter(|&id| program.op(id).is_timestep())
                .collect();
            if markers.is_empty() {
                return drained;
            }
            for id in markers {
                residual.complete(id);
                drained.push(id);
            }
        }
    }

    /// Place carried marker `id` as an empty step at `boundary`.
    fn empty_step(&self, id: OpId, boundary: Tick, all: &[ResourceId], schedule: &mut Schedule) {
        schedule.push(Operation::timestep(0, all.to_vec()), boundary, 0, Some(id));
        log_changes!(self.verbosity, "[timestep] marker {} closes an empty step at {}", id, boundary);
    }
}

impl Scheduler for TimestepGrouper<'_> {
    fn for_mirror(mut self) -> Self {
        self.carried = CarriedMarker::Opening;
        self
    }

    fn run(&self, program: &Program) -> Result<Schedule, SchedulerError> {
        ensure_physical(program)?;
        let graph = PrecedenceGraph::build(program);
        graph.topological_order()?;

        let mut schedule = Schedule::for_program(program);
        let mut resolved = Vec::with_capacity(program.len());
        for (id, _) in program.iter() {
            resolved.push(program.resolve_duration(id, self.table, &mut schedule)?);
        }
        let mut remaining = resolved.clone();

        let num_resources = program.num_resources();
        let all: Vec<ResourceId> = program.layout().resources().collect();
        // Every step admits at least its dominant operation, so the number
        // of steps never exceeds the number of operations.
        let bound = program.len() * (num_resources.max(1) as usize);
        let mut residual = ResidualGraph::new(&graph);
        let mut elapsed: Tick = 0;
        let mut steps = 0;

        while !residual.is_done() {
            steps += 1;
            if steps > bound {
                return Err(SchedulerError::InternalSchedulingInvariantViolation(format!(
                    "timestep grouping of '{}' exceeded {} steps",
                    program.name(),
                    bound
                )));
            }

            let mut opening: Option<OpId> = None;
            for id in self.drain_markers(program, &mut residual) {
                if self.carried == CarriedMarker::Opening && opening.is_none() {
                    opening = Some(id);
                } else {
                    self.empty_step(id, elapsed, &all, &mut schedule);
                }
            }
            if residual.is_done() {
                if let Some(id) = opening {
                    self.empty_step(id, elapsed, &all, &mut schedule);
                }
                break;
            }

            let frontier = residual.frontier();
            log_debug!(self.verbosity, "[timestep] step {} frontier: {:?}", steps, frontier);
            let dominant = frontier
                .iter()
                .map(|&id| {
                    DominanceKey::new(id, remaining[id as usize], program.op(id).is_delay(), self.rule)
                })
                .min()
                .ok_or_else(|| {
                    SchedulerError::InternalSchedulingInvariantViolation(format!(
                        "empty frontier in '{}' with operations left",
                        program.name()
                    ))
                })?;

            let mut step = Step {
                origin: elapsed,
                length: dominant.duration(),
                timeline: ResourceTimeline::starting_at(num_resources, elapsed),
                finish: FxHashMap::default(),
            };
            let admitted = self.admit(
                program,
                &graph,
                &mut residual,
                &resolved,
                &remaining,
                &mut step,
                &mut schedule,
            );
            if admitted == 0 {
                return Err(SchedulerError::InternalSchedulingInvariantViolation(format!(
                    "dominant operation {} of '{}' was not admitted",
                    dominant.id(),
                    program.name()
                )));
            }
            self.split_delays(program, &graph, &residual, &mut remaining, &mut step, &mut schedule);
            step.timeline.pad_all(step.length, &mut schedule);

            let closing = match self.carried {
                CarriedMarker::Opening => opening,
                CarriedMarker::Closing => {
                    let found = residual
                        .frontier()
                        .into_iter()
                        .find(|&id| program.op(id).is_timestep());
                    if let Some(id) = found {
                        residual.complete(id);
                    }
                    found
                }
            };
            elapsed += step.length;
            schedule.push(Operation::timestep(step.length, all.clone()), elapsed, 0, closing);
            log_changes!(
                self.verbosity,
                "[timestep] step {} of {} ticks (dominant {}), {} admitted, boundary {}",
                steps,
                step.length,
                dominant.id(),
                admitted,
                elapsed
            );
        }

        schedule.seal();
        Ok(schedule)
    }
}
