//! Forward (as-soon-as-possible) scheduling.

use crate::dag::PrecedenceGraph;
use crate::durations::DurationTable;
use crate::models::{ResourceId, Tick};
use crate::program::Program;
use crate::schedule::Schedule;
use crate::{log_changes, log_debug};

use super::{ensure_physical, ResourceTimeline, Scheduler, SchedulerError};

/// Places every operation at the earliest tick its resources and
/// predecessors allow.
///
/// Operations are visited in a stable topological order; lagging resources
/// of a multi-resource operation get a Delay so they stay gap-free. At the
/// end every declared resource is padded to the latest finish.
#[derive(Clone, Copy, Debug)]
pub struct ForwardScheduler<'a> {
    table: &'a DurationTable,
    verbosity: u8,
}

impl<'a> ForwardScheduler<'a> {
    pub fn new(table: &'a DurationTable) -> Self {
        Self {
            table,
            verbosity: 0,
        }
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }
}

impl Scheduler for ForwardScheduler<'_> {
    fn run(&self, program: &Program) -> Result<Schedule, SchedulerError> {
        ensure_physical(program)?;
        let graph = PrecedenceGraph::build(program);
        let order = graph.topological_order()?;
        log_debug!(self.verbosity, "[asap] '{}' order: {:?}", program.name(), order);

        let mut schedule = Schedule::for_program(program);
        let mut timeline = ResourceTimeline::new(program.num_resources());
        let mut finish: Vec<Tick> = vec![0; program.len()];

        for id in order {
            let op = program.op(id);
            let duration = program.resolve_duration(id, self.table, &mut schedule)?;
            let ready = graph
                .preds(id)
                .iter()
                .map(|&p| finish[p as usize])
                .max()
                .unwrap_or(0);
            let start = timeline.earliest_start(op.resources()).max(ready);

            let padded = timeline.pad_until(op.resources(), start, &mut schedule);
            schedule.push(op.clone(), start, duration, Some(id));
            timeline.occupy(op.resources(), start, duration);
            finish[id as usize] = start + duration;

            log_changes!(
                self.verbosity,
                "[asap] {} '{}' on {:?} at {} for {} ({} delays)",
                id,
                op.name(),
                op.resources(),
                start,
                duration,
                padded
            );
        }

        let total = timeline.horizon();
        let all: Vec<ResourceId> = program.layout().resources().collect();
        timeline.pad_until(&all, total, &mut schedule);
        schedule.seal();
        Ok(schedule)
    }
}
