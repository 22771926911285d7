//! Schedule container: operations pinned to absolute start ticks.

use crate::durations::{RoundingAnomaly, WarningSink};
use crate::models::{OpId, OpKind, Operation, ResourceId, ScheduleResult, ScheduledOperation, Tick};
use crate::program::{Program, ResourceLayout};

/// One operation placed in time.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledOp {
    pub op: Operation,
    pub start: Tick,
    /// Footprint on each touched resource. Always 0 for timestep markers.
    pub duration: Tick,
    /// Program operation this entry was scheduled from; `None` for padding
    /// and markers inserted by the scheduler.
    pub source: Option<OpId>,
}

impl ScheduledOp {
    pub fn end(&self) -> Tick {
        self.start + self.duration
    }
}

/// Output of a scheduling pass.
///
/// The total duration is cached: [`Schedule::push`] clears it and
/// [`Schedule::seal`] recomputes it.
#[derive(Clone, Debug)]
pub struct Schedule {
    name: String,
    layout: ResourceLayout,
    entries: Vec<ScheduledOp>,
    duration: Option<Tick>,
    anomalies: Vec<RoundingAnomaly>,
}

impl Schedule {
    pub fn new(name: impl Into<String>, layout: ResourceLayout) -> Self {
        Self {
            name: name.into(),
            layout,
            entries: Vec::new(),
            duration: None,
            anomalies: Vec::new(),
        }
    }

    /// Empty schedule over the same resources as `program`.
    pub fn for_program(program: &Program) -> Self {
        Self::new(program.name(), program.layout().clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    pub fn num_resources(&self) -> u32 {
        self.layout.num_resources()
    }

    pub fn entries(&self) -> &[ScheduledOp] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, op: Operation, start: Tick, duration: Tick, source: Option<OpId>) {
        self.entries.push(ScheduledOp {
            op,
            start,
            duration,
            source,
        });
        self.duration = None;
    }

    /// Mutable access to the entries; clears the cached duration.
    pub(crate) fn entries_mut(&mut self) -> &mut Vec<ScheduledOp> {
        self.duration = None;
        &mut self.entries
    }

    /// Cached total duration, `None` after a mutation until [`Schedule::seal`].
    pub fn duration(&self) -> Option<Tick> {
        self.duration
    }

    /// Latest end tick over all entries.
    pub fn compute_duration(&self) -> Tick {
        self.entries.iter().map(ScheduledOp::end).max().unwrap_or(0)
    }

    /// Recompute and cache the total duration.
    pub fn seal(&mut self) -> Tick {
        let duration = self.compute_duration();
        self.duration = Some(duration);
        duration
    }

    pub fn anomalies(&self) -> &[RoundingAnomaly] {
        &self.anomalies
    }

    /// `[start, end)` spans of the non-marker entries on `resource`, in entry order.
    pub fn resource_intervals(&self, resource: ResourceId) -> Vec<(Tick, Tick)> {
        self.entries
            .iter()
            .filter(|e| !e.op.is_marker() && e.op.resources().contains(&resource))
            .map(|e| (e.start, e.end()))
            .collect()
    }

    /// `(boundary, length)` of every timestep marker, in entry order.
    pub fn timesteps(&self) -> Vec<(Tick, Tick)> {
        self.entries
            .iter()
            .filter_map(|e| match e.op.kind() {
                OpKind::Timestep { length } => Some((e.start, *length)),
                _ => None,
            })
            .collect()
    }

    /// Start tick of the entry scheduled from program operation `source`.
    pub fn start_of(&self, source: OpId) -> Option<Tick> {
        self.entries
            .iter()
            .find(|e| e.source == Some(source))
            .map(|e| e.start)
    }

    /// Flatten back into a program whose operations (padding included) carry
    /// their scheduled durations.
    pub fn to_program(&self) -> Program {
        let ops = self
            .entries
            .iter()
            .map(|e| (e.op.clone(), e.duration))
            .collect();
        Program::from_resolved(self.name.clone(), self.layout.clone(), ops, Vec::new())
    }
}

impl WarningSink for Schedule {
    fn warn(&mut self, anomaly: RoundingAnomaly) {
        self.anomalies.push(anomaly);
    }
}

impl From<&Schedule> for ScheduleResult {
    fn from(schedule: &Schedule) -> Self {
        let operations = schedule
            .entries
            .iter()
            .map(|e| ScheduledOperation {
                name: e.op.name().to_string(),
                resources: e.op.resources().to_vec(),
                start: e.start,
                duration: e.duration,
                length: match e.op.kind() {
                    OpKind::Timestep { length } => Some(*length),
                    _ => None,
                },
            })
            .collect();
        ScheduleResult {
            name: schedule.name.clone(),
            duration: schedule
                .duration
                .unwrap_or_else(|| schedule.compute_duration()),
            operations,
            anomalies: schedule.anomalies.iter().map(|a| a.to_string()).collect(),
        }
    }
}
