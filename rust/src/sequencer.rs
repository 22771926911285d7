//! Lowering of a schedule into absolute-time channel instructions.
//!
//! The sequencer re-walks every resource from tick 0 to confirm the
//! schedule is consistent, then replaces each scheduled operation with its
//! implementation shifted to the operation's start tick.

use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

use crate::log_debug;
use crate::models::{ResourceId, Tick};
use crate::schedule::Schedule;

/// Errors raised while sequencing a schedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("Bug in scheduler: entry {index} ('{name}') {detail}")]
    BugInScheduler {
        index: usize,
        name: String,
        detail: String,
    },
    #[error("No implementation for operation '{name}' on resources {resources:?}")]
    MissingImplementation {
        name: String,
        resources: Vec<ResourceId>,
    },
    #[error("Sequenced duration {actual} does not match scheduled duration {expected}")]
    InternalSchedulingInvariantViolation { expected: Tick, actual: Tick },
}

/// Hardware channel an instruction plays on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Drive(ResourceId),
    Measure(ResourceId),
    Acquire(ResourceId),
    Control(u32),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Drive(i) => write!(f, "d{}", i),
            Channel::Measure(i) => write!(f, "m{}", i),
            Channel::Acquire(i) => write!(f, "a{}", i),
            Channel::Control(i) => write!(f, "u{}", i),
        }
    }
}

/// One instruction of an implementation, relative to the operation start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub name: String,
    pub channel: Channel,
    pub offset: Tick,
    pub duration: Tick,
}

impl Instruction {
    pub fn new(name: impl Into<String>, channel: Channel, offset: Tick, duration: Tick) -> Self {
        Self {
            name: name.into(),
            channel,
            offset,
            duration,
        }
    }
}

/// Timed sub-program realizing an operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Implementation {
    pub duration: Tick,
    pub instructions: Vec<Instruction>,
}

impl Implementation {
    /// Duration is the latest instruction end.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let duration = instructions
            .iter()
            .map(|i| i.offset + i.duration)
            .max()
            .unwrap_or(0);
        Self {
            duration,
            instructions,
        }
    }
}

/// Source of implementations keyed by operation name and resources.
pub trait ImplementationLookup {
    fn get(&self, name: &str, resources: &[ResourceId]) -> Option<&Implementation>;
}

/// In-memory [`ImplementationLookup`].
#[derive(Clone, Debug, Default)]
pub struct ImplementationMap {
    entries: FxHashMap<String, FxHashMap<Vec<ResourceId>, Implementation>>,
}

impl ImplementationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, resources: &[ResourceId], implementation: Implementation) -> &mut Self {
        self.entries
            .entry(name.to_string())
            .or_default()
            .insert(resources.to_vec(), implementation);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImplementationLookup for ImplementationMap {
    fn get(&self, name: &str, resources: &[ResourceId]) -> Option<&Implementation> {
        self.entries.get(name).and_then(|m| m.get(resources))
    }
}

/// An instruction pinned to an absolute tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimedInstruction {
    pub start: Tick,
    pub name: String,
    pub channel: Channel,
    pub duration: Tick,
}

impl TimedInstruction {
    pub fn end(&self) -> Tick {
        self.start + self.duration
    }
}

/// Flat instruction list of a schedule, ordered by start tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencedProgram {
    pub name: String,
    pub duration: Tick,
    pub instructions: Vec<TimedInstruction>,
}

impl SequencedProgram {
    pub fn on_channel(&self, channel: Channel) -> impl Iterator<Item = &TimedInstruction> {
        self.instructions.iter().filter(move |i| i.channel == channel)
    }
}

/// Lowers schedules through an [`ImplementationLookup`].
pub struct Sequencer<'a, L: ?Sized> {
    lookup: &'a L,
    verbosity: u8,
}

impl<'a, L: ImplementationLookup + ?Sized> Sequencer<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self {
            lookup,
            verbosity: 0,
        }
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn sequence(&self, schedule: &Schedule) -> Result<SequencedProgram, SequencerError> {
        let mut timeline: Vec<Tick> = vec![0; schedule.num_resources() as usize];
        let mut instructions: Vec<TimedInstruction> = Vec::new();

        for (index, entry) in schedule.entries().iter().enumerate() {
            let op = &entry.op;
            let bug = |detail: String| SequencerError::BugInScheduler {
                index,
                name: op.name().to_string(),
                detail,
            };
            let Some(&first) = op.resources().first() else {
                return Err(bug("touches no resources".to_string()));
            };
            if let Some(&r) = op.resources().iter().find(|&&r| r as usize >= timeline.len()) {
                return Err(bug(format!("uses undeclared resource {}", r)));
            }
            let start = timeline[first as usize];
            if let Some(&r) = op.resources().iter().find(|&&r| timeline[r as usize] != start) {
                return Err(bug(format!(
                    "resources disagree on start: {} is free at {}, {} at {}",
                    first, start, r, timeline[r as usize]
                )));
            }
            if start != entry.start {
                return Err(bug(format!("recorded at {} but resources are free at {}", entry.start, start)));
            }
            for &r in op.resources() {
                timeline[r as usize] += entry.duration;
            }
            log_debug!(self.verbosity, "[sequencer] {} '{}' at {}", index, op.name(), start);

            if op.is_marker() {
                continue;
            }
            if op.is_delay() {
                let r = first;
                for channel in [Channel::Drive(r), Channel::Measure(r), Channel::Acquire(r)] {
                    instructions.push(TimedInstruction {
                        start,
                        name: "delay".to_string(),
                        channel,
                        duration: entry.duration,
                    });
                }
                continue;
            }
            let implementation = self.lookup.get(op.name(), op.resources()).ok_or_else(|| {
                SequencerError::MissingImplementation {
                    name: op.name().to_string(),
                    resources: op.resources().to_vec(),
                }
            })?;
            instructions.extend(implementation.instructions.iter().map(|i| TimedInstruction {
                start: start + i.offset,
                name: i.name.clone(),
                channel: i.channel,
                duration: i.duration,
            }));
        }

        let actual = timeline
            .iter()
            .copied()
            .chain(instructions.iter().map(TimedInstruction::end))
            .max()
            .unwrap_or(0);
        let expected = schedule
            .duration()
            .unwrap_or_else(|| schedule.compute_duration());
        if actual != expected {
            return Err(SequencerError::InternalSchedulingInvariantViolation { expected, actual });
        }

        instructions.sort_by_key(|i| i.start);
        Ok(SequencedProgram {
            name: schedule.name().to_string(),
            duration: actual,
            instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRule;
    use crate::durations::DurationTable;
    use crate::models::Operation;
    use crate::program::{Program, ResourceLayout};
    use crate::scheduler::{ForwardScheduler, Scheduler, TimestepGrouper};

    fn make_table() -> DurationTable {
        vec![("x", vec![0], 3), ("measure", vec![1], 5)]
            .into_iter()
            .collect()
    }

    fn make_implementations() -> ImplementationMap {
        let mut map = ImplementationMap::new();
        map.insert(
            "x",
            &[0],
            Implementation::new(vec![Instruction::new("x_pulse", Channel::Drive(0), 0, 3)]),
        )
        .insert(
            "measure",
            &[1],
            Implementation::new(vec![
                Instruction::new("readout", Channel::Measure(1), 0, 5),
                Instruction::new("acquire", Channel::Acquire(1), 1, 4),
            ]),
        );
        map
    }

    fn make_program() -> Program {
        let mut program = Program::physical("p", 2);
        program.gate("x", &[0]).unwrap();
        program.gate("measure", &[1]).unwrap();
        program
    }

    #[test]
    fn test_expansion_and_idle_padding() {
        let table = make_table();
        let schedule = ForwardScheduler::new(&table).run(&make_program()).unwrap();
        let implementations = make_implementations();

        let sequenced = Sequencer::new(&implementations).sequence(&schedule).unwrap();

        assert_eq!(sequenced.duration, 5);
        let acquire: Vec<_> = sequenced.on_channel(Channel::Acquire(1)).collect();
        assert_eq!(acquire.len(), 1);
        assert_eq!(acquire[0].start, 1);
        // Delay(2) on resource 0 idles all three of its channels
        for channel in [Channel::Drive(0), Channel::Measure(0), Channel::Acquire(0)] {
            assert!(sequenced
                .on_channel(channel)
                .any(|i| i.name == "delay" && i.start == 3 && i.duration == 2));
        }
        assert!(sequenced.instructions.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn test_markers_are_dropped() {
        let table = make_table();
        let mut program = make_program();
        program.barrier(&[0, 1]).unwrap();
        let schedule = TimestepGrouper::new(&table, DelayRule::Shortest)
            .run(&program)
            .unwrap();
        let implementations = make_implementations();

        let sequenced = Sequencer::new(&implementations).sequence(&schedule).unwrap();

        assert!(sequenced
            .instructions
            .iter()
            .all(|i| i.name != "barrier" && i.name != "timestep"));
        assert_eq!(sequenced.duration, schedule.duration().unwrap());
    }

    #[test]
    fn test_tampered_start_is_a_scheduler_bug() {
        let mut schedule = Schedule::new("s", ResourceLayout::physical(1));
        schedule.push(Operation::gate("x", vec![0]), 1, 3, Some(0));
        schedule.seal();
        let implementations = make_implementations();

        let err = Sequencer::new(&implementations).sequence(&schedule).unwrap_err();
        assert!(matches!(err, SequencerError::BugInScheduler { index: 0, .. }));
    }

    #[test]
    fn test_disagreeing_resources_are_a_scheduler_bug() {
        let mut schedule = Schedule::new("s", ResourceLayout::physical(2));
        schedule.push(Operation::gate("x", vec![0]), 0, 3, Some(0));
        schedule.push(Operation::gate("cx", vec![0, 1]), 3, 2, Some(1));
        schedule.seal();
        let implementations = make_implementations();

        let err = Sequencer::new(&implementations).sequence(&schedule).unwrap_err();
        assert!(matches!(err, SequencerError::BugInScheduler { index: 1, .. }));
    }

    #[test]
    fn test_missing_implementation() {
        let table = make_table();
        let schedule = ForwardScheduler::new(&table).run(&make_program()).unwrap();
        let mut implementations = ImplementationMap::new();
        implementations.insert("x", &[0], Implementation::default());

        assert_eq!(
            Sequencer::new(&implementations).sequence(&schedule).unwrap_err(),
            SequencerError::MissingImplementation {
                name: "measure".to_string(),
                resources: vec![1],
            }
        );
    }

    #[test]
    fn test_overlong_implementation_breaks_duration() {
        let mut schedule = Schedule::new("s", ResourceLayout::physical(1));
        schedule.push(Operation::gate("x", vec![0]), 0, 3, Some(0));
        schedule.seal();
        let mut implementations = ImplementationMap::new();
        implementations.insert(
            "x",
            &[0],
            Implementation::new(vec![Instruction::new("x_pulse", Channel::Drive(0), 0, 4)]),
        );

        assert_eq!(
            Sequencer::new(&implementations).sequence(&schedule).unwrap_err(),
            SequencerError::InternalSchedulingInvariantViolation {
                expected: 3,
                actual: 4
            }
        );
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Drive(3).to_string(), "d3");
        assert_eq!(Channel::Acquire(0).to_string(), "a0");
    }
}
