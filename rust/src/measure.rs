//! Alignment of measurements to the target's measurement groups.
//!
//! Some targets can only measure fixed groups of resources together (the
//! "measurement map"). When a schedule measures only part of a group, the
//! rest of the group is measured as well, in the same interval, by turning
//! the tail of its idle Delay into a measurement.

use thiserror::Error;

use crate::models::{Operation, ResourceId, Tick};
use crate::schedule::{Schedule, ScheduledOp};

/// Name of the measurement operation.
pub const MEASURE: &str = "measure";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeasureError {
    #[error("Cannot align measurement of {resources:?} over [{start}, {end}): {reason}")]
    UnsupportedMeasureLayout {
        resources: Vec<ResourceId>,
        start: Tick,
        end: Tick,
        reason: String,
    },
}

/// Return a copy of `schedule` whose measurements respect `meas_map`.
///
/// Measurements with identical intervals form a group. A group that is not
/// itself a `meas_map` entry is extended to the first entry covering it;
/// each added resource must be idle in a Delay that ends with the group and
/// starts no later than it.
pub fn align_measurements(schedule: &Schedule, meas_map: &[Vec<ResourceId>]) -> Result<Schedule, MeasureError> {
    let meas_map: Vec<Vec<ResourceId>> = meas_map
        .iter()
        .map(|group| {
            let mut group = group.clone();
            group.sort_unstable();
            group
        })
        .collect();

    let mut groups: Vec<((Tick, Tick), Vec<ResourceId>)> = Vec::new();
    for entry in schedule.entries().iter().filter(|e| e.op.name() == MEASURE) {
        let interval = (entry.start, entry.end());
        match groups.iter_mut().find(|(i, _)| *i == interval) {
            Some((_, resources)) => resources.extend_from_slice(entry.op.resources()),
            None => groups.push((interval, entry.op.resources().to_vec())),
        }
    }
    if groups.is_empty() {
        return Ok(schedule.clone());
    }
    groups.sort_by_key(|(interval, _)| *interval);

    let mut entries: Vec<ScheduledOp> = schedule.entries().to_vec();
    for ((start, end), mut measured) in groups {
        measured.sort_unstable();
        if meas_map.contains(&measured) {
            continue;
        }
        let unsupported = |reason: String| MeasureError::UnsupportedMeasureLayout {
            resources: measured.clone(),
            start,
            end,
            reason,
        };
        let covering = meas_map
            .iter()
            .find(|group| measured.iter().all(|r| group.contains(r)))
            .ok_or_else(|| unsupported("no measurement group covers it".to_string()))?;

        let mut splits: Vec<usize> = Vec::new();
        for &r in covering.iter().filter(|r| !measured.contains(r)) {
            for (index, entry) in entries.iter().enumerate() {
                let overlaps = entry.start < end && start < entry.end();
                if entry.op.is_marker() || !entry.op.resources().contains(&r) || !overlaps {
                    continue;
                }
                if !entry.op.is_delay() {
                    return Err(unsupported(format!(
                        "resource {} is busy with '{}'",
                        r,
                        entry.op.name()
                    )));
                }
                if entry.end() != end || start < entry.start {
                    return Err(unsupported(format!(
                        "idle period [{}, {}) on resource {} does not end with the measurement",
                        entry.start,
                        entry.end(),
                        r
                    )));
                }
                splits.push(index);
            }
        }

        // Highest index first so earlier indices stay valid
        splits.sort_unstable_by(|a, b| b.cmp(a));
        for index in splits {
            let idle = entries[index].clone();
            let resource = idle.op.resources()[0];
            let mut replacement = Vec::with_capacity(2);
            if start > idle.start {
                replacement.push(ScheduledOp {
                    op: Operation::delay(start - idle.start, resource),
                    start: idle.start,
                    duration: start - idle.start,
                    source: idle.source,
                });
            }
            replacement.push(ScheduledOp {
                op: Operation::gate(MEASURE, vec![resource]),
                start,
                duration: end - start,
                source: None,
            });
            entries.splice(index..=index, replacement);
        }
    }

    let mut aligned = schedule.clone();
    *aligned.entries_mut() = entries;
    aligned.seal();
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durations::DurationTable;
    use crate::program::Program;
    use crate::scheduler::{ForwardScheduler, Scheduler};

    fn make_table() -> DurationTable {
        let mut table = DurationTable::new();
        table
            .register_default("x", 3)
            .register_default(MEASURE, 5);
        table
    }

    /// x then measure on resource 0; resource 1 idles throughout.
    fn make_schedule() -> Schedule {
        let mut program = Program::physical("p", 3);
        program.gate("x", &[0]).unwrap();
        program.gate(MEASURE, &[0]).unwrap();
        program.gate("x", &[2]).unwrap();
        ForwardScheduler::new(&make_table()).run(&program).unwrap()
    }

    #[test]
    fn test_partial_group_is_completed() {
        let schedule = make_schedule();
        let aligned = align_measurements(&schedule, &[vec![1, 0], vec![2]]).unwrap();

        assert_eq!(aligned.resource_intervals(1), vec![(0, 3), (3, 8)]);
        let measured: Vec<ResourceId> = aligned
            .entries()
            .iter()
            .filter(|e| e.op.name() == MEASURE)
            .map(|e| e.op.resources()[0])
            .collect();
        assert_eq!(measured, vec![0, 1]);
        assert_eq!(aligned.duration(), Some(8));
    }

    #[test]
    fn test_complete_group_is_untouched() {
        let schedule = make_schedule();
        let aligned = align_measurements(&schedule, &[vec![0], vec![1, 2]]).unwrap();
        assert_eq!(aligned.entries(), schedule.entries());
    }

    #[test]
    fn test_no_measurements() {
        let mut program = Program::physical("p", 1);
        program.gate("x", &[0]).unwrap();
        let schedule = ForwardScheduler::new(&make_table()).run(&program).unwrap();
        let aligned = align_measurements(&schedule, &[vec![0]]).unwrap();
        assert_eq!(aligned.entries(), schedule.entries());
    }

    #[test]
    fn test_uncovered_group() {
        let schedule = make_schedule();
        assert!(matches!(
            align_measurements(&schedule, &[vec![1, 2]]),
            Err(MeasureError::UnsupportedMeasureLayout { .. })
        ));
    }

    #[test]
    fn test_idle_period_matching_interval_becomes_measure() {
        // Resource 2 idles exactly over [3, 8)
        let schedule = make_schedule();
        let aligned = align_measurements(&schedule, &[vec![0, 2]]).unwrap();
        assert_eq!(aligned.len(), schedule.len());
        assert_eq!(aligned.resource_intervals(2), vec![(0, 3), (3, 8)]);
        assert_eq!(aligned.entries().last().unwrap().op.name(), MEASURE);
    }

    #[test]
    fn test_busy_partner() {
        let mut program = Program::physical("p", 2);
        program.gate("x", &[0]).unwrap();
        program.gate(MEASURE, &[0]).unwrap();
        program.gate("x", &[1]).unwrap();
        program.gate("x", &[1]).unwrap();
        let schedule = ForwardScheduler::new(&make_table()).run(&program).unwrap();

        let err = align_measurements(&schedule, &[vec![0, 1]]).unwrap_err();
        let MeasureError::UnsupportedMeasureLayout { reason, .. } = err;
        assert!(reason.contains("busy"));
    }

    #[test]
    fn test_idle_period_outlasting_measurement() {
        let mut program = Program::physical("p", 2);
        program.gate("x", &[0]).unwrap();
        program.gate(MEASURE, &[0]).unwrap();
        program.gate("x", &[0]).unwrap();
        let schedule = ForwardScheduler::new(&make_table()).run(&program).unwrap();

        let err = align_measurements(&schedule, &[vec![0, 1]]).unwrap_err();
        let MeasureError::UnsupportedMeasureLayout { start, end, reason, .. } = err;
        assert_eq!((start, end), (3, 8));
        assert!(reason.contains("does not end"));
    }
}
