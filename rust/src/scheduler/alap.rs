//! Latest-start scheduling by mirroring.

use crate::durations::{DurationTable, RoundingAnomaly, WarningSink};
use crate::mirror::{mirror_program, reverse_schedule, shift_timestep_markers};
use crate::program::Program;
use crate::schedule::Schedule;

use super::{ensure_physical, ForwardScheduler, Scheduler, SchedulerError, TimestepGrouper};

/// Runs `inner` on the time-reversed program and reverses the result.
///
/// Timestep markers, if the inner pass emits any, are moved back behind the
/// groups they close.
#[derive(Clone, Copy, Debug)]
pub struct Mirrored<'a, S> {
    inner: S,
    table: &'a DurationTable,
}

/// As-late-as-possible scheduling.
pub type AlapScheduler<'a> = Mirrored<'a, ForwardScheduler<'a>>;

/// Quantized as-late-as-possible scheduling.
pub type AlapTimestepScheduler<'a> = Mirrored<'a, TimestepGrouper<'a>>;

impl<'a, S: Scheduler> Mirrored<'a, S> {
    /// `table` must be the one `inner` resolves durations with.
    pub fn new(inner: S, table: &'a DurationTable) -> Self {
        Self {
            inner: inner.for_mirror(),
            table,
        }
    }
}

impl<S: Scheduler> Scheduler for Mirrored<'_, S> {
    fn run(&self, program: &Program) -> Result<Schedule, SchedulerError> {
        ensure_physical(program)?;
        let mut anomalies: Vec<RoundingAnomaly> = Vec::new();
        let mirror = mirror_program(program, self.table, &mut anomalies)?;
        let mirrored = self.inner.run(&mirror.program)?;

        let mut schedule = reverse_schedule(&mirrored, program, &mirror);
        if !schedule.timesteps().is_empty() {
            shift_timestep_markers(&mut schedule);
        }
        for anomaly in anomalies {
            schedule.warn(anomaly);
        }
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRule;
    use crate::dag::PrecedenceGraph;
    use crate::models::{OpId, Operation, TimeUnit, Tick};
    use crate::scheduler::testing::{assert_gap_free, make_random_program, shape};

    fn make_table() -> DurationTable {
        vec![
            ("a", vec![0], 3),
            ("d", vec![1], 1),
            ("c", vec![0, 1], 4),
            ("short", vec![0], 2),
            ("long", vec![1], 5),
        ]
        .into_iter()
        .collect()
    }

    /// Latest starts computed directly from the precedence graph against
    /// the earliest-start makespan.
    fn latest_starts(program: &Program, table: &DurationTable) -> Vec<Tick> {
        let total = ForwardScheduler::new(table)
            .run(program)
            .unwrap()
            .duration()
            .unwrap();
        let graph = PrecedenceGraph::build(program);
        let order = graph.topological_order().unwrap();
        let mut latest = vec![0; program.len()];
        for &id in order.iter().rev() {
            let finish = graph
                .succs(id)
                .iter()
                .map(|&s| latest[s as usize])
                .min()
                .unwrap_or(total);
            latest[id as usize] = finish - program.resolved_duration(id).unwrap();
        }
        latest
    }

    #[test]
    fn test_alap_delays_short_branch() {
        let table = make_table();
        let mut program = Program::physical("p", 2);
        let a = program.gate("a", &[0]).unwrap();
        let d = program.gate("d", &[1]).unwrap();
        let c = program.gate("c", &[0, 1]).unwrap();

        let schedule = AlapScheduler::new(ForwardScheduler::new(&table), &table)
            .run(&program)
            .unwrap();

        assert_eq!(schedule.start_of(a), Some(0));
        assert_eq!(schedule.start_of(d), Some(2));
        assert_eq!(schedule.start_of(c), Some(3));
        assert_eq!(schedule.duration(), Some(7));
        let first = &schedule.entries()[0];
        assert_eq!(first.op, Operation::delay(2, 1));
        assert_eq!(first.start, 0);
        assert_gap_free(&schedule);
    }

    #[test]
    fn test_alap_matches_direct_latest_start() {
        for seed in 1..40 {
            let (program, table) = make_random_program(seed, 4, 25);
            let expected = latest_starts(&program, &table);
            let schedule = AlapScheduler::new(ForwardScheduler::new(&table), &table)
                .run(&program)
                .unwrap();
            for id in 0..program.len() as OpId {
                assert_eq!(schedule.start_of(id), Some(expected[id as usize]), "seed {} op {}", seed, id);
            }
        }
    }

    #[test]
    fn test_alap_explicit_dependency() {
        let table = make_table();
        let mut program = Program::physical("p", 2);
        let a = program.gate("a", &[0]).unwrap();
        let d = program.gate("d", &[1]).unwrap();
        program.depend(d, a).unwrap();

        let schedule = AlapScheduler::new(ForwardScheduler::new(&table), &table)
            .run(&program)
            .unwrap();

        // d must finish before a starts; a sits at the end
        assert_eq!(schedule.duration(), Some(4));
        assert_eq!(schedule.start_of(a), Some(1));
        assert_eq!(schedule.start_of(d), Some(0));
    }

    #[test]
    fn test_alap_writes_durations_back() {
        let table = make_table();
        let mut program = Program::physical("p", 2);
        let a = program.gate("a", &[0]).unwrap();
        AlapScheduler::new(ForwardScheduler::new(&table), &table)
            .run(&program)
            .unwrap();
        assert_eq!(program.resolved_duration(a), Some(3));
    }

    #[test]
    fn test_alap_collects_rounding_anomalies() {
        let mut table = DurationTable::with_dt(2e-9).unwrap();
        table.register("a", &[0], 3);
        let mut program = Program::physical("p", 1);
        program.push(Operation::delay_in(35.5, TimeUnit::Ns, 0)).unwrap();
        program.gate("a", &[0]).unwrap();

        let schedule = AlapScheduler::new(ForwardScheduler::new(&table), &table)
            .run(&program)
            .unwrap();

        assert_eq!(schedule.anomalies().len(), 1);
        assert_eq!(schedule.duration(), Some(21));
    }

    #[test]
    fn test_alap_timestep_pads_before_short_operation() {
        let table = make_table();
        let mut program = Program::physical("p", 2);
        let a = program.gate("short", &[0]).unwrap();
        let b = program.gate("long", &[1]).unwrap();

        let schedule = AlapTimestepScheduler::new(TimestepGrouper::new(&table, DelayRule::Shortest), &table)
            .run(&program)
            .unwrap();

        assert_eq!(schedule.start_of(a), Some(3));
        assert_eq!(schedule.start_of(b), Some(0));
        assert_eq!(schedule.timesteps(), vec![(5, 5)]);
        assert!(schedule.entries().last().unwrap().op.is_timestep());
        assert_gap_free(&schedule);
    }

    #[test]
    fn test_alap_timestep_markers_close_their_groups() {
        let table = make_table();
        let mut program = Program::physical("p", 2);
        program.gate("short", &[0]).unwrap();
        program.gate("long", &[1]).unwrap();
        program.gate("c", &[0, 1]).unwrap();

        let schedule = AlapTimestepScheduler::new(TimestepGrouper::new(&table, DelayRule::Shortest), &table)
            .run(&program)
            .unwrap();

        // Mirror groups c' first (4), then long'/short' (5); reversed the
        // 5-tick group opens the schedule
        assert_eq!(schedule.timesteps(), vec![(5, 5), (9, 4)]);
        assert_eq!(schedule.start_of(2), Some(5));
        assert_eq!(schedule.start_of(0), Some(3));
        assert_gap_free(&schedule);
    }

    #[test]
    fn test_alap_timestep_rescheduled_output_keeps_its_steps() {
        let table = make_table();
        let mut program = Program::physical("p", 2);
        program.gate("short", &[0]).unwrap();
        program.gate("long", &[1]).unwrap();
        program.gate("c", &[0, 1]).unwrap();
        let scheduler = AlapTimestepScheduler::new(TimestepGrouper::new(&table, DelayRule::Shortest), &table);
        let first = scheduler.run(&program).unwrap();

        let second = scheduler.run(&first.to_program()).unwrap();

        assert_eq!(second.timesteps(), vec![(5, 5), (9, 4)]);
        assert_eq!(second.duration(), Some(9));
        assert!(second
            .entries()
            .iter()
            .filter(|e| e.op.is_timestep())
            .all(|e| e.source.is_some()));
        let mut expected = shape(&first);
        let mut actual = shape(&second);
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
        assert_gap_free(&second);
    }
}
